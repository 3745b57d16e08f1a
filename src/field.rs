//! Pre-gridded wind fields and colour tables.
//!
//! A [`VectorField`] is a regular lon/lat/level grid carrying two scalar
//! components: `U` (eastward) and `V` (northward), both in metres per second.
//! Values are stored lon-fastest, then lat, then level:
//!
//! ```text
//! index = lev * (lat_count * lon_count) + lat * lon_count + lon
//! ```
//!
//! On the GPU each component becomes an `R32Float` texture of
//! `lon_count x (lat_count * lev_count)` texels, sampled nearest-neighbour.
//!
//! # Example
//!
//! ```ignore
//! let field = VectorField::from_fn(
//!     GridDimensions::new(72, 37, 1),
//!     GeoBounds::new(
//!         AxisRange::new(0.0, 355.0),
//!         AxisRange::new(-90.0, 90.0),
//!         AxisRange::new(0.0, 0.0),
//!     ),
//!     |lon, lat, _lev| (10.0 * lat.to_radians().cos(), 0.0),
//! )?;
//! ```

use glam::{Vec2, Vec3};

use crate::error::ConfigError;

/// Closed interval on one axis.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
}

impl AxisRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Width of the interval.
    pub fn span(&self) -> f32 {
        self.max - self.min
    }

    /// Whether `value` lies inside the interval (inclusive).
    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }

    /// Overlap of two intervals, `None` if they are disjoint.
    pub fn intersect(&self, other: &AxisRange) -> Option<AxisRange> {
        let min = self.min.max(other.min);
        let max = self.max.min(other.max);
        (min <= max).then_some(AxisRange { min, max })
    }

    /// Largest absolute value inside the interval.
    pub fn magnitude(&self) -> f32 {
        self.min.abs().max(self.max.abs())
    }

    fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }
}

/// Lon/lat/level box, all bounds inclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    pub lon: AxisRange,
    pub lat: AxisRange,
    pub lev: AxisRange,
}

impl GeoBounds {
    pub const fn new(lon: AxisRange, lat: AxisRange, lev: AxisRange) -> Self {
        Self { lon, lat, lev }
    }

    pub fn min(&self) -> Vec3 {
        Vec3::new(self.lon.min, self.lat.min, self.lev.min)
    }

    pub fn max(&self) -> Vec3 {
        Vec3::new(self.lon.max, self.lat.max, self.lev.max)
    }

    /// Whether a (lon, lat, lev) position lies inside the box.
    pub fn contains(&self, position: Vec3) -> bool {
        self.lon.contains(position.x) && self.lat.contains(position.y) && self.lev.contains(position.z)
    }
}

/// Number of grid nodes along each axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridDimensions {
    pub lon: u32,
    pub lat: u32,
    pub lev: u32,
}

impl GridDimensions {
    pub const fn new(lon: u32, lat: u32, lev: u32) -> Self {
        Self { lon, lat, lev }
    }

    /// Total number of grid nodes.
    pub fn cells(&self) -> usize {
        self.lon as usize * self.lat as usize * self.lev as usize
    }

    /// Flat index of a grid node.
    pub fn index(&self, lon: u32, lat: u32, lev: u32) -> usize {
        (lev as usize * self.lat as usize + lat as usize) * self.lon as usize + lon as usize
    }
}

/// One scalar component of the field with its value range.
#[derive(Clone, Debug, PartialEq)]
pub struct ScalarGrid {
    pub values: Vec<f32>,
    pub min: f32,
    pub max: f32,
}

impl ScalarGrid {
    /// Wrap values, computing min/max from the data.
    pub fn new(values: Vec<f32>) -> Self {
        if values.is_empty() {
            return Self { values, min: 0.0, max: 0.0 };
        }
        let (min, max) = values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Self { values, min, max }
    }

    /// Wrap values with a range supplied by the data source.
    pub fn with_range(values: Vec<f32>, min: f32, max: f32) -> Self {
        Self { values, min, max }
    }

    /// Largest absolute value the range admits.
    pub fn magnitude(&self) -> f32 {
        AxisRange::new(self.min, self.max).magnitude()
    }
}

/// Immutable wind field on a regular lon/lat/level grid.
#[derive(Clone, Debug)]
pub struct VectorField {
    dimensions: GridDimensions,
    bounds: GeoBounds,
    u: ScalarGrid,
    v: ScalarGrid,
}

impl VectorField {
    /// Build a field, rejecting degenerate grids and mismatched arrays.
    ///
    /// An axis with a single node may have `min == max`; its spacing is 0.
    pub fn new(
        dimensions: GridDimensions,
        bounds: GeoBounds,
        u: ScalarGrid,
        v: ScalarGrid,
    ) -> Result<Self, ConfigError> {
        check_axis("lon", dimensions.lon, &bounds.lon)?;
        check_axis("lat", dimensions.lat, &bounds.lat)?;
        check_axis("lev", dimensions.lev, &bounds.lev)?;

        let expected = dimensions.cells();
        for (component, grid) in [("U", &u), ("V", &v)] {
            if grid.values.len() != expected {
                return Err(ConfigError::FieldSizeMismatch {
                    component,
                    expected,
                    actual: grid.values.len(),
                });
            }
        }

        Ok(Self {
            dimensions,
            bounds,
            u,
            v,
        })
    }

    /// Build a field by evaluating `f(lon, lat, lev) -> (u, v)` at every node.
    pub fn from_fn<F>(dimensions: GridDimensions, bounds: GeoBounds, f: F) -> Result<Self, ConfigError>
    where
        F: Fn(f32, f32, f32) -> (f32, f32),
    {
        let spacing = spacing_of(&dimensions, &bounds);
        let cells = dimensions.cells();
        let mut u = Vec::with_capacity(cells);
        let mut v = Vec::with_capacity(cells);
        for lev in 0..dimensions.lev {
            for lat in 0..dimensions.lat {
                for lon in 0..dimensions.lon {
                    let (du, dv) = f(
                        bounds.lon.min + lon as f32 * spacing.x,
                        bounds.lat.min + lat as f32 * spacing.y,
                        bounds.lev.min + lev as f32 * spacing.z,
                    );
                    u.push(du);
                    v.push(dv);
                }
            }
        }
        Self::new(dimensions, bounds, ScalarGrid::new(u), ScalarGrid::new(v))
    }

    pub fn dimensions(&self) -> GridDimensions {
        self.dimensions
    }

    pub fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    pub fn u(&self) -> &ScalarGrid {
        &self.u
    }

    pub fn v(&self) -> &ScalarGrid {
        &self.v
    }

    /// Grid spacing per axis: `(max - min) / (count - 1)`, 0 for singleton axes.
    pub fn spacing(&self) -> Vec3 {
        spacing_of(&self.dimensions, &self.bounds)
    }

    /// Largest wind speed the U/V ranges admit, used to normalise speeds.
    pub fn max_speed(&self) -> f32 {
        self.metadata().max_speed()
    }

    /// Copy of everything the pipeline needs after the textures are uploaded.
    pub fn metadata(&self) -> FieldMetadata {
        FieldMetadata {
            dimensions: self.dimensions,
            bounds: self.bounds,
            spacing: self.spacing(),
            u_range: AxisRange::new(self.u.min, self.u.max),
            v_range: AxisRange::new(self.v.min, self.v.max),
        }
    }
}

/// Field description retained by the pipeline once the data lives on the GPU.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldMetadata {
    pub dimensions: GridDimensions,
    pub bounds: GeoBounds,
    pub spacing: Vec3,
    pub u_range: AxisRange,
    pub v_range: AxisRange,
}

impl FieldMetadata {
    /// Largest wind speed the U/V ranges admit, used to normalise speeds.
    pub fn max_speed(&self) -> f32 {
        Vec2::new(self.u_range.magnitude(), self.v_range.magnitude()).length()
    }

    /// Length of one grid cell's diagonal in lon/lat/lev units.
    pub fn cell_diagonal(&self) -> f32 {
        self.spacing.length()
    }
}

fn check_axis(axis: &'static str, count: u32, range: &AxisRange) -> Result<(), ConfigError> {
    if count == 0 {
        return Err(ConfigError::GridTooSmall { axis });
    }
    let degenerate = !range.is_finite()
        || if count == 1 {
            range.max < range.min
        } else {
            range.max <= range.min
        };
    if degenerate {
        return Err(ConfigError::DegenerateBounds {
            axis,
            min: range.min,
            max: range.max,
        });
    }
    Ok(())
}

fn spacing_of(dimensions: &GridDimensions, bounds: &GeoBounds) -> Vec3 {
    let step = |count: u32, range: &AxisRange| {
        if count > 1 {
            range.span() / (count - 1) as f32
        } else {
            0.0
        }
    };
    Vec3::new(
        step(dimensions.lon, &bounds.lon),
        step(dimensions.lat, &bounds.lat),
        step(dimensions.lev, &bounds.lev),
    )
}

/// Speed colour ramp: entry 0 is the slowest speed, the last entry the fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorTable {
    colors: Vec<[f32; 3]>,
}

impl ColorTable {
    /// Create a colour table from RGB triples in 0-1.
    pub fn new(colors: Vec<[f32; 3]>) -> Result<Self, ConfigError> {
        if colors.is_empty() {
            return Err(ConfigError::EmptyColorTable);
        }
        Ok(Self { colors })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    /// RGBA8 texel data for a `len x 1` texture.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let to_byte = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
        self.colors
            .iter()
            .flat_map(|[r, g, b]| [to_byte(*r), to_byte(*g), to_byte(*b), 255])
            .collect()
    }
}
