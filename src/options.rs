//! Particle system configuration.
//!
//! Options are built with `with_*` methods on top of [`Default`] and checked
//! once by [`ParticleSystemOptions::validate`]. Out-of-range values are
//! rejected, never clamped.
//!
//! ```ignore
//! let options = ParticleSystemOptions::default()
//!     .with_max_particles(128 * 128)
//!     .with_fade_opacity(0.02)
//!     .with_drop_rate(0.003);
//! ```

use crate::error::ConfigError;
use crate::field::{AxisRange, FieldMetadata, GeoBounds};

/// Largest supported `max_particles` (a 2048 x 2048 slot square).
///
/// Fits the default wgpu limits for one storage binding and one 1D compute
/// dispatch. Devices with lower limits are checked by
/// [`ParticleSystemOptions::validate_for`].
pub const MAX_PARTICLES: u32 = 2048 * 2048;

/// How particle (lon, lat, lev) positions become world coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Projection {
    /// WGS84 earth-centred coordinates in metres, at `particle_height`.
    #[default]
    Globe,
    /// `(lon, lat, lev)` used directly as world `(x, y, z)`.
    Equirectangular,
}

/// Tunables of the particle system.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ParticleSystemOptions {
    /// Number of drawn particles. Storage is rounded up to a square.
    pub max_particles: u32,
    /// Per-frame probability that a particle is reseeded (0-1).
    pub drop_rate: f32,
    /// Extra reseed probability for particles that left the seed region.
    pub drop_rate_bump: f32,
    /// Fraction of the trail removed each frame (0 = never fades, 1 = no trail).
    pub fade_opacity: f32,
    /// Displacement of the slowest wind, in pixels per frame.
    pub uv_min_factor: f32,
    /// Displacement of the fastest wind, in pixels per frame.
    pub uv_max_factor: f32,
    /// Height above the ellipsoid for [`Projection::Globe`], in metres.
    pub particle_height: f32,
    pub projection: Projection,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ParticleSystemOptions {
    fn default() -> Self {
        Self {
            max_particles: 64 * 64,
            drop_rate: 0.003,
            drop_rate_bump: 0.01,
            fade_opacity: 0.004,
            uv_min_factor: 0.5,
            uv_max_factor: 2.0,
            particle_height: 100.0,
            projection: Projection::Globe,
            seed: None,
        }
    }
}

impl ParticleSystemOptions {
    pub fn with_max_particles(mut self, count: u32) -> Self {
        self.max_particles = count;
        self
    }

    pub fn with_drop_rate(mut self, rate: f32) -> Self {
        self.drop_rate = rate;
        self
    }

    pub fn with_drop_rate_bump(mut self, bump: f32) -> Self {
        self.drop_rate_bump = bump;
        self
    }

    pub fn with_fade_opacity(mut self, opacity: f32) -> Self {
        self.fade_opacity = opacity;
        self
    }

    /// Set the displacement range in pixels per frame for the slowest and fastest wind.
    pub fn with_speed_factors(mut self, min: f32, max: f32) -> Self {
        self.uv_min_factor = min;
        self.uv_max_factor = max;
        self
    }

    pub fn with_particle_height(mut self, height: f32) -> Self {
        self.particle_height = height;
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject anything the pipeline cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_particles == 0 {
            return Err(ConfigError::NoParticles);
        }
        if self.max_particles > MAX_PARTICLES {
            return Err(ConfigError::InvalidOption {
                name: "max_particles",
                value: self.max_particles as f32,
                reason: "must not exceed 2048 * 2048",
            });
        }
        unit_interval("drop_rate", self.drop_rate)?;
        unit_interval("fade_opacity", self.fade_opacity)?;
        non_negative("drop_rate_bump", self.drop_rate_bump)?;
        non_negative("uv_min_factor", self.uv_min_factor)?;
        non_negative("uv_max_factor", self.uv_max_factor)?;
        if self.uv_max_factor < self.uv_min_factor {
            return Err(ConfigError::InvalidOption {
                name: "uv_max_factor",
                value: self.uv_max_factor,
                reason: "must not be smaller than uv_min_factor",
            });
        }
        if !self.particle_height.is_finite() {
            return Err(ConfigError::InvalidOption {
                name: "particle_height",
                value: self.particle_height,
                reason: "must be finite",
            });
        }
        Ok(())
    }

    /// [`validate`](Self::validate), then check the particle buffers can be
    /// bound and advected in one dispatch on a device with `limits`.
    pub fn validate_for(&self, limits: &wgpu::Limits) -> Result<(), ConfigError> {
        self.validate()?;
        if self.max_particles > crate::gpu::max_supported_particles(limits) {
            return Err(ConfigError::InvalidOption {
                name: "max_particles",
                value: self.max_particles as f32,
                reason: "exceeds the device's storage binding or dispatch limits",
            });
        }
        Ok(())
    }

    /// Side of the square slot layout holding `max_particles`.
    pub fn particles_texture_size(&self) -> u32 {
        crate::spawn::particles_texture_size(self.max_particles)
    }

    /// Displacement range in metres per frame for a given pixel size.
    pub fn relative_speed_range(&self, pixel_size: f32) -> AxisRange {
        AxisRange::new(self.uv_min_factor * pixel_size, self.uv_max_factor * pixel_size)
    }
}

fn unit_interval(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::InvalidOption {
            name,
            value,
            reason: "must be within [0, 1]",
        });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidOption {
            name,
            value,
            reason: "must be finite and non-negative",
        });
    }
    Ok(())
}

/// What the viewer currently sees, supplied by the host on refresh.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ViewerParameters {
    /// Visible longitude range in degrees.
    pub lon: AxisRange,
    /// Visible latitude range in degrees.
    pub lat: AxisRange,
    /// World size of one screen pixel, in metres.
    pub pixel_size: f32,
}

impl ViewerParameters {
    pub fn new(lon: AxisRange, lat: AxisRange, pixel_size: f32) -> Self {
        Self { lon, lat, pixel_size }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.pixel_size.is_finite() || self.pixel_size <= 0.0 {
            return Err(ConfigError::InvalidOption {
                name: "pixel_size",
                value: self.pixel_size,
                reason: "must be finite and positive",
            });
        }
        for (name, range) in [("lon", self.lon), ("lat", self.lat)] {
            if !range.min.is_finite() || !range.max.is_finite() || range.max < range.min {
                return Err(ConfigError::DegenerateBounds {
                    axis: name,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    /// Region particles are seeded into: visible lon/lat clipped to the field,
    /// with the field's whole level range.
    pub fn seed_bounds(&self, field: &FieldMetadata) -> Result<GeoBounds, ConfigError> {
        let lon = self
            .lon
            .intersect(&field.bounds.lon)
            .ok_or(ConfigError::EmptySeedRegion)?;
        let lat = self
            .lat
            .intersect(&field.bounds.lat)
            .ok_or(ConfigError::EmptySeedRegion)?;
        Ok(GeoBounds::new(lon, lat, field.bounds.lev))
    }
}

/// Size and format of the host's render target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

impl SurfaceSize {
    pub fn new(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self { width, height, format }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::EmptySurface {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{GridDimensions, VectorField};

    #[test]
    fn test_defaults_are_valid() {
        assert!(ParticleSystemOptions::default().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = ParticleSystemOptions::default()
            .with_max_particles(10)
            .with_drop_rate(0.5)
            .with_drop_rate_bump(0.2)
            .with_fade_opacity(1.0)
            .with_speed_factors(1.0, 3.0)
            .with_projection(Projection::Equirectangular)
            .with_seed(7);

        assert_eq!(options.max_particles, 10);
        assert_eq!(options.particles_texture_size(), 4);
        assert!((options.drop_rate - 0.5).abs() < 1e-6);
        assert_eq!(options.projection, Projection::Equirectangular);
        assert_eq!(options.seed, Some(7));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_zero_particles_rejected() {
        let options = ParticleSystemOptions::default().with_max_particles(0);
        assert_eq!(options.validate(), Err(ConfigError::NoParticles));

        let options = ParticleSystemOptions::default().with_max_particles(MAX_PARTICLES + 1);
        assert!(matches!(
            options.validate(),
            Err(ConfigError::InvalidOption { name: "max_particles", .. })
        ));
        assert!(ParticleSystemOptions::default()
            .with_max_particles(MAX_PARTICLES)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_max_particles_fit_default_limits() {
        let limits = wgpu::Limits::default();
        let options = ParticleSystemOptions::default().with_max_particles(MAX_PARTICLES);
        assert!(options.validate_for(&limits).is_ok());

        let slots = options.particles_texture_size() as u64 * options.particles_texture_size() as u64;
        assert!(slots * 16 <= limits.max_storage_buffer_binding_size as u64);
        assert!(slots.div_ceil(256) <= limits.max_compute_workgroups_per_dimension as u64);
    }

    #[test]
    fn test_particle_count_checked_against_device_limits() {
        // 9M slots need 144 MB of storage binding, past the 128 MiB default.
        let options = ParticleSystemOptions::default().with_max_particles(9_000_000);
        assert!(options.validate().is_err());

        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 64 * 64 * 16,
            ..wgpu::Limits::default()
        };
        assert!(ParticleSystemOptions::default()
            .with_max_particles(64 * 64)
            .validate_for(&limits)
            .is_ok());
        assert!(matches!(
            ParticleSystemOptions::default()
                .with_max_particles(64 * 64 + 1)
                .validate_for(&limits),
            Err(ConfigError::InvalidOption { name: "max_particles", .. })
        ));

        let limits = wgpu::Limits {
            max_compute_workgroups_per_dimension: 4,
            ..wgpu::Limits::default()
        };
        assert!(ParticleSystemOptions::default()
            .with_max_particles(32 * 32)
            .validate_for(&limits)
            .is_ok());
        assert!(ParticleSystemOptions::default()
            .with_max_particles(32 * 32 + 1)
            .validate_for(&limits)
            .is_err());
    }

    #[test]
    fn test_probabilities_not_clamped() {
        let err = ParticleSystemOptions::default().with_drop_rate(1.5).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { name: "drop_rate", .. }));

        let err = ParticleSystemOptions::default().with_fade_opacity(-0.1).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { name: "fade_opacity", .. }));

        let err = ParticleSystemOptions::default()
            .with_fade_opacity(f32::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { name: "fade_opacity", .. }));
    }

    #[test]
    fn test_speed_factors_ordered() {
        let err = ParticleSystemOptions::default()
            .with_speed_factors(2.0, 1.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { name: "uv_max_factor", .. }));
    }

    #[test]
    fn test_relative_speed_range_scales_with_pixel_size() {
        let options = ParticleSystemOptions::default().with_speed_factors(0.5, 2.0);
        let range = options.relative_speed_range(1000.0);
        assert!((range.min - 500.0).abs() < 1e-3);
        assert!((range.max - 2000.0).abs() < 1e-3);
    }

    #[test]
    fn test_seed_bounds_clip_to_field() {
        let field = VectorField::from_fn(
            GridDimensions::new(2, 2, 2),
            GeoBounds::new(
                AxisRange::new(0.0, 10.0),
                AxisRange::new(0.0, 10.0),
                AxisRange::new(100.0, 200.0),
            ),
            |_, _, _| (0.0, 0.0),
        )
        .unwrap()
        .metadata();

        let viewer = ViewerParameters::new(AxisRange::new(-20.0, 5.0), AxisRange::new(2.0, 3.0), 1.0);
        let bounds = viewer.seed_bounds(&field).unwrap();
        assert_eq!(bounds.lon, AxisRange::new(0.0, 5.0));
        assert_eq!(bounds.lat, AxisRange::new(2.0, 3.0));
        assert_eq!(bounds.lev, AxisRange::new(100.0, 200.0));

        let outside = ViewerParameters::new(AxisRange::new(20.0, 30.0), AxisRange::new(2.0, 3.0), 1.0);
        assert_eq!(outside.seed_bounds(&field), Err(ConfigError::EmptySeedRegion));
    }

    #[test]
    fn test_viewer_validation() {
        let viewer = ViewerParameters::new(AxisRange::new(0.0, 10.0), AxisRange::new(0.0, 10.0), 0.0);
        assert!(viewer.validate().is_err());

        let viewer = ViewerParameters::new(AxisRange::new(10.0, 0.0), AxisRange::new(0.0, 10.0), 1.0);
        assert!(matches!(viewer.validate(), Err(ConfigError::DegenerateBounds { axis: "lon", .. })));
    }

    #[test]
    fn test_empty_surface_rejected() {
        let surface = SurfaceSize::new(0, 10, wgpu::TextureFormat::Rgba8Unorm);
        assert!(surface.validate().is_err());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_options_from_partial_json() {
        let options: ParticleSystemOptions =
            serde_json::from_str(r#"{ "max_particles": 256, "projection": "Equirectangular" }"#).unwrap();
        assert_eq!(options.max_particles, 256);
        assert_eq!(options.projection, Projection::Equirectangular);
        assert!((options.drop_rate - 0.003).abs() < 1e-6);
    }
}
