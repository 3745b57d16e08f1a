//! Per-stage uniform blocks.
//!
//! Each struct is `#[repr(C)]` + [`Pod`] and mirrors a WGSL struct declared
//! next to it. Every member is either a 16-byte vector or packed into a
//! trailing 16-byte row, so the Rust and WGSL layouts agree without
//! implicit padding.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::field::{AxisRange, FieldMetadata, GeoBounds};
use crate::options::{ParticleSystemOptions, Projection};

/// Inputs of the advection compute pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct AdvectionUniforms {
    pub minimum: [f32; 4],
    pub maximum: [f32; 4],
    /// Grid spacing per axis, 0 on singleton axes.
    pub interval: [f32; 4],
    pub dimension: [u32; 4],
    pub seed_min: [f32; 4],
    pub seed_max: [f32; 4],
    /// `(rel_min, rel_max, max_speed, _)`, metres per frame and m/s.
    pub speed: [f32; 4],
    pub drop_rate: f32,
    pub drop_rate_bump: f32,
    pub slot_count: u32,
    pub frame_seed: u32,
}

pub const ADVECTION_UNIFORMS_WGSL: &str = r#"
struct AdvectionUniforms {
    minimum: vec4<f32>,
    maximum: vec4<f32>,
    interval: vec4<f32>,
    dimension: vec4<u32>,
    seed_min: vec4<f32>,
    seed_max: vec4<f32>,
    speed: vec4<f32>,
    drop_rate: f32,
    drop_rate_bump: f32,
    slot_count: u32,
    frame_seed: u32,
};
"#;

impl AdvectionUniforms {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        field: &FieldMetadata,
        seed_bounds: &GeoBounds,
        speed_range: AxisRange,
        options: &ParticleSystemOptions,
        slot_count: u32,
        frame_seed: u32,
    ) -> Self {
        let dims = field.dimensions;
        Self {
            minimum: field.bounds.min().extend(0.0).to_array(),
            maximum: field.bounds.max().extend(0.0).to_array(),
            interval: field.spacing.extend(0.0).to_array(),
            dimension: [dims.lon, dims.lat, dims.lev, 0],
            seed_min: seed_bounds.min().extend(0.0).to_array(),
            seed_max: seed_bounds.max().extend(0.0).to_array(),
            speed: [speed_range.min, speed_range.max, field.max_speed(), 0.0],
            drop_rate: options.drop_rate,
            drop_rate_bump: options.drop_rate_bump,
            slot_count,
            frame_seed,
        }
    }
}

/// Inputs of the segment line draw.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SegmentUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// 0 = globe, 1 = equirectangular.
    pub projection: u32,
    pub particle_count: u32,
    pub particle_height: f32,
    pub color_count: u32,
}

pub const SEGMENT_UNIFORMS_WGSL: &str = r#"
struct SegmentUniforms {
    view_proj: mat4x4<f32>,
    projection: u32,
    particle_count: u32,
    particle_height: f32,
    color_count: u32,
};
"#;

impl SegmentUniforms {
    pub fn new(view_proj: Mat4, options: &ParticleSystemOptions, color_count: u32) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            projection: match options.projection {
                Projection::Globe => 0,
                Projection::Equirectangular => 1,
            },
            particle_count: options.max_particles,
            particle_height: options.particle_height,
            color_count,
        }
    }
}

/// Inputs of the trail accumulation pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TrailUniforms {
    pub fade_opacity: f32,
    pub _pad: [f32; 3],
}

pub const TRAIL_UNIFORMS_WGSL: &str = r#"
struct TrailUniforms {
    fade_opacity: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};
"#;

impl TrailUniforms {
    pub fn new(fade_opacity: f32) -> Self {
        Self {
            fade_opacity,
            _pad: [0.0; 3],
        }
    }
}
