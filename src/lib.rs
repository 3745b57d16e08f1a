//! # windtrail
//!
//! GPU wind particles with fading motion trails.
//!
//! A swarm of massless particles is advected through a static, pre-gridded
//! wind field on the GPU. Every frame draws one short line per particle
//! (from where it was to where it is), fades the accumulated trail image a
//! little and composites the new lines on top, then blends the trail over
//! the host's render target.
//!
//! ## Quick Start
//!
//! ```ignore
//! use windtrail::prelude::*;
//!
//! let field = VectorField::from_fn(
//!     GridDimensions::new(72, 37, 1),
//!     GeoBounds::new(
//!         AxisRange::new(-180.0, 180.0),
//!         AxisRange::new(-90.0, 90.0),
//!         AxisRange::new(0.0, 0.0),
//!     ),
//!     |_lon, lat, _lev| (15.0 * lat.to_radians().cos(), 0.0),
//! )?;
//! let colors = ColorTable::new(vec![[0.2, 0.4, 1.0], [1.0, 1.0, 1.0]])?;
//! let viewer = ViewerParameters::new(
//!     AxisRange::new(-180.0, 180.0),
//!     AxisRange::new(-90.0, 90.0),
//!     20_000.0,
//! );
//!
//! let mut system = ParticleSystem::new(
//!     &device,
//!     &queue,
//!     &field,
//!     &colors,
//!     ParticleSystemOptions::default().with_projection(Projection::Equirectangular),
//!     viewer,
//!     SurfaceSize::new(1280, 720, surface_format),
//! )?;
//!
//! // each frame
//! system.render(&device, &queue, &frame_view, view_proj)?;
//! ```
//!
//! ## Passes
//!
//! | Pass | Kind | Reads | Writes |
//! |------|------|-------|--------|
//! | Advection | compute | particles (read), U/V textures | particles (write) |
//! | Segments | line list | previous + latest particles, colour table | segment target |
//! | Trails | full screen | segment target, trail (read) | trail (write) |
//! | Composite | full screen | trail (read) | host target |
//!
//! Particles and trails are double-buffered ([`PingPong`]); the roles swap
//! once per frame so no pass reads what it writes.
//!
//! ## Lifecycle
//!
//! See [`lifecycle`]. `resize`, `refresh` and option changes rebuild the
//! affected resources after the GPU has finished with the old ones.

pub mod error;
pub mod field;
mod gpu;
pub mod lifecycle;
pub mod options;
mod particle_system;
pub mod ping_pong;
pub mod shader_utils;
pub mod spawn;
mod uniforms;

pub use error::{ConfigError, GpuError, PipelineError};
pub use field::{AxisRange, ColorTable, FieldMetadata, GeoBounds, GridDimensions, ScalarGrid, VectorField};
pub use glam::{Mat4, Vec3, Vec4};
pub use gpu::{max_supported_particles, GpuContext, ResourceId};
pub use lifecycle::PipelineState;
pub use options::{ParticleSystemOptions, Projection, SurfaceSize, ViewerParameters};
pub use particle_system::{ParticleSystem, ResourceSnapshot};
pub use ping_pong::PingPong;
pub use spawn::RESEEDED;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use windtrail::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        AxisRange, ColorTable, GeoBounds, GpuContext, GridDimensions, ParticleSystem, ParticleSystemOptions,
        PipelineError, PipelineState, Projection, SurfaceSize, VectorField, ViewerParameters,
    };
    pub use glam::{Mat4, Vec3, Vec4};
}
