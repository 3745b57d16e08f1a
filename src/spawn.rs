//! Particle seeding.
//!
//! Particles are stored as one `vec4<f32>` slot each: `xyz` is
//! (lon, lat, lev), `w` is the speed fraction of the last step or
//! [`RESEEDED`] when the slot was respawned this frame. Slots form a square
//! of side [`particles_texture_size`].

use glam::Vec4;
use rand::Rng;

use crate::field::{AxisRange, GeoBounds};

/// `w` marker of a slot that was respawned during the current frame.
pub const RESEEDED: f32 = -1.0;

/// Side of the smallest square holding `max_particles` slots.
pub fn particles_texture_size(max_particles: u32) -> u32 {
    let n = max_particles as u64;
    let mut side = (n as f64).sqrt().ceil() as u64;
    while side * side < n {
        side += 1;
    }
    while side > 0 && (side - 1) * (side - 1) >= n {
        side -= 1;
    }
    side as u32
}

/// Draw `count` positions uniformly inside `bounds`, one independent draw per axis.
pub fn randomize_particles<R: Rng + ?Sized>(count: usize, bounds: &GeoBounds, rng: &mut R) -> Vec<Vec4> {
    (0..count)
        .map(|_| {
            Vec4::new(
                sample_axis(&bounds.lon, rng),
                sample_axis(&bounds.lat, rng),
                sample_axis(&bounds.lev, rng),
                0.0,
            )
        })
        .collect()
}

fn sample_axis<R: Rng + ?Sized>(range: &AxisRange, rng: &mut R) -> f32 {
    if range.max <= range.min {
        return range.min;
    }
    rng.gen_range(range.min..=range.max)
}
