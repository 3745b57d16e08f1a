//! Double-buffered particle storage.

use glam::Vec4;
use rand::Rng;
use wgpu::util::DeviceExt;

use crate::field::GeoBounds;
use crate::ping_pong::PingPong;
use crate::spawn::{particles_texture_size, randomize_particles};

use crate::options::MAX_PARTICLES;

use super::{ResourceId, WORKGROUP_SIZE};

/// Bytes per particle slot (`vec4<f32>`).
pub const SLOT_SIZE: u64 = 16;

/// Largest `max_particles` whose slot square a device with `limits` can
/// bind as one storage buffer and advect in one dispatch.
pub fn max_supported_particles(limits: &wgpu::Limits) -> u32 {
    let slots = (limits.max_storage_buffer_binding_size as u64 / SLOT_SIZE)
        .min(limits.max_buffer_size / SLOT_SIZE)
        .min(limits.max_compute_workgroups_per_dimension as u64 * WORKGROUP_SIZE as u64)
        .min(MAX_PARTICLES as u64);

    // Storage holds texture_size² slots, so only full squares count.
    let mut side = (slots as f64).sqrt() as u64;
    while side * side > slots {
        side -= 1;
    }
    while (side + 1) * (side + 1) <= slots {
        side += 1;
    }
    (side * side) as u32
}

/// One of the two particle buffers.
pub struct ParticleBuffer {
    id: ResourceId,
    pub buffer: wgpu::Buffer,
}

impl ParticleBuffer {
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

/// Which buffer of the pair to address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferRole {
    /// Positions after the last advection.
    Read,
    /// Positions before the last advection; next advection target.
    Write,
}

/// Two equally sized particle buffers with alternating roles.
pub struct ParticleStore {
    buffers: PingPong<ParticleBuffer>,
    /// Side of the square slot layout.
    texture_size: u32,
    /// Particles that are drawn; the rest of the slots are only advected.
    drawn: u32,
}

impl ParticleStore {
    /// Allocate both buffers and seed them with the same positions.
    pub fn new<R: Rng + ?Sized>(
        device: &wgpu::Device,
        max_particles: u32,
        bounds: &GeoBounds,
        rng: &mut R,
    ) -> Self {
        let texture_size = particles_texture_size(max_particles);
        let slots = texture_size as usize * texture_size as usize;
        let positions = randomize_particles(slots, bounds, rng);

        let buffers = PingPong::from_fn(|i| ParticleBuffer {
            id: ResourceId::next(),
            buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Particle Buffer {}", if i == 0 { 'A' } else { 'B' })),
                contents: bytemuck::cast_slice(&positions),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            }),
        });

        tracing::debug!(slots, max_particles, "particle buffers seeded");

        Self {
            buffers,
            texture_size,
            drawn: max_particles,
        }
    }

    pub fn read(&self) -> &ParticleBuffer {
        self.buffers.read()
    }

    pub fn write(&self) -> &ParticleBuffer {
        self.buffers.write()
    }

    /// `(read, write)`.
    pub fn split(&self) -> (&ParticleBuffer, &ParticleBuffer) {
        self.buffers.split()
    }

    /// Exchange roles. Called once per frame, right after advection.
    pub fn swap(&mut self) {
        self.buffers.swap();
    }

    /// Overwrite one buffer; the other is left untouched.
    pub fn seed(&self, queue: &wgpu::Queue, role: BufferRole, positions: &[Vec4]) {
        let target = match role {
            BufferRole::Read => self.read(),
            BufferRole::Write => self.write(),
        };
        let len = positions.len().min(self.slot_count() as usize);
        queue.write_buffer(&target.buffer, 0, bytemuck::cast_slice(&positions[..len]));
    }

    pub fn texture_size(&self) -> u32 {
        self.texture_size
    }

    /// Slots in each buffer, `texture_size²`.
    pub fn slot_count(&self) -> u32 {
        self.texture_size * self.texture_size
    }

    pub fn drawn(&self) -> u32 {
        self.drawn
    }

    pub fn byte_size(&self) -> u64 {
        self.slot_count() as u64 * SLOT_SIZE
    }

    pub fn ids(&self) -> [ResourceId; 2] {
        self.buffers.map(ParticleBuffer::id)
    }

    pub fn destroy(&self) {
        for slot in self.buffers.iter() {
            slot.buffer.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits_allow_the_cap() {
        assert_eq!(max_supported_particles(&wgpu::Limits::default()), MAX_PARTICLES);
    }

    #[test]
    fn test_supported_count_is_a_full_square() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 1000 * SLOT_SIZE as u32,
            ..wgpu::Limits::default()
        };
        // 31² = 961 fits, 32² = 1024 does not.
        assert_eq!(max_supported_particles(&limits), 961);

        let limits = wgpu::Limits::downlevel_webgl2_defaults();
        assert_eq!(max_supported_particles(&limits), 0);
    }
}
