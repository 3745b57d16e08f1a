//! GPU resources and passes.
//!
//! Stages own only their pipelines and uniform buffers. Buffers and
//! textures are owned by the [`ParticleSystem`](crate::ParticleSystem) and
//! handed to each stage's `encode` call, which builds its bind group for
//! that frame.

mod advect;
mod composite;
mod field_gpu;
mod particles;
pub(crate) mod readback;
mod segments;
mod target;
mod trails;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::GpuError;

pub(crate) use advect::{AdvectionInputs, AdvectionStage};
pub(crate) use composite::CompositeStage;
pub(crate) use field_gpu::{ColorTableTexture, FieldTextures};
pub(crate) use particles::{BufferRole, ParticleStore};
pub use particles::max_supported_particles;
pub(crate) use segments::{SegmentInputs, SegmentStage};
pub(crate) use target::RenderTarget;
pub(crate) use trails::{TrailInputs, TrailStage};

pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub(crate) const TRAIL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub(crate) const WORKGROUP_SIZE: u32 = 256;

/// Process-unique identity of a GPU allocation.
///
/// A new id is issued every time a buffer pair, render target or texture
/// set is (re)created, so callers can tell whether a transition replaced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Device and queue for hosts without their own, and for tests.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Request an adapter (optionally compatible with `surface`) and a device.
    pub async fn new(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
    ) -> Result<Self, GpuError> {
        Self::request(instance, surface, false).await
    }

    /// Blocking headless context.
    ///
    /// Tries the primary backends first, then every backend, then a
    /// software adapter.
    pub fn headless() -> Result<Self, GpuError> {
        let attempts = [
            (wgpu::Backends::PRIMARY, false),
            (wgpu::Backends::all(), false),
            (wgpu::Backends::all(), true),
        ];
        let mut last_error = GpuError::NoAdapter;
        for (backends, force_fallback_adapter) in attempts {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends,
                ..Default::default()
            });
            match pollster::block_on(Self::request(instance, None, force_fallback_adapter)) {
                Ok(context) => return Ok(context),
                Err(e) => {
                    tracing::debug!(?backends, force_fallback_adapter, error = %e, "no usable adapter");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn request(
        instance: wgpu::Instance,
        surface: Option<&wgpu::Surface<'_>>,
        force_fallback_adapter: bool,
    ) -> Result<Self, GpuError> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Windtrail Device"),
                    required_features: wgpu::Features::empty(),
                    // Whatever the adapter offers; particle counts are checked
                    // against `device.limits()` at creation.
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        tracing::info!(adapter = ?adapter.get_info().name, "GPU device ready");

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }
}

/// Run `create` inside out-of-memory and validation error scopes.
///
/// Any error raised by the device while `create` runs is returned as
/// [`GpuError::Allocation`] instead of reaching the uncaptured-error handler.
pub(crate) fn allocation_scope<T>(
    device: &wgpu::Device,
    what: &str,
    create: impl FnOnce() -> T,
) -> Result<T, GpuError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = block_on_scope(device.pop_error_scope());
    let out_of_memory = block_on_scope(device.pop_error_scope());

    match out_of_memory.or(validation) {
        Some(error) => {
            tracing::warn!(%error, "allocating {} failed", what);
            Err(GpuError::Allocation(format!("{}: {}", what, error)))
        }
        None => Ok(value),
    }
}

fn block_on_scope(scope: impl Future<Output = Option<wgpu::Error>>) -> Option<wgpu::Error> {
    pollster::block_on(scope)
}

/// Block until `submission` (or all work, if `None`) has finished on the GPU.
pub(crate) fn wait_for(device: &wgpu::Device, submission: Option<wgpu::SubmissionIndex>) {
    let maintain = match submission {
        Some(index) => wgpu::Maintain::wait_for(index),
        None => wgpu::Maintain::Wait,
    };
    device.poll(maintain);
}

/// Number of workgroups covering `count` invocations.
pub(crate) fn workgroups(count: u32) -> u32 {
    count.div_ceil(WORKGROUP_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_ids_are_unique() {
        let a = ResourceId::next();
        let b = ResourceId::next();
        assert_ne!(a, b);
        assert!(b.get() > a.get());
    }

    #[test]
    fn test_workgroups_round_up() {
        assert_eq!(workgroups(1), 1);
        assert_eq!(workgroups(256), 1);
        assert_eq!(workgroups(257), 2);
        assert_eq!(workgroups(64 * 64), 16);
    }
}
