//! The particle system: owns every GPU resource and runs the four passes.
//!
//! Frame order:
//!
//! ```text
//! advect(particles.read -> particles.write)
//! particles.swap()
//! segments(previous = particles.write, latest = particles.read) -> segment target
//! trails(segment target, trails.read -> trails.write)
//! trails.swap()
//! composite(trails.read) -> host target
//! submit
//! ```
//!
//! Every operation takes `&mut self`, so a resize or refresh can never run
//! while a frame is being encoded; it always lands between two submitted
//! frames. Replaced resources are destroyed only after the GPU has finished
//! the last submitted frame.

use glam::{Mat4, Vec4};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::PipelineError;
use crate::field::{AxisRange, ColorTable, FieldMetadata, GeoBounds, VectorField};
use crate::gpu::{
    self, readback, AdvectionInputs, AdvectionStage, BufferRole, ColorTableTexture, CompositeStage,
    FieldTextures, ParticleStore, RenderTarget, ResourceId, SegmentInputs, SegmentStage, TrailInputs,
    TrailStage,
};
use crate::lifecycle::{Lifecycle, PipelineState, TransitionKind};
use crate::options::{ParticleSystemOptions, SurfaceSize, ViewerParameters};
use crate::ping_pong::PingPong;
use crate::uniforms::{AdvectionUniforms, SegmentUniforms, TrailUniforms};

/// Ids of every replaceable GPU allocation, for telling old from new.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Particle buffers in storage order.
    pub particles: [ResourceId; 2],
    pub segments: ResourceId,
    /// Trail targets in storage order.
    pub trails: [ResourceId; 2],
    pub field: ResourceId,
    pub color_table: ResourceId,
}

/// GPU wind particles with fading trails.
///
/// # Example
///
/// ```ignore
/// let mut system = ParticleSystem::new(
///     &device,
///     &queue,
///     &field,
///     &colors,
///     ParticleSystemOptions::default(),
///     viewer,
///     SurfaceSize::new(width, height, format),
/// )?;
///
/// // every frame
/// system.render(&device, &queue, &frame_view, camera.view_proj())?;
/// ```
pub struct ParticleSystem {
    lifecycle: Lifecycle,
    options: ParticleSystemOptions,
    viewer: ViewerParameters,
    seed_bounds: GeoBounds,
    speed_range: AxisRange,
    surface: SurfaceSize,
    field: FieldTextures,
    colors: ColorTableTexture,
    particles: ParticleStore,
    segments: RenderTarget,
    trails: PingPong<RenderTarget>,
    advect: AdvectionStage,
    segment_stage: SegmentStage,
    trail_stage: TrailStage,
    composite: CompositeStage,
    rng: SmallRng,
    frame: u64,
    last_submission: Option<wgpu::SubmissionIndex>,
}

impl ParticleSystem {
    /// Validate the inputs, then allocate and seed everything.
    ///
    /// Nothing touches the GPU until every input has been validated. If any
    /// allocation fails, everything allocated so far is released and the
    /// error is returned.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        field: &VectorField,
        color_table: &ColorTable,
        options: ParticleSystemOptions,
        viewer: ViewerParameters,
        surface: SurfaceSize,
    ) -> Result<Self, PipelineError> {
        options.validate_for(&device.limits())?;
        viewer.validate()?;
        surface.validate()?;
        let seed_bounds = viewer.seed_bounds(&field.metadata())?;
        let speed_range = options.relative_speed_range(viewer.pixel_size);

        let mut rng = match options.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        let mut system = gpu::allocation_scope(device, "particle system", || Self {
            field: FieldTextures::new(device, queue, field),
            colors: ColorTableTexture::new(device, queue, color_table),
            particles: ParticleStore::new(device, options.max_particles, &seed_bounds, &mut rng),
            segments: RenderTarget::new(device, "Segment", surface.width, surface.height),
            trails: create_trails(device, surface.width, surface.height),
            advect: AdvectionStage::new(device),
            segment_stage: SegmentStage::new(device),
            trail_stage: TrailStage::new(device),
            composite: CompositeStage::new(device, surface.format),
            lifecycle: Lifecycle::new(),
            options,
            viewer,
            seed_bounds,
            speed_range,
            surface,
            rng,
            frame: 0,
            last_submission: None,
        })?;

        system.clear_targets(device, queue);
        system.lifecycle.mark_ready()?;

        tracing::info!(
            particles = system.options.max_particles,
            texture_size = system.particles.texture_size(),
            width = surface.width,
            height = surface.height,
            "particle system ready"
        );

        Ok(system)
    }

    /// Advance the particles one step and draw the trails over `target`.
    ///
    /// `target` must have the format given in [`SurfaceSize`] at creation.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &wgpu::TextureView,
        view_proj: Mat4,
    ) -> Result<(), PipelineError> {
        self.lifecycle.begin_frame()?;

        let frame_seed: u32 = self.rng.gen();
        self.advect.update(
            queue,
            &AdvectionUniforms::new(
                self.field.metadata(),
                &self.seed_bounds,
                self.speed_range,
                &self.options,
                self.particles.slot_count(),
                frame_seed,
            ),
        );
        self.segment_stage.update(
            queue,
            &SegmentUniforms::new(view_proj, &self.options, self.colors.color_count()),
        );
        self.trail_stage
            .update(queue, &TrailUniforms::new(self.options.fade_opacity));

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Wind Frame Encoder"),
        });

        let (current, next) = self.particles.split();
        self.advect.encode(
            device,
            &mut encoder,
            AdvectionInputs {
                current,
                next,
                field: &self.field,
                slot_count: self.particles.slot_count(),
            },
        );
        self.particles.swap();

        let (latest, previous) = self.particles.split();
        self.segment_stage.encode(
            device,
            &mut encoder,
            SegmentInputs {
                previous,
                latest,
                colors: &self.colors,
                target: &self.segments,
                particle_count: self.particles.drawn(),
            },
        );

        let (current, next) = self.trails.split();
        self.trail_stage.encode(
            device,
            &mut encoder,
            TrailInputs {
                segments: &self.segments,
                current,
                next,
            },
        );
        self.trails.swap();

        self.composite
            .encode(device, &mut encoder, self.trails.read(), target);

        self.last_submission = Some(queue.submit(Some(encoder.finish())));
        self.frame += 1;
        Ok(())
    }

    /// Re-seed for a new view: new seed region and speed range, fresh
    /// particle buffers, cleared trails.
    pub fn refresh(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        viewer: ViewerParameters,
    ) -> Result<(), PipelineError> {
        self.ensure_live("refresh")?;
        viewer.validate()?;
        let seed_bounds = viewer.seed_bounds(self.field.metadata())?;

        self.lifecycle.begin_transition(TransitionKind::Refresh)?;

        let max_particles = self.options.max_particles;
        let rng = &mut self.rng;
        let particles = gpu::allocation_scope(device, "particle buffers", || {
            ParticleStore::new(device, max_particles, &seed_bounds, rng)
        })?;
        self.replace_particles(device, particles);

        self.viewer = viewer;
        self.seed_bounds = seed_bounds;
        self.speed_range = self.options.relative_speed_range(viewer.pixel_size);
        self.clear_targets(device, queue);
        self.lifecycle.mark_ready()?;

        tracing::info!(
            lon_min = seed_bounds.lon.min,
            lon_max = seed_bounds.lon.max,
            lat_min = seed_bounds.lat.min,
            lat_max = seed_bounds.lat.max,
            "particles refreshed"
        );
        Ok(())
    }

    /// Recreate the screen-sized targets.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<(), PipelineError> {
        self.ensure_live("resize")?;
        let surface = SurfaceSize::new(width, height, self.surface.format);
        surface.validate()?;

        self.lifecycle.begin_transition(TransitionKind::Resize)?;

        let (segments, trails) = gpu::allocation_scope(device, "screen targets", || {
            (
                RenderTarget::new(device, "Segment", width, height),
                create_trails(device, width, height),
            )
        })?;

        gpu::wait_for(device, self.last_submission.take());
        let old_segments = std::mem::replace(&mut self.segments, segments);
        let old_trails = std::mem::replace(&mut self.trails, trails);
        old_segments.destroy();
        for target in old_trails.iter() {
            target.destroy();
        }

        self.surface = surface;
        self.clear_targets(device, queue);
        self.lifecycle.mark_ready()?;

        tracing::info!(width, height, "screen targets resized");
        Ok(())
    }

    /// Replace the options.
    ///
    /// A different `max_particles` reallocates and reseeds the particle
    /// buffers. Everything else takes effect on the next frame. The RNG
    /// seed is only read at creation.
    pub fn set_options(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        options: ParticleSystemOptions,
    ) -> Result<(), PipelineError> {
        self.ensure_live("set options")?;
        options.validate_for(&device.limits())?;

        if options.max_particles == self.options.max_particles {
            self.speed_range = options.relative_speed_range(self.viewer.pixel_size);
            self.options = options;
            return Ok(());
        }

        self.lifecycle.begin_transition(TransitionKind::Refresh)?;

        let seed_bounds = self.seed_bounds;
        let rng = &mut self.rng;
        let particles = gpu::allocation_scope(device, "particle buffers", || {
            ParticleStore::new(device, options.max_particles, &seed_bounds, rng)
        })?;
        self.replace_particles(device, particles);

        self.speed_range = options.relative_speed_range(self.viewer.pixel_size);
        self.options = options;
        self.clear_targets(device, queue);
        self.lifecycle.mark_ready()?;

        tracing::info!(
            particles = self.options.max_particles,
            texture_size = self.particles.texture_size(),
            "particle count changed"
        );
        Ok(())
    }

    /// Upload a new wind field and reseed the particles inside it.
    pub fn reload_field(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        field: &VectorField,
    ) -> Result<(), PipelineError> {
        self.ensure_live("reload field")?;
        let seed_bounds = self.viewer.seed_bounds(&field.metadata())?;
        self.lifecycle.begin_transition(TransitionKind::Refresh)?;

        let max_particles = self.options.max_particles;
        let rng = &mut self.rng;
        let (textures, particles) = gpu::allocation_scope(device, "field textures", || {
            (
                FieldTextures::new(device, queue, field),
                ParticleStore::new(device, max_particles, &seed_bounds, rng),
            )
        })?;

        self.replace_particles(device, particles);
        let old_field = std::mem::replace(&mut self.field, textures);
        old_field.destroy();

        self.seed_bounds = seed_bounds;
        self.clear_targets(device, queue);
        self.lifecycle.mark_ready()?;

        let dims = self.field.metadata().dimensions;
        tracing::info!(lon = dims.lon, lat = dims.lat, lev = dims.lev, "wind field reloaded");
        Ok(())
    }

    /// Upload a new colour ramp. Particles and trails are kept.
    pub fn set_color_table(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        table: &ColorTable,
    ) -> Result<(), PipelineError> {
        self.ensure_live("set color table")?;
        let colors = gpu::allocation_scope(device, "colour table", || {
            ColorTableTexture::new(device, queue, table)
        })?;

        gpu::wait_for(device, self.last_submission.take());
        let old = std::mem::replace(&mut self.colors, colors);
        old.destroy();

        tracing::debug!(colors = table.len(), "colour table replaced");
        Ok(())
    }

    /// Wait for the GPU, release every resource and enter [`PipelineState::Disposed`].
    ///
    /// Calling it again does nothing.
    pub fn dispose(&mut self, device: &wgpu::Device) {
        if !self.lifecycle.dispose() {
            return;
        }
        gpu::wait_for(device, self.last_submission.take());

        self.particles.destroy();
        self.segments.destroy();
        for target in self.trails.iter() {
            target.destroy();
        }
        self.field.destroy();
        self.colors.destroy();
        self.advect.destroy();
        self.segment_stage.destroy();
        self.trail_stage.destroy();

        tracing::info!(frames = self.frame, "particle system disposed");
    }

    pub fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    pub fn options(&self) -> &ParticleSystemOptions {
        &self.options
    }

    pub fn viewer(&self) -> &ViewerParameters {
        &self.viewer
    }

    /// Region reseeded particles are placed in.
    pub fn seed_bounds(&self) -> GeoBounds {
        self.seed_bounds
    }

    pub fn field_metadata(&self) -> &FieldMetadata {
        self.field.metadata()
    }

    /// `(width, height)` of the segment and trail targets.
    pub fn screen_size(&self) -> (u32, u32) {
        (self.surface.width, self.surface.height)
    }

    /// Side of the square particle slot layout.
    pub fn particles_texture_size(&self) -> u32 {
        self.particles.texture_size()
    }

    /// Frames rendered since creation.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    pub fn resource_ids(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            particles: self.particles.ids(),
            segments: self.segments.id(),
            trails: self.trails.map(RenderTarget::id),
            field: self.field.id(),
            color_table: self.colors.id(),
        }
    }

    /// Latest particle slots (all `texture_size²` of them).
    pub fn read_particles(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<Vec4>, PipelineError> {
        self.ensure_live("read particles")?;
        self.read_slots(device, queue, BufferRole::Read)
    }

    /// Particle slots as they were before the last advection.
    pub fn read_previous_particles(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<Vec4>, PipelineError> {
        self.ensure_live("read particles")?;
        self.read_slots(device, queue, BufferRole::Write)
    }

    /// RGBA8 texels of the latest trail, row by row.
    pub fn read_trail_color(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, PipelineError> {
        self.ensure_live("read trail")?;
        self.read_target(device, queue, self.trails.read())
    }

    /// RGBA8 texels of this frame's segments, row by row.
    pub fn read_segment_color(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>, PipelineError> {
        self.ensure_live("read segments")?;
        self.read_target(device, queue, &self.segments)
    }

    /// Overwrite particle slots directly, e.g. to place particles at known positions.
    ///
    /// Both buffers receive the same positions, so the next segment starts
    /// and ends at the given positions plus one advection step.
    pub fn seed_particles(&mut self, queue: &wgpu::Queue, positions: &[Vec4]) -> Result<(), PipelineError> {
        self.ensure_live("seed particles")?;
        self.particles.seed(queue, BufferRole::Read, positions);
        self.particles.seed(queue, BufferRole::Write, positions);
        Ok(())
    }

    fn read_slots(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        role: BufferRole,
    ) -> Result<Vec<Vec4>, PipelineError> {
        let buffer = match role {
            BufferRole::Read => self.particles.read(),
            BufferRole::Write => self.particles.write(),
        };
        let bytes = readback::read_buffer(device, queue, &buffer.buffer, self.particles.byte_size())?;
        Ok(bytes
            .chunks_exact(16)
            .map(|chunk| Vec4::from_array(bytemuck::pod_read_unaligned::<[f32; 4]>(chunk)))
            .collect())
    }

    fn read_target(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        target: &RenderTarget,
    ) -> Result<Vec<u8>, PipelineError> {
        let (width, height) = target.size();
        Ok(readback::read_texture_rgba8(device, queue, &target.color, width, height)?)
    }

    fn ensure_live(&self, operation: &'static str) -> Result<(), PipelineError> {
        match self.lifecycle.state() {
            state @ (PipelineState::Uninitialized | PipelineState::Disposed) => {
                Err(PipelineError::InvalidState { operation, state })
            }
            _ => Ok(()),
        }
    }

    fn replace_particles(&mut self, device: &wgpu::Device, particles: ParticleStore) {
        gpu::wait_for(device, self.last_submission.take());
        let old = std::mem::replace(&mut self.particles, particles);
        old.destroy();
    }

    fn clear_targets(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Clear Targets Encoder"),
        });
        self.segments.clear(&mut encoder);
        for target in self.trails.iter() {
            target.clear(&mut encoder);
        }
        self.last_submission = Some(queue.submit(Some(encoder.finish())));
    }
}

fn create_trails(device: &wgpu::Device, width: u32, height: u32) -> PingPong<RenderTarget> {
    PingPong::from_fn(|i| {
        let label = if i == 0 { "Trail A" } else { "Trail B" };
        RenderTarget::new(device, label, width, height)
    })
}
