//! End-to-end tests for the particle system on a real device.
//!
//! These need a GPU adapter (hardware or software) and are ignored by
//! default. Run them with `cargo test -- --ignored`; without an adapter
//! they fail instead of passing silently.

use windtrail::prelude::*;
use windtrail::{max_supported_particles, ConfigError, RESEEDED};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 32;
const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn gpu() -> GpuContext {
    GpuContext::headless().expect("GPU tests need an adapter")
}

fn global_bounds() -> GeoBounds {
    GeoBounds::new(
        AxisRange::new(-180.0, 180.0),
        AxisRange::new(-90.0, 90.0),
        AxisRange::new(0.0, 0.0),
    )
}

fn uniform_field(u: f32, v: f32) -> VectorField {
    VectorField::from_fn(GridDimensions::new(4, 3, 1), global_bounds(), |_, _, _| (u, v)).unwrap()
}

fn colors() -> ColorTable {
    ColorTable::new(vec![[0.2, 0.4, 1.0], [1.0, 1.0, 1.0]]).unwrap()
}

fn whole_globe(pixel_size: f32) -> ViewerParameters {
    ViewerParameters::new(AxisRange::new(-180.0, 180.0), AxisRange::new(-90.0, 90.0), pixel_size)
}

fn view_proj() -> Mat4 {
    Mat4::orthographic_rh(-180.0, 180.0, -90.0, 90.0, -1.0, 1.0)
}

fn flat_options() -> ParticleSystemOptions {
    ParticleSystemOptions::default()
        .with_projection(Projection::Equirectangular)
        .with_seed(7)
}

fn build(
    gpu: &GpuContext,
    field: &VectorField,
    options: ParticleSystemOptions,
    pixel_size: f32,
) -> ParticleSystem {
    ParticleSystem::new(
        &gpu.device,
        &gpu.queue,
        field,
        &colors(),
        options,
        whole_globe(pixel_size),
        SurfaceSize::new(WIDTH, HEIGHT, FORMAT),
    )
    .unwrap()
}

struct HostTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

fn host_target(gpu: &GpuContext) -> HostTarget {
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Test Host Target"),
        size: wgpu::Extent3d {
            width: WIDTH,
            height: HEIGHT,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    HostTarget {
        _texture: texture,
        view,
    }
}

fn is_blank(texels: &[u8]) -> bool {
    texels.iter().all(|&b| b == 0)
}

fn alphas(texels: &[u8]) -> Vec<u8> {
    texels.chunks_exact(4).map(|texel| texel[3]).collect()
}

// ============================================================================
// Advection
// ============================================================================

#[test]
#[ignore = "needs a GPU adapter"]
fn test_zero_wind_keeps_particles_still() {
    let gpu = gpu();
    let options = flat_options()
        .with_max_particles(4)
        .with_drop_rate(0.0)
        .with_drop_rate_bump(0.0);
    let mut system = build(&gpu, &uniform_field(0.0, 0.0), options, 10_000.0);
    let target = host_target(&gpu);

    let before = system.read_particles(&gpu.device, &gpu.queue).unwrap();
    for _ in 0..3 {
        system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    }
    let after = system.read_particles(&gpu.device, &gpu.queue).unwrap();

    assert_eq!(before.len(), 4);
    for (a, b) in before.iter().zip(&after) {
        assert_eq!(a.truncate(), b.truncate());
        assert_eq!(b.w, 0.0);
    }
    assert_eq!(system.frame_count(), 3);

    // Zero-length segments cover no pixels.
    assert!(is_blank(&system.read_segment_color(&gpu.device, &gpu.queue).unwrap()));
    assert!(is_blank(&system.read_trail_color(&gpu.device, &gpu.queue).unwrap()));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_uniform_wind_moves_east() {
    let gpu = gpu();
    let options = flat_options()
        .with_max_particles(4)
        .with_drop_rate(0.0)
        .with_drop_rate_bump(0.0)
        .with_speed_factors(0.5, 2.0);
    let pixel_size = 10_000.0;
    let mut system = build(&gpu, &uniform_field(10.0, 0.0), options, pixel_size);
    let target = host_target(&gpu);

    let start = vec![Vec4::new(0.0, 0.0, 0.0, 0.0); 4];
    system.seed_particles(&gpu.queue, &start).unwrap();
    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();

    // Fastest wind in the field moves uv_max_factor pixels per frame.
    let expected = (2.0 * pixel_size / 6_378_137.0_f32).to_degrees();
    let latest = system.read_particles(&gpu.device, &gpu.queue).unwrap();
    let previous = system.read_previous_particles(&gpu.device, &gpu.queue).unwrap();
    for (now, then) in latest.iter().zip(&previous) {
        assert!((now.x - expected).abs() < 1e-4, "lon {} != {}", now.x, expected);
        assert!(now.y.abs() < 1e-6);
        assert!((now.w - 1.0).abs() < 1e-6);
        assert_eq!(then.truncate(), Vec3::ZERO);
    }
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_full_drop_rate_reseeds_everything() {
    let gpu = gpu();
    let options = flat_options().with_max_particles(64).with_drop_rate(1.0);
    let mut system = build(&gpu, &uniform_field(10.0, 5.0), options, 100_000.0);
    let target = host_target(&gpu);

    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();

    let bounds = system.seed_bounds();
    let particles = system.read_particles(&gpu.device, &gpu.queue).unwrap();
    for p in &particles {
        assert_eq!(p.w, RESEEDED);
        assert!(bounds.contains(p.truncate()), "{:?} outside seed region", p);
    }

    // Reseeded particles draw nothing.
    assert!(is_blank(&system.read_segment_color(&gpu.device, &gpu.queue).unwrap()));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_reseed_jump_is_not_drawn() {
    let gpu = gpu();
    // 10 degree cells.
    let field = VectorField::from_fn(GridDimensions::new(37, 19, 1), global_bounds(), |_, _, _| (10.0, 0.0)).unwrap();
    let options = flat_options().with_drop_rate(1.0);
    let mut system = build(&gpu, &field, options, 100_000.0);
    let target = host_target(&gpu);

    let corner = vec![Vec4::new(-175.0, -85.0, 0.0, 0.0); 64 * 64];
    system.seed_particles(&gpu.queue, &corner).unwrap();
    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();

    let diagonal = system.field_metadata().cell_diagonal();
    assert!((diagonal - 200f32.sqrt()).abs() < 1e-4);

    let previous = system.read_previous_particles(&gpu.device, &gpu.queue).unwrap();
    let latest = system.read_particles(&gpu.device, &gpu.queue).unwrap();
    let jumps: Vec<(f32, f32)> = previous
        .iter()
        .zip(&latest)
        .map(|(then, now)| ((now.truncate() - then.truncate()).length(), now.w))
        .collect();

    // Every slot jumped somewhere random, many of them further than a cell...
    assert!(jumps.iter().filter(|(span, _)| *span > diagonal).count() > 100);
    // ...yet no span longer than a cell is drawn.
    for (span, w) in &jumps {
        assert!(*w == RESEEDED || *span <= diagonal, "drawn span {} > {}", span, diagonal);
    }
    assert!(is_blank(&system.read_segment_color(&gpu.device, &gpu.queue).unwrap()));
}

// ============================================================================
// Trails
// ============================================================================

#[test]
#[ignore = "needs a GPU adapter"]
fn test_zero_fade_keeps_isolated_segments_exactly() {
    let gpu = gpu();
    let options = flat_options()
        .with_drop_rate(0.0)
        .with_drop_rate_bump(0.0)
        .with_fade_opacity(0.0);
    let mut system = build(&gpu, &uniform_field(10.0, 0.0), options.clone(), 626_000.0);
    let target = host_target(&gpu);

    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    let drawn = system.read_trail_color(&gpu.device, &gpu.queue).unwrap();
    assert!(alphas(&drawn).iter().any(|&a| a > 0), "first frame drew nothing");

    // From now on every particle reseeds, so no new segments land on the trail.
    system
        .set_options(&gpu.device, &gpu.queue, options.with_drop_rate(1.0))
        .unwrap();
    for frame in 0..3 {
        system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
        assert!(is_blank(&system.read_segment_color(&gpu.device, &gpu.queue).unwrap()));
        let kept = system.read_trail_color(&gpu.device, &gpu.queue).unwrap();
        assert!(kept == drawn, "trail changed after {} empty frames", frame + 1);
    }
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_full_fade_clears_without_segments() {
    let gpu = gpu();
    let options = flat_options()
        .with_drop_rate(0.0)
        .with_drop_rate_bump(0.0)
        .with_fade_opacity(1.0);
    let mut system = build(&gpu, &uniform_field(10.0, 0.0), options.clone(), 626_000.0);
    let target = host_target(&gpu);

    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    assert!(!is_blank(&system.read_trail_color(&gpu.device, &gpu.queue).unwrap()));

    system
        .set_options(&gpu.device, &gpu.queue, options.with_drop_rate(1.0))
        .unwrap();
    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    assert!(is_blank(&system.read_trail_color(&gpu.device, &gpu.queue).unwrap()));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_full_fade_leaves_only_this_frame() {
    let gpu = gpu();
    let options = flat_options()
        .with_drop_rate(0.0)
        .with_drop_rate_bump(0.0)
        .with_fade_opacity(1.0);
    let mut system = build(&gpu, &uniform_field(10.0, 0.0), options, 626_000.0);
    let target = host_target(&gpu);

    for _ in 0..3 {
        system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    }

    let trail = alphas(&system.read_trail_color(&gpu.device, &gpu.queue).unwrap());
    let segments = alphas(&system.read_segment_color(&gpu.device, &gpu.queue).unwrap());
    assert_eq!(trail.len(), (WIDTH * HEIGHT) as usize);
    for (i, (&t, &s)) in trail.iter().zip(&segments).enumerate() {
        assert_eq!(t > 0, s > 0, "pixel {}", i);
    }
}

// ============================================================================
// Transitions
// ============================================================================

#[test]
#[ignore = "needs a GPU adapter"]
fn test_resize_replaces_screen_targets_only() {
    let gpu = gpu();
    let mut system = build(&gpu, &uniform_field(5.0, 0.0), flat_options(), 100_000.0);
    let before = system.resource_ids();

    system.resize(&gpu.device, &gpu.queue, 128, 48).unwrap();
    let after = system.resource_ids();

    assert_eq!(system.state(), PipelineState::Ready);
    assert_eq!(system.screen_size(), (128, 48));
    assert_ne!(before.segments, after.segments);
    assert_ne!(before.trails, after.trails);
    assert_eq!(before.particles, after.particles);
    assert_eq!(before.field, after.field);

    let trail = system.read_trail_color(&gpu.device, &gpu.queue).unwrap();
    assert_eq!(trail.len(), 128 * 48 * 4);
    assert!(is_blank(&trail));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_refresh_reseeds_into_new_view() {
    let gpu = gpu();
    let mut system = build(&gpu, &uniform_field(5.0, 0.0), flat_options(), 100_000.0);
    let target = host_target(&gpu);
    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();
    let before = system.resource_ids();

    let viewer = ViewerParameters::new(AxisRange::new(10.0, 20.0), AxisRange::new(-5.0, 5.0), 2_000.0);
    system.refresh(&gpu.device, &gpu.queue, viewer).unwrap();

    assert_eq!(system.state(), PipelineState::Ready);
    assert_eq!(system.viewer(), &viewer);
    assert_ne!(before.particles, system.resource_ids().particles);

    let bounds = system.seed_bounds();
    assert_eq!(bounds.lon, AxisRange::new(10.0, 20.0));
    for p in system.read_particles(&gpu.device, &gpu.queue).unwrap() {
        assert!(bounds.contains(p.truncate()));
    }
    assert!(is_blank(&system.read_trail_color(&gpu.device, &gpu.queue).unwrap()));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_refresh_outside_field_is_rejected() {
    let gpu = gpu();
    let field = VectorField::from_fn(
        GridDimensions::new(3, 3, 1),
        GeoBounds::new(
            AxisRange::new(0.0, 10.0),
            AxisRange::new(0.0, 10.0),
            AxisRange::new(0.0, 0.0),
        ),
        |_, _, _| (1.0, 1.0),
    )
    .unwrap();
    let mut system = build(&gpu, &field, flat_options(), 1_000.0);
    let before = system.resource_ids();

    let viewer = ViewerParameters::new(AxisRange::new(50.0, 60.0), AxisRange::new(50.0, 60.0), 1_000.0);
    let err = system.refresh(&gpu.device, &gpu.queue, viewer).unwrap_err();

    assert!(matches!(err, PipelineError::Config(ConfigError::EmptySeedRegion)));
    assert_eq!(system.state(), PipelineState::Ready);
    assert_eq!(before, system.resource_ids());
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_set_options_reallocates_on_new_particle_count() {
    let gpu = gpu();
    let mut system = build(&gpu, &uniform_field(5.0, 0.0), flat_options(), 100_000.0);
    let before = system.resource_ids();

    system
        .set_options(&gpu.device, &gpu.queue, flat_options().with_fade_opacity(0.1))
        .unwrap();
    assert_eq!(before.particles, system.resource_ids().particles);
    assert_eq!(system.options().fade_opacity, 0.1);

    system
        .set_options(&gpu.device, &gpu.queue, flat_options().with_max_particles(100))
        .unwrap();
    assert_ne!(before.particles, system.resource_ids().particles);
    assert_eq!(system.particles_texture_size(), 10);
    assert_eq!(system.read_particles(&gpu.device, &gpu.queue).unwrap().len(), 100);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_reload_field_and_color_table() {
    let gpu = gpu();
    let mut system = build(&gpu, &uniform_field(5.0, 0.0), flat_options(), 100_000.0);
    let before = system.resource_ids();

    system
        .reload_field(&gpu.device, &gpu.queue, &uniform_field(0.0, 20.0))
        .unwrap();
    let after_field = system.resource_ids();
    assert_ne!(before.field, after_field.field);
    assert_ne!(before.particles, after_field.particles);
    assert_eq!(system.field_metadata().max_speed(), 20.0);

    let ramp = ColorTable::new(vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5], [1.0, 0.0, 0.0]]).unwrap();
    system.set_color_table(&gpu.device, &gpu.queue, &ramp).unwrap();
    let after_colors = system.resource_ids();
    assert_ne!(after_field.color_table, after_colors.color_table);
    assert_eq!(after_field.particles, after_colors.particles);
    assert_eq!(system.state(), PipelineState::Ready);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_render_after_dispose_fails() {
    let gpu = gpu();
    let mut system = build(&gpu, &uniform_field(5.0, 0.0), flat_options(), 100_000.0);
    let target = host_target(&gpu);
    system.render(&gpu.device, &gpu.queue, &target.view, view_proj()).unwrap();

    system.dispose(&gpu.device);
    system.dispose(&gpu.device);
    assert_eq!(system.state(), PipelineState::Disposed);

    let err = system
        .render(&gpu.device, &gpu.queue, &target.view, view_proj())
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::InvalidState {
            state: PipelineState::Disposed,
            ..
        }
    ));
    assert!(system.resize(&gpu.device, &gpu.queue, 10, 10).is_err());
    assert!(system.read_particles(&gpu.device, &gpu.queue).is_err());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
#[ignore = "needs a GPU adapter"]
fn test_invalid_configuration_is_reported() {
    let gpu = gpu();
    let field = uniform_field(1.0, 0.0);

    let result = ParticleSystem::new(
        &gpu.device,
        &gpu.queue,
        &field,
        &colors(),
        flat_options().with_fade_opacity(1.5),
        whole_globe(1_000.0),
        SurfaceSize::new(WIDTH, HEIGHT, FORMAT),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::InvalidOption {
            name: "fade_opacity",
            ..
        }))
    ));

    let result = ParticleSystem::new(
        &gpu.device,
        &gpu.queue,
        &field,
        &colors(),
        flat_options(),
        whole_globe(1_000.0),
        SurfaceSize::new(0, HEIGHT, FORMAT),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::EmptySurface { .. }))
    ));

    let result = ParticleSystem::new(
        &gpu.device,
        &gpu.queue,
        &field,
        &colors(),
        flat_options().with_max_particles(0),
        whole_globe(1_000.0),
        SurfaceSize::new(WIDTH, HEIGHT, FORMAT),
    );
    assert!(matches!(result, Err(PipelineError::Config(ConfigError::NoParticles))));
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_particle_count_beyond_device_limits_is_rejected() {
    let gpu = gpu();
    let supported = max_supported_particles(&gpu.device.limits());
    let field = uniform_field(1.0, 0.0);

    let result = ParticleSystem::new(
        &gpu.device,
        &gpu.queue,
        &field,
        &colors(),
        flat_options().with_max_particles(supported + 1),
        whole_globe(1_000.0),
        SurfaceSize::new(WIDTH, HEIGHT, FORMAT),
    );
    assert!(matches!(
        result,
        Err(PipelineError::Config(ConfigError::InvalidOption {
            name: "max_particles",
            ..
        }))
    ));

    let mut system = build(&gpu, &field, flat_options(), 1_000.0);
    let err = system
        .set_options(&gpu.device, &gpu.queue, flat_options().with_max_particles(supported + 1))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Config(ConfigError::InvalidOption { .. })));
    assert_eq!(system.options().max_particles, 64 * 64);
    assert_eq!(system.state(), PipelineState::Ready);
}

#[test]
#[ignore = "needs a GPU adapter"]
fn test_globe_projection_renders() {
    let gpu = gpu();
    let options = ParticleSystemOptions::default().with_seed(3).with_max_particles(256);
    let mut system = build(&gpu, &uniform_field(10.0, 3.0), options, 50_000.0);
    let target = host_target(&gpu);

    let eye = Vec3::new(0.0, 0.0, 3.0e7);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(45f32.to_radians(), WIDTH as f32 / HEIGHT as f32, 1.0e5, 1.0e8);
    for _ in 0..2 {
        system.render(&gpu.device, &gpu.queue, &target.view, proj * view).unwrap();
    }
    assert_eq!(system.frame_count(), 2);
    assert_eq!(system.state(), PipelineState::Running);
}
