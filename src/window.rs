use std::sync::Arc;

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent},
    event_loop::ActiveEventLoop,
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use windtrail::prelude::*;

/// Metres per degree of latitude, used to estimate the pixel size.
const METRES_PER_DEGREE: f32 = 111_320.0;

/// Equirectangular view: a lon/lat rectangle mapped onto the window.
pub struct Camera {
    pub center_lon: f32,
    pub center_lat: f32,
    /// Visible latitude span in degrees.
    pub lat_span: f32,
}

impl Camera {
    fn new() -> Self {
        Self {
            center_lon: 0.0,
            center_lat: 0.0,
            lat_span: 180.0,
        }
    }

    fn lon_span(&self, aspect: f32) -> f32 {
        self.lat_span * aspect
    }

    fn view_proj(&self, aspect: f32) -> Mat4 {
        let half_lon = self.lon_span(aspect) * 0.5;
        let half_lat = self.lat_span * 0.5;
        Mat4::orthographic_rh(
            self.center_lon - half_lon,
            self.center_lon + half_lon,
            self.center_lat - half_lat,
            self.center_lat + half_lat,
            -1.0,
            1.0,
        )
    }

    fn viewer(&self, width: u32, height: u32) -> ViewerParameters {
        let aspect = width as f32 / height as f32;
        let half_lon = self.lon_span(aspect) * 0.5;
        let half_lat = self.lat_span * 0.5;
        ViewerParameters::new(
            AxisRange::new(self.center_lon - half_lon, self.center_lon + half_lon),
            AxisRange::new(self.center_lat - half_lat, self.center_lat + half_lat),
            self.lat_span * METRES_PER_DEGREE / height as f32,
        )
    }
}

/// Zonal jets with a wave pattern on a 2.5 degree global grid.
fn synthetic_field() -> Result<VectorField, windtrail::ConfigError> {
    VectorField::from_fn(
        GridDimensions::new(145, 73, 1),
        GeoBounds::new(
            AxisRange::new(-180.0, 180.0),
            AxisRange::new(-90.0, 90.0),
            AxisRange::new(0.0, 0.0),
        ),
        |lon, lat, _lev| {
            let (lon, lat) = (lon.to_radians(), lat.to_radians());
            let u = 25.0 * (3.0 * lat).cos() * lat.cos();
            let v = 10.0 * (4.0 * lon).sin() * (2.0 * lat).cos();
            (u, v)
        },
    )
}

fn color_ramp() -> Result<ColorTable, windtrail::ConfigError> {
    ColorTable::new(vec![
        [0.12, 0.25, 0.65],
        [0.18, 0.55, 0.85],
        [0.45, 0.80, 0.75],
        [0.95, 0.90, 0.55],
        [1.00, 1.00, 1.00],
    ])
}

pub struct DemoState {
    surface: wgpu::Surface<'static>,
    gpu: GpuContext,
    pub config: wgpu::SurfaceConfiguration,
    system: ParticleSystem,
    pub camera: Camera,
}

impl DemoState {
    pub async fn new(window: Arc<Window>) -> Result<Self, Box<dyn std::error::Error>> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let surface = instance.create_surface(window)?;
        let gpu = GpuContext::new(instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or("surface reports no formats")?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        let camera = Camera::new();
        let options = ParticleSystemOptions::default()
            .with_max_particles(128 * 128)
            .with_projection(Projection::Equirectangular)
            .with_fade_opacity(0.02);

        let system = ParticleSystem::new(
            &gpu.device,
            &gpu.queue,
            &synthetic_field()?,
            &color_ramp()?,
            options,
            camera.viewer(config.width, config.height),
            SurfaceSize::new(config.width, config.height, config.format),
        )?;

        Ok(Self {
            surface,
            gpu,
            config,
            system,
            camera,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.gpu.device, &self.config);
            if let Err(e) = self
                .system
                .resize(&self.gpu.device, &self.gpu.queue, new_size.width, new_size.height)
            {
                tracing::warn!("resize failed: {}", e);
            }
        }
    }

    /// Reseed the particles for what the camera currently shows.
    pub fn refresh(&mut self) {
        let viewer = self.camera.viewer(self.config.width, self.config.height);
        if let Err(e) = self.system.refresh(&self.gpu.device, &self.gpu.queue, viewer) {
            tracing::warn!("refresh failed: {}", e);
        }
    }

    pub fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Background Encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Background Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.02,
                            g: 0.02,
                            b: 0.05,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.gpu.queue.submit(std::iter::once(encoder.finish()));

        let aspect = self.config.width as f32 / self.config.height as f32;
        if let Err(e) = self.system.render(
            &self.gpu.device,
            &self.gpu.queue,
            &view,
            self.camera.view_proj(aspect),
        ) {
            tracing::warn!("frame skipped: {}", e);
        }

        output.present();
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.system.dispose(&self.gpu.device);
    }
}

#[derive(Default)]
pub struct App {
    window: Option<Arc<Window>>,
    state: Option<DemoState>,
    mouse_pressed: bool,
    last_mouse_pos: Option<(f64, f64)>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_attrs = Window::default_attributes()
            .with_title("windtrail")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                tracing::error!("could not create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match pollster::block_on(DemoState::new(window.clone())) {
            Ok(state) => {
                self.window = Some(window);
                self.state = Some(state);
            }
            Err(e) => {
                tracing::error!("could not start: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(state) = &mut self.state {
                    state.dispose();
                }
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(state) = &mut self.state {
                    state.resize(physical_size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::KeyR),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(state) = &mut self.state {
                    state.refresh();
                }
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.mouse_pressed = state == ElementState::Pressed;
                    if !self.mouse_pressed {
                        self.last_mouse_pos = None;
                        // Panning finished: seed the new view.
                        if let Some(demo) = &mut self.state {
                            demo.refresh();
                        }
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                if self.mouse_pressed {
                    if let Some((last_x, last_y)) = self.last_mouse_pos {
                        let dx = position.x - last_x;
                        let dy = position.y - last_y;

                        if let Some(state) = &mut self.state {
                            let degrees_per_pixel = state.camera.lat_span / state.config.height as f32;
                            state.camera.center_lon -= dx as f32 * degrees_per_pixel;
                            state.camera.center_lat += dy as f32 * degrees_per_pixel;
                            state.camera.center_lat = state.camera.center_lat.clamp(-90.0, 90.0);
                        }
                    }
                    self.last_mouse_pos = Some((position.x, position.y));
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                if let Some(state) = &mut self.state {
                    state.camera.lat_span *= 1.0 - scroll * 0.1;
                    state.camera.lat_span = state.camera.lat_span.clamp(5.0, 180.0);
                    state.refresh();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(state) = &mut self.state {
                    match state.render() {
                        Ok(_) => {}
                        Err(wgpu::SurfaceError::Lost) => state.resize(winit::dpi::PhysicalSize {
                            width: state.config.width,
                            height: state.config.height,
                        }),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => tracing::warn!("surface error: {:?}", e),
                    }
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
