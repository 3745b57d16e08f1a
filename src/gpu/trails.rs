//! Trail accumulation.
//!
//! A full-screen pass that fades the current trail and composites this
//! frame's segments over it, writing the next trail colour and depth. Depth
//! is computed in the fragment shader, so the pipeline uses compare
//! `Always` with writes enabled.

use crate::shader_utils::FULLSCREEN_WGSL;
use crate::uniforms::{TrailUniforms, TRAIL_UNIFORMS_WGSL};

use super::target::RenderTarget;
use super::{DEPTH_FORMAT, TRAIL_FORMAT};

pub struct TrailInputs<'a> {
    pub segments: &'a RenderTarget,
    pub current: &'a RenderTarget,
    pub next: &'a RenderTarget,
}

pub struct TrailStage {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

impl TrailStage {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trail Render Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
        });

        let color = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let depth = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Depth,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trail Bind Group Layout"),
            entries: &[
                color(0),
                depth(1),
                color(2),
                depth(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trail Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Trail Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: TRAIL_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trail Uniform Buffer"),
            size: std::mem::size_of::<TrailUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, uniforms: &TrailUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    pub fn encode(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, inputs: TrailInputs<'_>) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&inputs.segments.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&inputs.segments.depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&inputs.current.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&inputs.current.depth_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Trail Pass"),
            color_attachments: &[Some(inputs.next.color_attachment())],
            depth_stencil_attachment: Some(inputs.next.depth_attachment()),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    pub fn destroy(&self) {
        self.uniform_buffer.destroy();
    }
}

pub(crate) fn generate_shader() -> String {
    format!(
        r#"
{uniforms}
{fullscreen}

@group(0) @binding(0)
var segment_color: texture_2d<f32>;
@group(0) @binding(1)
var segment_depth: texture_depth_2d;
@group(0) @binding(2)
var trail_color: texture_2d<f32>;
@group(0) @binding(3)
var trail_depth: texture_depth_2d;
@group(0) @binding(4)
var<uniform> params: TrailUniforms;

struct TrailOutput {{
    @location(0) color: vec4<f32>,
    @builtin(frag_depth) depth: f32,
}};

// Premultiplied "over".
fn over(top: vec4<f32>, bottom: vec4<f32>) -> vec4<f32> {{
    return top + bottom * (1.0 - top.a);
}}

@fragment
fn fs_main(in: VertexOutput) -> TrailOutput {{
    let texel = vec2<i32>(in.clip_position.xy);
    let segment = textureLoad(segment_color, texel, 0);
    let segment_z = textureLoad(segment_depth, texel, 0);
    var trail = textureLoad(trail_color, texel, 0);
    var trail_z = textureLoad(trail_depth, texel, 0);

    // Quantised fade: every 8-bit channel drops by at least one step while fade > 0.
    trail = floor((1.0 - params.fade_opacity) * 255.0 * trail + vec4<f32>(1e-3)) / 255.0;
    if trail.a <= 0.0 {{
        trail = vec4<f32>(0.0);
        trail_z = 1.0;
    }}

    var out: TrailOutput;
    if segment_z >= 1.0 {{
        out.color = trail;
        out.depth = trail_z;
        return out;
    }}

    if segment_z <= trail_z {{
        out.color = over(segment, trail);
    }} else {{
        out.color = over(trail, segment);
    }}
    out.depth = min(segment_z, trail_z);
    return out;
}}
"#,
        uniforms = TRAIL_UNIFORMS_WGSL,
        fullscreen = FULLSCREEN_WGSL,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_utils::validate_wgsl;

    /// CPU mirror of the quantised fade for one 8-bit channel.
    fn fade(value: u8, fade_opacity: f32) -> u8 {
        let t = value as f32 / 255.0;
        ((1.0 - fade_opacity) * 255.0 * t + 1e-3).floor() as u8
    }

    #[test]
    fn test_shader_validates() {
        validate_wgsl(&generate_shader()).unwrap();
    }

    #[test]
    fn test_fade_zero_preserves() {
        for v in 0..=255u8 {
            assert_eq!(fade(v, 0.0), v);
        }
    }

    #[test]
    fn test_fade_one_clears() {
        for v in 0..=255u8 {
            assert_eq!(fade(v, 1.0), 0);
        }
    }

    #[test]
    fn test_small_fade_strictly_decreases() {
        for v in 1..=255u8 {
            assert!(fade(v, 0.004) < v, "{} did not fade", v);
        }
    }
}
