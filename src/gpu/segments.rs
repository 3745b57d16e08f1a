//! Segment rasterization: one line per particle, from its previous to its
//! latest position, coloured by speed.

use crate::shader_utils::geo_wgsl;
use crate::uniforms::{SegmentUniforms, SEGMENT_UNIFORMS_WGSL};

use super::field_gpu::ColorTableTexture;
use super::particles::ParticleBuffer;
use super::target::RenderTarget;
use super::{DEPTH_FORMAT, TRAIL_FORMAT};

pub struct SegmentInputs<'a> {
    pub previous: &'a ParticleBuffer,
    pub latest: &'a ParticleBuffer,
    pub colors: &'a ColorTableTexture,
    pub target: &'a RenderTarget,
    pub particle_count: u32,
}

pub struct SegmentStage {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

impl SegmentStage {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Segment Render Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
        });

        let particles = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Segment Bind Group Layout"),
            entries: &[
                particles(0),
                particles(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
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
            label: Some("Segment Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Segment Render Pipeline"),
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
                topology: wgpu::PrimitiveTopology::LineList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Segment Uniform Buffer"),
            size: std::mem::size_of::<SegmentUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, uniforms: &SegmentUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    /// Clear the segment target and draw `particle_count` lines into it.
    pub fn encode(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, inputs: SegmentInputs<'_>) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Segment Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: inputs.previous.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.latest.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&inputs.colors.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(&inputs.colors.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Segment Pass"),
            color_attachments: &[Some(inputs.target.color_attachment())],
            depth_stencil_attachment: Some(inputs.target.depth_attachment()),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..inputs.particle_count * 2, 0..1);
    }

    pub fn destroy(&self) {
        self.uniform_buffer.destroy();
    }
}

pub(crate) fn generate_shader() -> String {
    format!(
        r#"
{uniforms}
{geo}

@group(0) @binding(0)
var<storage, read> previous: array<vec4<f32>>;
@group(0) @binding(1)
var<storage, read> latest: array<vec4<f32>>;
@group(0) @binding(2)
var color_table: texture_2d<f32>;
@group(0) @binding(3)
var color_sampler: sampler;
@group(0) @binding(4)
var<uniform> params: SegmentUniforms;

struct VertexOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) speed: f32,
}};

fn to_world(p: vec3<f32>) -> vec3<f32> {{
    if params.projection == 0u {{
        return geodetic_to_ecef(p.x, p.y, params.particle_height);
    }}
    return p;
}}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {{
    let index = vertex_index / 2u;
    let head = latest[index];

    var out: VertexOutput;
    out.speed = clamp(head.w, 0.0, 1.0);

    // Reseeded this frame: both ends land outside the clip volume.
    if head.w < 0.0 {{
        out.clip_position = vec4<f32>(2.0, 2.0, 2.0, 1.0);
        return out;
    }}

    var p = head.xyz;
    if vertex_index % 2u == 0u {{
        p = previous[index].xyz;
    }}
    out.clip_position = params.view_proj * vec4<f32>(to_world(p), 1.0);
    return out;
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let n = f32(params.color_count);
    let u = (in.speed * (n - 1.0) + 0.5) / n;
    let color = textureSample(color_table, color_sampler, vec2<f32>(u, 0.5));
    return vec4<f32>(color.rgb, 1.0);
}}
"#,
        uniforms = SEGMENT_UNIFORMS_WGSL,
        geo = geo_wgsl(),
    )
}
