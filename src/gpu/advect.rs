//! Advection compute pass.
//!
//! One invocation per particle slot. Each slot samples the field at its
//! nearest grid node, moves by a speed-scaled displacement converted from
//! metres to degrees, and is reseeded into the seed region with the
//! per-frame drop probability.

use crate::shader_utils::{geo_wgsl, RANDOM_WGSL};
use crate::uniforms::{AdvectionUniforms, ADVECTION_UNIFORMS_WGSL};

use super::field_gpu::FieldTextures;
use super::particles::ParticleBuffer;
use super::{workgroups, WORKGROUP_SIZE};

/// Handles the advection pass reads and writes this frame.
pub struct AdvectionInputs<'a> {
    pub current: &'a ParticleBuffer,
    pub next: &'a ParticleBuffer,
    pub field: &'a FieldTextures,
    pub slot_count: u32,
}

pub struct AdvectionStage {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
}

impl AdvectionStage {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Advection Compute Shader"),
            source: wgpu::ShaderSource::Wgsl(generate_shader().into()),
        });

        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let field_texture = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Advection Bind Group Layout"),
            entries: &[
                storage(0, true),
                storage(1, false),
                field_texture(2),
                field_texture(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
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
            label: Some("Advection Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Advection Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Advection Uniform Buffer"),
            size: std::mem::size_of::<AdvectionUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipeline,
            bind_group_layout,
            uniform_buffer,
        }
    }

    pub fn update(&self, queue: &wgpu::Queue, uniforms: &AdvectionUniforms) {
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    pub fn encode(&self, device: &wgpu::Device, encoder: &mut wgpu::CommandEncoder, inputs: AdvectionInputs<'_>) {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Advection Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: inputs.current.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: inputs.next.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&inputs.field.u_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&inputs.field.v_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        });

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Advection Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(workgroups(inputs.slot_count), 1, 1);
    }

    pub fn destroy(&self) {
        self.uniform_buffer.destroy();
    }
}

pub(crate) fn generate_shader() -> String {
    format!(
        r#"
{uniforms}
{random}
{geo}

@group(0) @binding(0)
var<storage, read> particles_in: array<vec4<f32>>;
@group(0) @binding(1)
var<storage, read_write> particles_out: array<vec4<f32>>;
@group(0) @binding(2)
var field_u: texture_2d<f32>;
@group(0) @binding(3)
var field_v: texture_2d<f32>;
@group(0) @binding(4)
var<uniform> params: AdvectionUniforms;

const RESEEDED: f32 = -1.0;

fn inside(p: vec3<f32>, lo: vec3<f32>, hi: vec3<f32>) -> bool {{
    return all(p >= lo) && all(p <= hi);
}}

// Nearest grid node; zero outside the field.
fn sample_field(p: vec3<f32>) -> vec2<f32> {{
    if !inside(p, params.minimum.xyz, params.maximum.xyz) {{
        return vec2<f32>(0.0);
    }}
    let dims = params.dimension.xyz;
    let interval = select(params.interval.xyz, vec3<f32>(1.0), params.interval.xyz <= vec3<f32>(0.0));
    let scaled = round((p - params.minimum.xyz) / interval);
    let cell = min(vec3<u32>(max(scaled, vec3<f32>(0.0))), dims - vec3<u32>(1u));
    let texel = vec2<i32>(i32(cell.x), i32(cell.z * dims.y + cell.y));
    return vec2<f32>(
        textureLoad(field_u, texel, 0).r,
        textureLoad(field_v, texel, 0).r
    );
}}

// xyz = step in degrees (lon, lat, lev), w = speed fraction.
fn displacement(p: vec3<f32>, uv: vec2<f32>) -> vec4<f32> {{
    let speed = length(uv);
    if speed <= 0.0 {{
        return vec4<f32>(0.0);
    }}
    let fraction = clamp(speed / max(params.speed.z, 1e-6), 0.0, 1.0);
    let meters = mix(params.speed.x, params.speed.y, fraction) * (uv / speed);
    let cos_lat = max(cos(radians(p.y)), 1e-4);
    let d_lon = degrees(meters.x / (EARTH_RADIUS * cos_lat));
    let d_lat = degrees(meters.y / EARTH_RADIUS);
    return vec4<f32>(d_lon, d_lat, 0.0, fraction);
}}

@compute @workgroup_size({workgroup_size})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= params.slot_count {{
        return;
    }}

    let p = particles_in[index].xyz;
    let delta = displacement(p, sample_field(p));
    let moved = p + delta.xyz;

    var state = hash(index ^ hash(params.frame_seed));
    var drop_chance = params.drop_rate;
    if !inside(moved, params.seed_min.xyz, params.seed_max.xyz) {{
        drop_chance = drop_chance + params.drop_rate_bump;
    }}

    if next_random(&state) < drop_chance {{
        let r = vec3<f32>(next_random(&state), next_random(&state), next_random(&state));
        particles_out[index] = vec4<f32>(mix(params.seed_min.xyz, params.seed_max.xyz, r), RESEEDED);
    }} else {{
        particles_out[index] = vec4<f32>(moved, delta.w);
    }}
}}
"#,
        uniforms = ADVECTION_UNIFORMS_WGSL,
        random = RANDOM_WGSL,
        geo = geo_wgsl(),
        workgroup_size = WORKGROUP_SIZE,
    )
}
