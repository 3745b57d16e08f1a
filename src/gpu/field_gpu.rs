//! GPU copies of the wind field and the colour table.

use crate::field::{ColorTable, FieldMetadata, VectorField};

use super::ResourceId;

/// U and V components as `R32Float` textures.
///
/// Texture width is the lon count, height is `lat count * lev count`:
/// level `k` occupies rows `k * lat .. (k + 1) * lat`.
pub struct FieldTextures {
    id: ResourceId,
    metadata: FieldMetadata,
    pub u: wgpu::Texture,
    pub u_view: wgpu::TextureView,
    pub v: wgpu::Texture,
    pub v_view: wgpu::TextureView,
}

impl FieldTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, field: &VectorField) -> Self {
        let dims = field.dimensions();
        let width = dims.lon;
        let height = dims.lat * dims.lev;

        let (u, u_view) = create_component(device, queue, "U", width, height, &field.u().values);
        let (v, v_view) = create_component(device, queue, "V", width, height, &field.v().values);

        Self {
            id: ResourceId::next(),
            metadata: field.metadata(),
            u,
            u_view,
            v,
            v_view,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    pub fn destroy(&self) {
        self.u.destroy();
        self.v.destroy();
    }
}

fn create_component(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    component: &str,
    width: u32,
    height: u32,
    values: &[f32],
) -> (wgpu::Texture, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(&format!("Field {} Texture", component)),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(values),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(width * 4),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// Colour ramp as an `N x 1` `Rgba8Unorm` texture with a linear sampler.
pub struct ColorTableTexture {
    id: ResourceId,
    len: u32,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl ColorTableTexture {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, table: &ColorTable) -> Self {
        let len = table.len() as u32;
        let size = wgpu::Extent3d {
            width: len,
            height: 1,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Color Table Texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &table.to_rgba8(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(len * 4),
                rows_per_image: Some(1),
            },
            size,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Color Table Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            id: ResourceId::next(),
            len,
            texture,
            view,
            sampler,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Number of colours in the ramp.
    pub fn color_count(&self) -> u32 {
        self.len
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}
