//! Equirectangular skybox drawn as one fullscreen triangle behind the model.

use crate::{
    data_structures::texture::Texture,
    pipelines::basic::{depth_state, mk_render_pipeline},
};

pub fn mk_skybox_pipeline(
    device: &wgpu::Device,
    color_format: wgpu::TextureFormat,
    skybox_layout: &wgpu::BindGroupLayout,
    camera_layout: &wgpu::BindGroupLayout,
) -> wgpu::RenderPipeline {
    let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Skybox Pipeline Layout"),
        bind_group_layouts: &[skybox_layout, camera_layout],
        push_constant_ranges: &[],
    });
    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Skybox Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("skybox_shader.wgsl").into()),
    };
    mk_render_pipeline(
        device,
        &layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        // drawn first at the far plane, never occludes the model
        Some(depth_state(false, wgpu::CompareFunction::LessEqual)),
        None,
        &[],
        shader,
    )
}

#[derive(Debug)]
pub struct SkyboxResources {
    pub texture: Texture,
    pub bind_group: wgpu::BindGroup,
}

impl SkyboxResources {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, texture: Texture) -> Self {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
            label: Some("skybox_bind_group"),
        });
        Self {
            texture,
            bind_group,
        }
    }

    /// A skybox of one flat colour (components in 0..=1, sRGB).
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        colour: [f32; 4],
    ) -> Self {
        let rgba = colour.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let texture = Texture::create_solid(device, queue, rgba, "skybox colour");
        Self::new(device, layout, texture)
    }
}
