use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        model::{self, MaterialUniform},
        texture::Texture,
    },
    resources::{MaterialData, MeshData},
};

/// Uploads every primitive of every mesh. The outer index is the glTF mesh.
pub fn load_meshes(meshes: &[MeshData], device: &wgpu::Device) -> Vec<Vec<model::Mesh>> {
    meshes
        .iter()
        .map(|mesh| {
            mesh.primitives
                .iter()
                .enumerate()
                .map(|(idx, primitive)| {
                    let vertex_buffer =
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&format!("{} #{} Vertex Buffer", mesh.name, idx)),
                            contents: bytemuck::cast_slice(&primitive.vertices),
                            usage: wgpu::BufferUsages::VERTEX,
                        });
                    let index_buffer =
                        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                            label: Some(&format!("{} #{} Index Buffer", mesh.name, idx)),
                            contents: bytemuck::cast_slice(&primitive.indices),
                            usage: wgpu::BufferUsages::INDEX,
                        });
                    model::Mesh {
                        name: mesh.name.clone(),
                        vertex_buffer,
                        index_buffer,
                        num_elements: primitive.indices.len() as u32,
                        material: primitive.material,
                    }
                })
                .collect()
        })
        .collect()
}

/// Uploads materials. A base colour image that fails to decode falls back to
/// plain white so the model still renders with its colour factor.
pub fn load_materials(
    materials: &[MaterialData],
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
) -> Vec<model::Material> {
    materials
        .iter()
        .map(|material| {
            let texture = material
                .base_colour_image
                .as_ref()
                .and_then(|image| {
                    Texture::from_bytes(
                        device,
                        queue,
                        &image.bytes,
                        &material.name,
                        image.extension.as_deref(),
                        false,
                    )
                    .map_err(|e| {
                        log::warn!("could not decode base colour of {}: {}", material.name, e)
                    })
                    .ok()
                })
                .unwrap_or_else(|| {
                    Texture::create_solid(device, queue, [255; 4], &material.name)
                });
            let uniform = MaterialUniform {
                base_colour: material.base_colour,
                emissive: [
                    material.emissive[0],
                    material.emissive[1],
                    material.emissive[2],
                    0.0,
                ],
            };
            model::Material::new(device, &material.name, texture, uniform, layout)
        })
        .collect()
}
