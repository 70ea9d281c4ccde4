//! The wgpu model viewer.
//!
//! [`GltfViewer`] owns the GPU [`Context`], the pipelines and at most one
//! loaded model. Each [`render`](ModelViewer::render) pushes the current node
//! transforms, bone matrices and material overrides to the GPU, draws the
//! skybox and then every visible mesh node.

use std::{iter, mem};

use cgmath::{Matrix4, SquareMatrix, Vector3};

use crate::{
    camera::{Camera, CameraResources},
    config::ViewerConfig,
    context::Context,
    data_structures::{
        asset::ModelAsset,
        instance::InstanceRaw,
        model::{DrawModel, Material, Mesh},
        texture::Texture,
    },
    pipelines::{
        basic::{MeshLayouts, mk_basic_pipeline},
        light::{LightResources, LightUniform},
        skybox::{SkyboxResources, mk_skybox_pipeline},
    },
    resources::{self, Environment, ModelData, mesh, texture},
    viewer::{Animator, Asset, ModelViewer},
};

struct Layouts {
    material: wgpu::BindGroupLayout,
    camera: wgpu::BindGroupLayout,
    light: wgpu::BindGroupLayout,
    bones: wgpu::BindGroupLayout,
    skybox: wgpu::BindGroupLayout,
}

impl Layouts {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            material: texture::material_layout(device),
            camera: texture::uniform_layout(device, "camera_bind_group_layout"),
            light: texture::uniform_layout(device, "light_bind_group_layout"),
            bones: texture::bones_layout(device),
            skybox: texture::skybox_layout(device),
        }
    }
}

/// Storage buffer with the joint matrices of one skin.
struct BoneResources {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl BoneResources {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Bone Buffer"),
            size: (capacity * mem::size_of::<[[f32; 4]; 4]>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("bones_bind_group"),
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }

    fn identity(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let bones = Self::new(device, layout, 1);
        bones.write(queue, &[Matrix4::identity()]);
        bones
    }

    fn write(&self, queue: &wgpu::Queue, matrices: &[Matrix4<f32>]) {
        let raw: Vec<[[f32; 4]; 4]> = matrices
            .iter()
            .take(self.capacity)
            .map(|&m| m.into())
            .collect();
        if !raw.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&raw));
        }
    }
}

struct Draw {
    mesh: usize,
    skin: Option<usize>,
}

/// A model uploaded to the GPU.
pub struct LoadedModel {
    asset: ModelAsset,
    meshes: Vec<Vec<Mesh>>,
    materials: Vec<Material>,
    bones: Vec<BoneResources>,
    instances: wgpu::Buffer,
    instance_capacity: usize,
}

impl LoadedModel {
    pub fn asset(&self) -> &ModelAsset {
        &self.asset
    }
}

fn instance_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Instance Buffer"),
        size: (capacity.max(1) * mem::size_of::<InstanceRaw>()) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub struct GltfViewer {
    ctx: Context,
    layouts: Layouts,
    mesh_pipeline: wgpu::RenderPipeline,
    skybox_pipeline: wgpu::RenderPipeline,
    camera: CameraResources,
    light: LightResources,
    skybox: SkyboxResources,
    identity_bones: BoneResources,
    model: Option<LoadedModel>,
    centre_point: Vector3<f32>,
    clear_colour: wgpu::Color,
    frames: u64,
}

impl GltfViewer {
    pub fn new(ctx: Context, config: &ViewerConfig) -> Self {
        let device = &ctx.device;
        let layouts = Layouts::new(device);
        let mesh_pipeline = mk_basic_pipeline(
            device,
            ctx.config.format,
            &MeshLayouts {
                material: &layouts.material,
                camera: &layouts.camera,
                light: &layouts.light,
                bones: &layouts.bones,
            },
        );
        let skybox_pipeline =
            mk_skybox_pipeline(device, ctx.config.format, &layouts.skybox, &layouts.camera);
        let camera = CameraResources::new(device, &layouts.camera, Camera::default(), ctx.aspect());
        let light = LightResources::new(
            device,
            &layouts.light,
            LightUniform::sun().with_indirect_intensity(config.indirect_light_intensity),
        );
        let c = config.clear_colour;
        let skybox = SkyboxResources::solid(
            device,
            &ctx.queue,
            &layouts.skybox,
            [c.r as f32, c.g as f32, c.b as f32, c.a as f32],
        );
        let identity_bones = BoneResources::identity(device, &ctx.queue, &layouts.bones);

        Self {
            layouts,
            mesh_pipeline,
            skybox_pipeline,
            camera,
            light,
            skybox,
            identity_bones,
            model: None,
            centre_point: config.centre_point,
            clear_colour: config.clear_colour,
            frames: 0,
            ctx,
        }
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn model(&self) -> Option<&LoadedModel> {
        self.model.as_ref()
    }

    /// Frames drawn so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.ctx.resize(width, height);
    }

    /// Loads a binary glTF, replacing the current model.
    pub fn load_model_glb(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        let data = resources::parse_glb(bytes)?;
        self.install(data);
        Ok(())
    }

    /// Loads a JSON glTF whose side files come from `resolver`, replacing the
    /// current model.
    pub fn load_model_gltf<R>(&mut self, bytes: &[u8], resolver: R) -> anyhow::Result<()>
    where
        R: FnMut(&str) -> anyhow::Result<Vec<u8>>,
    {
        let data = resources::parse_gltf(bytes, resolver)?;
        self.install(data);
        Ok(())
    }

    pub fn install(&mut self, data: ModelData) {
        let device = &self.ctx.device;
        let meshes = mesh::load_meshes(&data.meshes, device);
        let materials =
            mesh::load_materials(&data.materials, device, &self.ctx.queue, &self.layouts.material);
        let bones = data
            .asset
            .skins()
            .iter()
            .map(|skin| BoneResources::new(device, &self.layouts.bones, skin.joints.len()))
            .collect();
        let instance_capacity = data.asset.scene().len();
        let instances = instance_buffer(device, instance_capacity);
        if self.model.is_some() {
            log::info!("replacing the loaded model");
        }
        self.model = Some(LoadedModel {
            asset: data.asset,
            meshes,
            materials,
            bones,
            instances,
            instance_capacity,
        });
    }

    pub fn unload_model(&mut self) {
        self.model = None;
    }

    /// Uses `environment`'s skybox (when it has one) and indirect light.
    pub fn load_environment(&mut self, environment: &Environment) -> anyhow::Result<()> {
        if let Some(image) = &environment.skybox {
            let texture = Texture::from_equirect_bytes(
                &self.ctx.device,
                &self.ctx.queue,
                &image.bytes,
                &environment.name,
                image.extension.as_deref(),
            )?;
            self.skybox = SkyboxResources::new(&self.ctx.device, &self.layouts.skybox, texture);
        }
        self.light.set(
            &self.ctx.queue,
            LightUniform::sun().with_indirect_intensity(environment.indirect_light_intensity),
        );
        log::info!(
            "environment {} (indirect {} lux)",
            environment.name,
            environment.indirect_light_intensity
        );
        Ok(())
    }

    pub fn set_skybox_colour(&mut self, colour: [f32; 4]) {
        self.skybox = SkyboxResources::solid(
            &self.ctx.device,
            &self.ctx.queue,
            &self.layouts.skybox,
            colour,
        );
    }

    /// Pushes node transforms, bone matrices and material overrides.
    fn upload_model(&mut self) -> Vec<Draw> {
        let Some(model) = self.model.as_mut() else {
            return Vec::new();
        };
        model.asset.scene_mut().update_world_transforms();

        for (material, &emissive) in model
            .materials
            .iter_mut()
            .zip(model.asset.emissive_factors())
        {
            material.set_emissive(emissive);
            material.write_to_buffer(&self.ctx.queue);
        }
        for (skin, bones) in model.bones.iter().enumerate() {
            bones.write(&self.ctx.queue, model.asset.bone_matrices(skin));
        }

        let scene = model.asset.scene();
        let mut raw = Vec::new();
        let mut draws = Vec::new();
        for entity in scene.entities() {
            let Some(node) = scene.node(entity) else {
                continue;
            };
            let (Some(mesh), true) = (node.mesh, node.visible) else {
                continue;
            };
            let world = scene.world_transform(entity).unwrap_or_else(Matrix4::identity);
            raw.push(InstanceRaw::from_matrix(&world));
            draws.push(Draw {
                mesh,
                skin: node.skin,
            });
        }
        if raw.len() > model.instance_capacity {
            model.instance_capacity = raw.len();
            model.instances = instance_buffer(&self.ctx.device, raw.len());
        }
        if !raw.is_empty() {
            self.ctx
                .queue
                .write_buffer(&model.instances, 0, bytemuck::cast_slice(&raw));
        }
        draws
    }
}

impl ModelViewer for GltfViewer {
    fn render(&mut self, frame_time_nanos: u64) -> anyhow::Result<()> {
        let frame = match self.ctx.acquire_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            // Reconfigure the surface if it's lost or outdated
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("surface lost or outdated, reconfiguring");
                self.ctx.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("surface timed out, frame at {frame_time_nanos} skipped");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.camera.update(&self.ctx.queue, self.ctx.aspect());
        let draws = self.upload_model();
        let view = frame.view();

        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.ctx.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            render_pass.set_pipeline(&self.skybox_pipeline);
            render_pass.set_bind_group(0, &self.skybox.bind_group, &[]);
            render_pass.set_bind_group(1, &self.camera.bind_group, &[]);
            render_pass.draw(0..3, 0..1);

            if let Some(model) = &self.model {
                render_pass.set_pipeline(&self.mesh_pipeline);
                render_pass.set_vertex_buffer(1, model.instances.slice(..));
                for (idx, draw) in draws.iter().enumerate() {
                    let bones = draw
                        .skin
                        .and_then(|skin| model.bones.get(skin))
                        .unwrap_or(&self.identity_bones);
                    let instance = idx as u32;
                    for primitive in model.meshes.get(draw.mesh).into_iter().flatten() {
                        let Some(material) = model.materials.get(primitive.material) else {
                            log::warn!("{} uses missing material {}", primitive.name, primitive.material);
                            continue;
                        };
                        render_pass.draw_mesh_instanced(
                            primitive,
                            material,
                            instance..instance + 1,
                            &self.camera.bind_group,
                            &self.light.bind_group,
                            &bones.bind_group,
                        );
                    }
                }
            }
        }

        self.ctx.queue.submit(iter::once(encoder.finish()));
        frame.present();
        self.frames += 1;
        log::trace!("frame {} at {} ns", self.frames, frame_time_nanos);
        Ok(())
    }

    fn transform_to_unit_cube(&mut self) {
        if let Some(model) = self.model.as_mut() {
            model.asset.transform_to_unit_cube(self.centre_point);
        }
    }

    fn asset(&mut self) -> Option<&mut dyn Asset> {
        self.model.as_mut().map(|m| &mut m.asset as &mut dyn Asset)
    }

    fn animator(&mut self) -> Option<&mut dyn Animator> {
        self.model.as_mut().map(|m| &mut m.asset as &mut dyn Animator)
    }
}
