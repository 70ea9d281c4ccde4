use cgmath::{InnerSpace, Vector3};
use wgpu::util::DeviceExt;

/// Sun illuminance the directional term is normalised against.
pub const SUN_ILLUMINANCE: f32 = 100_000.0;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightUniform {
    // Uniforms require 16 byte (4 float) spacing, so every field is a vec4.
    pub direction: [f32; 4],
    pub colour: [f32; 4],
    pub ambient: [f32; 4],
}

impl LightUniform {
    /// A white-ish sun shining down and away from the camera.
    pub fn sun() -> Self {
        let direction = Vector3::new(0.6_f32, -1.0, -0.8).normalize();
        Self {
            direction: [direction.x, direction.y, direction.z, 0.0],
            colour: [0.98, 0.92, 0.89, 1.0],
            ambient: [0.0, 0.0, 0.0, 1.0],
        }
    }

    /// Ambient term standing in for image based lighting of `intensity` lux.
    pub fn with_indirect_intensity(mut self, intensity: f32) -> Self {
        let ambient = ambient_from_intensity(intensity);
        self.ambient = [ambient, ambient, ambient, 1.0];
        self
    }
}

pub fn ambient_from_intensity(intensity: f32) -> f32 {
    (intensity / SUN_ILLUMINANCE).max(0.0)
}

#[derive(Debug)]
pub struct LightResources {
    pub uniform: LightUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
}

impl LightResources {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, uniform: LightUniform) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("light_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
        }
    }

    pub fn set(&mut self, queue: &wgpu::Queue, uniform: LightUniform) {
        self.uniform = uniform;
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}
