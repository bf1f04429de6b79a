//! Materials that shade with the cluster system.
//!
//! A [`Material`] owns a small uniform block mirroring the parts of the
//! pipeline state a material shader needs: the cluster grid it indexes into,
//! the clip range, and the environment.

use bytemuck::{Pod, Zeroable};
use tessera_lighting::{Environment, EnvironmentUniform};

use crate::cluster::ClusterConfig;

/// 112 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MaterialUniform {
    /// x, y, z, cluster shading enabled flag.
    pub cluster_dims: [u32; 4],
    /// near clip, far clip, time of day, padding.
    pub clip_time: [f32; 4],
    pub environment: EnvironmentUniform,
}

static_assertions::const_assert_eq!(std::mem::size_of::<MaterialUniform>(), 112);

impl MaterialUniform {
    pub fn new(config: &ClusterConfig, environment: &Environment, cluster_enabled: bool) -> Self {
        let dims = config.dims;
        Self {
            cluster_dims: [dims.x, dims.y, dims.z, cluster_enabled as u32],
            clip_time: [config.near_clip, config.far_clip, environment.time_of_day, 0.0],
            environment: environment.to_uniform(),
        }
    }
}

pub struct Material {
    label: String,
    cluster_enabled: bool,
    uniform: MaterialUniform,
    buffer: wgpu::Buffer,
    bound: bool,
}

impl Material {
    pub fn new(device: &wgpu::Device, label: &str) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: std::mem::size_of::<MaterialUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self {
            label: label.to_string(),
            cluster_enabled: true,
            uniform: MaterialUniform::zeroed(),
            buffer,
            bound: false,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_cluster_enabled(&self) -> bool {
        self.cluster_enabled
    }

    /// Takes effect on the next bind.
    pub fn set_cluster_enabled(&mut self, enabled: bool) {
        self.cluster_enabled = enabled;
    }

    /// Whether the uniform has been written at least once.
    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn uniform(&self) -> &MaterialUniform {
        &self.uniform
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Refresh the uniform from the pipeline's current state.
    pub fn bind_cluster_system(&mut self, queue: &wgpu::Queue, config: &ClusterConfig, environment: &Environment) {
        self.uniform = MaterialUniform::new(config, environment, self.cluster_enabled);
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.uniform));
        self.bound = true;
    }
}
