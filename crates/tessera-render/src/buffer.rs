//! Vertex, index, instance and storage buffer management.

use bytemuck::{Pod, Zeroable};

/// A complete mesh buffer containing vertex and index data ready for GPU rendering.
pub struct MeshBuffer {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
    pub index_format: wgpu::IndexFormat,
}

impl MeshBuffer {
    /// Bind vertex (slot 0) and index buffers to a render pass.
    pub fn bind(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.set_index_buffer(self.index_buffer.slice(..), self.index_format);
    }

    /// Draw `instance_count` copies of the mesh.
    pub fn draw_instanced(&self, render_pass: &mut wgpu::RenderPass<'_>, instance_count: u32) {
        render_pass.draw_indexed(0..self.index_count, 0, 0..instance_count);
    }
}

/// Index data that can be either u16 or u32 format.
pub enum IndexData<'a> {
    U16(&'a [u16]),
    U32(&'a [u32]),
}

impl IndexData<'_> {
    pub fn format(&self) -> wgpu::IndexFormat {
        match self {
            IndexData::U16(_) => wgpu::IndexFormat::Uint16,
            IndexData::U32(_) => wgpu::IndexFormat::Uint32,
        }
    }

    pub fn count(&self) -> u32 {
        match self {
            IndexData::U16(data) => data.len() as u32,
            IndexData::U32(data) => data.len() as u32,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            IndexData::U16(data) => bytemuck::cast_slice(data),
            IndexData::U32(data) => bytemuck::cast_slice(data),
        }
    }
}

/// GPU buffer allocator for creating mesh buffers.
pub struct BufferAllocator<'a> {
    device: &'a wgpu::Device,
}

impl<'a> BufferAllocator<'a> {
    pub fn new(device: &'a wgpu::Device) -> Self {
        Self { device }
    }

    /// Create a complete mesh buffer from vertex and index data.
    pub fn create_mesh(&self, label: &str, vertices: &[u8], indices: IndexData) -> MeshBuffer {
        use wgpu::util::DeviceExt;

        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-vertices")),
                contents: vertices,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
        let index_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{label}-indices")),
                contents: indices.as_bytes(),
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
            });

        MeshBuffer {
            vertex_buffer,
            index_buffer,
            index_count: indices.count(),
            index_format: indices.format(),
        }
    }

    /// Create the shared unit cube used for voxel instancing.
    pub fn create_cube_mesh(&self) -> MeshBuffer {
        let (vertices, indices) = cube_mesh();
        self.create_mesh(
            "voxel-cube",
            bytemuck::cast_slice(&vertices),
            IndexData::U16(&indices),
        )
    }
}

/// Vertex with position and color, used for debug lines.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPositionColor {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl VertexPositionColor {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VertexPositionColor>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Standard vertex format with position, normal, and UV coordinates.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VertexPositionNormalUv {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl VertexPositionNormalUv {
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VertexPositionNormalUv>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: VertexFormat::Float32x3,
                },
                VertexAttribute {
                    offset: (std::mem::size_of::<[f32; 3]>() * 2) as wgpu::BufferAddress,
                    shader_location: 2,
                    format: VertexFormat::Float32x2,
                },
            ],
        }
    }
}

/// Per-voxel instance data: model matrix columns followed by RGB color.
/// 76 bytes, consumed at instance step rate.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VoxelInstance {
    pub model: [[f32; 4]; 4],
    pub color: [f32; 3],
}

static_assertions::const_assert_eq!(std::mem::size_of::<VoxelInstance>(), 76);

impl VoxelInstance {
    /// Shader locations 3..=6 carry the matrix columns, 7 the color.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        use wgpu::{VertexAttribute, VertexFormat};

        const COLUMN: wgpu::BufferAddress = std::mem::size_of::<[f32; 4]>() as wgpu::BufferAddress;
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<VoxelInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &[
                VertexAttribute {
                    offset: 0,
                    shader_location: 3,
                    format: VertexFormat::Float32x4,
                },
                VertexAttribute {
                    offset: COLUMN,
                    shader_location: 4,
                    format: VertexFormat::Float32x4,
                },
                VertexAttribute {
                    offset: COLUMN * 2,
                    shader_location: 5,
                    format: VertexFormat::Float32x4,
                },
                VertexAttribute {
                    offset: COLUMN * 3,
                    shader_location: 6,
                    format: VertexFormat::Float32x4,
                },
                VertexAttribute {
                    offset: COLUMN * 4,
                    shader_location: 7,
                    format: VertexFormat::Float32x3,
                },
            ],
        }
    }
}

/// Unit cube centered on the origin: 24 vertices (4 per face, so each face
/// gets its own normal) and 36 indices, counter-clockwise when viewed from
/// outside.
pub fn cube_mesh() -> (Vec<VertexPositionNormalUv>, Vec<u16>) {
    // (normal, tangent u, tangent v) per face; u × v == normal.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)];

    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);
    for (face, (n, u, v)) in FACES.iter().enumerate() {
        let n = glam::Vec3::from_array(*n);
        let u = glam::Vec3::from_array(*u);
        let v = glam::Vec3::from_array(*v);
        for (cu, cv) in CORNERS {
            let p = n * 0.5 + u * (cu - 0.5) + v * (cv - 0.5);
            vertices.push(VertexPositionNormalUv {
                position: p.to_array(),
                normal: n.to_array(),
                uv: [cu, 1.0 - cv],
            });
        }
        let base = (face * 4) as u16;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
    (vertices, indices)
}

/// A growable storage buffer holding a tightly packed array of `T`.
///
/// The buffer is reallocated (to the next power of two) only when the data
/// outgrows it, and always holds at least one element so it can be bound.
pub struct StorageArray<T> {
    label: &'static str,
    buffer: wgpu::Buffer,
    capacity: usize,
    len: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Pod> StorageArray<T> {
    pub fn new(device: &wgpu::Device, label: &'static str, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            label,
            buffer: Self::allocate(device, label, capacity),
            capacity,
            len: 0,
            _marker: std::marker::PhantomData,
        }
    }

    fn allocate(device: &wgpu::Device, label: &str, capacity: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (capacity * std::mem::size_of::<T>()) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Upload `data`, growing the buffer first if needed. Returns `true`
    /// when the buffer was reallocated (bind groups must be rebuilt).
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[T]) -> bool {
        let mut reallocated = false;
        if data.len() > self.capacity {
            self.capacity = data.len().next_power_of_two();
            self.buffer = Self::allocate(device, self.label, self.capacity);
            log::debug!("{} grown to {} elements", self.label, self.capacity);
            reallocated = true;
        }
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        self.len = data.len();
        reallocated
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Elements written by the last [`StorageArray::write`].
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::test_device;

    #[test]
    fn test_cube_mesh_counts() {
        let (vertices, indices) = cube_mesh();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn test_cube_mesh_is_unit_and_centered() {
        let (vertices, _) = cube_mesh();
        for v in &vertices {
            assert!(v.position.iter().all(|c| c.abs() == 0.5), "{:?}", v.position);
        }
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let (vertices, indices) = cube_mesh();
        for tri in indices.chunks(3) {
            let p = |i: u16| glam::Vec3::from_array(vertices[i as usize].position);
            let n = glam::Vec3::from_array(vertices[tri[0] as usize].normal);
            let face_normal = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            assert!(face_normal.dot(n) > 0.0, "triangle {tri:?} winds inward");
        }
    }

    #[test]
    fn test_instance_layout() {
        let layout = VoxelInstance::layout();
        assert_eq!(layout.array_stride, 76);
        assert_eq!(layout.step_mode, wgpu::VertexStepMode::Instance);
        assert_eq!(layout.attributes.len(), 5);
        assert_eq!(layout.attributes[4].offset, 64);
    }

    #[test]
    fn test_vertex_layouts() {
        assert_eq!(VertexPositionNormalUv::layout().array_stride, 32);
        assert_eq!(VertexPositionColor::layout().array_stride, 28);
    }

    #[test]
    fn test_index_data_as_bytes() {
        assert_eq!(IndexData::U16(&[0, 1, 2]).as_bytes().len(), 6);
        assert_eq!(IndexData::U32(&[0, 1, 2]).as_bytes().len(), 12);
        assert_eq!(IndexData::U32(&[0]).format(), wgpu::IndexFormat::Uint32);
    }

    #[test]
    fn test_cube_mesh_upload() {
        let Some((device, _queue)) = test_device() else {
            return;
        };
        let mesh = BufferAllocator::new(&device).create_cube_mesh();
        assert_eq!(mesh.index_count, 36);
        assert_eq!(mesh.index_format, wgpu::IndexFormat::Uint16);
    }

    #[test]
    fn test_storage_array_grows_to_power_of_two() {
        let Some((device, queue)) = test_device() else {
            return;
        };
        let mut array = StorageArray::<[f32; 4]>::new(&device, "test-array", 2);
        assert!(!array.write(&device, &queue, &[[0.0; 4]; 2]));
        assert!(array.write(&device, &queue, &[[1.0; 4]; 5]));
        assert_eq!(array.capacity(), 8);
        assert_eq!(array.len(), 5);
        assert!(!array.write(&device, &queue, &[]));
        assert!(array.is_empty());
    }
}
