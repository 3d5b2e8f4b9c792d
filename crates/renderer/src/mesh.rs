//! Drawable geometry in device-local memory.

use std::sync::Arc;

use ash::vk;
use glam::{Vec2, Vec3, Vec4};
use tracing::info;

use forge_rhi::buffer::{Buffer, BufferBuilder, upload_device_local};
use forge_rhi::command::CommandBuffer;
use forge_rhi::device::Device;
use forge_rhi::vertex::Vertex;
use forge_rhi::{RhiError, RhiResult};

/// CPU-side vertices and 16-bit indices, as handed over by asset loading.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        Self { vertices, indices }
    }

    /// Unit quad in the XY plane facing +Z, two counter-clockwise triangles.
    pub fn quad() -> Self {
        let corner = |x: f32, y: f32, color: Vec4, u: f32, v: f32| {
            Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, color, Vec2::new(u, v))
        };
        let vertices = vec![
            corner(-0.5, -0.5, Vec4::new(1.0, 0.0, 0.0, 1.0), 0.0, 1.0),
            corner(0.5, -0.5, Vec4::new(0.0, 1.0, 0.0, 1.0), 1.0, 1.0),
            corner(0.5, 0.5, Vec4::new(0.0, 0.0, 1.0, 1.0), 1.0, 0.0),
            corner(-0.5, 0.5, Vec4::ONE, 0.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 2, 3, 0];
        Self { vertices, indices }
    }

    /// Rejects empty geometry and indices that point past the vertex list.
    pub fn validate(&self) -> RhiResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(RhiError::InvalidConfig(format!(
                "Mesh needs vertices and indices (got {} and {})",
                self.vertices.len(),
                self.indices.len()
            )));
        }
        if let Some(&bad) = self
            .indices
            .iter()
            .find(|&&i| usize::from(i) >= self.vertices.len())
        {
            return Err(RhiError::InvalidConfig(format!(
                "Index {} out of range for {} vertices",
                bad,
                self.vertices.len()
            )));
        }
        Ok(())
    }
}

/// Vertex and index buffers uploaded through staging.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_count: u32,
    index_count: u32,
}

impl Mesh {
    pub fn new(device: &Arc<Device>, data: &MeshData) -> RhiResult<Self> {
        data.validate()?;

        let vertex_buffer = upload_device_local(
            device,
            BufferBuilder::vertex(0).label("mesh vertices"),
            bytemuck::cast_slice(&data.vertices),
        )?;
        let index_buffer = upload_device_local(
            device,
            BufferBuilder::index(0).label("mesh indices"),
            bytemuck::cast_slice(&data.indices),
        )?;

        info!(
            "Uploaded mesh: {} vertices, {} indices",
            data.vertices.len(),
            data.indices.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: data.vertices.len() as u32,
            index_count: data.indices.len() as u32,
        })
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    /// Binds both buffers and issues one indexed draw.
    pub fn record_draw(&self, cmd: &CommandBuffer) {
        cmd.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT16);
        cmd.draw_indexed(self.index_count, 1, 0, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_shape() {
        let quad = MeshData::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.indices, vec![0, 1, 2, 2, 3, 0]);
        assert!(quad.validate().is_ok());
    }

    #[test]
    fn test_quad_triangles_face_positive_z() {
        let quad = MeshData::quad();
        for tri in quad.indices.chunks_exact(3) {
            let [a, b, c] =
                [tri[0], tri[1], tri[2]].map(|i| quad.vertices[usize::from(i)].position);
            assert!((b - a).cross(c - a).z > 0.0);
        }
    }

    #[test]
    fn test_validate_rejects_empty() {
        assert!(MeshData::default().validate().is_err());
        let no_indices = MeshData::new(MeshData::quad().vertices, Vec::new());
        assert!(matches!(
            no_indices.validate(),
            Err(RhiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_index() {
        let mut quad = MeshData::quad();
        quad.indices.push(4);
        assert!(quad.validate().is_err());
    }

    #[test]
    fn test_index_bytes_are_u16() {
        let quad = MeshData::quad();
        let bytes: &[u8] = bytemuck::cast_slice(&quad.indices);
        assert_eq!(bytes.len(), 12);
    }
}
