//! Device-local meshes.

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::debug;

use vge_rhi::buffer::{Buffer, BufferUsage};
use vge_rhi::command::CommandPool;
use vge_rhi::device::Device;
use vge_rhi::vertex::Vertex;

use crate::error::{RendererError, RendererResult};

/// Checks that a vertex/index pair can be drawn.
///
/// Both lists must be non-empty and every index must name a vertex.
pub fn validate_geometry(vertex_count: usize, indices: &[u32]) -> RendererResult<()> {
    if vertex_count == 0 {
        return Err(RendererError::InvalidMesh("mesh has no vertices".to_string()));
    }
    if indices.is_empty() {
        return Err(RendererError::InvalidMesh("mesh has no indices".to_string()));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(RendererError::InvalidMesh(format!(
            "index {} out of range for {} vertices",
            bad, vertex_count
        )));
    }
    Ok(())
}

/// An indexed triangle list in device-local memory.
///
/// The vertex and index buffers are filled once through staging copies and
/// never written again; only the model matrix changes after creation.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    vertex_count: u32,
    index_count: u32,
    texture_index: usize,
    model: Mat4,
}

impl Mesh {
    /// Uploads `vertices` and `indices` into device-local buffers.
    ///
    /// The model matrix starts as identity.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Command pool for the one-time copy submissions
    /// * `vertices` - Vertex data
    /// * `indices` - 32-bit triangle list indices into `vertices`
    /// * `texture_index` - Texture registry index sampled by this mesh
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidMesh`] for empty or inconsistent
    /// geometry, or an error if either upload fails.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        vertices: &[Vertex],
        indices: &[u32],
        texture_index: usize,
    ) -> RendererResult<Self> {
        validate_geometry(vertices.len(), indices)?;

        let vertex_buffer = Buffer::new_device_local(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(vertices),
        )?;
        let index_buffer = Buffer::new_device_local(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(indices),
        )?;

        debug!(
            "Mesh uploaded: {} vertices, {} indices, texture {}",
            vertices.len(),
            indices.len(),
            texture_index
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            texture_index,
            model: Mat4::IDENTITY,
        })
    }

    /// Returns the vertex buffer handle.
    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Returns the index buffer handle.
    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Number of vertices uploaded.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Number of indices uploaded.
    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Texture registry index sampled by this mesh.
    #[inline]
    pub fn texture_index(&self) -> usize {
        self.texture_index
    }

    /// Current model matrix.
    #[inline]
    pub fn model(&self) -> Mat4 {
        self.model
    }

    /// Replaces the model matrix.
    #[inline]
    pub fn set_model(&mut self, model: Mat4) {
        self.model = model;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_geometry_is_valid() {
        assert!(validate_geometry(4, &[0, 1, 2, 2, 3, 0]).is_ok());
    }

    #[test]
    fn test_empty_geometry_is_rejected() {
        assert!(matches!(
            validate_geometry(0, &[0]),
            Err(RendererError::InvalidMesh(_))
        ));
        assert!(matches!(
            validate_geometry(3, &[]),
            Err(RendererError::InvalidMesh(_))
        ));
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let err = validate_geometry(4, &[0, 1, 4]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid mesh: index 4 out of range for 4 vertices"
        );
    }

    #[test]
    fn test_mesh_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Mesh>();
    }
}
