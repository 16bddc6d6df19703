//! Vertex layout consumed by the textured pipeline.
//!
//! # Memory Layout
//!
//! `Vertex` is `#[repr(C)]`, tightly packed with no padding:
//! - Offset 0: position (12 bytes), shader location 0
//! - Offset 12: color (12 bytes), shader location 1
//! - Offset 24: tex_coord (8 bytes), shader location 2
//! - Total size: 32 bytes

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Textured, vertex-colored vertex.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in object space.
    pub position: Vec3,
    /// RGB color, multiplied with the sampled texel.
    pub color: Vec3,
    /// Texture coordinates (UV).
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Per-vertex input binding 0.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for locations 0 (position), 1 (color) and 2 (UV).
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // 3 + 3 + 2 floats
        assert_eq!(Vertex::size(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attributes = Vertex::attribute_descriptions();

        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[0].offset, 0);

        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[1].offset, 12);

        assert_eq!(attributes[2].location, 2);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[2].offset, 24);

        assert!(attributes.iter().all(|a| a.binding == 0));
    }

    #[test]
    fn test_vertex_pod_bytes() {
        let vertex = Vertex::new(
            Vec3::new(-0.5, -0.5, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec2::new(1.0, 0.0),
        );
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[-0.5, -0.5, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_vertex_default_is_zeroed() {
        let vertex = Vertex::default();
        assert_eq!(vertex, Vertex::zeroed());
    }
}
