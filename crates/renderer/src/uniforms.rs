//! Per-swapchain-image view/projection uniforms.
//!
//! Every swapchain image gets its own host-visible uniform buffer and its own
//! descriptor set (set 0, binding 0), so writing the uniforms for the
//! acquired image never touches a buffer another in-flight frame is reading.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vge_rhi::buffer::{Buffer, BufferUsage};
use vge_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, write_uniform_buffer,
};
use vge_rhi::device::Device;

use crate::error::{RendererError, RendererResult};
use crate::ubo::ViewProjection;

/// Binding of the view/projection block inside set 0.
pub const VIEW_PROJECTION_BINDING: u32 = 0;

/// Creates the set 0 layout: one vertex-stage uniform buffer.
///
/// # Errors
///
/// Returns an error if layout creation fails.
pub fn view_projection_layout(device: Arc<Device>) -> RendererResult<DescriptorSetLayout> {
    let binding =
        DescriptorBindingBuilder::uniform_buffer(VIEW_PROJECTION_BINDING, vk::ShaderStageFlags::VERTEX);
    Ok(DescriptorSetLayout::new(device, &[binding])?)
}

/// Uniform buffers, pool and descriptor sets for one swapchain generation.
///
/// Rebuilt whenever the swapchain is recreated, because the image count may
/// change.
pub struct UniformSet {
    /// One buffer per swapchain image.
    buffers: Vec<Buffer>,
    /// One set per swapchain image, bound to the buffer of the same index.
    sets: Vec<vk::DescriptorSet>,
    /// Owns the sets; destroyed after the buffers.
    pool: DescriptorPool,
}

impl UniformSet {
    /// Allocates `image_count` uniform buffers and descriptor sets.
    ///
    /// The pool holds exactly `image_count` uniform buffer descriptors.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation, pool creation or set allocation
    /// fails.
    pub fn new(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        image_count: usize,
    ) -> RendererResult<Self> {
        let count = image_count as u32;
        let pool = DescriptorPool::new(
            device.clone(),
            count,
            &[DescriptorPool::size(vk::DescriptorType::UNIFORM_BUFFER, count)],
        )?;

        let layouts = vec![layout.handle(); image_count];
        let sets = pool.allocate(&layouts)?;

        let range = ViewProjection::SIZE as vk::DeviceSize;
        let mut buffers = Vec::with_capacity(image_count);
        for &set in &sets {
            let buffer = Buffer::new(device.clone(), BufferUsage::Uniform, range)?;
            write_uniform_buffer(
                &device,
                set,
                VIEW_PROJECTION_BINDING,
                vk::DescriptorType::UNIFORM_BUFFER,
                buffer.handle(),
                range,
            );
            buffers.push(buffer);
        }

        debug!(
            "Created {} view/projection uniform sets (pool max_sets={})",
            image_count,
            pool.max_sets()
        );

        Ok(Self {
            buffers,
            sets,
            pool,
        })
    }

    /// Writes `data` into the buffer belonging to `image_index`.
    ///
    /// The caller must have waited on the image guard for `image_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image_index` is out of range or the write fails.
    pub fn update(&self, image_index: u32, data: &ViewProjection) -> RendererResult<()> {
        let buffer = self.buffers.get(image_index as usize).ok_or_else(|| {
            RendererError::Rhi(vge_rhi::RhiError::InvalidHandle(format!(
                "No uniform buffer for swapchain image {}",
                image_index
            )))
        })?;
        buffer.write_pod(0, data)?;
        Ok(())
    }

    /// Descriptor set for `image_index`.
    #[inline]
    pub fn set(&self, image_index: u32) -> Option<vk::DescriptorSet> {
        self.sets.get(image_index as usize).copied()
    }

    /// Number of swapchain images covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns true when no images are covered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_set_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<UniformSet>();
    }

    #[test]
    fn test_binding_matches_shader() {
        assert_eq!(VIEW_PROJECTION_BINDING, 0);
        assert_eq!(ViewProjection::SIZE % 16, 0);
    }
}
