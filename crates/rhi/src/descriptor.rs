//! Descriptor set layouts, pools and writes.
//!
//! - [`DescriptorSetLayout`] describes the bindings of one set
//! - [`DescriptorPool`] hands out sets from a fixed capacity
//! - [`write_uniform_buffer`] and [`write_combined_image_sampler`] point a
//!   set's binding at a resource
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vge_rhi::device::Device;
//! use vge_rhi::descriptor::{DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout};
//!
//! # fn example(device: Arc<Device>, image_count: u32) -> Result<(), vge_rhi::RhiError> {
//! let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
//! let layout = DescriptorSetLayout::new(device.clone(), &[binding])?;
//!
//! let pool = DescriptorPool::new(
//!     device.clone(),
//!     image_count,
//!     &[DescriptorPool::size(vk::DescriptorType::UNIFORM_BUFFER, image_count)],
//! )?;
//! let layouts = vec![layout.handle(); image_count as usize];
//! let sets = pool.allocate(&layouts)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a new descriptor set layout.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool with a fixed capacity.
///
/// Sets are never freed individually; they go back to the driver when the
/// pool is destroyed.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
    /// Maximum number of sets that can be allocated.
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a new descriptor pool.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={:?}",
            max_sets,
            pool_sizes
                .iter()
                .map(|size| (size.ty, size.descriptor_count))
                .collect::<Vec<_>>()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// A pool size entry of `count` descriptors of type `ty`.
    #[inline]
    pub fn size(ty: vk::DescriptorType, count: u32) -> vk::DescriptorPoolSize {
        vk::DescriptorPoolSize::default()
            .ty(ty)
            .descriptor_count(count)
    }

    /// Allocates one descriptor set per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the maximum number of sets that can be allocated from this pool.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    /// Returns the device the pool was created on.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool (max_sets={})", self.max_sets);
    }
}

/// Points binding `binding` of `set` at `range` bytes of `buffer` from offset 0.
///
/// `ty` is `UNIFORM_BUFFER` or `UNIFORM_BUFFER_DYNAMIC`; for the dynamic
/// variant the offset is supplied at bind time.
pub fn write_uniform_buffer(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    ty: vk::DescriptorType,
    buffer: vk::Buffer,
    range: vk::DeviceSize,
) {
    let buffer_infos = [vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(0)
        .range(range)];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(ty)
        .buffer_info(&buffer_infos);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Points binding `binding` of `set` at `view` sampled through `sampler`.
///
/// The image must be in `SHADER_READ_ONLY_OPTIMAL` when the set is used.
pub fn write_combined_image_sampler(
    device: &Device,
    set: vk::DescriptorSet,
    binding: u32,
    view: vk::ImageView,
    sampler: vk::Sampler,
) {
    let image_infos = [vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(view)
        .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .image_info(&image_infos);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

/// Builder for single-descriptor layout bindings.
///
/// # Example
///
/// ```no_run
/// use ash::vk;
/// use vge_rhi::descriptor::DescriptorBindingBuilder;
///
/// let bindings = [
///     DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX),
///     DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
/// ];
/// ```
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// Creates a uniform buffer binding.
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Creates a dynamic uniform buffer binding (offset supplied at bind time).
    #[inline]
    pub fn uniform_buffer_dynamic(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(
            binding,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            stage_flags,
        )
    }

    /// Creates a combined image sampler binding.
    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(
            binding,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            stage_flags,
        )
    }

    fn single(
        binding: u32,
        ty: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(ty)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_binding_builder_uniform_buffer() {
        let binding = DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_descriptor_binding_builder_combined_image_sampler() {
        let binding =
            DescriptorBindingBuilder::combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 0);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_descriptor_binding_builder_dynamic_uniform_buffer() {
        let binding =
            DescriptorBindingBuilder::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert_eq!(binding.descriptor_count, 1);
    }

    #[test]
    fn test_pool_size() {
        let size = DescriptorPool::size(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 20);
        assert_eq!(size.ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(size.descriptor_count, 20);
    }
}
