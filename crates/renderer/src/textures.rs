//! Texture descriptor registry.
//!
//! Each registered texture gets one combined-image-sampler descriptor set
//! (set 1, binding 0). The index returned by [`TextureRegistry::register`]
//! is the texture handle stored on a [`Mesh`](crate::Mesh) and is stable for
//! the registry's lifetime.
//!
//! Set allocation goes through [`SamplerSetAllocator`], so the indexing rules
//! can be exercised without a device.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vge_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, write_combined_image_sampler,
};
use vge_rhi::device::Device;

use crate::error::{RendererError, RendererResult};

/// Binding of the sampled texture inside set 1.
pub const TEXTURE_BINDING: u32 = 0;

/// Creates the set 1 layout: one fragment-stage combined image sampler.
///
/// # Errors
///
/// Returns an error if layout creation fails.
pub fn texture_layout(device: Arc<Device>) -> RendererResult<DescriptorSetLayout> {
    let binding = DescriptorBindingBuilder::combined_image_sampler(
        TEXTURE_BINDING,
        vk::ShaderStageFlags::FRAGMENT,
    );
    Ok(DescriptorSetLayout::new(device, &[binding])?)
}

/// Source of texture descriptor sets.
pub trait SamplerSetAllocator {
    /// Allocates a set pointing at `view` through `sampler`.
    ///
    /// # Errors
    ///
    /// Returns an error if no set can be allocated.
    fn allocate_sampler_set(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> RendererResult<vk::DescriptorSet>;
}

/// Allocates sampler sets from a dedicated Vulkan descriptor pool.
pub struct DescriptorSamplerAllocator {
    device: Arc<Device>,
    pool: DescriptorPool,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSamplerAllocator {
    /// Creates a pool with room for `capacity` sampler sets of `layout`.
    ///
    /// The layout must outlive the allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        capacity: usize,
    ) -> RendererResult<Self> {
        let count = capacity as u32;
        let pool = DescriptorPool::new(
            device.clone(),
            count,
            &[DescriptorPool::size(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count,
            )],
        )?;

        Ok(Self {
            device,
            pool,
            layout: layout.handle(),
        })
    }
}

impl SamplerSetAllocator for DescriptorSamplerAllocator {
    fn allocate_sampler_set(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> RendererResult<vk::DescriptorSet> {
        let set = self
            .pool
            .allocate(&[self.layout])?
            .pop()
            .ok_or(RendererError::TextureLimit {
                limit: self.pool.max_sets() as usize,
            })?;

        write_combined_image_sampler(&self.device, set, TEXTURE_BINDING, view, sampler);
        Ok(set)
    }
}

/// Ordered list of texture descriptor sets, bounded by a fixed capacity.
pub struct TextureRegistry<A> {
    allocator: A,
    sets: Vec<vk::DescriptorSet>,
    capacity: usize,
}

impl<A: SamplerSetAllocator> TextureRegistry<A> {
    /// Creates an empty registry holding at most `capacity` textures.
    pub fn new(allocator: A, capacity: usize) -> Self {
        Self {
            allocator,
            sets: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Registers a texture view sampled through `sampler`.
    ///
    /// Returns the new texture's index; the K-th successful registration
    /// returns K - 1.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::TextureLimit`] once `capacity` textures are
    /// registered, or the allocator's error.
    pub fn register(
        &mut self,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> RendererResult<usize> {
        if self.sets.len() >= self.capacity {
            return Err(RendererError::TextureLimit {
                limit: self.capacity,
            });
        }

        let set = self.allocator.allocate_sampler_set(view, sampler)?;
        self.sets.push(set);

        let index = self.sets.len() - 1;
        debug!("Registered texture descriptor set {}", index);
        Ok(index)
    }

    /// Descriptor set for texture `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    /// Number of registered textures.
    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// Returns true when nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Maximum number of textures.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_OBJECTS;
    use ash::vk::Handle;

    /// Hands out sequential fake sets and remembers which view each one
    /// points at.
    #[derive(Default)]
    struct FakeAllocator {
        next: u64,
        bound_views: Vec<(vk::DescriptorSet, vk::ImageView)>,
        fail: bool,
    }

    impl SamplerSetAllocator for FakeAllocator {
        fn allocate_sampler_set(
            &mut self,
            view: vk::ImageView,
            _sampler: vk::Sampler,
        ) -> RendererResult<vk::DescriptorSet> {
            if self.fail {
                return Err(vge_rhi::RhiError::VulkanError(
                    vk::Result::ERROR_OUT_OF_POOL_MEMORY,
                )
                .into());
            }
            self.next += 1;
            // Non-sequential raw values, so indices can't be confused with handles.
            let set = vk::DescriptorSet::from_raw(self.next * 0x100 + 7);
            self.bound_views.push((set, view));
            Ok(set)
        }
    }

    fn view(n: u64) -> vk::ImageView {
        vk::ImageView::from_raw(0xABC0 + n)
    }

    #[test]
    fn test_register_returns_sequential_indices() {
        let mut registry = TextureRegistry::new(FakeAllocator::default(), MAX_OBJECTS);
        let sampler = vk::Sampler::from_raw(1);

        let indices: Vec<usize> = (0..5)
            .map(|n| registry.register(view(n), sampler).unwrap())
            .collect();

        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_get_returns_set_bound_to_matching_view() {
        let mut registry = TextureRegistry::new(FakeAllocator::default(), MAX_OBJECTS);
        let sampler = vk::Sampler::from_raw(1);

        for n in 0..4 {
            registry.register(view(n), sampler).unwrap();
        }

        for (i, &(set, bound_view)) in registry.allocator.bound_views.iter().enumerate() {
            assert_eq!(registry.get(i), Some(set));
            assert_eq!(bound_view, view(i as u64));
        }
        assert_eq!(registry.get(4), None);
    }

    #[test]
    fn test_register_past_capacity_fails() {
        let mut registry = TextureRegistry::new(FakeAllocator::default(), 2);
        let sampler = vk::Sampler::from_raw(1);

        registry.register(view(0), sampler).unwrap();
        registry.register(view(1), sampler).unwrap();
        let err = registry.register(view(2), sampler).unwrap_err();

        assert!(matches!(err, RendererError::TextureLimit { limit: 2 }));
        assert_eq!(registry.len(), 2);
        // The allocator is never asked for a set it has no room for.
        assert_eq!(registry.allocator.bound_views.len(), 2);
    }

    #[test]
    fn test_failed_allocation_leaves_registry_unchanged() {
        let allocator = FakeAllocator {
            fail: true,
            ..Default::default()
        };
        let mut registry = TextureRegistry::new(allocator, MAX_OBJECTS);

        assert!(registry.register(view(0), vk::Sampler::null()).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capacity_matches_object_limit() {
        let registry = TextureRegistry::new(FakeAllocator::default(), MAX_OBJECTS);
        assert_eq!(registry.capacity(), 20);
    }
}
