//! Device-local images and their views.
//!
//! [`Image`] owns a 2D image, its allocation and a view over the whole image.
//! It backs the depth attachment and sampled textures. Textures are uploaded
//! through a staging buffer with two layout transitions around the copy.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::{find_memory_type, has_stencil_component};

/// Format of uploaded textures.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Creates a 2D view over mip 0 / layer 0 of `image`.
///
/// # Errors
///
/// Returns an error if view creation fails.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect_mask)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

/// Access masks and pipeline stages of a supported layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Returns the barrier masks for a layout transition.
///
/// Only the transitions used by texture upload are supported.
///
/// # Errors
///
/// Returns [`RhiError::InvalidHandle`] for any other pair of layouts.
pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(TransitionMasks {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(RhiError::InvalidHandle(format!(
            "Unsupported layout transition {:?} -> {:?}",
            old_layout, new_layout
        ))),
    }
}

/// Layout transitions of a texture upload, in recording order.
pub const TEXTURE_UPLOAD_TRANSITIONS: [(vk::ImageLayout, vk::ImageLayout); 2] = [
    (
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    ),
    (
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    ),
];

/// Resolves the masks of every texture upload transition.
///
/// # Errors
///
/// Returns an error if any transition in [`TEXTURE_UPLOAD_TRANSITIONS`] is
/// unsupported.
pub fn texture_upload_masks() -> RhiResult<[TransitionMasks; 2]> {
    let [(a_old, a_new), (b_old, b_new)] = TEXTURE_UPLOAD_TRANSITIONS;
    Ok([
        transition_masks(a_old, a_new)?,
        transition_masks(b_old, b_new)?,
    ])
}

/// Returns the aspect flags used for views and barriers of `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
        f if has_stencil_component(f) => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Records a layout transition barrier for a single-mip color image.
///
/// `masks` come from [`transition_masks`], resolved before recording starts.
pub fn record_barrier(
    cmd: &CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    masks: TransitionMasks,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
}

/// Expected byte length of a tightly packed RGBA8 image.
#[inline]
pub fn rgba8_byte_size(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// A device-local 2D image with one view.
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// View over the whole image.
    view: vk::ImageView,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Image format.
    format: vk::Format,
    /// Image extent.
    extent: vk::Extent2D,
}

impl Image {
    /// Creates a device-local, optimally tiled 2D image and its view.
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is empty, no device-local memory type
    /// matches, or any creation step fails.
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        name: &str,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Image extent must be non-zero, got {}x{}",
                extent.width, extent.height
            )));
        }

        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&create_info, None)? };

        let allocation = match Self::bind_memory(&device, image, name) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = match create_image_view(&device, image, format, aspect_for_format(format)) {
            Ok(view) => view,
            Err(e) => {
                if let Ok(mut allocator) = device.lock_allocator()
                    && let Err(free_err) = allocator.free(allocation)
                {
                    error!("Failed to free image allocation: {}", free_err);
                }
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        debug!(
            "Created {} image {}x{} ({:?})",
            name, extent.width, extent.height, format
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    fn bind_memory(device: &Device, image: vk::Image, name: &str) -> RhiResult<Allocation> {
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            device.memory_properties(),
        )?;

        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let bound = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            if let Err(free_err) = device.lock_allocator()?.free(allocation) {
                error!("Failed to free image allocation: {}", free_err);
            }
            return Err(e.into());
        }

        Ok(allocation)
    }

    /// Creates a sampled `R8G8B8A8_UNORM` texture from tightly packed pixels.
    ///
    /// The pixels go through a staging buffer. The image moves
    /// `UNDEFINED -> TRANSFER_DST_OPTIMAL`, receives the copy, then moves
    /// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL`, all in one
    /// one-time command buffer that is waited on before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if `rgba.len() != width * height * 4` or if any
    /// creation, copy or submission step fails.
    pub fn new_texture(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RhiResult<Self> {
        let expected = rgba8_byte_size(width, height);
        if rgba.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                rgba.len(),
                expected,
                width,
                height
            )));
        }

        // Resolved before recording so a bad pair never reaches the queue.
        let [to_transfer, to_shader] = texture_upload_masks()?;
        let [(undefined, transfer_dst), (_, shader_read)] = TEXTURE_UPLOAD_TRANSITIONS;

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, rgba)?;
        let texture = Self::new(
            device,
            vk::Extent2D { width, height },
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            "texture",
        )?;

        pool.one_time_submit(|cmd| {
            record_barrier(cmd, texture.image, undefined, transfer_dst, to_transfer);

            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(
                    vk::ImageSubresourceLayers::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .mip_level(0)
                        .base_array_layer(0)
                        .layer_count(1),
                )
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width,
                    height,
                    depth: 1,
                });
            cmd.copy_buffer_to_image(
                staging.handle(),
                texture.image,
                transfer_dst,
                &[region],
            );

            record_barrier(cmd, texture.image, transfer_dst, shader_read, to_shader);
        })?;

        debug!("Uploaded texture {}x{}", width, height);
        Ok(texture)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking image memory: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }

        debug!(
            "Destroyed image {}x{} ({:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_upload_transitions() {
        let to_transfer = transition_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_transfer.src_access, vk::AccessFlags::empty());
        assert_eq!(to_transfer.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_transfer.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_transfer.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let to_shader = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_shader.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_shader.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(to_shader.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_texture_upload_masks_resolve_before_recording() {
        let masks = texture_upload_masks().unwrap();
        for ((old, new), resolved) in TEXTURE_UPLOAD_TRANSITIONS.into_iter().zip(masks) {
            assert_eq!(transition_masks(old, new).unwrap(), resolved);
        }
        // Each transition starts where the previous one ended.
        assert_eq!(TEXTURE_UPLOAD_TRANSITIONS[0].0, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            TEXTURE_UPLOAD_TRANSITIONS[0].1,
            TEXTURE_UPLOAD_TRANSITIONS[1].0
        );
        assert_eq!(
            TEXTURE_UPLOAD_TRANSITIONS[1].1,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn test_unsupported_transition() {
        let result = transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(matches!(result, Err(RhiError::InvalidHandle(_))));
    }

    #[test]
    fn test_aspect_for_format() {
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_rgba8_byte_size() {
        assert_eq!(rgba8_byte_size(4, 2), 32);
        assert_eq!(rgba8_byte_size(0, 16), 0);
        assert_eq!(rgba8_byte_size(512, 512), 1_048_576);
    }

    #[test]
    fn test_image_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Image>();
    }
}
