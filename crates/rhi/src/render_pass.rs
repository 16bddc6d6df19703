//! Render pass and framebuffers.
//!
//! The renderer uses one render pass with a single subpass: a color
//! attachment that ends up presentable and an optional depth attachment
//! whose contents are discarded after the pass.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vge_rhi::device::Device;
//! use vge_rhi::render_pass::{Framebuffer, RenderPass};
//!
//! # fn example(device: Arc<Device>, view: vk::ImageView, depth_view: vk::ImageView) -> Result<(), vge_rhi::RhiError> {
//! let render_pass = RenderPass::new(
//!     device.clone(),
//!     vk::Format::B8G8R8A8_SRGB,
//!     Some(vk::Format::D32_SFLOAT),
//! )?;
//!
//! let extent = vk::Extent2D { width: 800, height: 600 };
//! let framebuffer = Framebuffer::new(device, &render_pass, &[view, depth_view], extent)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Color attachment: cleared, stored, and handed to the presentation engine.
pub fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
}

/// Depth attachment: cleared each pass, never read back.
pub fn depth_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
}

/// The two external dependencies around subpass 0.
///
/// The first orders the pass after the presentation engine has finished
/// reading the image; the second makes the color writes visible before the
/// image is handed back for presentation.
///
/// With depth, the first also waits for the previous frame's depth writes:
/// every frame in flight shares one depth image, and this pass clears it.
pub fn subpass_dependencies(has_depth: bool) -> [vk::SubpassDependency; 2] {
    let mut src_stage = vk::PipelineStageFlags::BOTTOM_OF_PIPE;
    let mut src_access = vk::AccessFlags::MEMORY_READ;
    let mut dst_stage = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT;
    let mut dst_access =
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;
    if has_depth {
        let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        src_stage |= depth_stages;
        src_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
        dst_stage |= depth_stages;
        dst_access |= vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE;
    }

    let into_pass = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access);

    let out_of_pass = vk::SubpassDependency::default()
        .src_subpass(0)
        .dst_subpass(vk::SUBPASS_EXTERNAL)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        )
        .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
        .dst_access_mask(vk::AccessFlags::MEMORY_READ);

    [into_pass, out_of_pass]
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
    /// Format of attachment 0.
    color_format: vk::Format,
    /// Format of attachment 1, if present.
    depth_format: Option<vk::Format>,
}

impl RenderPass {
    /// Creates a single-subpass render pass.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `color_format` - Swapchain image format
    /// * `depth_format` - Depth attachment format, `None` for a color-only pass
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
    ) -> RhiResult<Self> {
        let mut attachments = vec![color_attachment(color_format)];
        if let Some(format) = depth_format {
            attachments.push(depth_attachment(format));
        }

        let color_refs = [vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)];
        let depth_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let subpasses = [subpass];
        let dependencies = subpass_dependencies(depth_format.is_some());

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Created render pass: color={:?}, depth={:?}",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            color_format,
            depth_format,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the color attachment format.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Returns the depth attachment format, if the pass has one.
    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.depth_format
    }

    /// Number of attachments every framebuffer must provide.
    #[inline]
    pub fn attachment_count(&self) -> usize {
        1 + usize::from(self.depth_format.is_some())
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

/// Vulkan framebuffer wrapper.
pub struct Framebuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan framebuffer handle.
    framebuffer: vk::Framebuffer,
    /// Size of every attachment.
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer for `render_pass` from `attachments`, in
    /// attachment order (color view first, then depth view).
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the number of views does not
    /// match the render pass, or a Vulkan error if creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if attachments.len() != render_pass.attachment_count() {
            return Err(RhiError::InvalidHandle(format!(
                "Render pass expects {} attachment(s), got {}",
                render_pass.attachment_count(),
                attachments.len()
            )));
        }

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        debug!(
            "Created framebuffer {}x{}",
            extent.width, extent.height
        );

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the framebuffer extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Destroyed framebuffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_is_presentable() {
        let attachment = color_attachment(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(attachment.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn test_depth_attachment_is_discarded() {
        let attachment = depth_attachment(vk::Format::D32_SFLOAT);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            attachment.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );
    }

    #[test]
    fn test_dependencies_without_depth() {
        let [into_pass, out_of_pass] = subpass_dependencies(false);

        assert_eq!(into_pass.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(into_pass.dst_subpass, 0);
        assert_eq!(into_pass.src_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
        assert_eq!(into_pass.src_access_mask, vk::AccessFlags::MEMORY_READ);
        assert_eq!(
            into_pass.dst_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert!(
            !into_pass
                .dst_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );

        assert_eq!(out_of_pass.src_subpass, 0);
        assert_eq!(out_of_pass.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(
            out_of_pass.src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(
            out_of_pass.dst_stage_mask,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE
        );
        assert_eq!(out_of_pass.dst_access_mask, vk::AccessFlags::MEMORY_READ);
    }

    #[test]
    fn test_dependencies_with_depth() {
        let [into_pass, out_of_pass] = subpass_dependencies(true);

        // The shared depth image is cleared only after the previous frame's
        // depth writes are done.
        let depth_stages = vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
            | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
        assert!(into_pass.src_stage_mask.contains(depth_stages));
        assert!(
            into_pass
                .src_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
        assert!(into_pass.dst_stage_mask.contains(depth_stages));
        assert!(
            into_pass
                .dst_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ)
        );

        assert!(
            into_pass
                .dst_stage_mask
                .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        );
        assert!(
            into_pass
                .dst_access_mask
                .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        );
        assert!(
            into_pass
                .dst_access_mask
                .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        );
        assert!(
            !out_of_pass
                .src_stage_mask
                .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS)
        );
    }

    #[test]
    fn test_render_pass_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderPass>();
        assert_send_sync::<Framebuffer>();
    }
}
