//! Graphics pipeline management.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout for descriptor set and push constant configuration
//! - [`Pipeline`] wraps a graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] assembles the fixed-function state for a render pass
//!
//! Viewport and scissor are baked into the pipeline, so the pipeline is
//! rebuilt whenever the swapchain extent changes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ash::vk;
//! use vge_rhi::device::Device;
//! use vge_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use vge_rhi::render_pass::RenderPass;
//! use vge_rhi::shader::{Shader, ShaderStage};
//! use vge_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, render_pass: &RenderPass) -> Result<(), vge_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/shader.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let fragment_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("shaders/shader.frag.spv"),
//!     ShaderStage::Fragment,
//!     "main",
//! )?;
//!
//! let push_range = vk::PushConstantRange {
//!     stage_flags: vk::ShaderStageFlags::VERTEX,
//!     offset: 0,
//!     size: 64,
//! };
//! let layout = PipelineLayout::new(device.clone(), &[], &[push_range])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vertex_shader)
//!     .fragment_shader(&fragment_shader)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .render_pass(render_pass, 0)
//!     .extent(vk::Extent2D { width: 800, height: 600 })
//!     .build(device.clone(), &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

/// Vulkan pipeline layout wrapper.
///
/// Describes the descriptor set layouts (by set number, in order) and push
/// constant ranges a pipeline may access.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts; index `i` becomes set `i`
    /// * `push_constant_ranges` - Slice of push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
    /// Extent the viewport and scissor were baked with.
    extent: vk::Extent2D,
}

impl Pipeline {
    fn create_graphics_internal(
        device: Arc<Device>,
        create_info: &vk::GraphicsPipelineCreateInfo,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[*create_info], None)
                .map_err(|(_, result)| result)?
        };

        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created ({}x{})",
            extent.width, extent.height
        );

        Ok(Self {
            device,
            pipeline,
            extent,
        })
    }

    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Returns the extent the viewport and scissor were built for.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// Do not cull any faces.
    None,
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    #[default]
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    /// Counter-clockwise winding is front-facing.
    #[default]
    CounterClockwise,
    /// Clockwise winding is front-facing.
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    /// Passes if less than.
    #[default]
    Less,
    /// Passes if less than or equal.
    LessOrEqual,
    /// Always passes.
    Always,
}

impl CompareOp {
    /// Converts to Vulkan compare op.
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Color blend attachment configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorBlendAttachment {
    /// Enable blending for this attachment.
    pub blend_enable: bool,
    pub src_color_blend_factor: vk::BlendFactor,
    pub dst_color_blend_factor: vk::BlendFactor,
    pub src_alpha_blend_factor: vk::BlendFactor,
    pub dst_alpha_blend_factor: vk::BlendFactor,
}

impl Default for ColorBlendAttachment {
    /// Blending disabled: the new color replaces the old one.
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_color_blend_factor: vk::BlendFactor::ONE,
            dst_color_blend_factor: vk::BlendFactor::ZERO,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        }
    }
}

impl ColorBlendAttachment {
    /// Standard alpha blending.
    ///
    /// Color: `src_alpha * new + (1 - src_alpha) * old`.
    /// Alpha: `1 * new + 0 * old`, so the new alpha replaces the old one.
    pub fn alpha_blend() -> Self {
        Self {
            blend_enable: true,
            src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
            dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
            src_alpha_blend_factor: vk::BlendFactor::ONE,
            dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        }
    }

    /// Converts to Vulkan pipeline color blend attachment state.
    pub fn to_vk(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState {
            blend_enable: self.blend_enable.into(),
            src_color_blend_factor: self.src_color_blend_factor,
            dst_color_blend_factor: self.dst_color_blend_factor,
            color_blend_op: vk::BlendOp::ADD,
            src_alpha_blend_factor: self.src_alpha_blend_factor,
            dst_alpha_blend_factor: self.dst_alpha_blend_factor,
            alpha_blend_op: vk::BlendOp::ADD,
            color_write_mask: vk::ColorComponentFlags::RGBA,
        }
    }
}

/// Full-extent viewport with depth range [0, 1].
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor covering the whole extent.
pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Builder for the graphics pipeline.
///
/// Defaults:
///
/// - Primitive topology: Triangle list
/// - Polygon mode: Fill
/// - Cull mode: Back-face culling
/// - Front face: Counter-clockwise
/// - Depth test and write: Enabled when the render pass has a depth attachment
/// - Depth compare op: Less
/// - Color blending: [`ColorBlendAttachment::alpha_blend`]
/// - Multisampling: 1 sample (no MSAA)
/// - Viewport and scissor: fixed, covering [`extent`](Self::extent)
pub struct GraphicsPipelineBuilder<'a> {
    // Shader stages
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,

    // Vertex input state
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    // Rasterization state
    cull_mode: CullMode,
    front_face: FrontFace,

    // Depth state
    depth_test_enable: bool,
    depth_write_enable: bool,
    depth_compare_op: CompareOp,

    // Color blend state
    color_blend_attachment: ColorBlendAttachment,

    // Render pass compatibility
    render_pass: vk::RenderPass,
    subpass: u32,
    has_depth_attachment: bool,

    // Fixed viewport
    extent: vk::Extent2D,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a new graphics pipeline builder with default settings.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,

            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),

            cull_mode: CullMode::Back,
            front_face: FrontFace::CounterClockwise,

            depth_test_enable: true,
            depth_write_enable: true,
            depth_compare_op: CompareOp::Less,

            color_blend_attachment: ColorBlendAttachment::alpha_blend(),

            render_pass: vk::RenderPass::null(),
            subpass: 0,
            has_depth_attachment: false,

            extent: vk::Extent2D::default(),
        }
    }

    /// Sets the vertex shader. Required.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader. Required.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex input attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    /// Sets the face culling mode.
    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    /// Sets the front face winding order.
    pub fn front_face(mut self, face: FrontFace) -> Self {
        self.front_face = face;
        self
    }

    /// Enables or disables depth testing.
    pub fn depth_test_enable(mut self, enable: bool) -> Self {
        self.depth_test_enable = enable;
        self
    }

    /// Enables or disables depth writing.
    pub fn depth_write_enable(mut self, enable: bool) -> Self {
        self.depth_write_enable = enable;
        self
    }

    /// Sets the depth comparison operation.
    pub fn depth_compare_op(mut self, op: CompareOp) -> Self {
        self.depth_compare_op = op;
        self
    }

    /// Replaces the color blend attachment configuration.
    pub fn color_blend_attachment(mut self, attachment: ColorBlendAttachment) -> Self {
        self.color_blend_attachment = attachment;
        self
    }

    /// Sets the render pass and subpass the pipeline will be used in. Required.
    pub fn render_pass(mut self, render_pass: &RenderPass, subpass: u32) -> Self {
        self.render_pass = render_pass.handle();
        self.subpass = subpass;
        self.has_depth_attachment = render_pass.depth_format().is_some();
        self
    }

    /// Sets the extent of the fixed viewport and scissor. Required.
    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    /// Whether depth testing ends up enabled in the built pipeline.
    #[inline]
    pub fn effective_depth_test(&self) -> bool {
        self.has_depth_attachment && self.depth_test_enable
    }

    /// Checks that every required piece of state has been provided.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] naming the first missing piece.
    pub fn validate(&self) -> RhiResult<()> {
        if self.vertex_shader.is_none() {
            return Err(RhiError::PipelineError(
                "Vertex shader is required".to_string(),
            ));
        }
        if self.fragment_shader.is_none() {
            return Err(RhiError::PipelineError(
                "Fragment shader is required".to_string(),
            ));
        }
        if self.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(
                "Render pass is required".to_string(),
            ));
        }
        if self.extent.width == 0 || self.extent.height == 0 {
            return Err(RhiError::PipelineError(format!(
                "Viewport extent must be non-zero, got {}x{}",
                self.extent.width, self.extent.height
            )));
        }
        Ok(())
    }

    /// Builds the graphics pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A shader, the render pass or the extent is missing
    /// - Pipeline creation fails
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        self.validate()?;

        let (Some(vertex_shader), Some(fragment_shader)) =
            (self.vertex_shader, self.fragment_shader)
        else {
            return Err(RhiError::PipelineError(
                "Vertex and fragment shaders are required".to_string(),
            ));
        };

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport state (fixed)
        let viewports = [viewport_for(self.extent)];
        let scissors = [scissor_for(self.extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_test = self.effective_depth_test();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_test && self.depth_write_enable)
            .depth_compare_op(self.depth_compare_op.to_vk())
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachments = [self.color_blend_attachment.to_vk()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(layout.handle())
            .render_pass(self.render_pass)
            .subpass(self.subpass)
            .base_pipeline_index(-1);

        Pipeline::create_graphics_internal(device, &pipeline_info, self.extent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Less.to_vk(), vk::CompareOp::LESS);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(CompareOp::Always.to_vk(), vk::CompareOp::ALWAYS);
    }

    #[test]
    fn test_color_blend_attachment_default() {
        let attachment = ColorBlendAttachment::default();
        assert!(!attachment.blend_enable);
        assert_eq!(attachment.to_vk().blend_enable, vk::FALSE);
    }

    #[test]
    fn test_color_blend_attachment_alpha_blend() {
        let state = ColorBlendAttachment::alpha_blend().to_vk();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.color_blend_op, vk::BlendOp::ADD);
        assert_eq!(state.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.alpha_blend_op, vk::BlendOp::ADD);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        let viewport = viewport_for(extent);
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = scissor_for(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_graphics_pipeline_builder_default() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::CounterClockwise);
        assert_eq!(builder.depth_compare_op, CompareOp::Less);
        assert_eq!(
            builder.color_blend_attachment,
            ColorBlendAttachment::alpha_blend()
        );
        assert!(builder.vertex_bindings.is_empty());
    }

    #[test]
    fn test_depth_test_requires_depth_attachment() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(!builder.effective_depth_test());

        let mut builder = GraphicsPipelineBuilder::new();
        builder.has_depth_attachment = true;
        assert!(builder.effective_depth_test());

        let builder = builder.depth_test_enable(false);
        assert!(!builder.effective_depth_test());
    }

    #[test]
    fn test_validate_reports_missing_shader() {
        let builder = GraphicsPipelineBuilder::new().extent(vk::Extent2D {
            width: 800,
            height: 600,
        });
        let error = builder.validate().unwrap_err();
        assert!(error.to_string().contains("Vertex shader"));
    }

    #[test]
    fn test_pipeline_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Pipeline>();
        assert_send_sync::<PipelineLayout>();
    }
}
