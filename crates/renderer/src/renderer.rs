//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct, which owns every Vulkan
//! resource of the application and drives the per-frame protocol:
//!
//! ```text
//! wait slot fence -> acquire image -> image guard -> reset fence
//!     -> update uniforms -> record -> submit -> present -> advance slot
//! ```
//!
//! # Example
//!
//! ```no_run
//! use glam::{Mat4, Vec2, Vec3};
//! use vge_core::EngineConfig;
//! use vge_platform::Window;
//! use vge_renderer::{Renderer, Vertex};
//!
//! # fn example(window: &Window) -> vge_renderer::RendererResult<()> {
//! let config = EngineConfig::default();
//! let mut renderer = Renderer::new(window, &config)?;
//!
//! let texture = renderer.add_texture(&config.assets.texture_path(&config.assets.texture))?;
//! let quad = [
//!     Vertex::new(Vec3::new(-0.4, 0.4, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec2::new(1.0, 1.0)),
//!     Vertex::new(Vec3::new(-0.4, -0.4, 0.0), Vec3::new(0.0, 1.0, 0.0), Vec2::new(1.0, 0.0)),
//!     Vertex::new(Vec3::new(0.4, -0.4, 0.0), Vec3::new(0.0, 0.0, 1.0), Vec2::new(0.0, 0.0)),
//!     Vertex::new(Vec3::new(0.4, 0.4, 0.0), Vec3::new(1.0, 1.0, 0.0), Vec2::new(0.0, 1.0)),
//! ];
//! let mesh = renderer.add_mesh(&quad, &[0, 1, 2, 2, 3, 0], texture)?;
//!
//! renderer.update_model(mesh, Mat4::from_rotation_z(0.5));
//! renderer.draw()?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::{debug, error, info, warn};

use vge_core::EngineConfig;
use vge_platform::{Surface, Window, aspect_ratio};
use vge_resources::load_texture;
use vge_rhi::RhiError;
use vge_rhi::command::{CommandBuffer, CommandPool};
use vge_rhi::descriptor::DescriptorSetLayout;
use vge_rhi::device::Device;
use vge_rhi::image::Image;
use vge_rhi::instance::Instance;
use vge_rhi::memory::find_depth_format;
use vge_rhi::physical_device::select_physical_device;
use vge_rhi::pipeline::{
    ColorBlendAttachment, CompareOp, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline,
    PipelineLayout,
};
use vge_rhi::render_pass::{Framebuffer, RenderPass};
use vge_rhi::sampler::{DEFAULT_MAX_ANISOTROPY, Sampler};
use vge_rhi::shader::{Shader, ShaderStage};
use vge_rhi::swapchain::{Swapchain, SwapchainConfig};
use vge_rhi::vertex::Vertex;

use crate::error::{RendererError, RendererResult};
use crate::frame_manager::{Acquired, FrameManager};
use crate::mesh::Mesh;
use crate::model_strategy::{ModelTransformStrategy, create_strategy};
use crate::textures::{DescriptorSamplerAllocator, TextureRegistry, texture_layout};
use crate::ubo::ViewProjection;
use crate::uniforms::{UniformSet, view_projection_layout};
use crate::{MAX_FRAMES_IN_FLIGHT, MAX_OBJECTS};

/// Shader entry point used by both stages.
const SHADER_ENTRY: &str = "main";

/// Depth clear value: the far plane.
const CLEAR_DEPTH: f32 = 1.0;

/// Clear values for the color and depth attachments, in attachment order.
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: CLEAR_DEPTH,
                stencil: 0,
            },
        },
    ]
}

/// One step of renderer teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownStep {
    WaitIdle,
    CommandBuffers,
    FrameSync,
    Meshes,
    ModelStrategy,
    Textures,
    Uniforms,
    Pipeline,
    PipelineLayout,
    DescriptorLayouts,
    Shaders,
    Sampler,
    Framebuffers,
    DepthBuffer,
    RenderPass,
    CommandPool,
    Swapchain,
    Device,
    Surface,
    Instance,
}

/// Teardown order, executed once by `Drop`.
///
/// Nothing is destroyed before the device is idle. Every object is released
/// before the object it was created from, ending with device, surface and
/// instance.
pub(crate) const SHUTDOWN_ORDER: [ShutdownStep; 20] = [
    ShutdownStep::WaitIdle,
    ShutdownStep::CommandBuffers,
    ShutdownStep::FrameSync,
    ShutdownStep::Meshes,
    ShutdownStep::ModelStrategy,
    ShutdownStep::Textures,
    ShutdownStep::Uniforms,
    ShutdownStep::Pipeline,
    ShutdownStep::PipelineLayout,
    ShutdownStep::DescriptorLayouts,
    ShutdownStep::Shaders,
    ShutdownStep::Sampler,
    ShutdownStep::Framebuffers,
    ShutdownStep::DepthBuffer,
    ShutdownStep::RenderPass,
    ShutdownStep::CommandPool,
    ShutdownStep::Swapchain,
    ShutdownStep::Device,
    ShutdownStep::Surface,
    ShutdownStep::Instance,
];

/// Dispatches every teardown step to `release`, in `SHUTDOWN_ORDER`.
pub(crate) fn run_shutdown(mut release: impl FnMut(ShutdownStep)) {
    for step in SHUTDOWN_ORDER {
        release(step);
    }
}

/// Command buffer recorded for `image_index`.
fn command_buffer_for(
    command_buffers: &[CommandBuffer],
    image_index: u32,
) -> RendererResult<&CommandBuffer> {
    command_buffers.get(image_index as usize).ok_or_else(|| {
        RhiError::InvalidHandle(format!(
            "No command buffer for swapchain image {}",
            image_index
        ))
        .into()
    })
}

/// Swaps a new resource into a `ManuallyDrop` slot, dropping the old one.
fn replace_resource<T>(slot: &mut ManuallyDrop<T>, value: T) {
    drop(ManuallyDrop::into_inner(std::mem::replace(
        slot,
        ManuallyDrop::new(value),
    )));
}

/// Owner of all GPU state and driver of the frame loop.
///
/// # Resource Destruction Order
///
/// Vulkan objects must be destroyed after the GPU stops using them and
/// before the objects they were created from. `Drop` waits for the device to
/// go idle and then walks a fixed shutdown order; `ManuallyDrop` fields make that
/// order explicit instead of relying on field declaration order.
pub struct Renderer {
    // Core Vulkan objects
    /// Vulkan instance (destroyed last).
    instance: ManuallyDrop<Instance>,
    /// Logical device, shared by every wrapper below.
    device: ManuallyDrop<Arc<Device>>,
    /// Window surface (destroyed after the device, before the instance).
    surface: ManuallyDrop<Surface>,
    /// Swapchain images and views.
    swapchain: ManuallyDrop<Swapchain>,
    /// Pool for per-image command buffers and one-time uploads.
    command_pool: ManuallyDrop<CommandPool>,

    // Swapchain-dependent resources
    /// Depth attachment shared by every framebuffer.
    depth_image: ManuallyDrop<Image>,
    /// Color + depth render pass.
    render_pass: ManuallyDrop<RenderPass>,
    /// One framebuffer per swapchain image.
    framebuffers: Vec<Framebuffer>,
    /// Graphics pipeline with a fixed viewport matching the swapchain.
    pipeline: ManuallyDrop<Pipeline>,
    /// View/projection uniforms, one per swapchain image.
    uniforms: ManuallyDrop<UniformSet>,
    /// One command buffer per swapchain image.
    command_buffers: Vec<CommandBuffer>,

    // Pipeline inputs that survive swapchain recreation
    vertex_shader: ManuallyDrop<Shader>,
    fragment_shader: ManuallyDrop<Shader>,
    /// Set 0 layout.
    view_projection_layout: ManuallyDrop<DescriptorSetLayout>,
    /// Set 1 layout.
    texture_layout: ManuallyDrop<DescriptorSetLayout>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    /// How model matrices reach the vertex shader.
    model_strategy: ManuallyDrop<Box<dyn ModelTransformStrategy>>,

    // Scene resources
    /// Sampler shared by every texture.
    sampler: ManuallyDrop<Sampler>,
    /// Uploaded texture images, indexed like the registry.
    textures: Vec<Image>,
    /// Sampler descriptor set per texture.
    texture_registry: ManuallyDrop<TextureRegistry<DescriptorSamplerAllocator>>,
    /// Drawn in insertion order.
    meshes: Vec<Mesh>,

    // Frame state
    /// Frame slots and the image guard.
    frames: ManuallyDrop<FrameManager>,
    /// Camera matrices, recomputed when the swapchain extent changes.
    view_projection: ViewProjection,
    /// Color attachment clear value.
    clear_color: [f32; 4],
    /// Size and present mode requested for the next swapchain build.
    swapchain_config: SwapchainConfig,
    /// Flag indicating the swapchain needs recreation.
    framebuffer_resized: bool,
}

impl Renderer {
    /// Creates a renderer for the given window.
    ///
    /// Builds the instance, surface, device, swapchain, depth buffer, render
    /// pass, framebuffers, pipeline, uniforms, sampler and frame slots. No
    /// meshes or textures exist yet; add them with [`add_texture`] and
    /// [`add_mesh`].
    ///
    /// [`add_texture`]: Self::add_texture
    /// [`add_mesh`]: Self::add_mesh
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails, a shader file is
    /// missing, or no suitable GPU is found.
    pub fn new(window: &Window, config: &EngineConfig) -> RendererResult<Self> {
        let render_config = &config.render;
        let swapchain_config = SwapchainConfig {
            width: window.width(),
            height: window.height(),
            prefer_mailbox: render_config.prefer_mailbox,
        };

        info!(
            "Initializing Vulkan renderer ({}x{})",
            swapchain_config.width, swapchain_config.height
        );

        let app_name = CString::new(window.title()).unwrap_or_else(|_| c"vge".to_owned());
        let extensions = window.required_extensions()?;
        let instance = Instance::new(&app_name, &extensions, render_config.enable_validation)?;
        debug!("Validation messenger active: {}", instance.has_validation());

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            render_config.allow_device_fallback,
        )?;
        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            swapchain_config,
        )?;
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let graphics_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::InvalidHandle("device has no graphics queue family".to_string())
        })?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let depth_format = find_depth_format(instance.handle(), device.physical_device())?;
        debug!("Using depth format {:?}", depth_format);
        let depth_image = Self::create_depth_image(device.clone(), extent, depth_format)?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), Some(depth_format))?;
        let framebuffers =
            Self::create_framebuffers(&device, &render_pass, &swapchain, &depth_image)?;

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.vertex_shader_path(),
            ShaderStage::Vertex,
            SHADER_ENTRY,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.assets.fragment_shader_path(),
            ShaderStage::Fragment,
            SHADER_ENTRY,
        )?;

        let view_projection_layout = view_projection_layout(device.clone())?;
        let texture_layout = texture_layout(device.clone())?;
        let model_strategy =
            create_strategy(render_config.model_transfer, device.clone(), image_count)?;
        info!("Model transfer: {:?}", render_config.model_transfer);

        let pipeline_layout = Self::create_pipeline_layout(
            device.clone(),
            &view_projection_layout,
            &texture_layout,
            model_strategy.as_ref(),
        )?;
        let pipeline = Self::create_pipeline(
            device.clone(),
            &vertex_shader,
            &fragment_shader,
            &render_pass,
            &pipeline_layout,
            extent,
        )?;

        let uniforms = UniformSet::new(device.clone(), &view_projection_layout, image_count)?;

        let sampler = Sampler::new(device.clone(), DEFAULT_MAX_ANISOTROPY)?;
        let texture_registry = TextureRegistry::new(
            DescriptorSamplerAllocator::new(device.clone(), &texture_layout, MAX_OBJECTS)?,
            MAX_OBJECTS,
        );

        let command_buffers = command_pool.allocate_command_buffers(image_count as u32)?;
        let frames = FrameManager::new(device.clone(), image_count)?;

        info!(
            "Renderer initialized: {} swapchain images, {} frames in flight",
            image_count, MAX_FRAMES_IN_FLIGHT
        );

        Ok(Self {
            instance: ManuallyDrop::new(instance),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            swapchain: ManuallyDrop::new(swapchain),
            command_pool: ManuallyDrop::new(command_pool),
            depth_image: ManuallyDrop::new(depth_image),
            render_pass: ManuallyDrop::new(render_pass),
            framebuffers,
            pipeline: ManuallyDrop::new(pipeline),
            uniforms: ManuallyDrop::new(uniforms),
            command_buffers,
            vertex_shader: ManuallyDrop::new(vertex_shader),
            fragment_shader: ManuallyDrop::new(fragment_shader),
            view_projection_layout: ManuallyDrop::new(view_projection_layout),
            texture_layout: ManuallyDrop::new(texture_layout),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            model_strategy: ManuallyDrop::new(model_strategy),
            sampler: ManuallyDrop::new(sampler),
            textures: Vec::new(),
            texture_registry: ManuallyDrop::new(texture_registry),
            meshes: Vec::new(),
            frames: ManuallyDrop::new(frames),
            view_projection: ViewProjection::for_aspect(aspect_ratio(extent.width, extent.height)),
            clear_color: render_config.clear_color,
            swapchain_config,
            framebuffer_resized: false,
        })
    }

    fn create_depth_image(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RendererResult<Image> {
        Ok(Image::new(
            device,
            extent,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth",
        )?)
    }

    fn create_framebuffers(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_image: &Image,
    ) -> RendererResult<Vec<Framebuffer>> {
        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                Framebuffer::new(
                    device.clone(),
                    render_pass,
                    &[view, depth_image.view()],
                    swapchain.extent(),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Created {} framebuffers", framebuffers.len());
        Ok(framebuffers)
    }

    fn create_pipeline_layout(
        device: Arc<Device>,
        view_projection_layout: &DescriptorSetLayout,
        texture_layout: &DescriptorSetLayout,
        strategy: &dyn ModelTransformStrategy,
    ) -> RendererResult<PipelineLayout> {
        let mut set_layouts = vec![view_projection_layout.handle(), texture_layout.handle()];
        set_layouts.extend(strategy.set_layout());

        Ok(PipelineLayout::new(
            device,
            &set_layouts,
            &strategy.push_constant_ranges(),
        )?)
    }

    fn create_pipeline(
        device: Arc<Device>,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        render_pass: &RenderPass,
        layout: &PipelineLayout,
        extent: vk::Extent2D,
    ) -> RendererResult<Pipeline> {
        let attributes = Vertex::attribute_descriptions();

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(vertex_shader)
            .fragment_shader(fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&attributes)
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(CompareOp::Less)
            .color_blend_attachment(ColorBlendAttachment::alpha_blend())
            .render_pass(render_pass, 0)
            .extent(extent)
            .build(device, layout)?;

        Ok(pipeline)
    }

    // =========================================================================
    // Scene
    // =========================================================================

    /// Loads an image file, uploads it as a sampled texture and registers a
    /// descriptor set for it.
    ///
    /// Returns the texture index to pass to [`add_mesh`](Self::add_mesh).
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Resource`] if the file cannot be decoded,
    /// [`RendererError::TextureLimit`] once [`MAX_OBJECTS`] textures exist, or
    /// an error if the upload fails.
    pub fn add_texture(&mut self, path: &Path) -> RendererResult<usize> {
        if self.texture_registry.len() >= self.texture_registry.capacity() {
            return Err(RendererError::TextureLimit {
                limit: self.texture_registry.capacity(),
            });
        }

        let data = load_texture(path)?;
        let image = Image::new_texture(
            Arc::clone(&self.device),
            &self.command_pool,
            data.width,
            data.height,
            &data.pixels,
        )?;

        let index = self
            .texture_registry
            .register(image.view(), self.sampler.handle())?;
        self.textures.push(image);

        info!(
            "Texture {} loaded from {:?} ({}x{})",
            index, path, data.width, data.height
        );
        Ok(index)
    }

    /// Uploads a mesh drawn with texture `texture`.
    ///
    /// Returns the mesh index to pass to [`update_model`](Self::update_model).
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::MeshLimit`] once [`MAX_OBJECTS`] meshes exist,
    /// [`RendererError::UnknownTexture`] for an unregistered texture,
    /// [`RendererError::InvalidMesh`] for unusable geometry, or an error if
    /// the upload fails.
    pub fn add_mesh(
        &mut self,
        vertices: &[Vertex],
        indices: &[u32],
        texture: usize,
    ) -> RendererResult<usize> {
        if self.meshes.len() >= MAX_OBJECTS {
            return Err(RendererError::MeshLimit { limit: MAX_OBJECTS });
        }
        if texture >= self.texture_registry.len() {
            return Err(RendererError::UnknownTexture {
                index: texture,
                count: self.texture_registry.len(),
            });
        }

        let mesh = Mesh::new(
            Arc::clone(&self.device),
            &self.command_pool,
            vertices,
            indices,
            texture,
        )?;
        self.meshes.push(mesh);

        Ok(self.meshes.len() - 1)
    }

    /// Sets the model matrix of mesh `index`.
    ///
    /// An index with no mesh is ignored.
    pub fn update_model(&mut self, index: usize, model: Mat4) {
        if let Some(mesh) = self.meshes.get_mut(index) {
            mesh.set_model(model);
        }
    }

    /// Notes a new framebuffer size; the swapchain is rebuilt before the next
    /// frame.
    ///
    /// A zero-sized (minimized) window pauses drawing until a real size
    /// arrives.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.swapchain_config.width && height == self.swapchain_config.height {
            return;
        }

        debug!(
            "Resize requested: {}x{} -> {}x{}",
            self.swapchain_config.width, self.swapchain_config.height, width, height
        );
        self.swapchain_config.width = width;
        self.swapchain_config.height = height;
        self.framebuffer_resized = true;
    }

    // =========================================================================
    // Frame
    // =========================================================================

    /// Renders and presents one frame.
    ///
    /// An out-of-date swapchain is rebuilt and the frame skipped; a
    /// suboptimal present or a pending resize rebuilds it after presenting.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting, recording, submission or a non-stale
    /// present fails. These are fatal.
    pub fn draw(&mut self) -> RendererResult<()> {
        if self.is_minimized() {
            return Ok(());
        }

        if self.framebuffer_resized {
            debug!("Resize pending, recreating swapchain before acquire");
            self.recreate_swapchain()?;
        }

        self.frames.wait_for_frame()?;

        let image_index = match self.frames.acquire_next_image(&self.swapchain)? {
            Acquired::Image(index) => index,
            Acquired::OutOfDate => {
                self.recreate_swapchain()?;
                return Ok(());
            }
        };

        self.frames.guard_image(image_index)?;

        // A submit is certain from here on, so the fence can be reset.
        self.frames.begin_submission()?;

        self.uniforms.update(image_index, &self.view_projection)?;
        let models: Vec<Mat4> = self.meshes.iter().map(Mesh::model).collect();
        self.model_strategy.upload(image_index, &models)?;

        self.record_commands(image_index)?;

        let command_buffer = command_buffer_for(&self.command_buffers, image_index)?;
        self.frames.submit(command_buffer)?;

        let needs_recreate = self.frames.present(&self.swapchain, image_index)?;
        self.frames.next_frame();

        if needs_recreate || self.framebuffer_resized {
            debug!("Swapchain needs recreation after present");
            self.recreate_swapchain()?;
        }

        Ok(())
    }

    /// Records the draw commands for `image_index` into its command buffer.
    fn record_commands(&self, image_index: u32) -> RendererResult<()> {
        let cmd = command_buffer_for(&self.command_buffers, image_index)?;
        let framebuffer = self.framebuffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No framebuffer for swapchain image {}", image_index))
        })?;
        let uniform_set = self.uniforms.set(image_index).ok_or_else(|| {
            RhiError::InvalidHandle(format!("No uniform set for swapchain image {}", image_index))
        })?;
        let layout = self.pipeline_layout.handle();

        // Beginning implicitly resets the buffer (RESET_COMMAND_BUFFER pool).
        cmd.begin()?;

        cmd.begin_render_pass(
            self.render_pass.handle(),
            framebuffer.handle(),
            self.swapchain.extent(),
            &clear_values(self.clear_color),
        );
        cmd.bind_graphics_pipeline(self.pipeline.handle());

        for (mesh_index, mesh) in self.meshes.iter().enumerate() {
            let Some(texture_set) = self.texture_registry.get(mesh.texture_index()) else {
                warn!(
                    "Mesh {} references missing texture {}, skipped",
                    mesh_index,
                    mesh.texture_index()
                );
                continue;
            };

            cmd.bind_vertex_buffers(0, &[mesh.vertex_buffer()], &[0]);
            cmd.bind_index_buffer(mesh.index_buffer(), 0, vk::IndexType::UINT32);

            self.model_strategy
                .apply(cmd, layout, image_index, mesh_index, &mesh.model());

            cmd.bind_descriptor_sets(layout, 0, &[uniform_set, texture_set], &[]);
            cmd.draw_indexed(mesh.index_count(), 1, 0, 0, 0);
        }

        cmd.end_render_pass();
        cmd.end()?;

        Ok(())
    }

    /// Rebuilds everything that depends on the swapchain.
    ///
    /// Waits for the device to go idle first, so nothing being replaced is
    /// still referenced by a pending submission.
    fn recreate_swapchain(&mut self) -> RendererResult<()> {
        if self.is_minimized() {
            return Ok(());
        }

        self.device.wait_idle()?;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.swapchain_config)?;

        let device = Arc::clone(&self.device);
        let extent = self.swapchain.extent();
        let image_count = self.swapchain.image_count();

        self.framebuffers.clear();

        if self.render_pass.color_format() != self.swapchain.format() {
            info!(
                "Swapchain format changed {:?} -> {:?}, rebuilding render pass",
                self.render_pass.color_format(),
                self.swapchain.format()
            );
            let render_pass = RenderPass::new(
                device.clone(),
                self.swapchain.format(),
                self.render_pass.depth_format(),
            )?;
            replace_resource(&mut self.render_pass, render_pass);
        }

        let depth_image =
            Self::create_depth_image(device.clone(), extent, self.depth_image.format())?;
        replace_resource(&mut self.depth_image, depth_image);

        self.framebuffers = Self::create_framebuffers(
            &device,
            &self.render_pass,
            &self.swapchain,
            &self.depth_image,
        )?;

        let pipeline = Self::create_pipeline(
            device.clone(),
            &self.vertex_shader,
            &self.fragment_shader,
            &self.render_pass,
            &self.pipeline_layout,
            extent,
        )?;
        replace_resource(&mut self.pipeline, pipeline);

        let uniforms = UniformSet::new(device, &self.view_projection_layout, image_count)?;
        replace_resource(&mut self.uniforms, uniforms);

        self.model_strategy.rebuild(image_count)?;

        self.command_pool.free_command_buffers(&self.command_buffers);
        self.command_buffers = self
            .command_pool
            .allocate_command_buffers(image_count as u32)?;

        self.frames.reset_images(image_count);

        self.view_projection = ViewProjection::for_aspect(aspect_ratio(extent.width, extent.height));
        self.framebuffer_resized = false;

        info!(
            "Swapchain recreated: {}x{}, {} images",
            extent.width, extent.height, image_count
        );
        Ok(())
    }

    fn is_minimized(&self) -> bool {
        self.swapchain_config.width == 0 || self.swapchain_config.height == 0
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns the swapchain format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Number of meshes added.
    #[inline]
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Number of textures registered.
    #[inline]
    pub fn texture_count(&self) -> usize {
        self.texture_registry.len()
    }

    /// Camera matrices used for the next frame.
    #[inline]
    pub fn view_projection(&self) -> &ViewProjection {
        &self.view_projection
    }

    /// Releases the resources belonging to `step`.
    ///
    /// # Safety
    ///
    /// Each step must run at most once, and `self` must not be used
    /// afterwards except for later steps. Only `Drop` calls this, walking
    /// `SHUTDOWN_ORDER`.
    unsafe fn release(&mut self, step: ShutdownStep) {
        // SAFETY: the caller guarantees every ManuallyDrop field below is
        // dropped exactly once and never touched again.
        unsafe {
            match step {
                ShutdownStep::WaitIdle => {
                    if let Err(e) = self.device.wait_idle() {
                        error!(
                            "Failed to wait for device idle during renderer drop: {:?}",
                            e
                        );
                    }
                }
                ShutdownStep::CommandBuffers => {
                    self.command_pool.free_command_buffers(&self.command_buffers);
                    self.command_buffers.clear();
                }
                ShutdownStep::FrameSync => ManuallyDrop::drop(&mut self.frames),
                ShutdownStep::Meshes => self.meshes.clear(),
                ShutdownStep::ModelStrategy => ManuallyDrop::drop(&mut self.model_strategy),
                ShutdownStep::Textures => {
                    ManuallyDrop::drop(&mut self.texture_registry);
                    self.textures.clear();
                }
                ShutdownStep::Uniforms => ManuallyDrop::drop(&mut self.uniforms),
                ShutdownStep::Pipeline => ManuallyDrop::drop(&mut self.pipeline),
                ShutdownStep::PipelineLayout => ManuallyDrop::drop(&mut self.pipeline_layout),
                ShutdownStep::DescriptorLayouts => {
                    ManuallyDrop::drop(&mut self.texture_layout);
                    ManuallyDrop::drop(&mut self.view_projection_layout);
                }
                ShutdownStep::Shaders => {
                    ManuallyDrop::drop(&mut self.fragment_shader);
                    ManuallyDrop::drop(&mut self.vertex_shader);
                }
                ShutdownStep::Sampler => ManuallyDrop::drop(&mut self.sampler),
                ShutdownStep::Framebuffers => self.framebuffers.clear(),
                ShutdownStep::DepthBuffer => ManuallyDrop::drop(&mut self.depth_image),
                ShutdownStep::RenderPass => ManuallyDrop::drop(&mut self.render_pass),
                ShutdownStep::CommandPool => ManuallyDrop::drop(&mut self.command_pool),
                ShutdownStep::Swapchain => ManuallyDrop::drop(&mut self.swapchain),
                ShutdownStep::Device => ManuallyDrop::drop(&mut self.device),
                ShutdownStep::Surface => ManuallyDrop::drop(&mut self.surface),
                ShutdownStep::Instance => ManuallyDrop::drop(&mut self.instance),
            }
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // SAFETY: run_shutdown hands out every step exactly once and this is
        // the only place release() is called.
        run_shutdown(|step| unsafe { self.release(step) });

        info!("Renderer destroyed");
    }
}
