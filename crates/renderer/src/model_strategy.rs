//! Delivery of per-mesh model matrices to the vertex shader.
//!
//! Two strategies are available, selected by
//! [`ModelTransfer`](vge_core::ModelTransfer):
//!
//! - [`PushConstantModels`]: one `mat4` push constant per draw. This is the
//!   default and needs no extra resources.
//! - [`DynamicUniformModels`]: all model matrices packed into one
//!   host-visible buffer per swapchain image, one aligned slot per mesh,
//!   bound at set 2 with a per-draw dynamic offset. The vertex shader must
//!   declare `layout(set = 2, binding = 0) uniform UboModel { mat4 model; }`.

use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::debug;

use vge_rhi::buffer::{Buffer, BufferUsage};
use vge_rhi::command::CommandBuffer;
use vge_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, write_uniform_buffer,
};
use vge_rhi::device::Device;
use vge_rhi::memory::aligned_stride;

use crate::MAX_OBJECTS;
use crate::error::{RendererError, RendererResult};
use crate::ubo::ModelPushConstant;

/// Descriptor set index used by [`DynamicUniformModels`].
pub const MODEL_SET: u32 = 2;

/// Size of one model matrix in bytes.
const MODEL_SIZE: vk::DeviceSize = std::mem::size_of::<Mat4>() as vk::DeviceSize;

/// How model matrices reach the shader.
pub trait ModelTransformStrategy: Send {
    /// Push constant ranges the pipeline layout must declare.
    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange>;

    /// Extra descriptor set layout appended after sets 0 and 1, if any.
    fn set_layout(&self) -> Option<vk::DescriptorSetLayout>;

    /// Rebuilds per-image resources after the swapchain changed.
    ///
    /// # Errors
    ///
    /// Returns an error if resource creation fails.
    fn rebuild(&mut self, image_count: usize) -> RendererResult<()>;

    /// Uploads all model matrices for `image_index` before recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    fn upload(&self, image_index: u32, models: &[Mat4]) -> RendererResult<()>;

    /// Records whatever makes `model` visible to the draw of mesh
    /// `mesh_index`.
    fn apply(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        image_index: u32,
        mesh_index: usize,
        model: &Mat4,
    );
}

/// Model matrices as vertex-stage push constants.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushConstantModels;

impl PushConstantModels {
    /// The single `mat4` vertex-stage range at offset 0.
    pub fn range() -> vk::PushConstantRange {
        vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(ModelPushConstant::SIZE as u32)
    }
}

impl ModelTransformStrategy for PushConstantModels {
    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        vec![Self::range()]
    }

    fn set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        None
    }

    fn rebuild(&mut self, _image_count: usize) -> RendererResult<()> {
        Ok(())
    }

    fn upload(&self, _image_index: u32, _models: &[Mat4]) -> RendererResult<()> {
        Ok(())
    }

    fn apply(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        _image_index: u32,
        _mesh_index: usize,
        model: &Mat4,
    ) {
        cmd.push_constants(
            layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            &ModelPushConstant { model: *model },
        );
    }
}

/// Dynamic offset of slot `index` in a buffer of `stride`-sized slots.
#[inline]
pub fn dynamic_offset(index: usize, stride: vk::DeviceSize) -> u32 {
    (index as vk::DeviceSize * stride) as u32
}

/// Packs `models` into `stride`-sized slots, zero padding between them.
pub fn pack_models(models: &[Mat4], stride: vk::DeviceSize) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; models.len() * stride];
    for (slot, model) in bytes.chunks_exact_mut(stride).zip(models) {
        slot[..MODEL_SIZE as usize].copy_from_slice(bytemuck::bytes_of(model));
    }
    bytes
}

/// Per-image resources of [`DynamicUniformModels`].
struct ModelSlots {
    buffers: Vec<Buffer>,
    sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
}

/// Model matrices in a dynamic uniform buffer at set 2, binding 0.
pub struct DynamicUniformModels {
    device: Arc<Device>,
    layout: DescriptorSetLayout,
    stride: vk::DeviceSize,
    slots: Option<ModelSlots>,
}

impl DynamicUniformModels {
    /// Creates the set 2 layout and one model buffer per swapchain image.
    ///
    /// The slot stride is `size_of::<Mat4>()` rounded up to the device's
    /// `minUniformBufferOffsetAlignment`.
    ///
    /// # Errors
    ///
    /// Returns an error if layout, pool or buffer creation fails.
    pub fn new(device: Arc<Device>, image_count: usize) -> RendererResult<Self> {
        let binding =
            DescriptorBindingBuilder::uniform_buffer_dynamic(0, vk::ShaderStageFlags::VERTEX);
        let layout = DescriptorSetLayout::new(device.clone(), &[binding])?;

        let alignment = device.properties().limits.min_uniform_buffer_offset_alignment;
        let stride = aligned_stride(MODEL_SIZE, alignment);
        debug!(
            "Dynamic model stride {} bytes (alignment {})",
            stride, alignment
        );

        let mut models = Self {
            device,
            layout,
            stride,
            slots: None,
        };
        models.rebuild(image_count)?;
        Ok(models)
    }

    /// Bytes between consecutive model slots.
    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    fn create_slots(&self, image_count: usize) -> RendererResult<ModelSlots> {
        let count = image_count as u32;
        let pool = DescriptorPool::new(
            self.device.clone(),
            count,
            &[DescriptorPool::size(
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                count,
            )],
        )?;
        let sets = pool.allocate(&vec![self.layout.handle(); image_count])?;

        let size = self.stride * MAX_OBJECTS as vk::DeviceSize;
        let mut buffers = Vec::with_capacity(image_count);
        for &set in &sets {
            let buffer = Buffer::new(self.device.clone(), BufferUsage::Uniform, size)?;
            // The range covers one slot; the dynamic offset picks which.
            write_uniform_buffer(
                &self.device,
                set,
                0,
                vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                buffer.handle(),
                MODEL_SIZE,
            );
            buffers.push(buffer);
        }

        Ok(ModelSlots {
            buffers,
            sets,
            _pool: pool,
        })
    }
}

impl ModelTransformStrategy for DynamicUniformModels {
    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        Vec::new()
    }

    fn set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        Some(self.layout.handle())
    }

    fn rebuild(&mut self, image_count: usize) -> RendererResult<()> {
        // Old slots go first so the pool never holds two generations.
        self.slots = None;
        self.slots = Some(self.create_slots(image_count)?);
        debug!("Dynamic model buffers built for {} images", image_count);
        Ok(())
    }

    fn upload(&self, image_index: u32, models: &[Mat4]) -> RendererResult<()> {
        if models.len() > MAX_OBJECTS {
            return Err(RendererError::MeshLimit { limit: MAX_OBJECTS });
        }

        let buffer = self
            .slots
            .as_ref()
            .and_then(|slots| slots.buffers.get(image_index as usize))
            .ok_or_else(|| {
                vge_rhi::RhiError::InvalidHandle(format!(
                    "No model buffer for swapchain image {}",
                    image_index
                ))
            })?;

        buffer.write_data(0, &pack_models(models, self.stride))?;
        Ok(())
    }

    fn apply(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        image_index: u32,
        mesh_index: usize,
        _model: &Mat4,
    ) {
        let Some(set) = self
            .slots
            .as_ref()
            .and_then(|slots| slots.sets.get(image_index as usize).copied())
        else {
            return;
        };

        cmd.bind_descriptor_sets(
            layout,
            MODEL_SET,
            &[set],
            &[dynamic_offset(mesh_index, self.stride)],
        );
    }
}

/// Builds the strategy named by the configuration.
///
/// # Errors
///
/// Returns an error if the dynamic uniform resources cannot be created.
pub fn create_strategy(
    transfer: vge_core::ModelTransfer,
    device: Arc<Device>,
    image_count: usize,
) -> RendererResult<Box<dyn ModelTransformStrategy>> {
    Ok(match transfer {
        vge_core::ModelTransfer::PushConstant => Box::new(PushConstantModels),
        vge_core::ModelTransfer::DynamicUniform => {
            Box::new(DynamicUniformModels::new(device, image_count)?)
        }
    })
}
