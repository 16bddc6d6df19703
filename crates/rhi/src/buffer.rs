//! GPU buffer management.
//!
//! Vertex and index buffers live in device-local memory and are filled through
//! a staging buffer; uniform and staging buffers are host-visible and written
//! through their persistent mapping.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vge_rhi::buffer::{Buffer, BufferUsage};
//! use vge_rhi::command::CommandPool;
//! use vge_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), vge_rhi::RhiError> {
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::memory::find_memory_type;

/// Buffer usage type.
///
/// Determines the Vulkan usage flags and where the memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Device-local vertex data, filled by a staging copy
    Vertex,
    /// Device-local 32-bit index data, filled by a staging copy
    Index,
    /// Host-visible shader uniform data, rewritten by the CPU
    Uniform,
    /// Host-visible upload source
    Staging,
    /// Host-visible copy destination for reading device data back
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Memory property flags a matching memory type must have.
    pub fn required_properties(self) -> vk::MemoryPropertyFlags {
        match self.memory_location() {
            MemoryLocation::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryLocation::GpuToCpu => vk::MemoryPropertyFlags::HOST_VISIBLE,
            _ => vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        }
    }

    /// Returns true when the buffer is written through a CPU mapping.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// Checks that `len` bytes at `offset` fit inside a buffer of `size` bytes.
pub fn check_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::InvalidHandle(format!(
            "Range exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}

/// Copies `data` into a mapped range at `offset`.
///
/// # Errors
///
/// Returns an error if the range does not fit inside `mapped`.
pub fn write_mapped(mapped: &mut [u8], offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
    check_range(offset, data.len(), mapped.len() as vk::DeviceSize)?;
    let start = offset as usize;
    mapped[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// The first `size` bytes of a mapped range.
///
/// # Errors
///
/// Returns an error if `mapped` is shorter than `size`.
pub fn read_mapped(mapped: &[u8], size: vk::DeviceSize) -> RhiResult<&[u8]> {
    check_range(0, size as usize, mapped.len() as vk::DeviceSize)?;
    Ok(&mapped[..size as usize])
}

/// GPU buffer wrapper with managed memory.
///
/// Wraps a Vulkan buffer and its gpu-allocator allocation. The buffer is the
/// sole owner of both and releases them on drop.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// Buffer usage type.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer with the specified size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `size` is 0
    /// - No memory type matches the usage's required properties
    /// - Buffer creation or memory allocation fails
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        match Self::bind_memory(&device, buffer, usage) {
            Ok(allocation) => {
                debug!("Created {} buffer: {} bytes", usage.name(), size);
                Ok(Self {
                    device,
                    buffer,
                    allocation: Some(allocation),
                    size,
                    usage,
                })
            }
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                Err(e)
            }
        }
    }

    fn bind_memory(
        device: &Device,
        buffer: vk::Buffer,
        usage: BufferUsage,
    ) -> RhiResult<Allocation> {
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        // gpu-allocator picks the actual type; this only rejects devices
        // that have none with the required properties.
        find_memory_type(
            requirements.memory_type_bits,
            usage.required_properties(),
            device.memory_properties(),
        )?;

        let allocation = device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        let bound = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            if let Err(free_err) = device.lock_allocator()?.free(allocation) {
                error!("Failed to free buffer allocation: {}", free_err);
            }
            return Err(e.into());
        }

        Ok(allocation)
    }

    /// Creates a host-visible buffer and initializes it with data.
    ///
    /// # Errors
    ///
    /// Returns an error if `usage` is not host-visible, or if creation or the
    /// write fails.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        if !usage.is_host_visible() {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffers are device-local, use new_device_local",
                usage.name()
            )));
        }

        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer filled through a staging copy.
    ///
    /// The data is written into a temporary staging buffer, copied with a
    /// one-time command buffer on the graphics queue, and the staging buffer
    /// is released once the queue is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, or if any creation, copy or
    /// submission step fails.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, size)?;

        pool.one_time_submit(|cmd| {
            cmd.copy_buffer(
                staging.handle(),
                buffer.handle(),
                &[vk::BufferCopy::default().size(size)],
            );
        })?;

        debug!("Uploaded {} bytes into {} buffer", size, usage.name());
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// Host-coherent memory needs no flush.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer memory is not mapped
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;

        // SAFETY: the allocation is persistently mapped for at least `size`
        // bytes and nothing else holds a slice into it.
        let mapped = unsafe {
            std::slice::from_raw_parts_mut(mapped_ptr.as_ptr() as *mut u8, self.size as usize)
        };
        write_mapped(mapped, offset, data)
    }

    /// Writes one plain-old-data value at `offset`.
    ///
    /// # Errors
    ///
    /// Same as [`Buffer::write_data`].
    pub fn write_pod<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, value: &T) -> RhiResult<()> {
        self.write_data(offset, bytemuck::bytes_of(value))
    }

    /// Copies the buffer contents back to the CPU.
    ///
    /// Host-visible buffers are read through their mapping. Device-local
    /// buffers are first copied into a readback buffer with a one-time
    /// command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy or the mapping fails.
    pub fn read_back(&self, pool: &CommandPool) -> RhiResult<Vec<u8>> {
        if self.usage.is_host_visible() {
            return Ok(self.mapped_slice()?.to_vec());
        }

        let readback = Self::new(self.device.clone(), BufferUsage::Readback, self.size)?;
        pool.one_time_submit(|cmd| {
            cmd.copy_buffer(
                self.buffer,
                readback.handle(),
                &[vk::BufferCopy::default().size(self.size)],
            );
        })?;

        Ok(readback.mapped_slice()?.to_vec())
    }

    fn mapped_slice(&self) -> RhiResult<&[u8]> {
        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_slice)
            .ok_or_else(|| RhiError::InvalidHandle("Buffer memory is not mapped".to_string()))?;
        read_mapped(mapped, self.size)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking {} buffer memory: {}", self.usage.name(), e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            BufferUsage::Readback.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(BufferUsage::Vertex.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Index.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Readback.memory_location(),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn test_staging_requires_coherent_memory() {
        let flags = BufferUsage::Staging.required_properties();
        assert!(flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert_eq!(
            BufferUsage::Vertex.required_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
        assert!(!BufferUsage::Index.is_host_visible());
        assert!(BufferUsage::Uniform.is_host_visible());
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 64, 64).is_ok());
        assert!(check_range(32, 32, 64).is_ok());
        assert!(check_range(0, 0, 0).is_ok());
        assert!(check_range(33, 32, 64).is_err());
        assert!(check_range(0, 65, 64).is_err());
        assert!(check_range(u64::MAX, 1, 64).is_err());
    }

    #[test]
    fn test_mapped_upload_round_trips() {
        let source: Vec<u32> = (0..97).map(|i| i * 0x0101_0101).collect();
        let bytes: &[u8] = bytemuck::cast_slice(&source);
        let size = bytes.len() as vk::DeviceSize;

        // Allocations are often larger than requested.
        let mut mapping = vec![0xAAu8; bytes.len() + 64];
        write_mapped(&mut mapping, 0, bytes).unwrap();

        let read = read_mapped(&mapping, size).unwrap();
        assert_eq!(read, bytes);
        assert_eq!(bytemuck::cast_slice::<u8, u32>(read), &source[..]);
    }

    #[test]
    fn test_mapped_write_at_offset_leaves_rest_untouched() {
        let mut mapping = vec![0u8; 16];
        write_mapped(&mut mapping, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mapping[..4], [0, 0, 0, 0]);
        assert_eq!(mapping[4..8], [1, 2, 3, 4]);
        assert!(mapping[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_mapped_access_out_of_range_fails() {
        let mut mapping = vec![0u8; 8];
        assert!(write_mapped(&mut mapping, 6, &[1, 2, 3]).is_err());
        assert_eq!(mapping, vec![0u8; 8]);
        assert!(read_mapped(&mapping, 9).is_err());
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
        assert_eq!(BufferUsage::Readback.name(), "readback");
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
