//! Integration tests for buffer uploads on a real Vulkan device.
//!
//! Every test skips when no Vulkan loader or graphics-capable device exists.

use std::sync::Arc;

use glam::{Vec2, Vec3};

use vge_rhi::buffer::{Buffer, BufferUsage};
use vge_rhi::command::CommandPool;
use vge_rhi::device::Device;
use vge_rhi::instance::Instance;
use vge_rhi::physical_device::PhysicalDeviceInfo;
use vge_rhi::vertex::Vertex;
use vge_rhi::vk;

/// Keeps the instance alive for as long as the device and pool.
struct Gpu {
    pool: CommandPool,
    device: Arc<Device>,
    _instance: Instance,
}

fn headless_gpu() -> Option<Gpu> {
    let instance = match Instance::new(c"vge-rhi-tests", &[ash::khr::surface::NAME.as_ptr()], false)
    {
        Ok(instance) => instance,
        Err(e) => {
            println!("Skipping test: Vulkan not available ({})", e);
            return None;
        }
    };

    let devices = unsafe { instance.handle().enumerate_physical_devices() }.unwrap_or_default();
    let info = devices.into_iter().find_map(|device| {
        let families =
            unsafe { instance.handle().get_physical_device_queue_family_properties(device) };
        // Without a surface, present support falls back to graphics support.
        let info = PhysicalDeviceInfo::query(instance.handle(), device, |i| {
            families
                .get(i as usize)
                .is_some_and(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        });
        info.queue_families.graphics_family.map(|_| info)
    });
    let Some(info) = info else {
        println!("Skipping test: no graphics-capable device");
        return None;
    };

    let device = match Device::new(&instance, &info) {
        Ok(device) => device,
        Err(e) => {
            println!("Skipping test: device creation failed ({})", e);
            return None;
        }
    };
    let family = info.queue_families.graphics_family?;
    let pool = CommandPool::new(device.clone(), family).expect("Failed to create command pool");

    Some(Gpu {
        pool,
        device,
        _instance: instance,
    })
}

fn sample_vertices(count: usize) -> Vec<Vertex> {
    (0..count)
        .map(|i| {
            let t = i as f32;
            Vertex::new(
                Vec3::new(t, -t, 0.5 * t),
                Vec3::new(1.0, t / count as f32, 0.0),
                Vec2::new(t.fract(), 1.0 - t / count as f32),
            )
        })
        .collect()
}

#[test]
fn test_device_local_vertex_upload_reads_back() {
    let Some(gpu) = headless_gpu() else {
        return;
    };

    let vertices = sample_vertices(1000);
    let source: &[u8] = bytemuck::cast_slice(&vertices);

    let buffer = Buffer::new_device_local(
        gpu.device.clone(),
        &gpu.pool,
        BufferUsage::Vertex,
        source,
    )
    .expect("Failed to upload vertices");

    assert_eq!(buffer.size(), source.len() as vk::DeviceSize);
    let read = buffer.read_back(&gpu.pool).expect("Failed to read back");
    assert_eq!(read, source);
    assert_eq!(bytemuck::cast_slice::<u8, Vertex>(&read), &vertices[..]);
}

#[test]
fn test_device_local_index_upload_reads_back() {
    let Some(gpu) = headless_gpu() else {
        return;
    };

    let indices: Vec<u32> = (0..4096).rev().collect();
    let source: &[u8] = bytemuck::cast_slice(&indices);

    let buffer =
        Buffer::new_device_local(gpu.device.clone(), &gpu.pool, BufferUsage::Index, source)
            .expect("Failed to upload indices");

    assert_eq!(buffer.read_back(&gpu.pool).expect("Failed to read back"), source);
}

#[test]
fn test_host_visible_writes_read_back() {
    let Some(gpu) = headless_gpu() else {
        return;
    };

    let buffer = Buffer::new(gpu.device.clone(), BufferUsage::Uniform, 256)
        .expect("Failed to create uniform buffer");
    let head = [7u8; 64];
    let tail: Vec<u8> = (0..64).collect();
    buffer.write_data(0, &head).expect("Failed to write head");
    buffer.write_data(192, &tail).expect("Failed to write tail");

    let read = buffer.read_back(&gpu.pool).expect("Failed to read back");
    assert_eq!(read.len(), 256);
    assert_eq!(read[..64], head);
    assert_eq!(read[192..], tail[..]);
    assert!(buffer.write_data(250, &head).is_err());
}
