//! Physical device (GPU) selection.
//!
//! Selection walks the enumerated GPUs in order and takes the first one that
//! passes every suitability check:
//!
//! 1. A queue family with graphics support
//! 2. A queue family that can present to the target surface
//! 3. Every extension in [`DEVICE_EXTENSIONS`]
//! 4. The `samplerAnisotropy` feature
//! 5. At least one surface format and at least one present mode
//!
//! When nothing passes, selection fails unless the caller explicitly allows
//! falling back to the first enumerated device.
//!
//! # Example
//!
//! ```no_run
//! use vge_rhi::instance::Instance;
//! use vge_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), vge_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader, false)?;
//! println!("Selected GPU: {}", device_info.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DEVICE_EXTENSIONS;
use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Queue family indices for the queues the renderer uses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Checks if both graphics and present queue families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns true when graphics and presentation use the same family.
    #[inline]
    pub fn is_shared(&self) -> bool {
        self.graphics_family == self.present_family
    }

    /// Returns the unique queue family indices.
    ///
    /// Used when creating the logical device so a family that serves both
    /// graphics and presentation only gets one queue.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for different operations.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Queries properties, features, memory types and queue families of
    /// `device`.
    ///
    /// `supports_present` decides which queue family can present; a caller
    /// without a surface can pass the graphics check instead.
    pub fn query(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        Self {
            device,
            properties,
            features,
            memory_properties,
            queue_families: find_queue_families(&families, supports_present),
        }
    }

    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the `minUniformBufferOffsetAlignment` limit.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Returns the `maxSamplerAnisotropy` limit.
    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Result of checking one GPU against the renderer's requirements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SuitabilityReport {
    /// Graphics and present queue families were found.
    pub queues_complete: bool,
    /// Required extensions the device lacks.
    pub missing_extensions: Vec<String>,
    /// The surface offers at least one format and one present mode.
    pub swapchain_adequate: bool,
    /// `samplerAnisotropy` is supported.
    pub sampler_anisotropy: bool,
}

impl SuitabilityReport {
    /// Returns true when every requirement holds.
    pub fn is_suitable(&self) -> bool {
        self.queues_complete
            && self.missing_extensions.is_empty()
            && self.swapchain_adequate
            && self.sampler_anisotropy
    }
}

/// Returns true when a surface can back a swapchain on this device.
///
/// Both lists must be non-empty.
#[inline]
pub fn is_swapchain_adequate(format_count: usize, present_mode_count: usize) -> bool {
    format_count > 0 && present_mode_count > 0
}

/// Returns the names in `required` that are absent from `available`.
pub fn missing_extensions(
    required: &[&CStr],
    available: &[vk::ExtensionProperties],
) -> Vec<String> {
    required
        .iter()
        .filter(|name| {
            !available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == **name))
        })
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Picks a device index from per-device suitability results.
///
/// The first suitable device in enumeration order wins. With no suitable
/// device, `allow_fallback` returns index 0 (if any device exists).
pub fn pick_device(suitable: &[bool], allow_fallback: bool) -> Option<usize> {
    suitable
        .iter()
        .position(|&ok| ok)
        .or_else(|| (allow_fallback && !suitable.is_empty()).then_some(0))
}

/// Derives queue family indices from queue family properties.
///
/// `supports_present` reports whether the family at an index can present to
/// the target surface. The scan stops once both families are found.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() && supports_present(i) {
            indices.present_family = Some(i);
        }

        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Selects the physical device used for rendering.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface for present support checking
/// * `surface_loader` - The surface extension loader
/// * `allow_fallback` - Use the first enumerated GPU when none is suitable
///
/// # Errors
///
/// - [`RhiError::NoVulkanDevice`] if the instance reports zero GPUs
/// - [`RhiError::NoSuitableGpu`] if no GPU is suitable and fallback is disabled
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    allow_fallback: bool,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        return Err(RhiError::NoVulkanDevice);
    }

    info!("Found {} GPU(s)", devices.len());

    let mut infos = Vec::with_capacity(devices.len());
    let mut suitable = Vec::with_capacity(devices.len());

    for &device in &devices {
        let info = describe_device(instance, device, surface, surface_loader);
        let report = check_device_suitability(instance, &info, surface, surface_loader)?;

        if report.is_suitable() {
            debug!("GPU '{}' is suitable", info.device_name());
        } else {
            debug!("GPU '{}' skipped: {:?}", info.device_name(), report);
        }

        suitable.push(report.is_suitable());
        infos.push(info);
    }

    let index = pick_device(&suitable, allow_fallback).ok_or(RhiError::NoSuitableGpu)?;
    if !suitable[index] {
        warn!(
            "No suitable GPU found, falling back to '{}'",
            infos[index].device_name()
        );
    }

    let selected = infos.swap_remove(index);
    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch
    );

    Ok(selected)
}

/// Gathers properties, features and queue families of one GPU.
fn describe_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> PhysicalDeviceInfo {
    PhysicalDeviceInfo::query(instance, device, |i| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, i, surface)
            .unwrap_or(false)
    })
}

/// Checks a GPU against every requirement.
fn check_device_suitability(
    instance: &ash::Instance,
    info: &PhysicalDeviceInfo,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<SuitabilityReport, RhiError> {
    let available = unsafe { instance.enumerate_device_extension_properties(info.device)? };
    let missing_extensions = missing_extensions(DEVICE_EXTENSIONS, &available);

    // Surface queries are only meaningful with the swapchain extension present.
    let swapchain_adequate = if missing_extensions.is_empty() {
        let support = SwapchainSupportDetails::query(info.device, surface, surface_loader)?;
        is_swapchain_adequate(support.formats.len(), support.present_modes.len())
    } else {
        false
    };

    Ok(SuitabilityReport {
        queues_complete: info.queue_families.is_complete(),
        missing_extensions,
        swapchain_adequate,
        sampler_anisotropy: info.features.sampler_anisotropy == vk::TRUE,
    })
}
