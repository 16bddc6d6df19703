//! Texture sampler shared by every texture descriptor set.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Anisotropy requested before clamping to the device limit.
pub const DEFAULT_MAX_ANISOTROPY: f32 = 16.0;

/// Clamps the requested anisotropy to what the device supports.
#[inline]
pub fn clamp_anisotropy(requested: f32, device_limit: f32) -> f32 {
    requested.min(device_limit).max(1.0)
}

/// Create info for a linear, repeating sampler with a single mip level.
pub fn sampler_create_info(max_anisotropy: f32) -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(max_anisotropy)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
}

/// Vulkan sampler wrapper.
pub struct Sampler {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan sampler handle.
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates the texture sampler.
    ///
    /// `max_anisotropy` is clamped to `maxSamplerAnisotropy` of the device.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>, max_anisotropy: f32) -> RhiResult<Self> {
        let limit = device.properties().limits.max_sampler_anisotropy;
        let anisotropy = clamp_anisotropy(max_anisotropy, limit);

        let create_info = sampler_create_info(anisotropy);
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!("Created sampler (anisotropy {})", anisotropy);

        Ok(Self { device, sampler })
    }

    /// Returns the Vulkan sampler handle.
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed sampler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_anisotropy_to_device_limit() {
        assert_eq!(clamp_anisotropy(DEFAULT_MAX_ANISOTROPY, 8.0), 8.0);
        assert_eq!(clamp_anisotropy(DEFAULT_MAX_ANISOTROPY, 16.0), 16.0);
        assert_eq!(clamp_anisotropy(DEFAULT_MAX_ANISOTROPY, 64.0), 16.0);
    }

    #[test]
    fn test_clamp_anisotropy_never_below_one() {
        assert_eq!(clamp_anisotropy(DEFAULT_MAX_ANISOTROPY, 0.0), 1.0);
    }

    #[test]
    fn test_sampler_create_info() {
        let info = sampler_create_info(16.0);
        assert_eq!(info.mag_filter, vk::Filter::LINEAR);
        assert_eq!(info.min_filter, vk::Filter::LINEAR);
        assert_eq!(info.address_mode_u, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_v, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.address_mode_w, vk::SamplerAddressMode::REPEAT);
        assert_eq!(info.anisotropy_enable, vk::TRUE);
        assert_eq!(info.max_anisotropy, 16.0);
        assert_eq!(info.border_color, vk::BorderColor::INT_OPAQUE_BLACK);
        assert_eq!(info.mipmap_mode, vk::SamplerMipmapMode::LINEAR);
        assert_eq!(info.min_lod, 0.0);
        assert_eq!(info.max_lod, 0.0);
    }

    #[test]
    fn test_sampler_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Sampler>();
    }
}
