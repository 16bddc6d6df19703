//! Memory type and format selection.
//!
//! These helpers only read physical device properties, so the selection logic
//! is plain functions over `vk` structs and can be tested without a GPU.

use ash::vk;
use tracing::debug;

use crate::error::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Finds the first memory type allowed by `type_bits` whose property flags
/// contain `required`.
///
/// Memory types are scanned in index order.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] when no type matches.
pub fn find_memory_type(
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
) -> RhiResult<u32> {
    let count = memory_properties.memory_type_count as usize;

    memory_properties
        .memory_types
        .iter()
        .take(count)
        .enumerate()
        .find(|(i, memory_type)| {
            (type_bits & (1 << i)) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(i, _)| i as u32)
        .ok_or(RhiError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// Returns the first candidate whose tiling supports `features`.
///
/// `properties_of` reports the format properties of a candidate.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] listing the candidates when none
/// qualifies.
pub fn pick_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties_of: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties_of(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| RhiError::NoSupportedFormat(candidates.to_vec()))
}

/// Queries the device for the first supported candidate format.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] when no candidate qualifies.
pub fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> RhiResult<vk::Format> {
    let format = pick_supported_format(candidates, tiling, features, |format| unsafe {
        instance.get_physical_device_format_properties(physical_device, format)
    })?;
    debug!("Selected format {:?} for {:?}", format, features);
    Ok(format)
}

/// Chooses the depth attachment format from [`DEPTH_FORMAT_CANDIDATES`].
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] when the device supports none.
pub fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> RhiResult<vk::Format> {
    find_supported_format(
        instance,
        physical_device,
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Returns true when the format carries a stencil component.
#[inline]
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Rounds `size` up to a multiple of `alignment`.
///
/// An alignment of 0 leaves the size unchanged. Non-zero alignments reported
/// by Vulkan are powers of two.
#[inline]
pub fn aligned_stride(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    if alignment == 0 {
        size
    } else {
        size.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (slot, &flag) in props.memory_types.iter_mut().zip(flags) {
            slot.property_flags = flag;
        }
        props
    }

    fn optimal(features: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: features,
            ..Default::default()
        }
    }

    #[test]
    fn test_find_memory_type_first_match_in_order() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        assert_eq!(find_memory_type(0b111, host, &props).unwrap(), 1);
        assert_eq!(
            find_memory_type(0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL, &props).unwrap(),
            0
        );
    }

    #[test]
    fn test_find_memory_type_respects_type_bits() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[host, host]);

        assert_eq!(find_memory_type(0b10, host, &props).unwrap(), 1);
    }

    #[test]
    fn test_find_memory_type_no_match() {
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let err = find_memory_type(0b1, vk::MemoryPropertyFlags::HOST_VISIBLE, &props).unwrap_err();
        assert!(matches!(
            err,
            RhiError::NoSuitableMemoryType { type_bits: 0b1, .. }
        ));

        // Types past memory_type_count are ignored even if their bit is set.
        let err = find_memory_type(0b10, vk::MemoryPropertyFlags::empty(), &props).unwrap_err();
        assert!(matches!(err, RhiError::NoSuitableMemoryType { .. }));
    }

    #[test]
    fn test_pick_supported_format_prefers_order() {
        let format = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| match format {
                vk::Format::D32_SFLOAT | vk::Format::D24_UNORM_S8_UINT => {
                    optimal(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                }
                _ => vk::FormatProperties::default(),
            },
        )
        .unwrap();
        assert_eq!(format, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_pick_supported_format_checks_tiling() {
        // Linear support alone does not satisfy an optimal tiling request.
        let err = pick_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        )
        .unwrap_err();

        match err {
            RhiError::NoSupportedFormat(candidates) => {
                assert_eq!(candidates, DEPTH_FORMAT_CANDIDATES.to_vec())
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_aligned_stride() {
        assert_eq!(aligned_stride(64, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(64, 64), 64);
        assert_eq!(aligned_stride(64, 0), 64);
    }
}
