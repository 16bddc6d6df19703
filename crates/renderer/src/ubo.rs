//! Shader-facing data layouts and the fixed camera.
//!
//! These structures must match the GLSL declarations exactly. All of them
//! are `#[repr(C)]` and implement `Pod` and `Zeroable` for byte casting.
//!
//! ```glsl
//! layout(set = 0, binding = 0) uniform UboViewProjection {
//!     mat4 projection;
//!     mat4 view;
//! } uboViewProjection;
//!
//! layout(push_constant) uniform PushModel {
//!     mat4 model;
//! } pushModel;
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Vertical field of view of the demo camera, in degrees.
pub const FOV_Y_DEGREES: f32 = 40.0;

/// Near clip plane distance.
pub const Z_NEAR: f32 = 0.1;

/// Far clip plane distance.
pub const Z_FAR: f32 = 100.0;

/// Camera position in world space.
pub const EYE: Vec3 = Vec3::new(0.0, 0.0, 2.0);

/// View and projection matrices, bound at set 0, binding 0.
///
/// # Memory Layout
///
/// - Offset 0: projection matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ViewProjection {
    /// Projection matrix (view to clip space).
    pub projection: Mat4,
    /// View matrix (world to view space).
    pub view: Mat4,
}

impl ViewProjection {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Fixed camera at [`EYE`] looking at the origin, for the given aspect
    /// ratio.
    pub fn for_aspect(aspect: f32) -> Self {
        Self {
            projection: projection_matrix(aspect),
            view: view_matrix(),
        }
    }
}

/// Right-handed perspective projection with Vulkan's clip-space Y.
///
/// `glam`'s projection assumes +Y up in clip space; Vulkan's points down,
/// so the Y scale is negated.
pub fn projection_matrix(aspect: f32) -> Mat4 {
    let mut projection =
        Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, Z_NEAR, Z_FAR);
    projection.y_axis.y *= -1.0;
    projection
}

/// Looks from [`EYE`] at the origin with +Y up.
pub fn view_matrix() -> Mat4 {
    Mat4::look_at_rh(EYE, Vec3::ZERO, Vec3::Y)
}

/// Per-draw model matrix, delivered as a vertex-stage push constant.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstant {
    /// Model matrix (object to world space).
    pub model: Mat4,
}

impl ModelPushConstant {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_view_projection_size() {
        assert_eq!(ViewProjection::SIZE, 128);
        assert_eq!(std::mem::offset_of!(ViewProjection, projection), 0);
        assert_eq!(std::mem::offset_of!(ViewProjection, view), 64);
    }

    #[test]
    fn test_push_constant_fits_minimum_limit() {
        // Vulkan guarantees at least 128 bytes of push constants.
        assert_eq!(ModelPushConstant::SIZE, 64);
        assert!(ModelPushConstant::SIZE <= 128);
    }

    #[test]
    fn test_projection_flips_y() {
        let projection = projection_matrix(1.0);
        let unflipped = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), 1.0, Z_NEAR, Z_FAR);
        assert_eq!(projection.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(projection.x_axis, unflipped.x_axis);

        // A point above the camera axis lands in the upper half of the
        // framebuffer, which is negative Y in Vulkan clip space.
        let clip = projection * Vec4::new(0.0, 0.5, -2.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_view_moves_origin_in_front_of_camera() {
        let origin_in_view = view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin_in_view.z + 2.0).abs() < 1e-6);
        assert!(origin_in_view.x.abs() < 1e-6);
        assert!(origin_in_view.y.abs() < 1e-6);
    }

    #[test]
    fn test_origin_is_within_depth_range() {
        let vp = ViewProjection::for_aspect(800.0 / 600.0);
        let clip = vp.projection * vp.view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let depth = clip.z / clip.w;
        assert!((0.0..=1.0).contains(&depth), "depth {depth}");
    }

    #[test]
    fn test_aspect_changes_only_x_scale() {
        let wide = projection_matrix(2.0);
        let square = projection_matrix(1.0);
        assert!((wide.x_axis.x * 2.0 - square.x_axis.x).abs() < 1e-6);
        assert_eq!(wide.y_axis, square.y_axis);
    }
}
