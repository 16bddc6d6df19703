//! Demo scene: two textured quads spinning about the view axis.

use glam::{Mat4, Vec2, Vec3};
use vge_renderer::Vertex;

/// Two triangles covering a quad, counter-clockwise.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Rotation speed of the first quad, in degrees per second.
pub const DEGREES_PER_SECOND: f32 = 10.0;

/// The second quad spins this many times faster, in the opposite direction.
pub const SECOND_QUAD_SPEEDUP: f32 = 100.0;

/// A square quad, faded toward blue along one diagonal.
pub fn first_quad() -> [Vertex; 4] {
    [
        Vertex::new(Vec3::new(-0.4, 0.4, 0.0), Vec3::new(0.0, 0.0, 0.1), Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(-0.4, -0.4, 0.0), Vec3::new(1.0, 1.0, 1.0), Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.4, -0.4, 0.0), Vec3::new(1.0, 1.0, 1.0), Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.4, 0.4, 0.0), Vec3::new(0.0, 0.0, 0.1), Vec2::new(0.0, 1.0)),
    ]
}

/// A narrower, skewed blue quad.
pub fn second_quad() -> [Vertex; 4] {
    let blue = Vec3::new(0.0, 0.0, 1.0);
    [
        Vertex::new(Vec3::new(-0.25, 0.6, 0.0), blue, Vec2::new(1.0, 1.0)),
        Vertex::new(Vec3::new(-0.25, -0.4, 0.0), blue, Vec2::new(1.0, 0.0)),
        Vertex::new(Vec3::new(0.25, -0.6, 0.0), blue, Vec2::new(0.0, 0.0)),
        Vertex::new(Vec3::new(0.25, 0.6, 0.0), blue, Vec2::new(0.0, 1.0)),
    ]
}

/// Advances the rotation angle by `delta_secs`, wrapping past 360 degrees.
pub fn advance_angle(angle: f32, delta_secs: f32) -> f32 {
    let next = angle + DEGREES_PER_SECOND * delta_secs;
    if next > 360.0 { next - 360.0 } else { next }
}

/// Model matrices of both quads for rotation `angle` (degrees).
pub fn model_matrices(angle: f32) -> [Mat4; 2] {
    [
        Mat4::from_rotation_z(angle.to_radians()),
        Mat4::from_rotation_z((-angle * SECOND_QUAD_SPEEDUP).to_radians()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_angle_advances_with_time() {
        assert_eq!(advance_angle(0.0, 1.0), 10.0);
        assert_eq!(advance_angle(5.0, 0.5), 10.0);
    }

    #[test]
    fn test_angle_wraps_past_full_turn() {
        let wrapped = advance_angle(359.0, 0.5);
        assert!((wrapped - 4.0).abs() < 1e-4);
        assert!(advance_angle(350.0, 1.0) <= 360.0);
    }

    #[test]
    fn test_models_rotate_in_opposite_directions() {
        let [first, second] = model_matrices(9.0);
        let x = Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert!((first * x).y > 0.0);
        // -900 degrees is half a turn: x maps to -x.
        let rotated = second * x;
        assert!((rotated.x + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_angle_is_identity() {
        for model in model_matrices(0.0) {
            assert!(model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
        }
    }

    #[test]
    fn test_indices_reference_quad_vertices() {
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < first_quad().len()));
        assert!(QUAD_INDICES.iter().all(|&i| (i as usize) < second_quad().len()));
    }
}
