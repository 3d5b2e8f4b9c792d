//! Object transforms.

use glam::{Mat4, Quat, Vec3};

/// Position, rotation and scale of one object.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotation of `radians_per_second * seconds` about `axis`.
    pub fn spinning(axis: Vec3, radians_per_second: f32, seconds: f32) -> Self {
        Self::new().with_rotation(Quat::from_axis_angle(
            axis.normalize_or(Vec3::Z),
            radians_per_second * seconds,
        ))
    }

    /// Scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_default_is_identity() {
        assert_eq!(Transform::default().matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_applies_scale_then_translation() {
        let transform = Transform::new()
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0));
        let point = transform.matrix().transform_point3(Vec3::ONE);
        assert!(approx_eq(point, Vec3::new(3.0, 4.0, 5.0)));
    }

    #[test]
    fn test_spinning_quarter_turn() {
        let transform = Transform::spinning(Vec3::Z, std::f32::consts::FRAC_PI_2, 1.0);
        let rotated = transform.matrix().transform_vector3(Vec3::X);
        assert!(approx_eq(rotated, Vec3::Y));
    }

    #[test]
    fn test_spinning_zero_axis_falls_back_to_z() {
        let transform = Transform::spinning(Vec3::ZERO, std::f32::consts::PI, 1.0);
        let rotated = transform.matrix().transform_vector3(Vec3::X);
        assert!(approx_eq(rotated, Vec3::NEG_X));
    }
}
