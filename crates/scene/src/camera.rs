//! Perspective camera producing Vulkan-ready matrices.

use glam::{Mat4, Vec3};

/// Right-handed look-at camera with a perspective projection.
#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov_y_degrees: 45.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Camera {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            fov_y_degrees,
            aspect,
            near,
            far,
            ..Self::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = position;
        self
    }

    pub fn look_at(mut self, target: Vec3) -> Self {
        self.target = target;
        self
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Projection into Vulkan clip space (Y down, depth 0..1).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_default_parameters() {
        let camera = Camera::default();
        assert_eq!(camera.fov_y_degrees, 45.0);
        assert_eq!(camera.near, 0.1);
        assert_eq!(camera.far, 1000.0);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::perspective(45.0, 1.0, 0.1, 100.0);
        let gl_style = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let proj = camera.projection_matrix();

        assert_eq!(proj.y_axis.y, -gl_style.y_axis.y);
        assert_eq!(proj.x_axis, gl_style.x_axis);
        assert_eq!(proj.z_axis, gl_style.z_axis);
    }

    #[test]
    fn test_point_above_target_maps_to_negative_clip_y() {
        let camera = Camera::perspective(45.0, 1.0, 0.1, 100.0).with_position(Vec3::new(0.0, 0.0, 2.0));
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.5, 0.0, 1.0);
        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_target_depth_in_unit_range() {
        let camera = Camera::default();
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let depth = clip.z / clip.w;
        assert!(depth > 0.0 && depth < 1.0);
    }
}
