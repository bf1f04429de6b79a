//! Camera for view and projection matrix generation.
//!
//! Projections use the standard wgpu depth range: the near plane maps to
//! `z = 0` and the far plane to `z = 1`. Cluster construction relies on this
//! when it unprojects tile corners.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

/// Uniform buffer for the camera: view-projection matrix and eye position.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    /// Rotation as a unit quaternion. Identity looks down -Z.
    pub rotation: Quat,
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
}

#[derive(Debug, Clone)]
pub enum Projection {
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    Orthographic {
        half_width: f32,
        half_height: f32,
    },
}

impl Camera {
    /// Perspective camera at `position` looking at `target`.
    pub fn looking_at(position: Vec3, target: Vec3, aspect_ratio: f32) -> Self {
        let mut camera = Self {
            position,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                aspect_ratio,
            },
            ..Self::default()
        };
        camera.look_at(target);
        camera
    }

    /// Rotate to face `target`. No-op if the target coincides with the eye.
    pub fn look_at(&mut self, target: Vec3) {
        let Some(dir) = (target - self.position).try_normalize() else {
            return;
        };
        let up = if dir.abs_diff_eq(Vec3::Y, 1e-4) || dir.abs_diff_eq(Vec3::NEG_Y, 1e-4) {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_to_rh(Vec3::ZERO, dir, up);
        self.rotation = Quat::from_mat4(&view.inverse());
    }

    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * Mat4::from_quat(self.rotation)).inverse()
    }

    pub fn projection_matrix(&self) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => Mat4::perspective_rh(*fov_y, *aspect_ratio, self.near, self.far),
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                self.near,
                self.far,
            ),
        }
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    pub fn right(&self) -> Vec3 {
        self.rotation * Vec3::X
    }

    /// Update the aspect ratio for perspective projection.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect_ratio, .. } = &mut self.projection {
            *aspect_ratio = width / height.max(1.0);
        }
    }

    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_projection_matrix().to_cols_array_2d(),
            camera_pos: self.position.extend(1.0).to_array(),
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.1,
            far: 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_default_looks_down_negative_z() {
        let camera = Camera::default();
        assert!((camera.forward() - Vec3::NEG_Z).length() < 1e-6);
        assert!((camera.up() - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_depth_range_is_zero_to_one() {
        let camera = Camera::default();
        let vp = camera.view_projection_matrix();
        let near = vp * Vec4::new(0.0, 0.0, -camera.near, 1.0);
        let far = vp * Vec4::new(0.0, 0.0, -camera.far, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_look_at_faces_target() {
        let camera = Camera::looking_at(Vec3::new(0.0, 5.0, 10.0), Vec3::ZERO, 1.0);
        let expected = (Vec3::ZERO - camera.position).normalize();
        assert!((camera.forward() - expected).length() < 1e-4);
        let clip = camera.view_projection_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-4 && (clip.y / clip.w).abs() < 1e-4);
    }

    #[test]
    fn test_look_at_straight_down() {
        let mut camera = Camera {
            position: Vec3::new(0.0, 10.0, 0.0),
            ..Camera::default()
        };
        camera.look_at(Vec3::ZERO);
        assert!((camera.forward() - Vec3::NEG_Y).length() < 1e-4);
    }

    #[test]
    fn test_set_aspect_ratio() {
        let mut camera = Camera::default();
        camera.set_aspect_ratio(800.0, 400.0);
        match camera.projection {
            Projection::Perspective { aspect_ratio, .. } => assert_eq!(aspect_ratio, 2.0),
            Projection::Orthographic { .. } => panic!("expected perspective"),
        }
    }

    #[test]
    fn test_camera_uniform_size() {
        assert_eq!(std::mem::size_of::<CameraUniform>(), 80);
    }
}
