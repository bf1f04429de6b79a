//! View-frustum planes extracted from a view-projection matrix.
//!
//! Shared by chunk-level voxel culling and by the cluster debug overlay. All
//! tests are conservative: an object straddling a plane is never reported
//! outside.

use glam::{Mat4, Vec3, Vec4};

use crate::aabb::Aabb;

/// Index of each plane inside [`Frustum::planes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrustumPlane {
    Left = 0,
    Right = 1,
    Bottom = 2,
    Top = 3,
    Near = 4,
    Far = 5,
}

/// A plane `normal · p + distance = 0` with an inward-pointing unit normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub distance: f32,
}

impl Plane {
    /// Build a plane from `(a, b, c, d)` coefficients, normalizing by the
    /// length of `(a, b, c)`. Degenerate coefficients are kept as-is.
    pub fn from_coefficients(coefficients: Vec4) -> Self {
        let normal = coefficients.truncate();
        let len = normal.length();
        if len > 0.0 {
            Self {
                normal: normal / len,
                distance: coefficients.w / len,
            }
        } else {
            Self {
                normal,
                distance: coefficients.w,
            }
        }
    }

    /// Signed distance from the plane; positive on the inside.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// Six inward-facing planes: left, right, bottom, top, near, far.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extract the planes with the Gribb-Hartmann method.
    ///
    /// Expects the wgpu clip-space convention where depth spans `[0, w]`, so
    /// the near plane is row 2 alone and the far plane is `row3 - row2`.
    pub fn from_view_projection(vp: &Mat4) -> Self {
        let r0 = vp.row(0);
        let r1 = vp.row(1);
        let r2 = vp.row(2);
        let r3 = vp.row(3);

        Self {
            planes: [
                Plane::from_coefficients(r3 + r0),
                Plane::from_coefficients(r3 - r0),
                Plane::from_coefficients(r3 + r1),
                Plane::from_coefficients(r3 - r1),
                Plane::from_coefficients(r2),
                Plane::from_coefficients(r3 - r2),
            ],
        }
    }

    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    pub fn plane(&self, which: FrustumPlane) -> &Plane {
        &self.planes[which as usize]
    }

    /// True iff the point is on the inner side of every plane.
    pub fn is_point_inside(&self, point: Vec3) -> bool {
        self.planes.iter().all(|p| p.signed_distance(point) >= 0.0)
    }

    /// True iff the sphere lies entirely behind at least one plane.
    pub fn is_sphere_outside(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .any(|p| p.signed_distance(center) < -radius)
    }

    pub fn is_sphere_visible(&self, center: Vec3, radius: f32) -> bool {
        !self.is_sphere_outside(center, radius)
    }

    /// Box rejection: a bounding-sphere test first, then a per-plane test of
    /// all eight corners. A box is only rejected when every corner is behind
    /// the same plane, so boxes crossing a frustum corner diagonally may be
    /// kept even though they are outside.
    pub fn is_box_outside(&self, min: Vec3, max: Vec3) -> bool {
        let aabb = Aabb::new(min, max);
        if self.is_sphere_outside(aabb.center(), aabb.half_diagonal()) {
            return true;
        }

        let corners = aabb.corners();
        self.planes
            .iter()
            .any(|plane| corners.iter().all(|c| plane.signed_distance(*c) < 0.0))
    }

    pub fn is_aabb_outside(&self, aabb: &Aabb) -> bool {
        self.is_box_outside(aabb.min, aabb.max)
    }

    /// Visibility of an axis-aligned cube of edge `size` centered on `center`.
    pub fn is_cube_visible(&self, center: Vec3, size: f32) -> bool {
        let half = Vec3::splat(size * 0.5);
        !self.is_box_outside(center - half, center + half)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAR: f32 = 100.0;

    /// Camera at the origin looking down +Z with a 100-unit far plane.
    fn forward_z_vp() -> Mat4 {
        let view = Mat4::look_to_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, FAR);
        proj * view
    }

    #[test]
    fn test_planes_are_normalized() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        for plane in frustum.planes() {
            let len = plane.normal.length();
            assert!((len - 1.0).abs() < 1e-4, "plane normal not normalized: {len}");
        }
    }

    #[test]
    fn test_point_inside_and_outside() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        assert!(frustum.is_point_inside(Vec3::new(0.0, 0.0, 10.0)));
        assert!(!frustum.is_point_inside(Vec3::new(0.0, 0.0, -10.0)));
        assert!(!frustum.is_point_inside(Vec3::new(0.0, 0.0, 0.01)));
        assert!(!frustum.is_point_inside(Vec3::new(0.0, 0.0, FAR + 1.0)));
    }

    #[test]
    fn test_near_and_far_planes_face_inward() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        let near = frustum.plane(FrustumPlane::Near);
        let far = frustum.plane(FrustumPlane::Far);
        assert!((near.signed_distance(Vec3::new(0.0, 0.0, 0.1))).abs() < 1e-3);
        assert!((far.signed_distance(Vec3::new(0.0, 0.0, FAR))).abs() < 1e-2);
        assert!(near.normal.z > 0.99);
        assert!(far.normal.z < -0.99);
    }

    #[test]
    fn test_box_beyond_far_plane_is_outside() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        let min = Vec3::new(-1.0, -1.0, 1000.0);
        let max = Vec3::new(1.0, 1.0, 1000.0);
        assert!(frustum.is_box_outside(min, max));
    }

    #[test]
    fn test_box_straddling_origin_in_view_is_kept() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 1.0, 0.1, FAR);
        let frustum = Frustum::from_view_projection(&(proj * view));
        assert!(!frustum.is_box_outside(Vec3::splat(-1.0), Vec3::splat(1.0)));
        assert!(frustum.is_cube_visible(Vec3::ZERO, 2.0));
    }

    #[test]
    fn test_box_crossing_side_plane_is_kept() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        let aabb = Aabb::new(Vec3::new(-500.0, -1.0, 10.0), Vec3::new(0.5, 1.0, 12.0));
        assert!(!frustum.is_aabb_outside(&aabb));
    }

    #[test]
    fn test_sphere_past_far_plane_is_outside() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        assert!(frustum.is_sphere_outside(Vec3::new(0.0, 0.0, 200.0), 1.0));
        assert!(!frustum.is_sphere_outside(Vec3::new(0.0, 0.0, 50.0), 1.0));
    }

    #[test]
    fn test_sphere_straddling_plane_is_not_outside() {
        let frustum = Frustum::from_view_projection(&forward_z_vp());
        // Centered just behind the far plane but reaching back inside.
        assert!(!frustum.is_sphere_outside(Vec3::new(0.0, 0.0, FAR + 2.0), 5.0));
        assert!(frustum.is_sphere_visible(Vec3::new(0.0, 0.0, FAR + 2.0), 5.0));
    }

    #[test]
    fn test_degenerate_plane_is_left_unscaled() {
        let plane = Plane::from_coefficients(Vec4::new(0.0, 0.0, 0.0, 2.0));
        assert_eq!(plane.normal, Vec3::ZERO);
        assert_eq!(plane.distance, 2.0);
    }
}
