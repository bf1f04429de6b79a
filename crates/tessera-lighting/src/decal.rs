//! Projected decals.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Floats per packed decal.
pub const DECAL_FLOATS: usize = 28;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlendMode {
    #[default]
    Normal = 0,
    Additive = 1,
    Multiply = 2,
}

/// A box-projected decal. The projection volume is the unit cube in decal
/// space, stretched along z by the projection distance.
#[derive(Clone, Debug, PartialEq)]
pub struct Decal {
    position: Vec3,
    /// Euler angles in degrees, applied X then Y then Z.
    rotation: Vec3,
    scale: Vec3,
    color: Vec4,
    blend_mode: BlendMode,
    projection_distance: f32,
    fade_start: f32,
    fade_end: f32,
    pixel_snapping: bool,
    pixel_size: u32,
    has_diffuse: bool,
    has_normal: bool,
    has_roughness: bool,
}

impl Default for Decal {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
            color: Vec4::ONE,
            blend_mode: BlendMode::Normal,
            projection_distance: 1.0,
            fade_start: 0.8,
            fade_end: 1.0,
            pixel_snapping: true,
            pixel_size: 1,
            has_diffuse: false,
            has_normal: false,
            has_roughness: false,
        }
    }
}

impl Decal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_rotation(&mut self, degrees: Vec3) {
        self.rotation = degrees;
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn set_color(&mut self, color: Vec4) {
        self.color = color;
    }

    pub fn set_blend_mode(&mut self, mode: BlendMode) {
        self.blend_mode = mode;
    }

    pub fn set_projection_distance(&mut self, distance: f32) {
        self.projection_distance = distance.max(0.01);
    }

    /// Keeps `0 <= start <= end <= 1`.
    pub fn set_fade_distance(&mut self, start: f32, end: f32) {
        let start = start.min(end).max(0.0);
        let end = end.max(start).min(1.0);
        self.fade_start = start.min(end);
        self.fade_end = end;
    }

    pub fn set_pixel_snapping(&mut self, enabled: bool) {
        self.pixel_snapping = enabled;
    }

    pub fn set_pixel_size(&mut self, size: u32) {
        self.pixel_size = size.max(1);
    }

    /// Texture presence flags: diffuse, normal, roughness.
    pub fn set_textures(&mut self, diffuse: bool, normal: bool, roughness: bool) {
        self.has_diffuse = diffuse;
        self.has_normal = normal;
        self.has_roughness = roughness;
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn color(&self) -> Vec4 {
        self.color
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    pub fn projection_distance(&self) -> f32 {
        self.projection_distance
    }

    pub fn fade_distance(&self) -> (f32, f32) {
        (self.fade_start, self.fade_end)
    }

    pub fn pixel_snapping(&self) -> bool {
        self.pixel_snapping
    }

    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    /// `T · Rx · Ry · Rz · S`.
    pub fn transform(&self) -> Mat4 {
        let r = self.rotation;
        Mat4::from_translation(self.position)
            * Mat4::from_rotation_x(r.x.to_radians())
            * Mat4::from_rotation_y(r.y.to_radians())
            * Mat4::from_rotation_z(r.z.to_radians())
            * Mat4::from_scale(self.scale)
    }

    pub fn to_gpu(&self) -> DecalGpu {
        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        DecalGpu {
            inverse_transform: self.transform().inverse().to_cols_array(),
            color: self.color.to_array(),
            properties: [
                self.blend_mode as u32 as f32,
                self.projection_distance,
                self.fade_start,
                self.fade_end,
            ],
            textures: [
                flag(self.has_diffuse),
                flag(self.has_normal),
                flag(self.has_roughness),
                if self.pixel_snapping {
                    self.pixel_size as f32
                } else {
                    0.0
                },
            ],
        }
    }
}

/// Packed decal record, 112 bytes, std430-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DecalGpu {
    /// World-to-decal matrix, column-major.
    pub inverse_transform: [f32; 16],
    pub color: [f32; 4],
    /// blend mode, projection distance, fade start, fade end.
    pub properties: [f32; 4],
    /// diffuse, normal, roughness flags; w = pixel size or 0 when snapping is off.
    pub textures: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<DecalGpu>(), DECAL_FLOATS * 4);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let decal = Decal::new();
        assert_eq!(decal.fade_distance(), (0.8, 1.0));
        assert_eq!(decal.projection_distance(), 1.0);
        assert!(decal.pixel_snapping());
        assert_eq!(decal.to_gpu().textures, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_fade_distance_ordering() {
        let mut decal = Decal::new();
        decal.set_fade_distance(0.9, 0.3);
        let (s, e) = decal.fade_distance();
        assert!(s <= e && (0.0..=1.0).contains(&s) && e <= 1.0);

        decal.set_fade_distance(-1.0, 5.0);
        assert_eq!(decal.fade_distance(), (0.0, 1.0));

        decal.set_fade_distance(3.0, 4.0);
        let (s, e) = decal.fade_distance();
        assert!(s <= e && e <= 1.0);
    }

    #[test]
    fn test_clamps() {
        let mut decal = Decal::new();
        decal.set_projection_distance(0.0);
        decal.set_pixel_size(0);
        assert_eq!(decal.projection_distance(), 0.01);
        assert_eq!(decal.pixel_size(), 1);
    }

    #[test]
    fn test_inverse_transform_maps_position_to_origin() {
        let mut decal = Decal::at(Vec3::new(4.0, -2.0, 7.0));
        decal.set_rotation(Vec3::new(30.0, 45.0, 10.0));
        decal.set_scale(Vec3::new(2.0, 1.0, 0.5));
        let gpu = decal.to_gpu();
        let inv = Mat4::from_cols_array(&gpu.inverse_transform);
        let local = inv.transform_point3(decal.position());
        assert!(local.length() < 1e-4);

        let corner = decal.transform().transform_point3(Vec3::splat(0.5));
        assert!((inv.transform_point3(corner) - Vec3::splat(0.5)).length() < 1e-4);
    }

    #[test]
    fn test_packed_properties() {
        let mut decal = Decal::new();
        decal.set_blend_mode(BlendMode::Multiply);
        decal.set_projection_distance(3.0);
        decal.set_pixel_snapping(false);
        decal.set_textures(true, false, true);
        let gpu = decal.to_gpu();
        assert_eq!(gpu.properties, [2.0, 3.0, 0.8, 1.0]);
        assert_eq!(gpu.textures, [1.0, 0.0, 1.0, 0.0]);
        let floats: &[f32] = bytemuck::cast_slice(std::slice::from_ref(&gpu));
        assert_eq!(floats.len(), DECAL_FLOATS);
    }
}
