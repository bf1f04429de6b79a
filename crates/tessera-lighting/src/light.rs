//! Typed light sources and their packed GPU form.
//!
//! A [`Light`] carries every parameter of every kind; setters for
//! kind-specific parameters are ignored on lights of another kind. Packing
//! produces a fixed 16-float [`LightGpu`] record regardless of kind.

use std::path::{Path, PathBuf};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Floats per packed light.
pub const LIGHT_FLOATS: usize = 16;

/// Light kind. The discriminant is written into the packed record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    Directional = 0,
    Point = 1,
    Spot = 2,
    Area = 3,
    Volumetric = 4,
}

impl LightKind {
    pub fn ordinal(self) -> f32 {
        self as u32 as f32
    }

    fn default_range(self) -> f32 {
        match self {
            LightKind::Directional => f32::MAX,
            LightKind::Point => 10.0,
            LightKind::Spot => 15.0,
            LightKind::Area => 5.0,
            LightKind::Volumetric => 8.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Light {
    kind: LightKind,
    position: Vec3,
    color: Vec3,
    intensity: f32,
    range: f32,
    cast_shadows: bool,
    direction: Vec3,
    /// Radians.
    spot_inner: f32,
    /// Radians.
    spot_outer: f32,
    area_size: Vec2,
    volumetric_density: f32,
    volumetric_scattering: f32,
    ies_profile: Option<PathBuf>,
    flicker_amount: f32,
    flicker_speed: f32,
    flicker_time: f32,
    flicker_value: f32,
}

impl Light {
    pub fn new(kind: LightKind) -> Self {
        Self {
            kind,
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 1.0,
            range: kind.default_range(),
            cast_shadows: false,
            direction: Vec3::NEG_Y,
            spot_inner: 30f32.to_radians(),
            spot_outer: 45f32.to_radians(),
            area_size: Vec2::ONE,
            volumetric_density: 0.1,
            volumetric_scattering: 0.5,
            ies_profile: None,
            flicker_amount: 0.0,
            flicker_speed: 0.0,
            flicker_time: 0.0,
            flicker_value: 1.0,
        }
    }

    pub fn directional(direction: Vec3) -> Self {
        let mut light = Self::new(LightKind::Directional);
        light.set_direction(direction);
        light
    }

    pub fn point(position: Vec3, range: f32) -> Self {
        let mut light = Self::new(LightKind::Point);
        light.set_position(position);
        light.set_range(range);
        light
    }

    pub fn spot(position: Vec3, direction: Vec3) -> Self {
        let mut light = Self::new(LightKind::Spot);
        light.set_position(position);
        light.set_direction(direction);
        light
    }

    // ---- Setters ----

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_color(&mut self, color: Vec3) {
        self.color = color;
    }

    /// Negative intensities clamp to zero.
    pub fn set_intensity(&mut self, intensity: f32) {
        self.intensity = intensity.max(0.0);
    }

    /// Ranges below 0.1 clamp to 0.1.
    pub fn set_range(&mut self, range: f32) {
        self.range = range.max(0.1);
    }

    pub fn set_cast_shadows(&mut self, cast_shadows: bool) {
        self.cast_shadows = cast_shadows;
    }

    /// Directional and spot lights only. Zero vectors are ignored.
    pub fn set_direction(&mut self, direction: Vec3) {
        if !matches!(self.kind, LightKind::Directional | LightKind::Spot) {
            return;
        }
        match direction.try_normalize() {
            Some(dir) => self.direction = dir,
            None => tracing::warn!("ignoring zero light direction"),
        }
    }

    /// Spot lights only. Angles in degrees; the smaller becomes the inner cone.
    pub fn set_spot_angles(&mut self, inner_deg: f32, outer_deg: f32) {
        if self.kind != LightKind::Spot {
            return;
        }
        self.spot_inner = inner_deg.min(outer_deg).to_radians();
        self.spot_outer = inner_deg.max(outer_deg).to_radians();
    }

    /// Area lights only. Each axis is at least 0.01.
    pub fn set_area_size(&mut self, size: Vec2) {
        if self.kind == LightKind::Area {
            self.area_size = size.max(Vec2::splat(0.01));
        }
    }

    /// Volumetric lights only. Both values clamp to `[0, 1]`.
    pub fn set_volumetric_parameters(&mut self, density: f32, scattering: f32) {
        if self.kind == LightKind::Volumetric {
            self.volumetric_density = density.clamp(0.0, 1.0);
            self.volumetric_scattering = scattering.clamp(0.0, 1.0);
        }
    }

    /// Attach an IES profile by path. The profile itself is loaded by the
    /// asset layer; the packed record only carries a presence flag.
    pub fn set_ies_profile(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.ies_profile = if path.as_os_str().is_empty() {
            None
        } else {
            Some(path.to_path_buf())
        };
    }

    /// `amount` clamps to `[0, 1]`; zero disables flicker.
    pub fn set_flicker(&mut self, amount: f32, speed: f32) {
        self.flicker_amount = amount.clamp(0.0, 1.0);
        self.flicker_speed = speed;
        if self.flicker_amount == 0.0 {
            self.flicker_value = 1.0;
        }
    }

    // ---- Getters ----

    pub fn kind(&self) -> LightKind {
        self.kind
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn color(&self) -> Vec3 {
        self.color
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn range(&self) -> f32 {
        self.range
    }

    pub fn casts_shadows(&self) -> bool {
        self.cast_shadows
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// `(inner, outer)` in radians.
    pub fn spot_angles(&self) -> (f32, f32) {
        (self.spot_inner, self.spot_outer)
    }

    pub fn area_size(&self) -> Vec2 {
        self.area_size
    }

    /// `(density, scattering)`.
    pub fn volumetric_parameters(&self) -> (f32, f32) {
        (self.volumetric_density, self.volumetric_scattering)
    }

    pub fn ies_profile(&self) -> Option<&Path> {
        self.ies_profile.as_deref()
    }

    /// `(amount, speed)`.
    pub fn flicker(&self) -> (f32, f32) {
        (self.flicker_amount, self.flicker_speed)
    }

    /// Current intensity multiplier in `[1 - amount, 1]`.
    pub fn flicker_modifier(&self) -> f32 {
        self.flicker_value
    }

    // ---- Simulation ----

    /// Advances flicker by `dt` seconds.
    pub fn update(&mut self, dt: f32) {
        if self.flicker_amount <= 0.0 {
            return;
        }
        self.flicker_time += dt * self.flicker_speed;
        let t = self.flicker_time;
        let noise = (t.sin() + 0.5 * (t * 2.7).sin() + 0.25 * (t * 4.3).sin()) / 1.75;
        self.flicker_value = 1.0 - (noise * 0.5 + 0.5) * self.flicker_amount;
    }

    /// Stepped falloff for the pixel-art look: `1 / (1 + d²)` with
    /// `d = distance / range`, floored to eighths, zero at or past the range.
    pub fn pixel_art_attenuation(&self, distance: f32) -> f32 {
        const STEPS: f32 = 8.0;
        let d = (distance / self.range).max(0.0);
        if d >= 1.0 {
            return 0.0;
        }
        let falloff = 1.0 / (1.0 + d * d);
        (falloff * STEPS).floor() / STEPS
    }

    // ---- Packing ----

    pub fn to_gpu(&self) -> LightGpu {
        let shadow = flag(self.cast_shadows);
        let ies = flag(self.ies_profile.is_some());
        let params = match self.kind {
            LightKind::Directional => [0.0, 0.0, 0.0, shadow],
            LightKind::Point => [ies, 0.0, 0.0, shadow],
            LightKind::Spot => [self.spot_inner.cos(), self.spot_outer.cos(), ies, shadow],
            LightKind::Area => [self.area_size.x, self.area_size.y, 0.0, shadow],
            LightKind::Volumetric => [
                self.volumetric_density,
                self.volumetric_scattering,
                0.0,
                shadow,
            ],
        };

        LightGpu {
            position_kind: self.position.extend(self.kind.ordinal()).to_array(),
            color_intensity: self
                .color
                .extend(self.intensity * self.flicker_value)
                .to_array(),
            direction_range: self.direction.extend(self.range).to_array(),
            params,
        }
    }
}

fn flag(on: bool) -> f32 {
    if on { 1.0 } else { 0.0 }
}

/// Packed light record, 64 bytes, std430-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightGpu {
    /// xyz = position, w = kind ordinal.
    pub position_kind: [f32; 4],
    /// rgb = color, w = intensity with flicker applied.
    pub color_intensity: [f32; 4],
    /// xyz = direction, w = range.
    pub direction_range: [f32; 4],
    /// Kind-specific parameters; w is always the shadow flag.
    pub params: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<LightGpu>(), LIGHT_FLOATS * 4);

impl LightGpu {
    pub fn as_floats(&self) -> &[f32; LIGHT_FLOATS] {
        bytemuck::cast_ref(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_by_kind() {
        assert_eq!(Light::new(LightKind::Directional).range(), f32::MAX);
        assert_eq!(Light::new(LightKind::Point).range(), 10.0);
        assert_eq!(Light::new(LightKind::Spot).range(), 15.0);
        assert_eq!(Light::new(LightKind::Area).range(), 5.0);
        assert_eq!(Light::new(LightKind::Volumetric).range(), 8.0);
        let light = Light::new(LightKind::Point);
        assert_eq!(light.color(), Vec3::ONE);
        assert_eq!(light.direction(), Vec3::NEG_Y);
        assert!(!light.casts_shadows());
    }

    #[test]
    fn test_point_light_packs_position_and_kind_first() {
        let light = Light::point(Vec3::new(0.0, 5.0, 0.0), 10.0);
        let gpu = light.to_gpu();
        assert_eq!(&gpu.as_floats()[..4], &[0.0, 5.0, 0.0, 1.0]);
        assert_eq!(gpu.direction_range[3], 10.0);
    }

    #[test]
    fn test_setters_clamp() {
        let mut light = Light::new(LightKind::Point);
        light.set_intensity(-3.0);
        light.set_range(0.0);
        assert_eq!(light.intensity(), 0.0);
        assert_eq!(light.range(), 0.1);

        light.set_flicker(4.0, 1.0);
        assert_eq!(light.flicker().0, 1.0);
    }

    #[test]
    fn test_kind_gated_setters() {
        let mut point = Light::new(LightKind::Point);
        point.set_direction(Vec3::X);
        point.set_spot_angles(10.0, 20.0);
        assert_eq!(point.direction(), Vec3::NEG_Y);
        assert_eq!(point.spot_angles(), Light::new(LightKind::Point).spot_angles());

        let mut spot = Light::new(LightKind::Spot);
        spot.set_direction(Vec3::new(0.0, 0.0, -4.0));
        assert_eq!(spot.direction(), Vec3::NEG_Z);
        spot.set_spot_angles(50.0, 20.0);
        let (inner, outer) = spot.spot_angles();
        assert!((inner - 20f32.to_radians()).abs() < 1e-6);
        assert!((outer - 50f32.to_radians()).abs() < 1e-6);

        let mut area = Light::new(LightKind::Area);
        area.set_area_size(Vec2::new(0.0, 3.0));
        assert_eq!(area.area_size(), Vec2::new(0.01, 3.0));

        let mut vol = Light::new(LightKind::Volumetric);
        vol.set_volumetric_parameters(2.0, -1.0);
        assert_eq!(vol.volumetric_parameters(), (1.0, 0.0));
    }

    #[test]
    fn test_kind_specific_parameters() {
        let mut spot = Light::spot(Vec3::ZERO, Vec3::NEG_Y);
        spot.set_cast_shadows(true);
        let params = spot.to_gpu().params;
        assert!((params[0] - 30f32.to_radians().cos()).abs() < 1e-6);
        assert!((params[1] - 45f32.to_radians().cos()).abs() < 1e-6);
        assert_eq!(params[2], 0.0);
        assert_eq!(params[3], 1.0);

        let mut point = Light::new(LightKind::Point);
        point.set_ies_profile("lamp.ies");
        assert_eq!(point.to_gpu().params, [1.0, 0.0, 0.0, 0.0]);
        point.set_ies_profile("");
        assert!(point.ies_profile().is_none());

        let area = Light::new(LightKind::Area);
        assert_eq!(area.to_gpu().params, [1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_flicker_stays_in_range() {
        let mut light = Light::new(LightKind::Point);
        light.set_intensity(2.0);
        light.set_flicker(0.4, 3.0);
        for _ in 0..200 {
            light.update(0.016);
            let m = light.flicker_modifier();
            assert!((0.6 - 1e-5..=1.0 + 1e-5).contains(&m), "modifier {m}");
            let packed = light.to_gpu().color_intensity[3];
            assert!((packed - 2.0 * m).abs() < 1e-6);
        }
    }

    #[test]
    fn test_no_flicker_without_amount() {
        let mut light = Light::new(LightKind::Point);
        light.update(1.0);
        assert_eq!(light.flicker_modifier(), 1.0);
    }

    #[test]
    fn test_pixel_art_attenuation_is_stepped() {
        let light = Light::point(Vec3::ZERO, 10.0);
        assert_eq!(light.pixel_art_attenuation(0.0), 1.0);
        assert_eq!(light.pixel_art_attenuation(10.0), 0.0);
        assert_eq!(light.pixel_art_attenuation(50.0), 0.0);
        for d in [1.0, 3.3, 7.7, 9.9] {
            let a = light.pixel_art_attenuation(d);
            assert_eq!((a * 8.0).fract(), 0.0, "not quantised at {d}: {a}");
        }
        assert!(light.pixel_art_attenuation(2.0) >= light.pixel_art_attenuation(8.0));
    }
}
