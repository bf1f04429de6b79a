//! Time of day, weather and atmosphere parameters.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WeatherParameters {
    pub rain_intensity: f32,
    pub snow_intensity: f32,
    pub fog_density: f32,
    pub fog_color: Vec3,
    pub wind_speed: f32,
    pub wind_direction: Vec3,
}

impl Default for WeatherParameters {
    fn default() -> Self {
        Self {
            rain_intensity: 0.0,
            snow_intensity: 0.0,
            fog_density: 0.05,
            fog_color: Vec3::new(0.8, 0.9, 1.0),
            wind_speed: 1.0,
            wind_direction: Vec3::X,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtmosphereSettings {
    pub rayleigh_scattering: f32,
    pub mie_scattering: f32,
    pub exposure: f32,
    pub sky_tint: Vec3,
    pub enabled: bool,
}

impl Default for AtmosphereSettings {
    fn default() -> Self {
        Self {
            rayleigh_scattering: 1.0,
            mie_scattering: 1.0,
            exposure: 1.0,
            sky_tint: Vec3::ONE,
            enabled: true,
        }
    }
}

/// Everything the shading pass needs to know about the sky and the air.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Environment {
    /// Hours, `[0, 24)`.
    pub time_of_day: f32,
    pub weather: WeatherParameters,
    pub atmosphere: AtmosphereSettings,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            time_of_day: 12.0,
            weather: WeatherParameters::default(),
            atmosphere: AtmosphereSettings::default(),
        }
    }
}

impl Environment {
    /// Wraps `hours` into `[0, 24)`.
    pub fn set_time_of_day(&mut self, hours: f32) {
        self.time_of_day = hours.rem_euclid(24.0);
    }

    pub fn to_uniform(&self) -> EnvironmentUniform {
        let w = &self.weather;
        let a = &self.atmosphere;
        EnvironmentUniform {
            fog_color_density: w.fog_color.extend(w.fog_density).to_array(),
            sky_tint_time: a.sky_tint.extend(self.time_of_day).to_array(),
            scattering: [
                a.rayleigh_scattering,
                a.mie_scattering,
                a.exposure,
                if a.enabled { 1.0 } else { 0.0 },
            ],
            wind: w.wind_direction.extend(w.wind_speed).to_array(),
            precipitation: [w.rain_intensity, w.snow_intensity, 0.0, 0.0],
        }
    }
}

/// GPU-side environment block, 80 bytes, std140-compatible.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct EnvironmentUniform {
    /// rgb = fog color, w = fog density.
    pub fog_color_density: [f32; 4],
    /// rgb = sky tint, w = time of day in hours.
    pub sky_tint_time: [f32; 4],
    /// rayleigh, mie, exposure, atmosphere enabled flag.
    pub scattering: [f32; 4],
    /// xyz = wind direction, w = wind speed.
    pub wind: [f32; 4],
    /// rain, snow, padding.
    pub precipitation: [f32; 4],
}

static_assertions::const_assert_eq!(std::mem::size_of::<EnvironmentUniform>(), 80);
