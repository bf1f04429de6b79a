//! Light and decal descriptions, the generational arena that owns them, and
//! the environment parameters that feed the clustered shading pass.

pub mod arena;
mod decal;
mod environment;
mod light;

pub use arena::{Arena, Handle};
pub use decal::{BlendMode, DECAL_FLOATS, Decal, DecalGpu};
pub use environment::{AtmosphereSettings, Environment, EnvironmentUniform, WeatherParameters};
pub use light::{LIGHT_FLOATS, Light, LightGpu, LightKind};

/// Handle to a light owned by a pipeline.
pub type LightHandle = Handle<Light>;

/// Handle to a decal owned by a pipeline.
pub type DecalHandle = Handle<Decal>;
