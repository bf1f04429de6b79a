//! The demo scene: a cube floor with a few pillars, three lights and a decal.

use glam::{IVec3, Vec3, Vec4};
use tessera_config::GridConfig;
use tessera_grid::CubeGrid;
use tessera_lighting::{BlendMode, Decal, Light};
use tessera_render::{Camera, ClusteredLightingPipeline};

const PILLAR_COLOR: Vec3 = Vec3::new(0.55, 0.35, 0.25);
const PILLAR_HEIGHT: i32 = 4;

/// Grid columns of the corner pillars, one cube in from the floor's edge.
fn pillar_range(config: &GridConfig) -> (i32, i32) {
    let size = config.initial_size.max(1) as i32;
    let half = size / 2;
    (-half + 1, size - half - 2)
}

/// Centred floor of `initial_size²` cubes plus a pillar near each corner.
pub fn build_grid(config: &GridConfig) -> CubeGrid {
    let size = config.initial_size.max(1) as i32;
    let mut grid = CubeGrid::new(size, config.spacing);
    if size >= 4 {
        let (lo, hi) = pillar_range(config);
        for (x, z) in [(lo, lo), (hi, lo), (lo, hi), (hi, hi)] {
            for y in 1..=PILLAR_HEIGHT {
                grid.place_cube(x, y, z, PILLAR_COLOR);
            }
        }
    }
    grid
}

/// Just above the middle of the floor, which is centred on the origin.
pub fn scene_center(config: &GridConfig) -> Vec3 {
    Vec3::Y * config.spacing
}

/// A sun, a warm flickering torch over the centre and a spot aimed at one
/// pillar, plus a scorch decal on the floor.
pub fn populate_lights(pipeline: &mut ClusteredLightingPipeline, config: &GridConfig) {
    let center = scene_center(config);
    let extent = config.initial_size.max(1) as f32 * config.spacing;

    let mut sun = Light::directional(Vec3::new(-0.4, -1.0, -0.3));
    sun.set_intensity(0.6);
    pipeline.add_light(sun);

    let mut torch = Light::point(center + Vec3::Y * 2.0, extent * 0.5);
    torch.set_color(Vec3::new(1.0, 0.7, 0.4));
    torch.set_intensity(2.0);
    torch.set_flicker(0.2, 6.0);
    pipeline.add_light(torch);

    let (lo, _) = pillar_range(config);
    let pillar = Vec3::new(lo as f32, 2.0, lo as f32) * config.spacing;
    let spot_position = center + Vec3::Y * 6.0 * config.spacing;
    let mut spot = Light::spot(spot_position, pillar - spot_position);
    spot.set_spot_angles(15.0, 30.0);
    spot.set_range(extent);
    pipeline.add_light(spot);

    let mut scorch = Decal::at(center + Vec3::new(2.0, 0.0, 2.0) * config.spacing);
    scorch.set_scale(Vec3::new(3.0, 1.0, 3.0) * config.spacing);
    scorch.set_color(Vec4::new(0.1, 0.08, 0.05, 0.8));
    scorch.set_blend_mode(BlendMode::Multiply);
    pipeline.add_decal(scorch);
}

/// Camera circling the scene centre, `frame` steps of 15° apart.
pub fn orbit_camera(config: &GridConfig, frame: u32, aspect_ratio: f32) -> Camera {
    let center = scene_center(config);
    let radius = config.initial_size.max(1) as f32 * config.spacing;
    let angle = (frame as f32 * 15.0).to_radians();
    let eye = center + Vec3::new(angle.cos() * radius, radius * 0.6, angle.sin() * radius);
    Camera::looking_at(eye, center, aspect_ratio)
}

/// Grid cell under the camera, used to centre chunk streaming.
pub fn camera_cell(grid: &CubeGrid, camera: &Camera) -> IVec3 {
    grid.grid().world_to_grid(camera.position)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_has_floor_and_pillars() {
        let config = GridConfig::default();
        let grid = build_grid(&config);
        assert_eq!(grid.total_active_cube_count(), 16 * 16 + 4 * PILLAR_HEIGHT as usize);
        assert!(grid.is_cube_active(-7, PILLAR_HEIGHT, 6));
        assert!(!grid.is_cube_active(-7, PILLAR_HEIGHT + 1, 6));
    }

    #[test]
    fn test_small_grid_skips_pillars() {
        let config = GridConfig {
            initial_size: 2,
            ..GridConfig::default()
        };
        assert_eq!(build_grid(&config).total_active_cube_count(), 4);
    }

    #[test]
    fn test_orbit_camera_faces_center() {
        let config = GridConfig::default();
        let center = scene_center(&config);
        for frame in 0..4 {
            let camera = orbit_camera(&config, frame, 16.0 / 9.0);
            let to_center = (center - camera.position).normalize();
            assert!(camera.forward().dot(to_center) > 0.999);
        }
    }
}
