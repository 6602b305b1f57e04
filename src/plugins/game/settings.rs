//! Tunable settings, loaded from `assets/settings.json`. Every field has a
//! sensible default and a missing or malformed file degrades to those
//! defaults with a warning rather than failing startup.

use std::path::Path;

use bevy::prelude::*;
use serde::Deserialize;

pub const SETTINGS_PATH: &str = "assets/settings.json";

#[derive(Debug, Clone, Default, Deserialize, Resource)]
#[serde(default)]
pub struct GameSettings {
    pub terrain: TerrainSettings,
    pub portals: PortalSettings,
    pub projectile: ProjectileSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TerrainSettings {
    /// Grid cell counts; the vertex grid is one larger on each axis.
    pub x_size: u32,
    pub z_size: u32,
    /// World-space size of one grid cell.
    pub scale: f32,
    pub uv_scale: f32,
    pub noise_scale: f32,
    pub height_multiplier: f32,
    pub seed: u32,
    /// World-space radius affected by one projectile impact.
    pub crater_radius: f32,
    /// Displacement subtracted from affected vertices, as `[x, y, z]`.
    pub crater_depth: [f32; 3],
}

impl Default for TerrainSettings {
    fn default() -> Self {
        TerrainSettings {
            x_size: 50,
            z_size: 50,
            scale: 1.0,
            uv_scale: 0.25,
            noise_scale: 0.08,
            height_multiplier: 2.5,
            seed: 415,
            crater_radius: 1.5,
            crater_depth: [0.0, 0.4, 0.0],
        }
    }
}

impl TerrainSettings {
    pub fn crater_depth_vec(&self) -> Vec3 {
        Vec3::from_array(self.crater_depth)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    /// Seconds an actor is suppressed after a crossing.
    pub cooldown_seconds: f32,
    /// Square render target edge, in pixels.
    pub render_target_size: u32,
    /// Portal surface half-extents.
    pub half_width: f32,
    pub half_height: f32,
    /// How far above the sampled terrain vertex the portal center sits.
    pub spawn_height: f32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        PortalSettings {
            cooldown_seconds: 1.0,
            render_target_size: 256,
            half_width: 0.9,
            half_height: 1.4,
            spawn_height: 1.6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProjectileSettings {
    pub speed: f32,
    pub radius: f32,
    /// Seconds an impact decal stays around.
    pub decal_lifetime: f32,
    pub decal_radius: f32,
}

impl Default for ProjectileSettings {
    fn default() -> Self {
        ProjectileSettings {
            speed: 25.0,
            radius: 0.08,
            decal_lifetime: 12.0,
            decal_radius: 0.35,
        }
    }
}

impl GameSettings {
    /// Read settings from disk, falling back to defaults on any failure.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(err) => {
                    warn!("Failed to parse {}: {err}; using defaults", path.display());
                    GameSettings::default()
                }
            },
            Err(err) => {
                warn!("Failed to read {}: {err}; using defaults", path.display());
                GameSettings::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_document_fills_in_defaults() {
        let settings: GameSettings = serde_json::from_str(
            r#"{ "terrain": { "x_size": 8, "z_size": 4 }, "portals": { "cooldown_seconds": 2.5 } }"#,
        )
        .unwrap();
        assert_eq!(settings.terrain.x_size, 8);
        assert_eq!(settings.terrain.z_size, 4);
        assert_eq!(settings.terrain.scale, TerrainSettings::default().scale);
        assert_eq!(settings.portals.cooldown_seconds, 2.5);
        assert_eq!(
            settings.projectile.speed,
            ProjectileSettings::default().speed
        );
    }

    #[test]
    fn missing_file_degrades_to_defaults() {
        let settings = GameSettings::load("does/not/exist.json");
        assert_eq!(settings.terrain.x_size, TerrainSettings::default().x_size);
    }

    #[test]
    fn crater_depth_converts_to_vec3() {
        let terrain = TerrainSettings {
            crater_depth: [0.0, 0.4, 0.0],
            ..default()
        };
        assert_eq!(terrain.crater_depth_vec(), Vec3::new(0.0, 0.4, 0.0));
    }
}
