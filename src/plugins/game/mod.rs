use std::f32::consts::*;

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;

use crate::plugins::*;

use self::settings::{GameSettings, SETTINGS_PATH};
use first_person_controller::FirstPersonControllerBundle;

pub mod settings;

/// Main game plugin, responsible for loading the other game plugins and
/// bootstrapping the game.
#[derive(Debug)]
pub struct GamePlugin;

/// Coarse app state: terrain generation happens during `Loading`, gameplay
/// systems only run once `InGame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    Loading,
    InGame,
}

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(GameSettings::load(SETTINGS_PATH));
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: "Portal Sandbox".to_string(),
                width: 1280.,
                height: 720.,
                ..default()
            },
            ..default()
        }));

        #[cfg(feature = "editor")]
        {
            app.add_plugins(dev_plugins::DeveloperPlugins);
        }
        #[cfg(feature = "bevy_prototype_debug_lines")]
        {
            app.add_plugin(bevy_prototype_debug_lines::DebugLinesPlugin::default());
            app.add_plugin(debug::DebugOverlayPlugin);
        }

        app.add_loopless_state(GameState::Loading);

        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default());
        app.add_plugin(physics::PhysicsPlugin);
        app.add_plugin(input::InputPlugin);
        app.add_plugin(first_person_controller::FirstPersonControllerPlugin);
        app.add_plugin(terrain::TerrainPlugin);
        app.add_plugin(portal::PortalPlugin);
        app.add_plugin(projectile::ProjectilePlugin);

        app.add_startup_system(setup);
    }
}

/// Spawn the sun and the player rig above the terrain center.
fn setup(mut commands: Commands, settings: Res<GameSettings>) {
    commands.spawn(DirectionalLightBundle {
        directional_light: DirectionalLight {
            color: Color::ANTIQUE_WHITE,
            illuminance: 20_000.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform {
            translation: Vec3::Y * 5.,
            rotation: Quat::from_euler(EulerRot::YXZ, FRAC_PI_4, FRAC_PI_4, 0.),
            scale: Vec3::ONE,
        },
        ..default()
    });

    // Drop the player in above the tallest the noise can reach.
    let spawn_height = settings.terrain.height_multiplier + 3.;
    commands.spawn(FirstPersonControllerBundle {
        spatial: SpatialBundle::from(Transform::from_xyz(0., spawn_height, 0.)),
        ..default()
    });
}
