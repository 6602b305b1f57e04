//! Decal projectile: a small fast ball fired from the camera. On impact it
//! despawns, requests a terrain crater, and the deformation notification in
//! turn spawns a short-lived surface decal.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::geometry::CollisionEventFlags;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::ActionState;

use crate::plugins::{
    first_person_controller::FirstPersonCamera,
    game::{settings::GameSettings, GameState},
    input::Actions,
    physics::*,
    portal::PortalTeleport,
    terrain::{DeformTerrain, Terrain, TerrainDeformed, TerrainLabels},
};

#[derive(Debug)]
pub struct ProjectilePlugin;

impl Plugin for ProjectilePlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(load_projectile_assets)
            .add_system(fire_projectiles.run_in_state(GameState::InGame))
            .add_system(
                handle_impacts
                    .run_in_state(GameState::InGame)
                    .before(TerrainLabels::Deform),
            )
            .add_system(
                spawn_impact_decals
                    .run_in_state(GameState::InGame)
                    .after(TerrainLabels::Deform),
            )
            .add_system(expire_decals.run_in_state(GameState::InGame));
    }
}

#[derive(Debug, Default, Component)]
pub struct Projectile;

#[derive(Debug, Component)]
struct DecalLifetime(Timer);

#[derive(Debug, Default, Resource)]
struct ProjectileAssets {
    mesh: Handle<Mesh>,
    material: Handle<StandardMaterial>,
    decal_mesh: Handle<Mesh>,
    decal_material: Handle<StandardMaterial>,
}

fn load_projectile_assets(
    mut commands: Commands,
    settings: Res<GameSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let mesh = meshes.add(
        shape::UVSphere {
            radius: settings.projectile.radius,
            sectors: 12,
            stacks: 12,
        }
        .into(),
    );
    let material = materials.add(StandardMaterial {
        base_color: Color::ORANGE_RED,
        emissive: Color::rgb(0.8, 0.2, 0.05),
        ..default()
    });
    let decal_mesh = meshes.add(
        shape::Quad {
            size: Vec2::splat(settings.projectile.decal_radius * 2.),
            flip: false,
        }
        .into(),
    );
    let decal_material = materials.add(StandardMaterial {
        base_color: Color::rgba(0.05, 0.04, 0.03, 0.9),
        unlit: true,
        alpha_mode: AlphaMode::Blend,
        ..default()
    });

    commands.insert_resource(ProjectileAssets {
        mesh,
        material,
        decal_mesh,
        decal_material,
    });
}

fn fire_projectiles(
    mut commands: Commands,
    assets: Res<ProjectileAssets>,
    settings: Res<GameSettings>,
    actions: Query<&ActionState<Actions>>,
    camera: Query<&GlobalTransform, With<FirstPersonCamera>>,
) {
    let Ok(actions) = actions.get_single() else { return };
    if !actions.just_pressed(Actions::Fire) {
        return;
    }
    let Ok(camera) = camera.get_single() else { return };

    let camera = camera.compute_transform();
    let direction = camera.forward();
    commands
        .spawn(PbrBundle {
            mesh: assets.mesh.clone(),
            material: assets.material.clone(),
            transform: Transform::from_translation(camera.translation + direction * 0.6),
            ..default()
        })
        .insert((
            Name::from("Projectile"),
            Projectile,
            PortalTeleport {
                half_height: settings.projectile.radius,
            },
            RigidBody::Dynamic,
            Collider::ball(settings.projectile.radius),
            Velocity {
                linvel: direction * settings.projectile.speed,
                ..default()
            },
            Ccd { enabled: true },
            ActiveEvents::COLLISION_EVENTS,
            CollisionGroups::new(PROJECTILE_GROUP, ALL_GROUPS & !PLAYER_GROUP),
        ));
}

/// Despawn projectiles on their first solid contact; hits on terrain request
/// a crater. Sensor overlaps (portal thresholds) are ignored so projectiles
/// can fly through portals instead of detonating on them.
fn handle_impacts(
    mut commands: Commands,
    mut collisions: EventReader<CollisionEvent>,
    mut deformations: EventWriter<DeformTerrain>,
    projectiles: Query<&GlobalTransform, With<Projectile>>,
    terrain: Query<(), With<Terrain>>,
) {
    // A projectile can report several contacts in one frame; despawn once.
    let mut spent: Vec<Entity> = Vec::new();
    for collision in collisions.iter() {
        let CollisionEvent::Started(a, b, flags) = collision else { continue };
        if flags.contains(CollisionEventFlags::SENSOR) {
            continue;
        }
        let (projectile, other) = if projectiles.contains(*a) {
            (*a, *b)
        } else if projectiles.contains(*b) {
            (*b, *a)
        } else {
            continue;
        };
        if spent.contains(&projectile) {
            continue;
        }
        spent.push(projectile);

        if let Ok(transform) = projectiles.get(projectile) {
            if terrain.contains(other) {
                deformations.send(DeformTerrain {
                    impact: transform.translation(),
                });
            }
        }
        commands.entity(projectile).despawn_recursive();
    }
}

/// Cosmetic consumer of the deformation notification: a dark disc flush with
/// the deformed surface.
fn spawn_impact_decals(
    mut commands: Commands,
    assets: Res<ProjectileAssets>,
    settings: Res<GameSettings>,
    mut notifications: EventReader<TerrainDeformed>,
) {
    for deformed in notifications.iter() {
        let rotation = Quat::from_rotation_arc(Vec3::Z, deformed.normal);
        commands
            .spawn(PbrBundle {
                mesh: assets.decal_mesh.clone(),
                material: assets.decal_material.clone(),
                transform: Transform {
                    translation: deformed.point + deformed.normal * 0.02,
                    rotation,
                    scale: Vec3::ONE,
                },
                ..default()
            })
            .insert((
                Name::from("Impact decal"),
                DecalLifetime(Timer::from_seconds(
                    settings.projectile.decal_lifetime,
                    TimerMode::Once,
                )),
            ));
    }
}

fn expire_decals(
    mut commands: Commands,
    time: Res<Time>,
    mut decals: Query<(Entity, &mut DecalLifetime)>,
) {
    for (entity, mut lifetime) in &mut decals {
        if lifetime.0.tick(time.delta()).finished() {
            commands.entity(entity).despawn_recursive();
        }
    }
}
