//! First person controller: a capsule body driven by velocity, with a camera
//! anchored at eye height. Yaw is applied to the body through angular
//! velocity, pitch directly to the camera anchor.

use bevy::{prelude::*, render::camera::Projection};
use bevy_rapier3d::prelude::*;
use euclid::Angle;
use leafwing_input_manager::prelude::*;

use crate::plugins::{
    input::{default_input_map, Actions},
    physics::*,
    portal::PortalTeleport,
};

#[derive(Debug)]
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(spawn_controller.label(FirstPersonLabels::SpawnControllers))
            .add_system(process_controller_inputs.label(FirstPersonLabels::ProcessInputs));
    }
}

#[derive(Debug, SystemLabel)]
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
}

#[derive(Debug, Component)]
pub struct FirstPersonController {
    pub yaw: Angle<f32>,
    pub pitch: Angle<f32>,
    pub camera_anchor: Entity,
}

/// Marker for the first person camera.
#[derive(Debug, Default, Component, Reflect)]
#[reflect(Component)]
pub struct FirstPersonCamera;

/// Spawning this marker (with a transform) builds the full controller rig in
/// place: rigid body, input map, camera anchor and camera.
#[derive(Debug, Component, Default, Reflect)]
#[reflect(Component)]
pub struct FirstPersonControllerSpawner;

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

pub const PLAYER_HEIGHT: f32 = 1.8;
const EYE_HEIGHT: f32 = 1.25;

fn spawn_controller(
    mut commands: Commands,
    spawners: Query<Entity, With<FirstPersonControllerSpawner>>,
) {
    for id in &spawners {
        const CAMERA_OFFSET: Vec3 = Vec3::new(0., EYE_HEIGHT - PLAYER_HEIGHT / 2., 0.);

        let camera_anchor = commands
            .spawn(SpatialBundle::from(Transform::from_translation(
                CAMERA_OFFSET,
            )))
            .insert(Name::from("Camera anchor"))
            .id();

        let camera = commands
            .spawn(Camera3dBundle {
                projection: Projection::Perspective(PerspectiveProjection {
                    fov: std::f32::consts::FRAC_PI_4,
                    aspect_ratio: 16. / 9.,
                    near: 0.1,
                    far: 1000.,
                }),
                ..default()
            })
            .insert((Name::from("Player camera"), FirstPersonCamera))
            .id();

        commands.entity(camera_anchor).push_children(&[camera]);

        commands
            .entity(id)
            .insert(InputManagerBundle {
                action_state: ActionState::default(),
                input_map: default_input_map(),
            })
            .insert((
                RigidBody::Dynamic,
                Collider::capsule_y(PLAYER_HEIGHT / 2. - 0.4, 0.4),
                LockedAxes::ROTATION_LOCKED_X | LockedAxes::ROTATION_LOCKED_Z,
                Velocity::default(),
                Ccd { enabled: true },
                Name::from("Player"),
                CollisionGroups::new(PLAYER_GROUP, ALL_GROUPS),
                PortalTeleport {
                    half_height: PLAYER_HEIGHT / 2.,
                },
            ))
            .add_child(camera_anchor)
            .insert(FirstPersonController {
                yaw: Angle::zero(),
                pitch: Angle::zero(),
                camera_anchor,
            })
            .remove::<FirstPersonControllerSpawner>();
    }
}

const PLAYER_SPEED: f32 = 4.;
const MOUSE_SENSITIVITY: f32 = 0.004;
const MOUSE_ANGVEL_MULTIPLIER: f32 = -75.;
const SPRINT_MULTIPLIER: f32 = 2.;

fn process_controller_inputs(
    mut player_query: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut Velocity,
        &Transform,
    )>,
    mut camera_query: Query<&mut Transform, Without<FirstPersonController>>,
) {
    for (input_state, mut controller, mut velocity, transform) in &mut player_query {
        // Vertical velocity stays with the physics engine so gravity keeps
        // working over the bumpy terrain.
        let mut new_velocities = Vec3::new(0., velocity.linvel.y, 0.);

        let forward = transform.forward();
        match (
            input_state.pressed(Actions::Forward),
            input_state.pressed(Actions::Backwards),
            input_state.pressed(Actions::Sprint),
        ) {
            (true, false, sprint) => {
                let k = if sprint { SPRINT_MULTIPLIER } else { 1. };
                new_velocities.x += PLAYER_SPEED * k * forward.x;
                new_velocities.z += PLAYER_SPEED * k * forward.z;
            }
            (false, true, sprint) => {
                let k = if sprint { SPRINT_MULTIPLIER } else { 1. };
                new_velocities.x -= PLAYER_SPEED * k * forward.x;
                new_velocities.z -= PLAYER_SPEED * k * forward.z;
            }
            _ => {}
        }

        let left = transform.left();
        match (
            input_state.pressed(Actions::StrafeLeft),
            input_state.pressed(Actions::StrafeRight),
            input_state.pressed(Actions::Sprint),
        ) {
            (true, false, sprint) => {
                let k = if sprint { SPRINT_MULTIPLIER } else { 1. };
                new_velocities.x += PLAYER_SPEED * k * left.x;
                new_velocities.z += PLAYER_SPEED * k * left.z;
            }
            (false, true, sprint) => {
                let k = if sprint { SPRINT_MULTIPLIER } else { 1. };
                new_velocities.x -= PLAYER_SPEED * k * left.x;
                new_velocities.z -= PLAYER_SPEED * k * left.z;
            }
            _ => {}
        }

        velocity.linvel = new_velocities;

        // Mouse aim: yaw goes to the body as angular velocity, pitch directly
        // to the camera anchor so the body stays upright.
        if let Some(mouse_movement) = input_state.axis_pair(Actions::Aim) {
            controller.yaw += Angle::radians(mouse_movement.x()) * MOUSE_SENSITIVITY;
            controller.pitch += Angle::radians(mouse_movement.y() * MOUSE_SENSITIVITY);
            controller.pitch.radians = controller
                .pitch
                .radians
                .clamp(-std::f32::consts::FRAC_PI_2, std::f32::consts::FRAC_PI_2);

            let v_rotation = Quat::from_axis_angle(Vec3::X, -controller.pitch.radians);
            velocity.angvel.y = mouse_movement.x() * MOUSE_SENSITIVITY * MOUSE_ANGVEL_MULTIPLIER;

            if let Ok(mut camera_transform) = camera_query.get_mut(controller.camera_anchor) {
                camera_transform.rotation = v_rotation;
            }
        } else {
            velocity.angvel.y = 0.;
        }
    }
}
