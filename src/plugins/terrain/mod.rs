//! Deformable Perlin terrain: builds the heightfield mesh and its collider at
//! startup, then applies localized craters in response to `DeformTerrain`
//! events, broadcasting `TerrainDeformed` for cosmetic layers.

use bevy::{
    prelude::*,
    render::{mesh::Indices, render_resource::PrimitiveTopology},
};
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;

pub mod heightfield;

pub use heightfield::Heightfield;

use crate::plugins::{
    game::{settings::GameSettings, GameState},
    physics::*,
};

#[derive(Debug)]
pub struct TerrainPlugin;

impl Plugin for TerrainPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<DeformTerrain>()
            .add_event::<TerrainDeformed>()
            .add_startup_system(spawn_terrain)
            .add_system(
                apply_deformations
                    .run_in_state(GameState::InGame)
                    .label(TerrainLabels::Deform),
            );
    }
}

#[derive(Debug, SystemLabel)]
pub enum TerrainLabels {
    Deform,
}

/// Marker for the terrain actor.
#[derive(Debug, Default, Component)]
pub struct Terrain;

/// Request a crater at a world-space impact point. Sent by any gameplay event
/// (projectile impacts here); ignored when no terrain exists or the impact
/// misses the grid entirely.
#[derive(Debug, Clone, Copy)]
pub struct DeformTerrain {
    pub impact: Vec3,
}

/// Notification that the terrain changed: world-space impact point and the
/// post-deformation surface normal near it. Consumed by the decal layer.
#[derive(Debug, Clone, Copy)]
pub struct TerrainDeformed {
    pub point: Vec3,
    pub normal: Vec3,
}

fn spawn_terrain(
    mut commands: Commands,
    settings: Res<GameSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let t = &settings.terrain;
    let field = Heightfield::generate(
        t.x_size,
        t.z_size,
        t.scale,
        t.uv_scale,
        t.noise_scale,
        t.height_multiplier,
        t.seed,
    );

    if field.is_empty() {
        warn!(
            "Terrain settings produced an empty grid ({}x{}); skipping spawn",
            t.x_size, t.z_size
        );
        commands.insert_resource(NextState(GameState::InGame));
        return;
    }

    info!(
        "Generated terrain: {} vertices, {} triangles",
        field.positions.len(),
        field.indices.len() / 3
    );

    let collider = trimesh_collider(&field);
    let mesh = meshes.add(build_mesh(&field));
    let material = materials.add(StandardMaterial {
        base_color: Color::rgb(0.35, 0.42, 0.3),
        perceptual_roughness: 0.95,
        ..default()
    });

    // Center the grid on the world origin.
    let half_extent = Vec3::new(
        t.x_size as f32 * t.scale / 2.,
        0.,
        t.z_size as f32 * t.scale / 2.,
    );

    commands
        .spawn(PbrBundle {
            mesh,
            material,
            transform: Transform::from_translation(-half_extent),
            ..default()
        })
        .insert((
            Name::from("Terrain"),
            Terrain,
            field,
            RigidBody::Fixed,
            collider,
            CollisionGroups::new(TERRAIN_GROUP, ALL_GROUPS),
        ));

    commands.insert_resource(NextState(GameState::InGame));
}

fn apply_deformations(
    mut events: EventReader<DeformTerrain>,
    mut notifications: EventWriter<TerrainDeformed>,
    settings: Res<GameSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut terrain: Query<
        (
            &mut Heightfield,
            &GlobalTransform,
            &Handle<Mesh>,
            &mut Collider,
        ),
        With<Terrain>,
    >,
) {
    for event in events.iter() {
        let Ok((mut field, global, mesh_handle, mut collider)) = terrain.get_single_mut() else {
            debug!("Deformation event with no terrain present; skipping");
            continue;
        };

        let local_impact = global.affine().inverse().transform_point3(event.impact);
        let radius = settings.terrain.crater_radius;
        let depth = settings.terrain.crater_depth_vec();

        if !field.deform(local_impact, radius, depth) {
            continue;
        }

        match meshes.get_mut(mesh_handle) {
            Some(mesh) => refresh_mesh(mesh, &field),
            None => warn!("Terrain mesh asset missing; collider updated without it"),
        }
        *collider = trimesh_collider(&field);

        let (_, rotation, _) = global.to_scale_rotation_translation();
        let normal = field
            .normal_near(local_impact)
            .map(|n| rotation * n)
            .unwrap_or(Vec3::Y);
        notifications.send(TerrainDeformed {
            point: event.impact,
            normal,
        });
    }
}

/// Build a render mesh from the heightfield buffers.
pub fn build_mesh(field: &Heightfield) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList);
    refresh_mesh(&mut mesh, field);
    mesh.set_indices(Some(Indices::U32(field.indices.clone())));
    mesh
}

/// Rewrite the vertex attributes of an existing mesh in place. Triangle
/// indices never change after generation, so deformation only touches these.
fn refresh_mesh(mesh: &mut Mesh, field: &Heightfield) {
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_POSITION,
        field
            .positions
            .iter()
            .map(|p| p.to_array())
            .collect::<Vec<_>>(),
    );
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_NORMAL,
        field
            .normals
            .iter()
            .map(|n| n.to_array())
            .collect::<Vec<_>>(),
    );
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_TANGENT,
        field
            .tangents
            .iter()
            .map(|t| t.to_array())
            .collect::<Vec<_>>(),
    );
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_UV_0,
        field.uvs.iter().map(|uv| uv.to_array()).collect::<Vec<_>>(),
    );
}

fn trimesh_collider(field: &Heightfield) -> Collider {
    Collider::trimesh(
        field.positions.clone(),
        field
            .indices
            .chunks_exact(3)
            .map(|tri| [tri[0], tri[1], tri[2]])
            .collect(),
    )
}
