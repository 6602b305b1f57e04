//! Paired portals: authoring (spawn/clear over random terrain vertices),
//! per-frame capture-view mirroring into render targets, and overlap-driven
//! teleportation with cooldown suppression and floor avoidance.

use bevy::{
    prelude::*,
    render::{
        camera::RenderTarget,
        render_resource::{
            Extent3d, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages,
        },
        view::RenderLayers,
    },
    utils::HashMap,
};
use bevy_rapier3d::prelude::*;
use bevy_rapier3d::rapier::pipeline::QueryFilterFlags;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::ActionState;
use rand::Rng;

mod material;
pub mod teleport;

pub use material::PortalMaterial;
use teleport::{
    compute_teleport, floor_corrected_height, mirror_camera_view, TeleportCooldowns,
};

use crate::plugins::{
    first_person_controller::FirstPersonCamera,
    game::{settings::GameSettings, GameState},
    input::Actions,
    physics::*,
    terrain::Heightfield,
};

/// Render layer carrying the portal surfaces, so capture cameras (layer 0
/// only) never recursively render a portal into its own target.
const PORTAL_RENDER_LAYER: u8 = 1;

/// Minimum spacing between the two sampled spawn vertices, in grid cells.
const MIN_SPAWN_SEPARATION_CELLS: f32 = 6.;

const SPAWN_SAMPLE_ATTEMPTS: usize = 32;

/// Reach of the floor-avoidance ray casts below/above a teleport target.
const FLOOR_PROBE_DOWN: f32 = 25.;
const FLOOR_PROBE_UP: f32 = 2.;

#[derive(Debug)]
pub struct PortalPlugin;

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(MaterialPlugin::<PortalMaterial>::default())
            .register_type::<PortalTeleport>()
            .init_resource::<PortalLinks>()
            .add_event::<GeneratePortalPair>()
            .add_event::<ClearPortals>()
            .add_startup_system(load_portal_assets)
            .add_enter_system(GameState::InGame, request_initial_pair)
            .add_system(update_main_camera.label(PortalLabels::UpdateMainCamera))
            .add_system(
                authoring_input
                    .run_in_state(GameState::InGame)
                    .label(PortalLabels::Authoring),
            )
            .add_system(
                apply_authoring_events
                    .run_in_state(GameState::InGame)
                    .label(PortalLabels::SpawnPair)
                    .after(PortalLabels::Authoring),
            )
            .add_system(
                sync_capture_cameras
                    .run_in_state(GameState::InGame)
                    .label(PortalLabels::SyncCameras)
                    .after(PortalLabels::SpawnPair)
                    .after(PortalLabels::UpdateMainCamera),
            )
            .add_system(
                teleport_on_overlap
                    .run_in_state(GameState::InGame)
                    .label(PortalLabels::Teleport)
                    .after(PortalLabels::SyncCameras),
            )
            .add_system(
                prune_cooldowns
                    .run_in_state(GameState::InGame)
                    .after(PortalLabels::Teleport),
            )
            .add_system_to_stage(CoreStage::PostUpdate, unlink_removed_portals);
    }
}

#[derive(Debug, SystemLabel)]
pub enum PortalLabels {
    UpdateMainCamera,
    Authoring,
    SpawnPair,
    SyncCameras,
    Teleport,
}

/// Regenerate the portal pair. Idempotent: any existing pair is cleared
/// first.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeneratePortalPair;

/// Remove the portal pair, if any.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearPortals;

/// One side of a portal pair. The partner is looked up through
/// [`PortalLinks`], never held directly.
#[derive(Debug, Component)]
pub struct Portal {
    /// Camera rendering this portal's view into its render target.
    capture_camera: Option<Entity>,
}

#[derive(Debug, Component)]
pub struct PortalCaptureCamera;

/// Marker for actors that may cross portals. The half-height feeds the
/// floor-avoidance correction on arrival.
#[derive(Debug, Component, Clone, Reflect)]
#[reflect(Component)]
pub struct PortalTeleport {
    pub half_height: f32,
}

impl Default for PortalTeleport {
    fn default() -> Self {
        PortalTeleport { half_height: 0.5 }
    }
}

/// Pair table owning the bidirectional portal linkage. Both directions are
/// inserted and removed together, so `links.partner_of(a) == Some(b)` always
/// implies `links.partner_of(b) == Some(a)`.
#[derive(Debug, Default, Resource)]
pub struct PortalLinks {
    pairs: HashMap<Entity, Entity>,
}

impl PortalLinks {
    pub fn link(&mut self, a: Entity, b: Entity) {
        self.unlink(a);
        self.unlink(b);
        self.pairs.insert(a, b);
        self.pairs.insert(b, a);
    }

    pub fn partner_of(&self, portal: Entity) -> Option<Entity> {
        self.pairs.get(&portal).copied()
    }

    /// Remove the pairing from both sides at once.
    pub fn unlink(&mut self, portal: Entity) -> Option<Entity> {
        let partner = self.pairs.remove(&portal)?;
        self.pairs.remove(&partner);
        Some(partner)
    }

    pub fn clear(&mut self) {
        self.pairs.clear();
    }
}

#[derive(Debug, Default, Resource)]
struct PortalResources {
    render_targets: [Handle<Image>; 2],
    materials: [Handle<PortalMaterial>; 2],
    mesh: Handle<Mesh>,
    main_camera: Option<Entity>,
}

/// Allocate the render targets, portal materials and the shared surface quad.
fn load_portal_assets(
    mut commands: Commands,
    settings: Res<GameSettings>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<PortalMaterial>>,
    mut images: ResMut<Assets<Image>>,
) {
    let p = &settings.portals;
    let mesh = meshes.add(
        shape::Quad {
            size: Vec2::new(p.half_width * 2., p.half_height * 2.),
            flip: false,
        }
        .into(),
    );

    let mut render_targets: [Handle<Image>; 2] = default();
    let mut portal_materials: [Handle<PortalMaterial>; 2] = default();
    for i in 0..2 {
        let size = Extent3d {
            width: p.render_target_size,
            height: p.render_target_size,
            ..default()
        };
        let mut image = Image {
            texture_descriptor: TextureDescriptor {
                label: None,
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: TextureDimension::D2,
                format: TextureFormat::Bgra8UnormSrgb,
                usage: TextureUsages::TEXTURE_BINDING
                    | TextureUsages::COPY_DST
                    | TextureUsages::RENDER_ATTACHMENT,
            },
            ..default()
        };
        image.resize(size);
        render_targets[i] = images.add(image);
        portal_materials[i] = materials.add(PortalMaterial {
            texture: render_targets[i].clone(),
        });
    }

    commands.insert_resource(PortalResources {
        render_targets,
        materials: portal_materials,
        mesh,
        main_camera: None,
    });
}

/// Track the first-person camera and let it see the portal render layer.
fn update_main_camera(
    mut commands: Commands,
    cameras: Query<Entity, With<FirstPersonCamera>>,
    mut portal_res: ResMut<PortalResources>,
) {
    if portal_res.main_camera.is_none() {
        if let Ok(entity) = cameras.get_single() {
            commands
                .entity(entity)
                .insert(RenderLayers::default().with(PORTAL_RENDER_LAYER));
            portal_res.main_camera = Some(entity);
        }
    }
}

/// A pair is available from the start, so the player never faces an empty map.
fn request_initial_pair(mut events: EventWriter<GeneratePortalPair>) {
    events.send(GeneratePortalPair);
}

/// Map the authoring action keys onto the pair events.
fn authoring_input(
    actions: Query<&ActionState<Actions>>,
    mut generate: EventWriter<GeneratePortalPair>,
    mut clear: EventWriter<ClearPortals>,
) {
    if let Ok(actions) = actions.get_single() {
        if actions.just_pressed(Actions::GeneratePortals) {
            generate.send(GeneratePortalPair);
        }
        if actions.just_pressed(Actions::ClearPortals) {
            clear.send(ClearPortals);
        }
    }
}

/// Handle both authoring operations in one place so a clear and a regenerate
/// arriving in the same frame never double-despawn a portal.
fn apply_authoring_events(
    mut commands: Commands,
    mut generate_events: EventReader<GeneratePortalPair>,
    mut clear_events: EventReader<ClearPortals>,
    mut links: ResMut<PortalLinks>,
    settings: Res<GameSettings>,
    portal_res: Res<PortalResources>,
    portals: Query<(Entity, &Portal)>,
    terrain: Query<(&Heightfield, &Transform), Without<Portal>>,
) {
    let generate = generate_events.iter().next().is_some();
    let clear = clear_events.iter().next().is_some();
    if !generate && !clear {
        return;
    }

    despawn_all_portals(&mut commands, &mut links, &portals);
    if !generate {
        return;
    }

    let Ok((field, terrain_transform)) = terrain.get_single() else {
        warn!("Cannot generate portals: no terrain heightfield present");
        return;
    };

    let Some((site_a, site_b)) =
        sample_spawn_sites(field, &mut rand::thread_rng(), settings.portals.half_width)
    else {
        warn!("Cannot generate portals: no two vertices far enough apart");
        return;
    };

    // The terrain is a root entity, so its local transform is authoritative
    // even before the first propagation pass.
    let lift = Vec3::Y * settings.portals.spawn_height;
    let world_a = terrain_transform.transform_point(site_a) + lift;
    let world_b = terrain_transform.transform_point(site_b) + lift;

    let entity_a = spawn_portal(&mut commands, &settings, &portal_res, 0, world_a, world_b);
    let entity_b = spawn_portal(&mut commands, &settings, &portal_res, 1, world_b, world_a);
    links.link(entity_a, entity_b);

    info!("Spawned portal pair at {world_a} and {world_b}");
}

fn despawn_all_portals(
    commands: &mut Commands,
    links: &mut PortalLinks,
    portals: &Query<(Entity, &Portal)>,
) {
    for (entity, portal) in portals {
        if let Some(camera) = portal.capture_camera {
            commands.entity(camera).despawn_recursive();
        }
        commands.entity(entity).despawn_recursive();
    }
    links.clear();
}

/// Pick two distinct grid vertices with enough horizontal separation.
fn sample_spawn_sites<R: Rng>(
    field: &Heightfield,
    rng: &mut R,
    half_width: f32,
) -> Option<(Vec3, Vec3)> {
    let min_separation =
        (MIN_SPAWN_SEPARATION_CELLS * half_width.max(1.)).max(MIN_SPAWN_SEPARATION_CELLS);
    for _ in 0..SPAWN_SAMPLE_ATTEMPTS {
        let a = field.random_vertex(rng)?;
        let b = field.random_vertex(rng)?;
        let horizontal = Vec2::new(a.x - b.x, a.z - b.z);
        if horizontal.length() >= min_separation {
            return Some((a, b));
        }
    }
    None
}

fn spawn_portal(
    commands: &mut Commands,
    settings: &GameSettings,
    portal_res: &PortalResources,
    index: usize,
    position: Vec3,
    facing: Vec3,
) -> Entity {
    // The quad's visible face is +Z, so aim the transform's -Z away from the
    // partner.
    let away = position + (position - Vec3::new(facing.x, position.y, facing.z));
    let transform = Transform::from_translation(position).looking_at(away, Vec3::Y);

    let capture_camera = commands
        .spawn(Camera3dBundle {
            camera: Camera {
                // Render before the main camera.
                priority: -1 - index as isize,
                target: RenderTarget::Image(portal_res.render_targets[index].clone()),
                ..default()
            },
            ..default()
        })
        .insert((PortalCaptureCamera, Name::from(format!("PortalCapture_{index}"))))
        .id();

    commands
        .spawn(MaterialMeshBundle {
            mesh: portal_res.mesh.clone(),
            material: portal_res.materials[index].clone(),
            transform,
            ..default()
        })
        .insert((
            Name::from(format!("Portal_{index}")),
            Portal {
                capture_camera: Some(capture_camera),
            },
            RenderLayers::layer(PORTAL_RENDER_LAYER),
            Collider::cuboid(
                settings.portals.half_width,
                settings.portals.half_height,
                0.4,
            ),
            Sensor,
            ActiveEvents::COLLISION_EVENTS,
            CollisionGroups::new(PORTAL_GROUP, PLAYER_GROUP | PROJECTILE_GROUP),
            TeleportCooldowns::default(),
        ))
        .id()
}

/// Per-frame capture mirroring: each linked portal's capture camera follows
/// the main camera, offset by the portal-to-partner translation. Unlinked
/// portals and a missing main camera degrade to a no-op.
fn sync_capture_cameras(
    links: Res<PortalLinks>,
    portal_res: Res<PortalResources>,
    portals: Query<(Entity, &Transform, &Portal)>,
    main_camera: Query<(&GlobalTransform, &Projection), With<FirstPersonCamera>>,
    mut capture_cameras: Query<
        (&mut Transform, &mut Projection),
        (With<PortalCaptureCamera>, Without<FirstPersonCamera>, Without<Portal>),
    >,
) {
    let Some((viewer_global, viewer_projection)) = portal_res
        .main_camera
        .and_then(|entity| main_camera.get(entity).ok())
    else {
        return;
    };
    let viewer = viewer_global.compute_transform();
    let viewer_fov = match viewer_projection {
        Projection::Perspective(perspective) => perspective.fov,
        _ => std::f32::consts::FRAC_PI_4,
    };

    for (entity, transform, portal) in &portals {
        let Some(partner) = links.partner_of(entity) else { continue };
        let Ok((_, partner_transform, _)) = portals.get(partner) else { continue };
        let Some(camera) = portal.capture_camera else { continue };
        let Ok((mut capture_transform, mut capture_projection)) =
            capture_cameras.get_mut(camera)
        else {
            continue;
        };

        let view = mirror_camera_view(
            transform.translation,
            partner_transform.translation,
            &viewer,
            viewer_fov,
        );
        *capture_transform = view.transform;
        if let Projection::Perspective(perspective) = capture_projection.as_mut() {
            perspective.fov = view.fov;
        }
    }
}

/// Teleport actors that begin overlapping a linked portal's sensor, unless a
/// cooldown record suppresses them. The computed target gets a
/// floor-avoidance correction from a downward (or short upward) ray against
/// fixed geometry before being applied.
fn teleport_on_overlap(
    mut collisions: EventReader<CollisionEvent>,
    time: Res<Time>,
    settings: Res<GameSettings>,
    links: Res<PortalLinks>,
    rapier: Res<RapierContext>,
    mut portals: Query<(&Transform, &mut TeleportCooldowns), With<Portal>>,
    mut actors: Query<
        (&mut Transform, &mut Velocity, &PortalTeleport),
        Without<Portal>,
    >,
) {
    let now = time.elapsed_seconds();
    let cooldown = settings.portals.cooldown_seconds;

    for collision in collisions.iter() {
        let CollisionEvent::Started(a, b, _) = collision else { continue };
        let (portal_entity, actor_entity) = if portals.contains(*a) && actors.contains(*b) {
            (*a, *b)
        } else if portals.contains(*b) && actors.contains(*a) {
            (*b, *a)
        } else {
            continue;
        };

        let Some(partner_entity) = links.partner_of(portal_entity) else {
            // Unlinked portal: crossing it does nothing.
            continue;
        };
        let Ok([(source, mut source_cooldowns), (dest, mut dest_cooldowns)]) =
            portals.get_many_mut([portal_entity, partner_entity])
        else {
            continue;
        };
        if !source_cooldowns.should_teleport(actor_entity, now, cooldown) {
            continue;
        }
        let Ok((mut actor_transform, mut velocity, teleport)) = actors.get_mut(actor_entity)
        else {
            continue;
        };

        let source = *source;
        let dest = *dest;
        let mut result =
            compute_teleport(&actor_transform, velocity.linvel, &source, &dest);

        let half_height = teleport.half_height;
        if let Some(floor_y) = probe_floor_height(&rapier, result.transform.translation) {
            result.transform.translation.y =
                floor_corrected_height(result.transform.translation.y, floor_y, half_height);
        }

        info!(
            "Teleporting {actor_entity:?} from {:?} to {:?}",
            portal_entity, partner_entity
        );
        *actor_transform = result.transform;
        velocity.linvel = result.linvel;
        velocity.angvel = dest.rotation * (source.rotation.inverse() * velocity.angvel);

        // Arm both thresholds: the exit position sits right on the partner.
        source_cooldowns.record(actor_entity, now);
        dest_cooldowns.record(actor_entity, now);
    }
}

/// Height of the walkable geometry under (or just above) a point, from ray
/// casts against fixed, non-sensor colliders. `None` when nothing is hit and
/// no correction should apply.
fn probe_floor_height(rapier: &RapierContext, target: Vec3) -> Option<f32> {
    let filter = QueryFilter {
        flags: QueryFilterFlags::ONLY_FIXED | QueryFilterFlags::EXCLUDE_SENSORS,
        ..default()
    };
    let origin = target + Vec3::Y * 0.1;
    if let Some((_, toi)) = rapier.cast_ray(origin, -Vec3::Y, FLOOR_PROBE_DOWN, true, filter) {
        return Some(origin.y - toi);
    }
    // Target may already be below ground; probe a short distance upward.
    rapier
        .cast_ray(origin, Vec3::Y, FLOOR_PROBE_UP, true, filter)
        .map(|(_, toi)| origin.y + toi)
}

fn prune_cooldowns(
    time: Res<Time>,
    settings: Res<GameSettings>,
    mut portals: Query<&mut TeleportCooldowns, With<Portal>>,
) {
    let now = time.elapsed_seconds();
    for mut cooldowns in &mut portals {
        if !cooldowns.is_empty() {
            cooldowns.prune(now, settings.portals.cooldown_seconds);
        }
    }
}

/// Keep the pair table consistent when a portal despawns for any reason:
/// unlink both sides atomically, leaving the survivor inert.
fn unlink_removed_portals(
    removed: RemovedComponents<Portal>,
    mut links: ResMut<PortalLinks>,
) {
    for entity in removed.iter() {
        if links.unlink(entity).is_some() {
            debug!("Portal {entity:?} removed; partner unlinked");
        }
    }
}
