//! Portal math core: capture-view mirroring, crossing transform/velocity
//! computation and the cooldown records that keep a fresh arrival from
//! immediately re-triggering on the partner's threshold.

use std::f32::consts::PI;

use bevy::{prelude::*, utils::HashMap};

/// Extra height granted on top of the actor's half-height when the floor
/// correction fires.
pub const FLOOR_CLEARANCE: f32 = 0.05;

/// Capture view derived from the main camera for one portal's render target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureView {
    pub transform: Transform,
    pub fov: f32,
}

/// Offset-based capture mirroring: the capture camera sits at the viewer's
/// position shifted by the portal-to-partner offset, keeping the viewer's
/// rotation and FOV.
///
/// Only the position is mirrored; rotation relative to the portal plane is
/// deliberately left alone. This is not a true mirror-plane reflection and
/// can show seams for pairs that aren't axis-aligned, but it matches the
/// intended on-screen behavior.
pub fn mirror_camera_view(
    portal_translation: Vec3,
    linked_translation: Vec3,
    viewer: &Transform,
    viewer_fov: f32,
) -> CaptureView {
    CaptureView {
        transform: Transform {
            translation: viewer.translation + (portal_translation - linked_translation),
            rotation: viewer.rotation,
            scale: viewer.scale,
        },
        fov: viewer_fov,
    }
}

/// World transform and linear velocity an actor should receive after
/// crossing from `source` to `dest`. Applying them (and any floor
/// correction) is the caller's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeleportResult {
    pub transform: Transform,
    pub linvel: Vec3,
}

/// Mirror an actor's transform and velocity through a portal pair.
///
/// The actor is expressed relative to `source`, reflected through the portal
/// plane (local Z negated, rotation mirrored as yaw+180 / pitch and roll
/// negated) and re-composed onto `dest`. Velocity takes the same trip through
/// the two portal frames. The operation is involutive: crossing back through
/// the pair restores the original relative offset.
pub fn compute_teleport(
    actor: &Transform,
    linvel: Vec3,
    source: &Transform,
    dest: &Transform,
) -> TeleportResult {
    let source_inverse = Transform::from_matrix(source.compute_matrix().inverse());
    let relative = source_inverse * *actor;

    let mut mirrored_translation = relative.translation;
    mirrored_translation.z = -mirrored_translation.z;

    let (yaw, pitch, roll) = relative.rotation.to_euler(EulerRot::YXZ);
    let mirrored_rotation = Quat::from_euler(EulerRot::YXZ, yaw + PI, -pitch, -roll);

    let mirrored = Transform {
        translation: mirrored_translation,
        rotation: mirrored_rotation,
        scale: relative.scale,
    };

    let mut local_velocity = source.rotation.inverse() * linvel;
    local_velocity.z = -local_velocity.z;

    TeleportResult {
        transform: *dest * mirrored,
        linvel: dest.rotation * local_velocity,
    }
}

/// Floor-avoidance clamp: never place the actor's center below the hit floor
/// plus its half-height and a small clearance margin.
pub fn floor_corrected_height(target_y: f32, floor_y: f32, half_height: f32) -> f32 {
    target_y.max(floor_y + half_height + FLOOR_CLEARANCE)
}

/// Per-portal suppression records: actor identity → last teleport time.
///
/// A record is armed on both sides of a crossing; without it the mirrored
/// exit position sits exactly on the partner's threshold and re-triggers
/// every frame. Records are short-lived and pruned each tick.
#[derive(Debug, Default, Component)]
pub struct TeleportCooldowns {
    records: HashMap<Entity, f32>,
}

impl TeleportCooldowns {
    /// True iff the actor has no record, or its record has aged past
    /// `cooldown_seconds`.
    pub fn should_teleport(&self, actor: Entity, now: f32, cooldown_seconds: f32) -> bool {
        match self.records.get(&actor) {
            Some(&last) => now - last >= cooldown_seconds,
            None => true,
        }
    }

    pub fn record(&mut self, actor: Entity, now: f32) {
        self.records.insert(actor, now);
    }

    /// Drop expired records. O(n) over outstanding records.
    pub fn prune(&mut self, now: f32, cooldown_seconds: f32) {
        self.records.retain(|_, &mut last| now - last < cooldown_seconds);
    }

    pub fn forget(&mut self, actor: Entity) {
        self.records.remove(&actor);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec3_near(a: Vec3, b: Vec3, tolerance: f32) {
        assert!(
            a.distance(b) < tolerance,
            "expected {a:?} ≈ {b:?} (within {tolerance})"
        );
    }

    #[test]
    fn mirror_camera_view_offsets_position_only() {
        let viewer = Transform::from_xyz(1.0, 2.0, 3.0)
            .with_rotation(Quat::from_rotation_y(0.7));
        let view = mirror_camera_view(
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(4.0, 0.0, -2.0),
            &viewer,
            0.9,
        );
        assert_vec3_near(view.transform.translation, Vec3::new(7.0, 2.0, 5.0), 1e-6);
        assert_eq!(view.transform.rotation, viewer.rotation);
        assert_eq!(view.fov, 0.9);
    }

    #[test]
    fn teleport_between_identical_portals_reflects_through_plane() {
        let portal = Transform::IDENTITY;
        let actor = Transform::from_xyz(0.5, 1.0, -2.0);
        let result = compute_teleport(&actor, Vec3::new(0.0, 0.0, -3.0), &portal, &portal);
        // Position flips through the portal plane, velocity exits along +Z.
        assert_vec3_near(result.transform.translation, Vec3::new(0.5, 1.0, 2.0), 1e-5);
        assert_vec3_near(result.linvel, Vec3::new(0.0, 0.0, 3.0), 1e-5);
    }

    #[test]
    fn teleport_preserves_speed_and_remaps_direction() {
        // Portal pair offset on X, destination yawed 90 degrees.
        let source = Transform::from_xyz(0.0, 0.0, 0.0);
        let dest = Transform::from_xyz(500.0, 0.0, 0.0)
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2));
        let actor = Transform::from_xyz(0.0, 1.0, -0.5);
        let velocity = Vec3::new(0.0, 0.0, -300.0);

        let result = compute_teleport(&actor, velocity, &source, &dest);
        assert!((result.linvel.length() - 300.0).abs() < 1e-3);
        // Source-local forward crossing exits along the destination's +Z,
        // rotated into world space by the destination's yaw.
        let expected_dir = dest.rotation * Vec3::Z;
        assert_vec3_near(result.linvel.normalize(), expected_dir, 1e-5);
        // Exit point sits near the destination portal.
        assert!(result.transform.translation.distance(dest.translation) < 2.0);
    }

    #[test]
    fn teleport_is_involutive_without_floor_correction() {
        let portal_a = Transform::from_xyz(2.0, 0.5, -1.0)
            .with_rotation(Quat::from_euler(EulerRot::YXZ, 0.8, 0.1, 0.0));
        let portal_b = Transform::from_xyz(40.0, 3.0, 12.0)
            .with_rotation(Quat::from_euler(EulerRot::YXZ, -2.1, 0.0, 0.05));
        let actor = Transform::from_xyz(2.3, 1.2, -1.4)
            .with_rotation(Quat::from_euler(EulerRot::YXZ, 0.3, -0.2, 0.1));
        let velocity = Vec3::new(1.0, -0.5, -4.0);

        let out = compute_teleport(&actor, velocity, &portal_a, &portal_b);
        let back = compute_teleport(&out.transform, out.linvel, &portal_b, &portal_a);

        assert_vec3_near(back.transform.translation, actor.translation, 1e-3);
        assert_vec3_near(back.linvel, velocity, 1e-3);
        let dot = back.transform.rotation.dot(actor.rotation).abs();
        assert!(dot > 0.999, "rotation drifted: dot = {dot}");
    }

    #[test]
    fn floor_correction_only_raises() {
        assert_eq!(floor_corrected_height(10.0, 0.0, 1.0), 10.0);
        let raised = floor_corrected_height(0.2, 0.5, 1.0);
        assert!((raised - (1.5 + FLOOR_CLEARANCE)).abs() < 1e-6);
    }

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let mut cooldowns = TeleportCooldowns::default();
        let actor = Entity::from_raw(1);
        assert!(cooldowns.should_teleport(actor, 0.0, 1.0));
        cooldowns.record(actor, 0.0);
        assert!(!cooldowns.should_teleport(actor, 0.0, 1.0));
        assert!(!cooldowns.should_teleport(actor, 0.99, 1.0));
        assert!(cooldowns.should_teleport(actor, 1.0, 1.0));
    }

    #[test]
    fn prune_drops_only_expired_records() {
        let mut cooldowns = TeleportCooldowns::default();
        let stale = Entity::from_raw(1);
        let fresh = Entity::from_raw(2);
        cooldowns.record(stale, 0.0);
        cooldowns.record(fresh, 4.9);
        cooldowns.prune(5.0, 1.0);
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.should_teleport(stale, 5.0, 1.0));
        assert!(!cooldowns.should_teleport(fresh, 5.0, 1.0));
    }
}
