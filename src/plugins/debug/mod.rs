//! Devel-only overlay: draws the link between the portal pair and each
//! portal's facing axis.

use bevy::prelude::*;
use bevy_prototype_debug_lines::DebugLines;

use crate::plugins::portal::{Portal, PortalLinks};

#[derive(Debug)]
pub struct DebugOverlayPlugin;

impl Plugin for DebugOverlayPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(draw_portal_links);
    }
}

fn draw_portal_links(
    links: Res<PortalLinks>,
    portals: Query<(Entity, &Transform), With<Portal>>,
    mut lines: ResMut<DebugLines>,
) {
    for (entity, transform) in &portals {
        lines.line_colored(
            transform.translation,
            transform.translation + transform.forward(),
            0.,
            Color::CYAN,
        );
        if let Some(partner) = links.partner_of(entity) {
            if let Ok((_, partner_transform)) = portals.get(partner) {
                lines.line_colored(
                    transform.translation,
                    partner_transform.translation,
                    0.,
                    Color::FUCHSIA,
                );
            }
        }
    }
}
