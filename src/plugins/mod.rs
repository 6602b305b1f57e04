#[cfg(feature = "bevy_prototype_debug_lines")]
pub mod debug;
#[cfg(feature = "editor")]
pub mod dev_plugins;
pub mod first_person_controller;
pub mod game;
pub mod input;
pub mod physics;
pub mod portal;
pub mod projectile;
pub mod terrain;
