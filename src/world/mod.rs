//! World model: collision geometry, animation arbitration, player state and
//! coordinate persistence

pub mod animation;
pub mod collision;
pub mod persist;
pub mod player;
