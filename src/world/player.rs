//! Per-connection player state and the roster registry
//!
//! The registry owns all mutable player state. Network input never touches a
//! `PlayerState` directly; mutations go through the hub's validated
//! movement/animation operations while it holds the registry exclusively.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::animation::AnimationMachine;

/// Ephemeral per-connection id
pub type ConnectionId = Uuid;

/// Clamp a client-supplied facing value to the two legal directions
pub fn normalize_direction(direction: i8) -> i8 {
    if direction < 0 {
        -1
    } else {
        1
    }
}

/// Visual/profile attributes of a player, snapshotted at join or character
/// change. Level/EXP arithmetic happens outside this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub display_name: String,
    pub char_type: String,
    pub level: u32,
    pub rank_title: String,
    pub avatar_url: String,
    pub exp_points: u64,
}

/// Mutable state for one connected player
#[derive(Debug)]
pub struct PlayerState {
    pub connection_id: ConnectionId,
    pub x: f64,
    pub z: f64,
    pub direction: i8,
    pub animation: AnimationMachine,
    pub profile: PlayerProfile,
    pub joined_at: Instant,
}

impl PlayerState {
    pub fn new(connection_id: ConnectionId, profile: PlayerProfile, x: f64, z: f64) -> Self {
        Self {
            connection_id,
            x,
            z,
            direction: 1,
            animation: AnimationMachine::new(),
            profile,
            joined_at: Instant::now(),
        }
    }
}

/// Registry of all connected players' state, keyed by connection id
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: HashMap<ConnectionId, PlayerState>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self {
            players: HashMap::new(),
        }
    }

    /// Create state for a newly admitted connection
    pub fn join(
        &mut self,
        connection_id: ConnectionId,
        profile: PlayerProfile,
        x: f64,
        z: f64,
    ) -> &PlayerState {
        self.players
            .entry(connection_id)
            .or_insert_with(|| PlayerState::new(connection_id, profile, x, z))
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<&PlayerState> {
        self.players.get(&connection_id)
    }

    pub fn get_mut(&mut self, connection_id: ConnectionId) -> Option<&mut PlayerState> {
        self.players.get_mut(&connection_id)
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.players.contains_key(&connection_id)
    }

    /// Remove and return a player's state (drives the leave broadcast and
    /// the final persistence write). Idempotent.
    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<PlayerState> {
        self.players.remove(&connection_id)
    }

    /// Replace the visual profile for a connection. From an observer's
    /// perspective this is a remove-then-rejoin; the caller broadcasts the
    /// full new snapshot so stale assets cannot linger.
    pub fn set_profile(&mut self, connection_id: ConnectionId, profile: PlayerProfile) -> bool {
        match self.players.get_mut(&connection_id) {
            Some(p) => {
                p.profile = profile;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> PlayerProfile {
        PlayerProfile {
            display_name: name.to_string(),
            char_type: "knight".to_string(),
            level: 3,
            rank_title: "Novice".to_string(),
            avatar_url: "/avatars/default.png".to_string(),
            exp_points: 120,
        }
    }

    #[test]
    fn test_join_creates_state() {
        let mut reg = PlayerRegistry::new();
        let id = Uuid::new_v4();

        let state = reg.join(id, profile("Alice"), 1.0, 2.0);
        assert_eq!(state.x, 1.0);
        assert_eq!(state.z, 2.0);
        assert_eq!(state.direction, 1);
        assert_eq!(state.animation.state(), "Idle");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_remove_returns_state_and_is_idempotent() {
        let mut reg = PlayerRegistry::new();
        let id = Uuid::new_v4();
        reg.join(id, profile("Alice"), 0.0, 0.0);

        let removed = reg.remove(id);
        assert!(removed.is_some());
        assert!(reg.remove(id).is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_set_profile() {
        let mut reg = PlayerRegistry::new();
        let id = Uuid::new_v4();
        reg.join(id, profile("Alice"), 0.0, 0.0);

        let mut new_profile = profile("Alice");
        new_profile.char_type = "mage".to_string();
        assert!(reg.set_profile(id, new_profile));
        assert_eq!(reg.get(id).unwrap().profile.char_type, "mage");

        assert!(!reg.set_profile(Uuid::new_v4(), profile("Ghost")));
    }

    #[test]
    fn test_normalize_direction() {
        assert_eq!(normalize_direction(-1), -1);
        assert_eq!(normalize_direction(-5), -1);
        assert_eq!(normalize_direction(0), 1);
        assert_eq!(normalize_direction(1), 1);
        assert_eq!(normalize_direction(7), 1);
    }
}
