//! Chatroom hub - shared state machine behind all connection tasks
//!
//! The hub composes the session registry, player registry, broadcast router,
//! collision map, animation catalog and coordinate store, and implements one
//! handler per protocol operation. All mutations go through one
//! `Arc<RwLock<ChatroomHub>>`; the coarse lock is deliberate for the expected
//! connection counts (tens to low hundreds) and gives every handler a
//! consistent view, so a join snapshot can never observe a half-revoked
//! session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Notify, RwLock};
use tracing::{debug, info};

use crate::net::broadcast::{BroadcastRouter, OutboundSender};
use crate::net::protocol::{
    ChatLine, JoinProfile, PlayerSnapshot, ServerMessage, SocialNotice,
};
use crate::net::session::{AdmitError, IdentityId, SessionRegistry};
use crate::world::animation::{AnimationCatalog, RUN};
use crate::world::collision::{CollisionMap, MoveResolution, DEFAULT_SPAWN, PLAYER_RADIUS};
use crate::world::persist::{CoordinateStore, PersistenceThrottle};
use crate::world::player::{normalize_direction, ConnectionId, PlayerRegistry};

/// Kick notice sent to a connection superseded by a newer login
pub const DUPLICATE_LOGIN_NOTICE: &str =
    "You signed in from another window, so this chatroom session was closed.";

pub type SharedHub = Arc<RwLock<ChatroomHub>>;

/// Handle returned to the connection task on admission
pub struct AdmittedConnection {
    pub connection_id: ConnectionId,
    /// Signalled when the session is revoked; the connection's message loop
    /// selects on this and shuts down
    pub revoked: Arc<Notify>,
}

pub struct ChatroomHub {
    sessions: SessionRegistry,
    players: PlayerRegistry,
    router: BroadcastRouter,
    map: Arc<CollisionMap>,
    catalog: Arc<AnimationCatalog>,
    store: Arc<dyn CoordinateStore>,
    /// Keyed by identity and retained across reconnects, so the one-write-
    /// per-interval budget holds even through a quick disconnect-rejoin
    throttles: HashMap<IdentityId, PersistenceThrottle>,
    revoke_signals: HashMap<ConnectionId, Arc<Notify>>,
}

impl ChatroomHub {
    pub fn new(
        map: Arc<CollisionMap>,
        catalog: Arc<AnimationCatalog>,
        store: Arc<dyn CoordinateStore>,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            players: PlayerRegistry::new(),
            router: BroadcastRouter::new(),
            map,
            catalog,
            store,
            throttles: HashMap::new(),
            revoke_signals: HashMap::new(),
        }
    }

    pub fn new_shared(
        map: Arc<CollisionMap>,
        catalog: Arc<AnimationCatalog>,
        store: Arc<dyn CoordinateStore>,
    ) -> SharedHub {
        Arc::new(RwLock::new(Self::new(map, catalog, store)))
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether an identity currently holds a live session
    pub fn has_active_session(&self, identity_id: &str) -> bool {
        self.sessions.active(identity_id).is_some()
    }

    /// Flag a web-session token as expired (external auth collaborator)
    pub fn expire_token(&mut self, token: String) {
        self.sessions.flag_token_expired(token);
    }

    /// Admit an identity handshake, revoking any prior connection for the
    /// same identity first. The kick notice and the old entry's removal both
    /// happen here, under the same exclusive lock, before the new connection
    /// exists anywhere - so two avatars for one identity never coexist.
    pub fn admit(
        &mut self,
        identity_id: &str,
        token: &str,
        sender: OutboundSender,
    ) -> Result<AdmittedConnection, AdmitError> {
        self.sessions.validate(identity_id, token)?;

        if self.sessions.active(identity_id).is_some() {
            info!("Identity {} reconnected, revoking prior session", identity_id);
            self.revoke(identity_id);
        }

        let session = self
            .sessions
            .insert(identity_id.to_string(), token.to_string());
        let connection_id = session.connection_id;

        self.router.register(connection_id, sender);
        let revoked = Arc::new(Notify::new());
        self.revoke_signals.insert(connection_id, revoked.clone());

        self.router
            .unicast(connection_id, ServerMessage::Welcome { connection_id });

        debug!("Admitted identity {} as connection {}", identity_id, connection_id);
        Ok(AdmittedConnection {
            connection_id,
            revoked,
        })
    }

    /// Revoke an identity's active connection: kick notice, presence-leave
    /// broadcast, final coordinate flush, registry removal, loop cancellation.
    fn revoke(&mut self, identity_id: &str) {
        let Some(session) = self.sessions.remove_identity(identity_id) else {
            return;
        };
        let connection_id = session.connection_id;

        // Notice first: the per-connection FIFO writes Kicked before the
        // transport closes
        self.router
            .kick(connection_id, DUPLICATE_LOGIN_NOTICE.to_string());
        if let Some(signal) = self.revoke_signals.remove(&connection_id) {
            signal.notify_one();
        }

        if let Some(state) = self.players.remove(connection_id) {
            self.flush_coordinates(identity_id, state.x, state.z);
            self.router
                .broadcast_except(connection_id, &ServerMessage::PlayerDisconnected {
                    id: connection_id,
                });
        }
    }

    /// Complete the join handshake: create player state and seed the new
    /// connection with a point-in-time roster plus the recent chat ring,
    /// strictly before other connections hear `PlayerJoined`.
    pub fn join(&mut self, connection_id: ConnectionId, profile: JoinProfile) -> bool {
        let Some(identity) = self.sessions.identity_of(connection_id).map(str::to_string) else {
            return false;
        };
        if self.players.contains(connection_id) {
            return false;
        }

        let (x, z) = self.spawn_position(&identity, profile.x, profile.z);
        let name = profile.name.clone();
        self.players.join(connection_id, profile.into_profile(), x, z);
        self.throttles.entry(identity.clone()).or_default();

        // Point-in-time copy, not a live view
        let roster: HashMap<ConnectionId, PlayerSnapshot> = self
            .players
            .iter()
            .map(|p| (p.connection_id, PlayerSnapshot::from_state(p)))
            .collect();
        let joined = roster[&connection_id].clone();

        self.router
            .unicast(connection_id, ServerMessage::Roster(roster));
        self.router.unicast(
            connection_id,
            ServerMessage::RecentChat(self.router.recent_chat()),
        );
        self.router
            .broadcast_except(connection_id, &ServerMessage::PlayerJoined(joined));

        info!(
            "{} joined the plaza ({} connected)",
            name,
            self.players.len()
        );
        true
    }

    /// Spawn resolution: persisted last-known position when passable, else
    /// the client's suggestion, else the default spawn point.
    fn spawn_position(&self, identity_id: &str, suggested_x: f64, suggested_z: f64) -> (f64, f64) {
        if let Some((x, z)) = self.store.load(identity_id) {
            if self.map.validate(x, z, PLAYER_RADIUS) {
                return (x, z);
            }
        }
        if self.map.validate(suggested_x, suggested_z, PLAYER_RADIUS) {
            return (suggested_x, suggested_z);
        }
        DEFAULT_SPAWN
    }

    /// Validated movement. Rejections mutate nothing and propagate nothing;
    /// the client reconciles from the next accepted broadcast.
    pub fn handle_move(
        &mut self,
        connection_id: ConnectionId,
        x: f64,
        z: f64,
        direction: i8,
        anim_state: &str,
        now: Instant,
    ) {
        let Some(player) = self.players.get_mut(connection_id) else {
            return;
        };

        let resolution = self
            .map
            .resolve_move(player.x, player.z, x, z, PLAYER_RADIUS);
        let MoveResolution::Accepted { x, z } = resolution else {
            debug!("Rejected move for {} to ({:.2}, {:.2})", connection_id, x, z);
            return;
        };

        player.x = x;
        player.z = z;
        player.direction = normalize_direction(direction);
        player.animation.movement(true, anim_state == RUN, now);

        let delta = ServerMessage::PlayerMoved {
            id: connection_id,
            x,
            z,
            direction: player.direction,
            anim_state: player.animation.state().to_string(),
        };
        self.router.broadcast_except(connection_id, &delta);
        self.record_movement_write(connection_id, x, z, now);
    }

    /// Periodic persistence gate for one accepted movement
    fn record_movement_write(&mut self, connection_id: ConnectionId, x: f64, z: f64, now: Instant) {
        let Some(identity) = self.sessions.identity_of(connection_id).map(str::to_string) else {
            return;
        };
        if let Some(throttle) = self.throttles.get_mut(&identity) {
            if throttle.record_move(now) {
                self.persist_async(identity, x, z);
            }
        }
    }

    /// Explicit animation request, arbitrated by the priority lock.
    /// Unknown names are silently ignored. The broadcast carries the
    /// catalog's duration, not the client's.
    pub fn handle_play_anim(
        &mut self,
        connection_id: ConnectionId,
        animation: &str,
        direction: i8,
        now: Instant,
    ) {
        let catalog = self.catalog.clone();
        let Some(player) = self.players.get_mut(connection_id) else {
            return;
        };

        let direction = normalize_direction(direction);
        let Some(resolved) = player.animation.request(&catalog, animation, direction, now) else {
            return;
        };
        player.direction = direction;

        self.router.broadcast_except(
            connection_id,
            &ServerMessage::PlayAnim {
                id: connection_id,
                animation: resolved.name,
                duration_ms: resolved.duration_ms,
                direction,
            },
        );
    }

    /// Movement-derived animation state signal (walk/run/idle transitions)
    pub fn handle_anim_state(
        &mut self,
        connection_id: ConnectionId,
        anim_state: &str,
        direction: i8,
        is_moving: bool,
        now: Instant,
    ) {
        let Some(player) = self.players.get_mut(connection_id) else {
            return;
        };

        let direction = normalize_direction(direction);
        player.direction = direction;
        let Some(changed) = player
            .animation
            .movement(is_moving, anim_state == RUN, now)
        else {
            return;
        };

        self.router.broadcast_except(
            connection_id,
            &ServerMessage::AnimationState {
                id: connection_id,
                anim_state: changed,
                direction,
                is_moving,
            },
        );
    }

    /// Chat fan-out: verbatim payload, identical for every recipient
    /// including the sender, and appended to the late-joiner ring.
    pub fn handle_chat(&mut self, connection_id: ConnectionId, message: String) {
        let Some(player) = self.players.get(connection_id) else {
            return;
        };

        let line = ChatLine {
            id: connection_id,
            name: player.profile.display_name.clone(),
            message,
        };
        self.router.record_chat(line.clone());
        self.router.broadcast_all(&ServerMessage::Chat(line));
    }

    /// Reset a player to the default spawn point
    pub fn teleport_home(&mut self, connection_id: ConnectionId, now: Instant) {
        let Some(player) = self.players.get_mut(connection_id) else {
            return;
        };

        let (x, z) = DEFAULT_SPAWN;
        player.x = x;
        player.z = z;
        player.animation.movement(false, false, now);

        let delta = ServerMessage::PlayerMoved {
            id: connection_id,
            x,
            z,
            direction: player.direction,
            anim_state: player.animation.state().to_string(),
        };
        self.router.broadcast_except(connection_id, &delta);
        self.record_movement_write(connection_id, x, z, now);
    }

    /// Character change, driven by the web platform's HTTP side-channel.
    /// Observers treat it as remove-then-rejoin, so the broadcast carries
    /// the full new snapshot.
    pub fn change_character(&mut self, identity_id: &str, profile: JoinProfile) -> bool {
        let Some(connection_id) = self.sessions.connection_of(identity_id) else {
            return false;
        };
        if !self.players.set_profile(connection_id, profile.into_profile()) {
            return false;
        }

        if let Some(snapshot) = self.players.get(connection_id).map(PlayerSnapshot::from_state) {
            self.router.broadcast_except(
                connection_id,
                &ServerMessage::PlayerCharacterChanged(snapshot),
            );
        }
        true
    }

    /// Targeted social ping (follow/unfollow, level-up, EXP gain). Dropped
    /// when the identity has no active connection; these are live pings,
    /// not durable messages.
    pub fn notify_identity(&self, identity_id: &str, notice: SocialNotice) -> bool {
        match self.sessions.connection_of(identity_id) {
            Some(connection_id) => self
                .router
                .unicast(connection_id, ServerMessage::Social(notice)),
            None => false,
        }
    }

    /// Tear down a connection on graceful or abnormal disconnect.
    /// Idempotent, and a no-op for connections already superseded by a
    /// newer session (revocation already cleaned those up).
    pub fn release(&mut self, connection_id: ConnectionId) {
        let identity = self.sessions.identity_of(connection_id).map(str::to_string);

        if let Some(state) = self.players.remove(connection_id) {
            if let Some(identity) = &identity {
                self.flush_coordinates(identity, state.x, state.z);
            }
            self.router
                .broadcast_except(connection_id, &ServerMessage::PlayerDisconnected {
                    id: connection_id,
                });
            info!(
                "{} left the plaza ({} connected)",
                state.profile.display_name,
                self.players.len()
            );
        }

        self.sessions.release(connection_id);
        self.router.unregister(connection_id);
        self.revoke_signals.remove(&connection_id);
    }

    /// Final unconditional flush on disconnect, owed only when the identity
    /// moved since the last periodic write. The throttle entry stays behind
    /// to carry the write schedule across a reconnect.
    fn flush_coordinates(&mut self, identity_id: &str, x: f64, z: f64) {
        let owed = self
            .throttles
            .get_mut(identity_id)
            .map(|t| t.take_final_flush())
            .unwrap_or(false);
        if owed {
            self.persist_async(identity_id.to_string(), x, z);
        }
    }

    /// Fire-and-forget coordinate write, off the message path
    fn persist_async(&self, identity_id: String, x: f64, z: f64) {
        let store = self.store.clone();
        tokio::spawn(async move {
            store.save(&identity_id, x, z);
        });
    }
}
