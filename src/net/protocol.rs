use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::world::player::{ConnectionId, PlayerProfile, PlayerState};

/// Messages from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Identity handshake; must be the first message on a connection
    Hello { user_id: String, token: String },
    /// Join the plaza with a visual profile (after `Welcome`)
    Join(JoinProfile),
    /// Movement request with client-reported target coordinates
    Move {
        x: f64,
        z: f64,
        direction: i8,
        anim_state: String,
    },
    /// Explicit animation request (emotes, attacks)
    PlayAnim {
        animation: String,
        duration_ms: u64,
        direction: i8,
    },
    /// Movement-derived animation state change
    AnimationState {
        anim_state: String,
        direction: i8,
        is_moving: bool,
    },
    /// Reset position to the default spawn point
    TeleportHome,
    /// Chat message (sender identity is attached server-side)
    Chat { message: String },
    /// Graceful disconnect
    Leave,
}

/// Messages from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted; the session is admitted
    Welcome { connection_id: ConnectionId },
    /// Handshake refused; the connection is closed after this
    Refused { reason: String },
    /// Full roster snapshot, unicast to a joining connection before any
    /// incremental event for it
    Roster(HashMap<ConnectionId, PlayerSnapshot>),
    /// Recent chat ring replay for late joiners
    RecentChat(Vec<ChatLine>),
    /// A player joined the plaza
    PlayerJoined(PlayerSnapshot),
    /// Accepted movement delta
    PlayerMoved {
        id: ConnectionId,
        x: f64,
        z: f64,
        direction: i8,
        anim_state: String,
    },
    /// Locked/special animation with the resolved duration so observers run
    /// the same lock timer without further round-trips
    PlayAnim {
        id: ConnectionId,
        animation: String,
        duration_ms: u64,
        direction: i8,
    },
    /// Movement-derived animation state change
    AnimationState {
        id: ConnectionId,
        anim_state: String,
        direction: i8,
        is_moving: bool,
    },
    /// Chat fan-out; identical payload for every recipient, sender included
    Chat(ChatLine),
    /// A player swapped character; full snapshot so no stale assets linger
    PlayerCharacterChanged(PlayerSnapshot),
    /// A player left the plaza
    PlayerDisconnected { id: ConnectionId },
    /// Terminal notice to a superseded connection; the client must stop all
    /// further sends
    Kicked { message: String },
    /// Targeted social ping (best-effort, never queued)
    Social(SocialNotice),
}

/// Social notifications delivered to an identity's active connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SocialNotice {
    Followed { follower_name: String },
    Unfollowed { follower_name: String },
    LevelUp { level: u32 },
    ExpGained { amount: u64 },
}

/// Join handshake payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinProfile {
    pub name: String,
    pub char_type: String,
    pub level: u32,
    pub rank_title: String,
    pub avatar_url: String,
    pub exp_points: u64,
    pub x: f64,
    pub z: f64,
}

impl JoinProfile {
    pub fn into_profile(self) -> PlayerProfile {
        PlayerProfile {
            display_name: self.name,
            char_type: self.char_type,
            level: self.level,
            rank_title: self.rank_title,
            avatar_url: self.avatar_url,
            exp_points: self.exp_points,
        }
    }
}

/// One chat line as it appears on the wire for every recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub id: ConnectionId,
    pub name: String,
    pub message: String,
}

/// Point-in-time view of one player's visible state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub id: ConnectionId,
    pub name: String,
    pub char_type: String,
    pub level: u32,
    pub rank_title: String,
    pub avatar_url: String,
    pub exp_points: u64,
    pub x: f64,
    pub z: f64,
    pub direction: i8,
    pub anim_state: String,
}

impl PlayerSnapshot {
    pub fn from_state(state: &PlayerState) -> Self {
        Self {
            id: state.connection_id,
            name: state.profile.display_name.clone(),
            char_type: state.profile.char_type.clone(),
            level: state.profile.level,
            rank_title: state.profile.rank_title.clone(),
            avatar_url: state.profile.avatar_url.clone(),
            exp_points: state.profile.exp_points,
            x: state.x,
            z: state.z,
            direction: state.direction,
            anim_state: state.animation.state().to_string(),
        }
    }
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with the web client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with the web client)
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_hello_round_trip() {
        let msg = ClientMessage::Hello {
            user_id: "4521".to_string(),
            token: "session-abc".to_string(),
        };
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        match decoded {
            ClientMessage::Hello { user_id, token } => {
                assert_eq!(user_id, "4521");
                assert_eq!(token, "session-abc");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_move_round_trip() {
        let msg = ClientMessage::Move {
            x: 12.5,
            z: -3.25,
            direction: -1,
            anim_state: "Walk".to_string(),
        };
        let encoded = encode(&msg).unwrap();
        let decoded: ClientMessage = decode(&encoded).unwrap();
        match decoded {
            ClientMessage::Move {
                x,
                z,
                direction,
                anim_state,
            } => {
                assert_eq!(x, 12.5);
                assert_eq!(z, -3.25);
                assert_eq!(direction, -1);
                assert_eq!(anim_state, "Walk");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_roster_round_trip() {
        let id = Uuid::new_v4();
        let snapshot = PlayerSnapshot {
            id,
            name: "Alice".to_string(),
            char_type: "knight".to_string(),
            level: 12,
            rank_title: "Adept".to_string(),
            avatar_url: "/avatars/12.png".to_string(),
            exp_points: 3400,
            x: 5.0,
            z: -2.0,
            direction: 1,
            anim_state: "Idle".to_string(),
        };
        let mut roster = HashMap::new();
        roster.insert(id, snapshot);

        let encoded = encode(&ServerMessage::Roster(roster)).unwrap();
        let decoded: ServerMessage = decode(&encoded).unwrap();
        match decoded {
            ServerMessage::Roster(r) => {
                assert_eq!(r.len(), 1);
                assert_eq!(r[&id].name, "Alice");
                assert_eq!(r[&id].level, 12);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_chat_wire_payload_identical() {
        let line = ChatLine {
            id: Uuid::new_v4(),
            name: "Alice".to_string(),
            message: "hello".to_string(),
        };
        // Every recipient decodes the same bytes into the same line
        let encoded = encode(&ServerMessage::Chat(line.clone())).unwrap();
        let a: ServerMessage = decode(&encoded).unwrap();
        let b: ServerMessage = decode(&encoded).unwrap();
        match (a, b) {
            (ServerMessage::Chat(la), ServerMessage::Chat(lb)) => {
                assert_eq!(la, lb);
                assert_eq!(la, line);
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_social_round_trip() {
        let msg = ServerMessage::Social(SocialNotice::LevelUp { level: 7 });
        let encoded = encode(&msg).unwrap();
        let decoded: ServerMessage = decode(&encoded).unwrap();
        match decoded {
            ServerMessage::Social(SocialNotice::LevelUp { level }) => assert_eq!(level, 7),
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_kicked_round_trip() {
        let msg = ServerMessage::Kicked {
            message: "Signed in from another window".to_string(),
        };
        let encoded = encode(&msg).unwrap();
        let decoded: ServerMessage = decode(&encoded).unwrap();
        match decoded {
            ServerMessage::Kicked { message } => {
                assert_eq!(message, "Signed in from another window");
            }
            _ => panic!("Wrong message type"),
        }
    }

    #[test]
    fn test_invalid_decode() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        let result: Result<ClientMessage, _> = decode(&garbage);
        assert!(result.is_err());
    }
}
