//! Identity sessions: at most one active connection per identity
//!
//! The registry maps authenticated identities to their single active
//! connection. Reconnects supersede: the prior connection is revoked (kick
//! notice + transport termination, orchestrated by the hub) before the new
//! one is admitted. `identity_id -> connection_id` stays a partial function
//! at all times; that is the load-bearing invariant of this subsystem.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use uuid::Uuid;

use crate::world::player::ConnectionId;

/// Stable authenticated user id, issued by the web platform
pub type IdentityId = String;

/// Handshake refusal; the only error this subsystem propagates
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmitError {
    #[error("Missing identity credential")]
    MissingCredential,
    #[error("Session token expired")]
    TokenExpired,
}

/// One admitted identity session
#[derive(Debug, Clone)]
pub struct Session {
    pub identity_id: IdentityId,
    pub connection_id: ConnectionId,
    pub token: String,
    pub connected_at: Instant,
}

/// Registry of active identity sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    by_identity: HashMap<IdentityId, Session>,
    identity_by_connection: HashMap<ConnectionId, IdentityId>,
    /// Tokens flagged expired by the external auth collaborator
    expired_tokens: HashSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate a handshake credential. Well-formedness only: non-empty id
    /// and token, token not flagged expired. Token issuance lives in the
    /// web platform.
    pub fn validate(&self, identity_id: &str, token: &str) -> Result<(), AdmitError> {
        if identity_id.trim().is_empty() || token.trim().is_empty() {
            return Err(AdmitError::MissingCredential);
        }
        if self.expired_tokens.contains(token) {
            return Err(AdmitError::TokenExpired);
        }
        Ok(())
    }

    /// Flag a token as expired (external auth invalidated the web session)
    pub fn flag_token_expired(&mut self, token: String) {
        self.expired_tokens.insert(token);
    }

    /// The active session for an identity, if any
    pub fn active(&self, identity_id: &str) -> Option<&Session> {
        self.by_identity.get(identity_id)
    }

    pub fn connection_of(&self, identity_id: &str) -> Option<ConnectionId> {
        self.by_identity.get(identity_id).map(|s| s.connection_id)
    }

    pub fn identity_of(&self, connection_id: ConnectionId) -> Option<&str> {
        self.identity_by_connection
            .get(&connection_id)
            .map(String::as_str)
    }

    /// Insert a fresh session for an identity, generating its connection id.
    /// Any prior session for the identity is removed first so both indexes
    /// stay consistent.
    pub fn insert(&mut self, identity_id: IdentityId, token: String) -> Session {
        self.remove_identity(&identity_id);

        let session = Session {
            identity_id: identity_id.clone(),
            connection_id: Uuid::new_v4(),
            token,
            connected_at: Instant::now(),
        };
        self.identity_by_connection
            .insert(session.connection_id, identity_id.clone());
        self.by_identity.insert(identity_id, session.clone());
        session
    }

    /// Remove an identity's active session (revocation path)
    pub fn remove_identity(&mut self, identity_id: &str) -> Option<Session> {
        let session = self.by_identity.remove(identity_id)?;
        self.identity_by_connection.remove(&session.connection_id);
        Some(session)
    }

    /// Remove by connection id on graceful or abnormal disconnect.
    /// Idempotent; also a no-op when the connection was already superseded
    /// by a newer session for the same identity.
    pub fn release(&mut self, connection_id: ConnectionId) -> Option<Session> {
        let identity = self.identity_by_connection.remove(&connection_id)?;
        // Only drop the identity entry when it still points at this
        // connection; a reconnect may have replaced it already.
        match self.by_identity.get(&identity) {
            Some(s) if s.connection_id == connection_id => self.by_identity.remove(&identity),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }
}
