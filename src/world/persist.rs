//! Rate-limited write-back of last known coordinates
//!
//! The durable store is an external collaborator; this module only decides
//! *when* to write. Writes are issued off the message path as fire-and-forget
//! tasks, at most once per identity per flush interval, plus one final
//! unconditional write on disconnect when the connection moved since the
//! last flush.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Minimum spacing between periodic coordinate writes for one identity
pub const FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

/// Last-known-coordinate storage consumed by the hub.
///
/// Implementations must be cheap and non-blocking; the hub wraps calls in
/// spawned tasks so a slow store can never stall inbound message handling.
pub trait CoordinateStore: Send + Sync {
    fn load(&self, identity_id: &str) -> Option<(f64, f64)>;
    fn save(&self, identity_id: &str, x: f64, z: f64);
}

/// In-memory store used in tests and single-node deployments
#[derive(Debug, Default)]
pub struct InMemoryCoordinateStore {
    coords: Mutex<HashMap<String, (f64, f64)>>,
}

impl InMemoryCoordinateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.coords.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.lock().is_empty()
    }
}

impl CoordinateStore for InMemoryCoordinateStore {
    fn load(&self, identity_id: &str) -> Option<(f64, f64)> {
        self.coords.lock().get(identity_id).copied()
    }

    fn save(&self, identity_id: &str, x: f64, z: f64) {
        self.coords.lock().insert(identity_id.to_string(), (x, z));
    }
}

/// Per-connection write throttle. Takes `now` explicitly so the schedule is
/// testable without sleeping.
#[derive(Debug, Default)]
pub struct PersistenceThrottle {
    last_flush: Option<Instant>,
    dirty: bool,
}

impl PersistenceThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted movement. Returns true when a periodic write
    /// should be issued now.
    pub fn record_move(&mut self, now: Instant) -> bool {
        self.dirty = true;
        match self.last_flush {
            Some(at) if now.duration_since(at) < FLUSH_INTERVAL => false,
            _ => {
                self.last_flush = Some(now);
                self.dirty = false;
                true
            }
        }
    }

    /// Final flush decision on disconnect: true when the connection moved
    /// since the last periodic write.
    pub fn take_final_flush(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}
