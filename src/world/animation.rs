//! Animation definitions and the per-player animation lock state machine
//!
//! Competing animation requests are arbitrated with a priority table and
//! timed locks: a non-looping animation locks the state for its duration and
//! refuses lower-priority input until the lock expires. Movement-derived
//! states (Idle/Walk/Run) sit at the bottom of the priority table and never
//! preempt an active lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Movement-derived state names
pub const IDLE: &str = "Idle";
pub const WALK: &str = "Walk";
pub const RUN: &str = "Run";

/// Static per-animation configuration, looked up by name
#[derive(Debug, Clone)]
pub struct AnimationDef {
    pub frame_count: u32,
    pub duration_ms: u64,
    pub looping: bool,
    pub priority: u8,
    /// State to revert to when the lock expires; `None` falls through to
    /// movement-derived state (the `Dead*` family)
    pub return_to: Option<String>,
    /// Whether a `_Left` variant exists. Left variants are the same frames
    /// played in reverse order client-side; the server only resolves the
    /// variant name.
    pub has_left_variant: bool,
}

/// Immutable catalog of animation definitions, loaded once at startup
#[derive(Debug, Clone)]
pub struct AnimationCatalog {
    defs: HashMap<String, AnimationDef>,
}

impl AnimationCatalog {
    pub fn new(defs: HashMap<String, AnimationDef>) -> Self {
        Self { defs }
    }

    /// The built-in plaza animation set
    pub fn builtin() -> Self {
        let mut defs = HashMap::new();
        let mut add = |name: &str,
                       frame_count: u32,
                       duration_ms: u64,
                       looping: bool,
                       priority: u8,
                       return_to: Option<&str>,
                       has_left_variant: bool| {
            defs.insert(
                name.to_string(),
                AnimationDef {
                    frame_count,
                    duration_ms,
                    looping,
                    priority,
                    return_to: return_to.map(str::to_string),
                    has_left_variant,
                },
            );
        };

        add(IDLE, 30, 1000, true, 0, None, false);
        add(WALK, 24, 800, true, 1, None, false);
        add(RUN, 20, 600, true, 2, None, false);
        add("Wave", 45, 1200, false, 5, Some(IDLE), true);
        add("Sit", 30, 1000, true, 3, None, false);
        add("Dance", 60, 2000, true, 4, None, false);
        add("Jump", 28, 700, false, 8, Some(IDLE), false);
        add("Attack_1", 18, 600, false, 10, Some(IDLE), true);
        add("Attack_2", 24, 800, false, 10, Some(IDLE), true);
        add("Dead_1", 40, 1000, false, 15, None, false);

        Self::new(defs)
    }

    pub fn get(&self, name: &str) -> Option<&AnimationDef> {
        self.defs.get(name)
    }

    /// Resolve a base animation name against the facing direction: the
    /// `_Left` variant when facing -1 and one exists, else the base name.
    pub fn resolve_directional(&self, name: &str, direction: i8) -> String {
        match self.defs.get(name) {
            Some(def) if direction == -1 && def.has_left_variant => format!("{name}_Left"),
            _ => name.to_string(),
        }
    }
}

impl Default for AnimationCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// An animation accepted by the state machine, with the resolved name and
/// duration observers need to run the same lock timer locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAnim {
    pub name: String,
    pub duration_ms: u64,
    pub locked: bool,
}

#[derive(Debug, Clone)]
struct ActiveLock {
    priority: u8,
    until: Instant,
    return_to: Option<String>,
}

/// Per-player animation state with a timed priority lock.
///
/// All transitions take `now` explicitly so the machine is testable without
/// sleeping.
#[derive(Debug, Clone)]
pub struct AnimationMachine {
    state: String,
    lock: Option<ActiveLock>,
    // Last movement intent, used when an expiring lock falls through to a
    // movement-derived state
    moving: bool,
    running: bool,
}

impl AnimationMachine {
    pub fn new() -> Self {
        Self {
            state: IDLE.to_string(),
            lock: None,
            moving: false,
            running: false,
        }
    }

    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn is_locked(&self, now: Instant) -> bool {
        matches!(&self.lock, Some(l) if now < l.until)
    }

    fn movement_state(&self) -> &'static str {
        if !self.moving {
            IDLE
        } else if self.running {
            RUN
        } else {
            WALK
        }
    }

    /// Expire the lock if its deadline has passed. Returns the new state
    /// when the expiry changed it (so the change can be broadcast).
    pub fn tick(&mut self, now: Instant) -> Option<String> {
        let expired = match &self.lock {
            Some(l) if now >= l.until => true,
            _ => false,
        };
        if !expired {
            return None;
        }
        let lock = self.lock.take().expect("checked above");
        let next = lock
            .return_to
            .unwrap_or_else(|| self.movement_state().to_string());
        if next != self.state {
            self.state = next.clone();
            Some(next)
        } else {
            None
        }
    }

    /// Apply an explicit animation request.
    ///
    /// Unknown names return `None` without touching state (benign race
    /// between client asset loading and state application). A request is
    /// refused while a lock of higher priority is active.
    pub fn request(
        &mut self,
        catalog: &AnimationCatalog,
        name: &str,
        direction: i8,
        now: Instant,
    ) -> Option<ResolvedAnim> {
        let def = catalog.get(name)?.clone();
        self.tick(now);

        if let Some(lock) = &self.lock {
            if now < lock.until && def.priority < lock.priority {
                return None;
            }
        }

        let resolved = catalog.resolve_directional(name, direction);
        self.state = resolved.clone();

        if def.looping {
            self.lock = None;
        } else {
            self.lock = Some(ActiveLock {
                priority: def.priority,
                until: now + Duration::from_millis(def.duration_ms),
                return_to: def.return_to.clone(),
            });
        }

        Some(ResolvedAnim {
            name: resolved,
            duration_ms: def.duration_ms,
            locked: !def.looping,
        })
    }

    /// Apply continuous movement intent (Walk/Run/Idle, priority 0-2).
    ///
    /// Movement never preempts an active lock; the intent is still recorded
    /// so lock expiry falls through to the right state. Returns the new
    /// state when it changed.
    pub fn movement(&mut self, is_moving: bool, running: bool, now: Instant) -> Option<String> {
        self.moving = is_moving;
        self.running = running;

        let before = self.state.clone();
        self.tick(now);
        if !self.is_locked(now) {
            let next = self.movement_state();
            if next != self.state {
                self.state = next.to_string();
            }
        }

        if self.state != before {
            Some(self.state.clone())
        } else {
            None
        }
    }

    /// Server-side override: clear any lock and drop back to Idle.
    /// Used when a connection is reset or revoked.
    pub fn reset(&mut self) {
        self.lock = None;
        self.moving = false;
        self.running = false;
        self.state = IDLE.to_string();
    }
}

impl Default for AnimationMachine {
    fn default() -> Self {
        Self::new()
    }
}
