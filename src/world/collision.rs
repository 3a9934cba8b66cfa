//! Static collision geometry for the plaza
//!
//! The plaza is a circular world with a fixed set of obstacle shapes loaded
//! once at startup. Movement requests are validated here before they are
//! allowed to touch shared player state.

use serde::{Deserialize, Serialize};

/// World radius of the default plaza (world units)
pub const MAP_RADIUS: f64 = 45.0;

/// Collision radius of a player avatar
pub const PLAYER_RADIUS: f64 = 1.0;

/// Default spawn point, used for first-time joins and `TeleportHome`
pub const DEFAULT_SPAWN: (f64, f64) = (0.0, 20.0);

/// An immutable obstacle in the plaza
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CollisionShape {
    /// Circular obstacle (fountains, trees, pillars)
    Circle { x: f64, z: f64, radius: f64 },
    /// Axis-aligned rectangular obstacle (benches, stalls, planters)
    Rect {
        x: f64,
        z: f64,
        half_width: f64,
        half_height: f64,
    },
}

impl CollisionShape {
    /// Check whether a point with the given radius overlaps this shape.
    ///
    /// Rects use a point-in-expanded-rectangle test: the rectangle is padded
    /// by `radius` on each side rather than doing exact circle-vs-rect math.
    pub fn blocks(&self, px: f64, pz: f64, radius: f64) -> bool {
        match *self {
            CollisionShape::Circle { x, z, radius: r } => {
                let dx = px - x;
                let dz = pz - z;
                let min_dist = r + radius;
                dx * dx + dz * dz < min_dist * min_dist
            }
            CollisionShape::Rect {
                x,
                z,
                half_width,
                half_height,
            } => {
                (px - x).abs() < half_width + radius && (pz - z).abs() < half_height + radius
            }
        }
    }
}

/// Result of resolving a movement request against the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MoveResolution {
    /// The requested displacement (possibly reduced to one axis) is passable
    Accepted { x: f64, z: f64 },
    /// No axis of the displacement is passable; position unchanged
    Rejected,
}

/// Static collision map: circular world boundary plus obstacle shapes.
///
/// Read-only after startup, so it is shared between connection tasks without
/// any locking.
#[derive(Debug, Clone)]
pub struct CollisionMap {
    map_radius: f64,
    shapes: Vec<CollisionShape>,
}

impl CollisionMap {
    pub fn new(map_radius: f64, shapes: Vec<CollisionShape>) -> Self {
        Self { map_radius, shapes }
    }

    /// The default plaza layout: central fountain, benches and trees.
    pub fn plaza() -> Self {
        Self::new(
            MAP_RADIUS,
            vec![
                // Central fountain
                CollisionShape::Circle {
                    x: 0.0,
                    z: 0.0,
                    radius: 6.0,
                },
                // Benches flanking the fountain
                CollisionShape::Rect {
                    x: -14.0,
                    z: 0.0,
                    half_width: 1.0,
                    half_height: 4.0,
                },
                CollisionShape::Rect {
                    x: 14.0,
                    z: 0.0,
                    half_width: 1.0,
                    half_height: 4.0,
                },
                // Trees along the outer ring
                CollisionShape::Circle {
                    x: -25.0,
                    z: 25.0,
                    radius: 2.0,
                },
                CollisionShape::Circle {
                    x: 25.0,
                    z: 25.0,
                    radius: 2.0,
                },
                CollisionShape::Circle {
                    x: -25.0,
                    z: -25.0,
                    radius: 2.0,
                },
                CollisionShape::Circle {
                    x: 25.0,
                    z: -25.0,
                    radius: 2.0,
                },
            ],
        )
    }

    /// An obstacle-free map with the given radius (used heavily by tests)
    pub fn empty(map_radius: f64) -> Self {
        Self::new(map_radius, Vec::new())
    }

    pub fn map_radius(&self) -> f64 {
        self.map_radius
    }

    /// Pure passability predicate: true when a player of `player_radius`
    /// can stand at (x, z).
    ///
    /// The boundary test is strict: a player exactly touching the world edge
    /// is still passable.
    pub fn validate(&self, x: f64, z: f64, player_radius: f64) -> bool {
        // NaN makes every comparison below false, which would read as
        // passable; non-finite input is never a valid position
        if !x.is_finite() || !z.is_finite() {
            return false;
        }
        if (x * x + z * z).sqrt() + player_radius > self.map_radius {
            return false;
        }
        !self.shapes.iter().any(|s| s.blocks(x, z, player_radius))
    }

    /// Resolve a movement request from the last accepted position.
    ///
    /// Fallback order: full diagonal displacement, then X only, then Z only,
    /// else rejected. The axis fallbacks are what produce wall sliding
    /// instead of a hard stop, and the order is client-observable.
    pub fn resolve_move(
        &self,
        from_x: f64,
        from_z: f64,
        to_x: f64,
        to_z: f64,
        player_radius: f64,
    ) -> MoveResolution {
        if self.validate(to_x, to_z, player_radius) {
            return MoveResolution::Accepted { x: to_x, z: to_z };
        }
        if self.validate(to_x, from_z, player_radius) {
            return MoveResolution::Accepted { x: to_x, z: from_z };
        }
        if self.validate(from_x, to_z, player_radius) {
            return MoveResolution::Accepted { x: from_x, z: to_z };
        }
        MoveResolution::Rejected
    }
}

impl Default for CollisionMap {
    fn default() -> Self {
        Self::plaza()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundary_exact() {
        // mapRadius=45, playerRadius=1: distance 44 is the last passable spot
        let map = CollisionMap::empty(45.0);
        assert!(map.validate(44.0, 0.0, 1.0));
        assert!(!map.validate(44.001, 0.0, 1.0));
    }

    #[test]
    fn test_boundary_diagonal() {
        let map = CollisionMap::empty(45.0);
        let d = 44.0 / std::f64::consts::SQRT_2;
        assert!(map.validate(d, d, 1.0));
        assert!(!map.validate(d + 0.1, d + 0.1, 1.0));
    }

    #[test]
    fn test_circle_obstacle() {
        let map = CollisionMap::new(
            45.0,
            vec![CollisionShape::Circle {
                x: 10.0,
                z: 0.0,
                radius: 3.0,
            }],
        );
        // Inside the padded circle
        assert!(!map.validate(10.0, 3.5, 1.0));
        // Just outside radius + player_radius = 4
        assert!(map.validate(10.0, 4.1, 1.0));
    }

    #[test]
    fn test_rect_obstacle_padding() {
        let map = CollisionMap::new(
            45.0,
            vec![CollisionShape::Rect {
                x: 0.0,
                z: 10.0,
                half_width: 2.0,
                half_height: 1.0,
            }],
        );
        // Expanded rect spans x in (-3, 3), z in (8, 12) for radius 1
        assert!(!map.validate(2.9, 10.0, 1.0));
        assert!(map.validate(3.1, 10.0, 1.0));
        assert!(!map.validate(0.0, 8.5, 1.0));
        assert!(map.validate(0.0, 7.9, 1.0));
    }

    #[test]
    fn test_resolve_full_move() {
        let map = CollisionMap::empty(45.0);
        let res = map.resolve_move(0.0, 0.0, 3.0, 4.0, 1.0);
        assert_eq!(res, MoveResolution::Accepted { x: 3.0, z: 4.0 });
    }

    #[test]
    fn test_resolve_slides_along_wall() {
        // Wall blocks movement in X but not in Z from the origin side
        let map = CollisionMap::new(
            45.0,
            vec![CollisionShape::Rect {
                x: 5.0,
                z: 0.0,
                half_width: 1.0,
                half_height: 20.0,
            }],
        );
        // Diagonal into the wall: X component blocked, Z passes
        let res = map.resolve_move(0.0, 0.0, 5.0, 3.0, 1.0);
        assert_eq!(res, MoveResolution::Accepted { x: 0.0, z: 3.0 });
    }

    #[test]
    fn test_resolve_x_only_fallback() {
        // Obstacle above the target Z, clear along X
        let map = CollisionMap::new(
            45.0,
            vec![CollisionShape::Rect {
                x: 0.0,
                z: 5.0,
                half_width: 20.0,
                half_height: 1.0,
            }],
        );
        let res = map.resolve_move(0.0, 0.0, 3.0, 5.0, 1.0);
        assert_eq!(res, MoveResolution::Accepted { x: 3.0, z: 0.0 });
    }

    #[test]
    fn test_resolve_rejected() {
        // Boxed in: both axes blocked
        let map = CollisionMap::new(
            45.0,
            vec![
                CollisionShape::Rect {
                    x: 5.0,
                    z: 0.0,
                    half_width: 1.0,
                    half_height: 20.0,
                },
                CollisionShape::Rect {
                    x: 0.0,
                    z: 5.0,
                    half_width: 20.0,
                    half_height: 1.0,
                },
            ],
        );
        let res = map.resolve_move(0.0, 0.0, 5.0, 5.0, 1.0);
        assert_eq!(res, MoveResolution::Rejected);
    }

    #[test]
    fn test_non_finite_coordinates_rejected() {
        let map = CollisionMap::plaza();
        assert!(!map.validate(f64::NAN, f64::NAN, PLAYER_RADIUS));
        assert!(!map.validate(f64::NAN, 0.0, PLAYER_RADIUS));
        assert!(!map.validate(f64::INFINITY, 0.0, PLAYER_RADIUS));
        assert!(!map.validate(0.0, f64::NEG_INFINITY, PLAYER_RADIUS));

        // No axis fallback may smuggle a non-finite coordinate through
        let res = map.resolve_move(0.0, 20.0, f64::NAN, f64::NAN, PLAYER_RADIUS);
        assert_eq!(res, MoveResolution::Rejected);
        let res = map.resolve_move(0.0, 20.0, f64::NAN, 21.0, PLAYER_RADIUS);
        assert_eq!(res, MoveResolution::Accepted { x: 0.0, z: 21.0 });
    }

    #[test]
    fn test_rejection_keeps_origin_valid() {
        let map = CollisionMap::plaza();
        // Default spawn must always be passable
        let (sx, sz) = DEFAULT_SPAWN;
        assert!(map.validate(sx, sz, PLAYER_RADIUS));
    }

    #[test]
    fn test_plaza_fountain_blocks_center() {
        let map = CollisionMap::plaza();
        assert!(!map.validate(0.0, 0.0, PLAYER_RADIUS));
    }
}
