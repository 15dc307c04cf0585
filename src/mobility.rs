//! Mobility models and initial position allocators.
//!
//! A mobility model maps simulation time to a node position. The
//! runtime queries positions at event dispatch time, so queries are
//! non-decreasing in time; the random walk exploits this to advance
//! its legs lazily.
//!
//! All randomness comes from seeded ChaCha8 RNGs — given the same seed
//! and query sequence, positions are bit-identical across runs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::geom::Position;
use crate::time::SimTime;

// ── Bounds ────────────────────────────────────────────────────────────

/// A rectangular boundary for bounded mobility models.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Construct bounds, normalizing inverted corners.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Self {
        Bounds {
            min_x: min_x.min(max_x),
            max_x: min_x.max(max_x),
            min_y: min_y.min(max_y),
            max_y: min_y.max(max_y),
        }
    }

    /// Fold a coordinate back into `[min, max]` by reflection.
    fn reflect(mut v: f64, min: f64, max: f64) -> f64 {
        let span = max - min;
        if span <= 0.0 {
            return min;
        }
        // Map into [0, 2*span) then mirror the upper half.
        let mut offset = (v - min) % (2.0 * span);
        if offset < 0.0 {
            offset += 2.0 * span;
        }
        if offset > span {
            offset = 2.0 * span - offset;
        }
        v = min + offset;
        v
    }

    /// Reflect a position into the bounds.
    pub fn clamp_reflect(&self, p: Position) -> Position {
        Position::new(
            Self::reflect(p.x, self.min_x, self.max_x),
            Self::reflect(p.y, self.min_y, self.max_y),
        )
    }
}

// ── Mobility models ───────────────────────────────────────────────────

/// A node's motion as a function of virtual time.
#[derive(Debug, Clone)]
pub enum MobilityModel {
    /// Fixed at one position forever.
    ConstantPosition(Position),

    /// Straight-line motion at a fixed velocity from `origin` starting
    /// at `start`.
    ConstantVelocity {
        origin: Position,
        /// Meters per second along each axis.
        velocity: (f64, f64),
        start: SimTime,
    },

    /// Bounded 2-D random walk: straight legs of fixed duration with a
    /// freshly drawn direction per leg, reflecting off the bounds.
    RandomWalk2d(RandomWalk2d),
}

impl MobilityModel {
    /// Position at virtual time `t`.
    ///
    /// For the random walk, `t` must be non-decreasing across calls.
    pub fn position_at(&mut self, t: SimTime) -> Position {
        match self {
            MobilityModel::ConstantPosition(p) => *p,
            MobilityModel::ConstantVelocity {
                origin,
                velocity,
                start,
            } => {
                let dt = t.duration_since(*start).unwrap_or(SimTime::ZERO).as_secs_f64();
                origin.offset(velocity.0 * dt, velocity.1 * dt)
            }
            MobilityModel::RandomWalk2d(walk) => walk.position_at(t),
        }
    }
}

/// State for [`MobilityModel::RandomWalk2d`].
#[derive(Debug, Clone)]
pub struct RandomWalk2d {
    bounds: Bounds,
    /// Speed in meters per second.
    speed: f64,
    /// Duration of one straight leg.
    leg: SimTime,
    rng: ChaCha8Rng,
    leg_start: SimTime,
    leg_origin: Position,
    direction: (f64, f64),
}

impl RandomWalk2d {
    /// Create a walk starting at `origin` at time zero.
    pub fn new(origin: Position, bounds: Bounds, speed: f64, leg: SimTime, seed: u64) -> Self {
        assert!(leg > SimTime::ZERO, "random walk leg duration must be positive");
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let direction = Self::draw_direction(&mut rng);
        RandomWalk2d {
            bounds,
            speed,
            leg,
            rng,
            leg_start: SimTime::ZERO,
            leg_origin: bounds.clamp_reflect(origin),
            direction,
        }
    }

    fn draw_direction(rng: &mut ChaCha8Rng) -> (f64, f64) {
        let theta = rng.gen_range(0.0..std::f64::consts::TAU);
        (theta.cos(), theta.sin())
    }

    fn leg_end_position(&self) -> Position {
        let dt = self.leg.as_secs_f64();
        let raw = self
            .leg_origin
            .offset(self.direction.0 * self.speed * dt, self.direction.1 * self.speed * dt);
        self.bounds.clamp_reflect(raw)
    }

    fn position_at(&mut self, t: SimTime) -> Position {
        // Advance whole legs that have elapsed, redrawing direction.
        while t.duration_since(self.leg_start).map_or(false, |d| d >= self.leg) {
            self.leg_origin = self.leg_end_position();
            self.leg_start = self.leg_start + self.leg;
            self.direction = Self::draw_direction(&mut self.rng);
        }
        let dt = t
            .duration_since(self.leg_start)
            .unwrap_or(SimTime::ZERO)
            .as_secs_f64();
        let raw = self
            .leg_origin
            .offset(self.direction.0 * self.speed * dt, self.direction.1 * self.speed * dt);
        self.bounds.clamp_reflect(raw)
    }
}

// ── Position allocators ───────────────────────────────────────────────

/// Produces initial node placements.
#[derive(Debug, Clone)]
pub enum PositionAllocator {
    /// Explicit list, consumed in order. Panics if exhausted.
    List(Vec<Position>),

    /// Row-first rectangular grid.
    Grid {
        min_x: f64,
        min_y: f64,
        delta_x: f64,
        delta_y: f64,
        /// Nodes per row.
        width: usize,
    },

    /// Uniform placement within a disc around a center point.
    RandomDisc {
        center: Position,
        max_radius: f64,
        rng: ChaCha8Rng,
    },
}

impl PositionAllocator {
    /// Uniform disc allocator with a deterministic seed.
    pub fn random_disc(center: Position, max_radius: f64, seed: u64) -> Self {
        PositionAllocator::RandomDisc {
            center,
            max_radius,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Allocate `count` positions.
    pub fn allocate(&mut self, count: usize) -> Vec<Position> {
        match self {
            PositionAllocator::List(list) => {
                assert!(
                    list.len() >= count,
                    "position list has {} entries, {} requested",
                    list.len(),
                    count
                );
                list.drain(..count).collect()
            }
            PositionAllocator::Grid {
                min_x,
                min_y,
                delta_x,
                delta_y,
                width,
            } => {
                assert!(*width > 0, "grid width must be positive");
                (0..count)
                    .map(|i| {
                        Position::new(
                            *min_x + (i % *width) as f64 * *delta_x,
                            *min_y + (i / *width) as f64 * *delta_y,
                        )
                    })
                    .collect()
            }
            PositionAllocator::RandomDisc {
                center,
                max_radius,
                rng,
            } => (0..count)
                .map(|_| {
                    let rho = rng.gen_range(0.0..=*max_radius);
                    let theta = rng.gen_range(0.0..std::f64::consts::TAU);
                    center.offset(rho * theta.cos(), rho * theta.sin())
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_position() {
        let mut m = MobilityModel::ConstantPosition(Position::new(7.0, 20.0));
        assert_eq!(m.position_at(SimTime::ZERO), Position::new(7.0, 20.0));
        assert_eq!(m.position_at(SimTime::from_secs(100)), Position::new(7.0, 20.0));
    }

    #[test]
    fn test_constant_velocity() {
        // Moving straight down at 1 m/s, like the mobile node in the
        // three-node chain scenario.
        let mut m = MobilityModel::ConstantVelocity {
            origin: Position::new(7.0, 20.0),
            velocity: (0.0, -1.0),
            start: SimTime::ZERO,
        };
        let p = m.position_at(SimTime::from_secs(5));
        assert!((p.x - 7.0).abs() < 1e-9);
        assert!((p.y - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_velocity_before_start() {
        let mut m = MobilityModel::ConstantVelocity {
            origin: Position::new(0.0, 0.0),
            velocity: (2.0, 0.0),
            start: SimTime::from_secs(10),
        };
        // Before the start time the node has not moved.
        assert_eq!(m.position_at(SimTime::from_secs(5)), Position::new(0.0, 0.0));
    }

    #[test]
    fn test_random_walk_stays_in_bounds() {
        let bounds = Bounds::new(0.0, 200.0, 0.0, 200.0);
        let walk = RandomWalk2d::new(
            Position::new(100.0, 100.0),
            bounds,
            1.0,
            SimTime::from_secs(2),
            42,
        );
        let mut m = MobilityModel::RandomWalk2d(walk);
        for s in 0..600 {
            let p = m.position_at(SimTime::from_millis(s * 100));
            assert!(p.x >= 0.0 && p.x <= 200.0, "x out of bounds: {}", p);
            assert!(p.y >= 0.0 && p.y <= 200.0, "y out of bounds: {}", p);
        }
    }

    #[test]
    fn test_random_walk_deterministic() {
        fn trace(seed: u64) -> Vec<Position> {
            let bounds = Bounds::new(0.0, 100.0, 0.0, 100.0);
            let walk = RandomWalk2d::new(
                Position::new(50.0, 50.0),
                bounds,
                1.5,
                SimTime::from_secs(1),
                seed,
            );
            let mut m = MobilityModel::RandomWalk2d(walk);
            (0..50)
                .map(|s| m.position_at(SimTime::from_millis(s * 200)))
                .collect()
        }
        assert_eq!(trace(7), trace(7));
    }

    #[test]
    fn test_reflect_folds_into_range() {
        assert!((Bounds::reflect(-10.0, 0.0, 100.0) - 10.0).abs() < 1e-9);
        assert!((Bounds::reflect(110.0, 0.0, 100.0) - 90.0).abs() < 1e-9);
        assert!((Bounds::reflect(50.0, 0.0, 100.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_allocator_row_first() {
        let mut alloc = PositionAllocator::Grid {
            min_x: 0.0,
            min_y: 0.0,
            delta_x: 20.0,
            delta_y: 20.0,
            width: 5,
        };
        let positions = alloc.allocate(7);
        assert_eq!(positions[0], Position::new(0.0, 0.0));
        assert_eq!(positions[4], Position::new(80.0, 0.0));
        // Sixth node wraps to the second row.
        assert_eq!(positions[5], Position::new(0.0, 20.0));
        assert_eq!(positions[6], Position::new(20.0, 20.0));
    }

    #[test]
    fn test_list_allocator() {
        let mut alloc = PositionAllocator::List(vec![
            Position::new(0.0, 10.0),
            Position::new(7.0, 20.0),
            Position::new(15.0, 10.0),
        ]);
        let positions = alloc.allocate(3);
        assert_eq!(positions[1], Position::new(7.0, 20.0));
    }

    #[test]
    fn test_random_disc_within_radius() {
        let center = Position::new(100.0, 100.0);
        let mut alloc = PositionAllocator::random_disc(center, 30.0, 1);
        for p in alloc.allocate(100) {
            assert!(p.distance_to(center) <= 30.0 + 1e-9);
        }
    }

    #[test]
    fn test_random_disc_deterministic() {
        let center = Position::new(0.0, 0.0);
        let a = PositionAllocator::random_disc(center, 10.0, 99).allocate(10);
        let b = PositionAllocator::random_disc(center, 10.0, 99).allocate(10);
        assert_eq!(a, b);
    }
}
