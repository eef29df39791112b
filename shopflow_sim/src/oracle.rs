//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the true state of the simulated shop floor:
//! - True positions and velocities of all shoppers
//! - Physics stepping (constant velocity, wall reflection)
//! - Sensor record generation (noisy anchor ranges, noisy position fixes)
//!
//! Shoppers live in a Vec in spawn order, so record generation consumes
//! the noise stream in a fixed order and runs are reproducible.

use nalgebra::Vector2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use shopflow_core::{AnchorSet, DistanceSample, EntityId, RealPosition, TrackingRecord};

/// A ground truth shopper in the simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthShopper {
    /// Tag the sensor layer reports for this shopper
    pub entity: EntityId,

    /// True position in the real frame (meters)
    pub position: RealPosition,

    /// Velocity [vx, vz] in m/s
    pub velocity: Vector2<f64>,

    /// Shopper is still on the floor
    pub active: bool,
}

/// The Oracle - maintains ground truth and generates sensor records.
pub struct Oracle {
    /// RNG for physics noise
    rng: ChaCha8Rng,

    /// All shoppers, in spawn order
    shoppers: Vec<GroundTruthShopper>,

    /// Current simulation time (seconds)
    current_time: f64,

    /// Range noise standard deviation (meters)
    range_noise_std: f64,

    /// Seed for the next spawned shopper's entity tag
    next_seed: u64,

    /// Optional floor extents; walkers reflect off the walls when set
    bounds: Option<(f64, f64)>,
}

impl Oracle {
    /// Creates a new Oracle with the given physics seed.
    ///
    /// Note: derive the physics seed separately from the flow-engine seed
    /// so that changing agent behavior never shifts sensor noise.
    pub fn new(physics_seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(physics_seed),
            shoppers: Vec::new(),
            current_time: 0.0,
            range_noise_std: 0.3, // 30cm ranging noise by default
            next_seed: physics_seed,
            bounds: None,
        }
    }

    /// Sets the range noise standard deviation.
    pub fn set_range_noise(&mut self, std_dev: f64) {
        self.range_noise_std = std_dev.max(0.0);
    }

    /// Confines walkers to `[0, x_max] x [0, z_max]` by reflecting their
    /// velocity at the walls.
    pub fn set_bounds(&mut self, x_max: f64, z_max: f64) {
        self.bounds = Some((x_max, z_max));
    }

    /// Spawns a new shopper and returns its entity tag.
    pub fn spawn_shopper(&mut self, position: RealPosition, velocity: Vector2<f64>) -> EntityId {
        let entity = EntityId::from_seed(self.next_seed);
        self.next_seed = self.next_seed.wrapping_add(1);

        self.shoppers.push(GroundTruthShopper {
            entity,
            position,
            velocity,
            active: true,
        });

        entity
    }

    /// Marks a shopper as having left the floor.
    pub fn remove_shopper(&mut self, entity: EntityId) {
        if let Some(shopper) = self.shoppers.iter_mut().find(|s| s.entity == entity) {
            shopper.active = false;
        }
    }

    /// Advances physics by dt seconds.
    pub fn step(&mut self, dt: f64) {
        self.current_time += dt;

        for shopper in &mut self.shoppers {
            if !shopper.active {
                continue;
            }
            let next = shopper.position.as_vector() + shopper.velocity * dt;
            let (mut x, mut z) = (next.x, next.y);

            if let Some((x_max, z_max)) = self.bounds {
                if x < 0.0 {
                    x = -x;
                    shopper.velocity.x = -shopper.velocity.x;
                } else if x > x_max {
                    x = 2.0 * x_max - x;
                    shopper.velocity.x = -shopper.velocity.x;
                }
                if z < 0.0 {
                    z = -z;
                    shopper.velocity.y = -shopper.velocity.y;
                } else if z > z_max {
                    z = 2.0 * z_max - z;
                    shopper.velocity.y = -shopper.velocity.y;
                }
            }

            shopper.position = RealPosition::new(x, z);
        }
    }

    /// Returns the current simulation time.
    pub fn time(&self) -> f64 {
        self.current_time
    }

    /// Returns all shoppers still on the floor, in spawn order.
    pub fn active_shoppers(&self) -> Vec<&GroundTruthShopper> {
        self.shoppers.iter().filter(|s| s.active).collect()
    }

    /// Returns a specific shopper by entity tag.
    pub fn shopper(&self, entity: EntityId) -> Option<&GroundTruthShopper> {
        self.shoppers.iter().find(|s| s.entity == entity)
    }

    /// Generates one noisy range record per active shopper, measured
    /// against every anchor in `anchors`.
    pub fn range_records(&mut self, anchors: &AnchorSet) -> Vec<TrackingRecord> {
        let normal = Normal::new(0.0, self.range_noise_std).unwrap();
        let timestamp = self.current_time;

        self.shoppers
            .iter()
            .filter(|s| s.active)
            .map(|shopper| {
                let samples: Vec<DistanceSample> = anchors
                    .iter()
                    .map(|anchor| {
                        let true_range = shopper.position.distance_to(&anchor.position);
                        let noisy = (true_range + normal.sample(&mut self.rng)).max(0.0);
                        DistanceSample {
                            anchor: anchor.id,
                            distance: noisy,
                            timestamp,
                        }
                    })
                    .collect();

                TrackingRecord::Ranges {
                    entity: shopper.entity,
                    samples,
                    timestamp,
                }
            })
            .collect()
    }

    /// Generates one noisy pre-resolved position record per active
    /// shopper, with `accuracy` as both the noise scale and the reported
    /// accuracy figure.
    pub fn position_records(&mut self, accuracy: f64) -> Vec<TrackingRecord> {
        let normal = Normal::new(0.0, accuracy.max(0.0)).unwrap();
        let timestamp = self.current_time;

        self.shoppers
            .iter()
            .filter(|s| s.active)
            .map(|shopper| TrackingRecord::Position {
                entity: shopper.entity,
                x: shopper.position.x() + normal.sample(&mut self.rng),
                z: shopper.position.z() + normal.sample(&mut self.rng),
                accuracy,
                timestamp,
            })
            .collect()
    }

    /// Returns ground truth positions for error calculation.
    pub fn ground_truth_positions(&self) -> Vec<(EntityId, RealPosition)> {
        self.shoppers
            .iter()
            .filter(|s| s.active)
            .map(|s| (s.entity, s.position))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopflow_core::{AnchorDef, AnchorId};

    fn square_anchors() -> AnchorSet {
        AnchorSet::new(&[
            AnchorDef {
                id: AnchorId(0),
                x: 0.0,
                z: 0.0,
            },
            AnchorDef {
                id: AnchorId(1),
                x: 10.0,
                z: 0.0,
            },
            AnchorDef {
                id: AnchorId(2),
                x: 0.0,
                z: 10.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_oracle_spawn_shopper() {
        let mut oracle = Oracle::new(42);

        let id = oracle.spawn_shopper(RealPosition::new(3.0, 4.0), Vector2::new(1.0, 0.0));

        let shopper = oracle.shopper(id).unwrap();
        assert_eq!(shopper.position.x(), 3.0);
        assert!(shopper.active);
    }

    #[test]
    fn test_oracle_physics_step() {
        let mut oracle = Oracle::new(42);

        let id = oracle.spawn_shopper(RealPosition::new(0.0, 5.0), Vector2::new(2.0, 0.0));
        oracle.step(1.0);

        let shopper = oracle.shopper(id).unwrap();
        assert!((shopper.position.x() - 2.0).abs() < 1e-9);
        assert!((shopper.position.z() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_oracle_deterministic_noise() {
        let mut oracle1 = Oracle::new(42);
        let mut oracle2 = Oracle::new(42);
        let anchors = square_anchors();

        oracle1.spawn_shopper(RealPosition::new(5.0, 5.0), Vector2::zeros());
        oracle2.spawn_shopper(RealPosition::new(5.0, 5.0), Vector2::zeros());

        let r1 = serde_json::to_string(&oracle1.range_records(&anchors)).unwrap();
        let r2 = serde_json::to_string(&oracle2.range_records(&anchors)).unwrap();

        // Same seed = same noise
        assert_eq!(r1, r2);
    }

    #[test]
    fn test_removed_shopper_emits_no_records() {
        let mut oracle = Oracle::new(42);
        let anchors = square_anchors();

        let id = oracle.spawn_shopper(RealPosition::new(5.0, 5.0), Vector2::zeros());
        oracle.spawn_shopper(RealPosition::new(2.0, 2.0), Vector2::zeros());
        oracle.remove_shopper(id);

        assert_eq!(oracle.range_records(&anchors).len(), 1);
        assert_eq!(oracle.active_shoppers().len(), 1);
    }

    #[test]
    fn test_bounds_reflect_walkers() {
        let mut oracle = Oracle::new(42);
        oracle.set_bounds(24.0, 12.0);

        let id = oracle.spawn_shopper(RealPosition::new(1.0, 6.0), Vector2::new(-2.0, 0.0));
        oracle.step(1.0);

        let shopper = oracle.shopper(id).unwrap();
        assert!((shopper.position.x() - 1.0).abs() < 1e-9);
        assert!((shopper.velocity.x - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_range_record_count_matches_anchors() {
        let mut oracle = Oracle::new(42);
        let anchors = square_anchors();

        oracle.spawn_shopper(RealPosition::new(5.0, 5.0), Vector2::zeros());
        let records = oracle.range_records(&anchors);

        assert_eq!(records.len(), 1);
        match &records[0] {
            TrackingRecord::Ranges { samples, .. } => assert_eq!(samples.len(), 3),
            other => panic!("unexpected record {:?}", other),
        }
    }
}
