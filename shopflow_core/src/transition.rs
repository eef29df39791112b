//! The "FLOW" Engine - Zone Transition Model
//!
//! A right-stochastic matrix over zones, estimated from historical
//! "customer moved from A directly to B" counts. Built once at load time
//! and immutable afterwards; rebuilding from fresh counts replaces the
//! whole model.
//!
//! Zones with no historical data fall back to a uniform distribution over
//! their physically adjacent zones, or to a self-loop when isolated, so
//! every row is a valid distribution regardless of data coverage.

use rand::Rng;
use std::collections::BTreeMap;

use crate::records::{ConfigError, TransitionCount, ZoneId};
use crate::zones::ZoneSet;

/// Tolerance for the row-normalization invariant.
const ROW_SUM_EPSILON: f64 = 1e-9;

// ============================================================================
// TRANSITION MATRIX (The Engine)
// ============================================================================

/// Immutable zone-to-zone transition probabilities.
///
/// Every zone of the floor plan has a row, and every row sums to 1.
#[derive(Debug, Clone)]
pub struct TransitionMatrix {
    /// Zone id → (target, probability), targets ascending by id.
    /// BTreeMap keeps row iteration order deterministic.
    rows: BTreeMap<ZoneId, Vec<(ZoneId, f64)>>,
}

impl TransitionMatrix {
    /// Estimate the matrix from historical counts.
    ///
    /// Duplicate (from, to) entries are additive. Counts referencing a
    /// zone that is not on the floor plan are a configuration error.
    pub fn from_counts(zones: &ZoneSet, counts: &[TransitionCount]) -> Result<Self, ConfigError> {
        for c in counts {
            if zones.get(c.from).is_none() {
                return Err(ConfigError::Transitions(format!(
                    "count references unknown zone {}",
                    c.from
                )));
            }
            if zones.get(c.to).is_none() {
                return Err(ConfigError::Transitions(format!(
                    "count references unknown zone {}",
                    c.to
                )));
            }
        }

        // Aggregate per (from, to); zero counts contribute nothing
        let mut totals: BTreeMap<ZoneId, BTreeMap<ZoneId, u64>> = BTreeMap::new();
        for c in counts {
            if c.count > 0 {
                *totals
                    .entry(c.from)
                    .or_default()
                    .entry(c.to)
                    .or_insert(0) += c.count;
            }
        }

        let mut rows = BTreeMap::new();
        for id in zones.zone_ids() {
            let row = match totals.get(&id) {
                Some(observed) if !observed.is_empty() => {
                    let total: u64 = observed.values().sum();
                    observed
                        .iter()
                        .map(|(to, n)| (*to, *n as f64 / total as f64))
                        .collect()
                }
                _ => Self::fallback_row(zones, id),
            };
            rows.insert(id, row);
        }

        let matrix = Self { rows };
        matrix.check_rows()?;
        Ok(matrix)
    }

    /// Uniform over physically adjacent zones; self-loop when isolated.
    fn fallback_row(zones: &ZoneSet, id: ZoneId) -> Vec<(ZoneId, f64)> {
        let neighbors = zones.adjacent(id);
        if neighbors.is_empty() {
            vec![(id, 1.0)]
        } else {
            let p = 1.0 / neighbors.len() as f64;
            neighbors.iter().map(|&to| (to, p)).collect()
        }
    }

    /// Verify the right-stochastic invariant on every row.
    fn check_rows(&self) -> Result<(), ConfigError> {
        for (id, row) in &self.rows {
            let sum: f64 = row.iter().map(|(_, p)| p).sum();
            if (sum - 1.0).abs() > ROW_SUM_EPSILON {
                return Err(ConfigError::Transitions(format!(
                    "row for {} sums to {} instead of 1",
                    id, sum
                )));
            }
        }
        Ok(())
    }

    /// Number of rows (= zones on the floor plan at build time).
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The probability row for a zone, targets ascending by id.
    pub fn row(&self, from: ZoneId) -> Option<&[(ZoneId, f64)]> {
        self.rows.get(&from).map(Vec::as_slice)
    }

    /// Probability of moving from one zone directly to another.
    pub fn probability(&self, from: ZoneId, to: ZoneId) -> f64 {
        self.row(from)
            .and_then(|row| row.iter().find(|(t, _)| *t == to))
            .map(|(_, p)| *p)
            .unwrap_or(0.0)
    }

    /// Draw the next zone for an agent currently in `from`.
    ///
    /// Total by construction: a zone unknown to the matrix (never possible
    /// for zones of the floor plan it was built from) self-loops.
    pub fn sample_next(&self, from: ZoneId, rng: &mut impl Rng) -> ZoneId {
        let Some(row) = self.rows.get(&from) else {
            return from;
        };

        let draw: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (to, p) in row {
            cumulative += p;
            if draw < cumulative {
                return *to;
            }
        }

        // Rounding edge: the draw landed beyond the final cumulative sum
        row.last().map(|(to, _)| *to).unwrap_or(from)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ZoneDef, ZoneKind};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rect_def(id: u32, x0: f64, z0: f64, x1: f64, z1: f64) -> ZoneDef {
        ZoneDef {
            id: ZoneId(id),
            name: format!("zone-{}", id),
            kind: ZoneKind::Aisle,
            boundary: vec![[x0, z0], [x1, z0], [x1, z1], [x0, z1]],
        }
    }

    /// Zones 1-2-3 in a row (sharing edges), zone 4 isolated far away.
    fn corridor_zones() -> ZoneSet {
        ZoneSet::new(&[
            rect_def(1, 0.0, 0.0, 5.0, 5.0),
            rect_def(2, 5.0, 0.0, 10.0, 5.0),
            rect_def(3, 10.0, 0.0, 15.0, 5.0),
            rect_def(4, 100.0, 100.0, 105.0, 105.0),
        ])
        .unwrap()
    }

    fn count(from: u32, to: u32, n: u64) -> TransitionCount {
        TransitionCount {
            from: ZoneId(from),
            to: ZoneId(to),
            count: n,
        }
    }

    #[test]
    fn test_counts_normalize_to_probabilities() {
        let zones = corridor_zones();
        let matrix =
            TransitionMatrix::from_counts(&zones, &[count(1, 2, 30), count(1, 3, 70)]).unwrap();

        assert!((matrix.probability(ZoneId(1), ZoneId(2)) - 0.3).abs() < 1e-12);
        assert!((matrix.probability(ZoneId(1), ZoneId(3)) - 0.7).abs() < 1e-12);
        assert_eq!(matrix.probability(ZoneId(1), ZoneId(4)), 0.0);
    }

    #[test]
    fn test_duplicate_counts_are_additive() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(
            &zones,
            &[count(1, 2, 15), count(1, 2, 15), count(1, 3, 70)],
        )
        .unwrap();

        assert!((matrix.probability(ZoneId(1), ZoneId(2)) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_zone_in_counts_rejected() {
        let zones = corridor_zones();
        let result = TransitionMatrix::from_counts(&zones, &[count(1, 99, 10)]);
        assert!(matches!(result, Err(ConfigError::Transitions(_))));

        let result = TransitionMatrix::from_counts(&zones, &[count(99, 1, 10)]);
        assert!(matches!(result, Err(ConfigError::Transitions(_))));
    }

    #[test]
    fn test_missing_row_falls_back_to_adjacent_uniform() {
        let zones = corridor_zones();
        // No counts at all for zone 2, which touches zones 1 and 3
        let matrix = TransitionMatrix::from_counts(&zones, &[count(1, 2, 10)]).unwrap();

        assert!((matrix.probability(ZoneId(2), ZoneId(1)) - 0.5).abs() < 1e-12);
        assert!((matrix.probability(ZoneId(2), ZoneId(3)) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_isolated_zone_falls_back_to_self_loop() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(&zones, &[]).unwrap();

        assert!((matrix.probability(ZoneId(4), ZoneId(4)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_every_row_sums_to_one() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(
            &zones,
            &[count(1, 2, 7), count(1, 3, 13), count(2, 3, 1), count(3, 1, 5)],
        )
        .unwrap();

        for id in zones.zone_ids() {
            let sum: f64 = matrix.row(id).unwrap().iter().map(|(_, p)| p).sum();
            assert!((sum - 1.0).abs() < 1e-9, "row {} sums to {}", id, sum);
        }
        assert_eq!(matrix.len(), 4);
    }

    #[test]
    fn test_zero_counts_do_not_poison_a_row() {
        let zones = corridor_zones();
        // Zone 1's only entries are zero: treated as "no data", fallback
        let matrix =
            TransitionMatrix::from_counts(&zones, &[count(1, 2, 0), count(1, 3, 0)]).unwrap();

        // Fallback: zone 1 touches only zone 2
        assert!((matrix.probability(ZoneId(1), ZoneId(2)) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_sampling_matches_distribution() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(
            &zones,
            &[count(1, 2, 20), count(1, 3, 30), count(1, 4, 50)],
        )
        .unwrap();

        let mut rng = StdRng::seed_from_u64(42);
        let draws = 100_000usize;
        let mut observed: BTreeMap<ZoneId, u64> = BTreeMap::new();
        for _ in 0..draws {
            *observed
                .entry(matrix.sample_next(ZoneId(1), &mut rng))
                .or_insert(0) += 1;
        }

        // Chi-squared against the configured row; 13.82 is the 99.9th
        // percentile at two degrees of freedom
        let chi_squared: f64 = matrix
            .row(ZoneId(1))
            .unwrap()
            .iter()
            .map(|(to, p)| {
                let expected = p * draws as f64;
                let obs = *observed.get(to).unwrap_or(&0) as f64;
                (obs - expected).powi(2) / expected
            })
            .sum();

        assert!(chi_squared < 13.82, "chi-squared statistic {}", chi_squared);
    }

    #[test]
    fn test_sampling_is_deterministic_per_seed() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(
            &zones,
            &[count(1, 2, 30), count(1, 3, 70), count(2, 1, 5), count(2, 3, 5)],
        )
        .unwrap();

        let sequence = |seed: u64| -> Vec<ZoneId> {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut zone = ZoneId(1);
            (0..100)
                .map(|_| {
                    zone = matrix.sample_next(zone, &mut rng);
                    zone
                })
                .collect()
        };

        assert_eq!(sequence(7), sequence(7));
        assert_ne!(sequence(7), sequence(8));
    }

    #[test]
    fn test_unknown_from_zone_self_loops() {
        let zones = corridor_zones();
        let matrix = TransitionMatrix::from_counts(&zones, &[]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(matrix.sample_next(ZoneId(99), &mut rng), ZoneId(99));
    }
}
