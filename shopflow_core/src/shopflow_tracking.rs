//! The "TRACKING" Engine - Multilateration & Per-Entity Smoothing
//!
//! Turns raw anchor ranges into smoothed per-customer position fixes:
//! 1. Sample hygiene (drop non-finite / negative ranges, dedupe anchors)
//! 2. Linearized least-squares multilateration with a collinearity gate
//! 3. Per-entity constant-velocity Kalman smoothing
//! 4. Lifecycle: tracks appear on first sighting and are evicted after an
//!    idle timeout
//!
//! Lossy conditions (stale records, degenerate geometry, bad samples) are
//! reported on the diagnostic stream and never abort the pipeline.

use nalgebra::{Cholesky, Matrix2, Vector2};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::records::{
    AnchorDef, AnchorId, ConfigError, Diagnostic, DistanceSample, EntityId, PositionFix,
    TrackingRecord,
};
use crate::shopflow_filter::{FilterConfig, KalmanFilter};
use crate::shopflow_space::{CoordinateMapper, RealPosition};
use crate::zones::ZoneSet;

/// Scale-invariant conditioning bound: the normal-equation matrix is
/// treated as collinear when det(AᵀA) falls below this fraction of the
/// squared mean diagonal.
const COLLINEARITY_RATIO: f64 = 1e-6;

// ============================================================================
// ANCHOR SET
// ============================================================================

/// One fixed range anchor, surveyed in the real frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub id: AnchorId,
    pub position: RealPosition,
}

/// The validated anchor constellation of one store.
///
/// May legitimately be empty: stores whose hardware resolves positions
/// on-device send pre-resolved records and never hit the solver.
#[derive(Debug, Clone)]
pub struct AnchorSet {
    anchors: Vec<Anchor>,
    index: HashMap<AnchorId, usize>,
}

impl AnchorSet {
    pub fn new(defs: &[AnchorDef]) -> Result<Self, ConfigError> {
        let mut anchors = Vec::with_capacity(defs.len());
        let mut index = HashMap::with_capacity(defs.len());

        for def in defs {
            if !def.x.is_finite() || !def.z.is_finite() {
                return Err(ConfigError::Anchors(format!(
                    "{} has a non-finite position",
                    def.id
                )));
            }
            if index.insert(def.id, anchors.len()).is_some() {
                return Err(ConfigError::Anchors(format!("duplicate id {}", def.id)));
            }
            anchors.push(Anchor {
                id: def.id,
                position: RealPosition::new(def.x, def.z),
            });
        }

        Ok(Self { anchors, index })
    }

    pub fn get(&self, id: AnchorId) -> Option<&Anchor> {
        self.index.get(&id).map(|&i| &self.anchors[i])
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.iter()
    }
}

// ============================================================================
// MULTILATERATION
// ============================================================================

/// An unsmoothed solver output: one position estimate for one epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    pub position: RealPosition,

    /// Sum of squared range residuals, m². Zero means the ranges were
    /// perfectly consistent; large values flag multipath or a bad anchor.
    pub residual_error: f64,

    pub timestamp: f64,
}

/// Errors from a single localization attempt. Always recoverable: the
/// next epoch brings fresh samples.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LocalizationError {
    #[error("Insufficient geometry: {usable} usable anchors (need 3+, spread out)")]
    InsufficientGeometry { usable: usize },
}

/// Solve one entity's position from anchor ranges.
///
/// Linearizes the range equations by subtracting the first anchor's circle
/// from the others, then solves the 2×2 normal equations. Samples whose
/// anchor is unknown or whose distance is non-finite or negative are
/// ignored; fewer than 3 usable samples, or an anchor spread too close to
/// collinear, yields [`LocalizationError::InsufficientGeometry`].
pub fn trilaterate(
    anchors: &AnchorSet,
    samples: &[DistanceSample],
    timestamp: f64,
) -> Result<RawPosition, LocalizationError> {
    // Usable = known anchor + sane range, deduped by anchor (latest sample
    // wins), ordered by anchor id so the reference choice is deterministic.
    let mut usable: BTreeMap<AnchorId, (RealPosition, f64, f64)> = BTreeMap::new();
    for s in samples {
        if !s.distance.is_finite() || s.distance < 0.0 {
            continue;
        }
        let Some(anchor) = anchors.get(s.anchor) else {
            continue;
        };
        match usable.get(&s.anchor) {
            Some(&(_, _, ts)) if ts > s.timestamp => {}
            _ => {
                usable.insert(s.anchor, (anchor.position, s.distance, s.timestamp));
            }
        }
    }

    let n = usable.len();
    if n < 3 {
        return Err(LocalizationError::InsufficientGeometry { usable: n });
    }

    let points: Vec<(RealPosition, f64)> =
        usable.into_values().map(|(p, d, _)| (p, d)).collect();
    let (p0, d0) = points[0];

    // Accumulate AᵀA and Aᵀb for rows
    //   [2(xi - x0), 2(zi - z0)] · p = d0² - di² + xi² - x0² + zi² - z0²
    let mut ata = Matrix2::zeros();
    let mut atb = Vector2::zeros();
    for &(pi, di) in &points[1..] {
        let ax = 2.0 * (pi.x() - p0.x());
        let az = 2.0 * (pi.z() - p0.z());
        let b = d0 * d0 - di * di + pi.x() * pi.x() - p0.x() * p0.x() + pi.z() * pi.z()
            - p0.z() * p0.z();

        ata[(0, 0)] += ax * ax;
        ata[(0, 1)] += ax * az;
        ata[(1, 0)] += ax * az;
        ata[(1, 1)] += az * az;
        atb[0] += ax * b;
        atb[1] += az * b;
    }

    // Collinearity gate, scale-invariant in the anchor coordinates
    let mean_diag = ata.trace() / 2.0;
    if ata.determinant() <= COLLINEARITY_RATIO * mean_diag * mean_diag {
        return Err(LocalizationError::InsufficientGeometry { usable: n });
    }

    let solution = match Cholesky::new(ata) {
        Some(chol) => chol.solve(&atb),
        None => return Err(LocalizationError::InsufficientGeometry { usable: n }),
    };
    let position = RealPosition::new(solution[0], solution[1]);

    let residual_error = points
        .iter()
        .map(|(p, d)| {
            let err = position.distance_to(p) - d;
            err * err
        })
        .sum();

    Ok(RawPosition {
        position,
        residual_error,
        timestamp,
    })
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the Localizer.
#[derive(Debug, Clone, Copy)]
pub struct LocalizerConfig {
    /// Seconds without an accepted fix before an entity is evicted
    /// (default: 10.0 - a shopper out of coverage for ten seconds has
    /// left or shed the tag)
    pub idle_timeout: f64,

    /// Residual error above which a fix is flagged low-confidence
    /// (default: 9.0 m², roughly 1.5 m of disagreement per anchor on a
    /// four-anchor floor)
    pub residual_gate: f64,

    /// Per-entity filter noise configuration
    pub filter: FilterConfig,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            idle_timeout: 10.0,
            residual_gate: 9.0,
            filter: FilterConfig::default(),
        }
    }
}

// ============================================================================
// LOCALIZER (The Engine)
// ============================================================================

/// Per-entity tracking state.
#[derive(Debug, Clone)]
struct TrackedEntity {
    filter: KalmanFilter,

    /// Timestamp of the last accepted fix
    last_update: f64,

    /// Accepted fixes since birth
    fix_count: u64,
}

/// The localization engine: ingests tracking records, maintains one
/// Kalman filter per live entity and publishes smoothed fixes.
///
/// Out-of-order records are rejected, not reordered: a record older than
/// the entity's last accepted fix is dropped with a
/// [`Diagnostic::StaleSample`]. Reordering would need a retrodiction
/// window per entity; for a single ingest pipeline per store the stale
/// case is rare and the next epoch repairs it.
pub struct Localizer {
    anchors: Arc<AnchorSet>,
    mapper: CoordinateMapper,
    zones: Arc<ZoneSet>,
    config: LocalizerConfig,

    /// All live entities, keyed by id
    entities: HashMap<EntityId, TrackedEntity>,

    /// Pending diagnostic events, drained by the caller each tick
    diagnostics: Vec<Diagnostic>,
}

impl Localizer {
    pub fn new(
        anchors: Arc<AnchorSet>,
        mapper: CoordinateMapper,
        zones: Arc<ZoneSet>,
        config: LocalizerConfig,
    ) -> Self {
        Self {
            anchors,
            mapper,
            zones,
            config,
            entities: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Ingest one tracking record.
    ///
    /// Returns the smoothed fix if the record was usable; lossy outcomes
    /// land on the diagnostic stream instead.
    pub fn ingest(&mut self, record: &TrackingRecord) -> Option<PositionFix> {
        match record {
            TrackingRecord::Ranges {
                entity,
                samples,
                timestamp,
            } => {
                let clean = self.screen_samples(*entity, samples);
                match trilaterate(&self.anchors, &clean, *timestamp) {
                    Ok(raw) => {
                        if raw.residual_error > self.config.residual_gate {
                            self.diagnostics.push(Diagnostic::LowConfidenceFix {
                                entity: *entity,
                                residual_error: raw.residual_error,
                            });
                        }
                        self.apply_fix(*entity, raw)
                    }
                    Err(LocalizationError::InsufficientGeometry { usable }) => {
                        self.diagnostics.push(Diagnostic::DegenerateGeometry {
                            entity: *entity,
                            usable,
                        });
                        None
                    }
                }
            }
            TrackingRecord::Position {
                entity,
                x,
                z,
                accuracy,
                timestamp,
            } => {
                if !x.is_finite() || !z.is_finite() {
                    self.diagnostics.push(Diagnostic::DegenerateGeometry {
                        entity: *entity,
                        usable: 0,
                    });
                    return None;
                }
                // Reported accuracy enters the filter the same way a solve
                // residual does: squared meters of measurement doubt.
                let sigma = accuracy.max(0.0);
                let raw = RawPosition {
                    position: RealPosition::new(*x, *z),
                    residual_error: sigma * sigma,
                    timestamp: *timestamp,
                };
                self.apply_fix(*entity, raw)
            }
        }
    }

    /// Drop samples that can never contribute to a solve, reporting each.
    fn screen_samples(
        &mut self,
        entity: EntityId,
        samples: &[DistanceSample],
    ) -> Vec<DistanceSample> {
        let mut clean = Vec::with_capacity(samples.len());
        for s in samples {
            let sane = s.distance.is_finite() && s.distance >= 0.0;
            if sane && self.anchors.get(s.anchor).is_some() {
                clean.push(*s);
            } else {
                self.diagnostics.push(Diagnostic::BadSample {
                    entity,
                    anchor: s.anchor,
                    distance: s.distance,
                });
            }
        }
        clean
    }

    /// Feed a raw position into the entity's filter, creating the track on
    /// first sighting.
    fn apply_fix(&mut self, entity: EntityId, raw: RawPosition) -> Option<PositionFix> {
        match self.entities.get_mut(&entity) {
            Some(tracked) => {
                if raw.timestamp < tracked.last_update {
                    self.diagnostics.push(Diagnostic::StaleSample {
                        entity,
                        timestamp: raw.timestamp,
                        last_update: tracked.last_update,
                    });
                    return None;
                }
                let dt = raw.timestamp - tracked.last_update;
                tracked.filter.predict(dt);
                tracked.filter.update(&raw.position, raw.residual_error);
                tracked.last_update = raw.timestamp;
                tracked.fix_count += 1;
            }
            None => {
                self.entities.insert(
                    entity,
                    TrackedEntity {
                        filter: KalmanFilter::new(&raw.position, self.config.filter),
                        last_update: raw.timestamp,
                        fix_count: 1,
                    },
                );
            }
        }

        // Reborrow immutably for publication
        let tracked = &self.entities[&entity];
        Some(self.publish(entity, tracked))
    }

    /// Build the boundary-facing fix for one tracked entity.
    fn publish(&self, entity: EntityId, tracked: &TrackedEntity) -> PositionFix {
        let position = tracked.filter.position();
        let model = self.mapper.real_to_model(&position);
        let velocity = tracked.filter.velocity();

        PositionFix {
            entity,
            model_x: model.x(),
            model_z: model.z(),
            velocity_x: velocity.x,
            velocity_z: velocity.y,
            zone: self.zones.resolve(&position),
            uncertainty: tracked.filter.uncertainty(),
            timestamp: tracked.last_update,
        }
    }

    /// Evict entities that have produced no accepted fix for longer than
    /// the idle timeout. Emits exactly one [`Diagnostic::EntityLost`] per
    /// evicted entity. Returns the number evicted.
    pub fn evict_idle(&mut self, now: f64) -> usize {
        let timeout = self.config.idle_timeout;
        let mut lost: Vec<(EntityId, f64)> = self
            .entities
            .iter()
            .filter(|(_, t)| now - t.last_update > timeout)
            .map(|(id, t)| (*id, t.last_update))
            .collect();
        lost.sort_by_key(|(id, _)| *id);

        for (entity, last_seen) in &lost {
            self.entities.remove(entity);
            self.diagnostics.push(Diagnostic::EntityLost {
                entity: *entity,
                last_seen: *last_seen,
            });
        }

        lost.len()
    }

    /// Drain pending diagnostic events.
    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Number of live tracked entities.
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn is_tracking(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// Current smoothed position of a tracked entity.
    pub fn position_of(&self, entity: EntityId) -> Option<RealPosition> {
        self.entities.get(&entity).map(|t| t.filter.position())
    }

    /// Accepted fixes since birth for a tracked entity.
    pub fn fix_count(&self, entity: EntityId) -> Option<u64> {
        self.entities.get(&entity).map(|t| t.fix_count)
    }

    /// Ids of all live entities, ascending.
    pub fn tracked_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort();
        ids
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{ZoneDef, ZoneId, ZoneKind};
    use crate::shopflow_space::SpaceMetadata;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    fn square_anchors() -> AnchorSet {
        AnchorSet::new(&[
            AnchorDef { id: AnchorId(0), x: 0.0, z: 0.0 },
            AnchorDef { id: AnchorId(1), x: 10.0, z: 0.0 },
            AnchorDef { id: AnchorId(2), x: 0.0, z: 10.0 },
            AnchorDef { id: AnchorId(3), x: 10.0, z: 10.0 },
        ])
        .unwrap()
    }

    fn ranges_from(anchors: &AnchorSet, truth: RealPosition, t: f64) -> Vec<DistanceSample> {
        anchors
            .iter()
            .map(|a| DistanceSample {
                anchor: a.id,
                distance: truth.distance_to(&a.position),
                timestamp: t,
            })
            .collect()
    }

    fn floor_zones() -> Arc<ZoneSet> {
        Arc::new(
            ZoneSet::new(&[ZoneDef {
                id: ZoneId(1),
                name: "floor".into(),
                kind: ZoneKind::Aisle,
                boundary: vec![[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]],
            }])
            .unwrap(),
        )
    }

    fn test_localizer() -> Localizer {
        Localizer::new(
            Arc::new(square_anchors()),
            CoordinateMapper::new(SpaceMetadata::identity()),
            floor_zones(),
            LocalizerConfig::default(),
        )
    }

    #[test]
    fn test_anchor_set_rejects_duplicates_and_non_finite() {
        let dup = AnchorSet::new(&[
            AnchorDef { id: AnchorId(1), x: 0.0, z: 0.0 },
            AnchorDef { id: AnchorId(1), x: 5.0, z: 0.0 },
        ]);
        assert!(matches!(dup, Err(ConfigError::Anchors(_))));

        let nan = AnchorSet::new(&[AnchorDef { id: AnchorId(1), x: f64::NAN, z: 0.0 }]);
        assert!(matches!(nan, Err(ConfigError::Anchors(_))));
    }

    #[test]
    fn test_trilaterate_exact_ranges_recover_position() {
        let anchors = square_anchors();
        let truth = RealPosition::new(5.0, 5.0);
        let samples = ranges_from(&anchors, truth, 1.0);

        let raw = trilaterate(&anchors, &samples, 1.0).unwrap();

        assert_abs_diff_eq!(raw.position.x(), 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(raw.position.z(), 5.0, epsilon = 1e-6);
        assert!(raw.residual_error < 1e-9);
    }

    #[test]
    fn test_trilaterate_off_center_target() {
        let anchors = square_anchors();
        let truth = RealPosition::new(2.5, 7.75);
        let samples = ranges_from(&anchors, truth, 0.0);

        let raw = trilaterate(&anchors, &samples, 0.0).unwrap();
        assert_abs_diff_eq!(raw.position.x(), truth.x(), epsilon = 1e-6);
        assert_abs_diff_eq!(raw.position.z(), truth.z(), epsilon = 1e-6);
    }

    #[test]
    fn test_trilaterate_rounded_ranges() {
        let anchors = AnchorSet::new(&[
            AnchorDef { id: AnchorId(0), x: 0.0, z: 0.0 },
            AnchorDef { id: AnchorId(1), x: 10.0, z: 0.0 },
            AnchorDef { id: AnchorId(2), x: 0.0, z: 10.0 },
        ])
        .unwrap();
        // Ranges rounded to two decimals; the true common distance is sqrt(50)
        let samples = [0, 1, 2].map(|id| DistanceSample {
            anchor: AnchorId(id),
            distance: 7.07,
            timestamp: 0.0,
        });

        let raw = trilaterate(&anchors, &samples, 0.0).unwrap();

        assert!(raw.position.distance_to(&RealPosition::new(5.0, 5.0)) < 0.1);
        assert!(raw.residual_error < 1e-4);
    }

    #[test]
    fn test_trilaterate_too_few_anchors() {
        let anchors = square_anchors();
        let truth = RealPosition::new(5.0, 5.0);
        let samples = &ranges_from(&anchors, truth, 0.0)[..2];

        let err = trilaterate(&anchors, samples, 0.0).unwrap_err();
        assert_eq!(err, LocalizationError::InsufficientGeometry { usable: 2 });
    }

    #[test]
    fn test_trilaterate_collinear_anchors_rejected() {
        let anchors = AnchorSet::new(&[
            AnchorDef { id: AnchorId(0), x: 0.0, z: 0.0 },
            AnchorDef { id: AnchorId(1), x: 5.0, z: 0.0 },
            AnchorDef { id: AnchorId(2), x: 10.0, z: 0.0 },
        ])
        .unwrap();
        let truth = RealPosition::new(3.0, 4.0);
        let samples = ranges_from(&anchors, truth, 0.0);

        let err = trilaterate(&anchors, &samples, 0.0).unwrap_err();
        assert_eq!(err, LocalizationError::InsufficientGeometry { usable: 3 });
    }

    #[test]
    fn test_trilaterate_error_grows_with_range_noise() {
        let anchors = square_anchors();
        let truth = RealPosition::new(4.0, 6.0);

        let exact = ranges_from(&anchors, truth, 0.0);
        let mut noisy = exact.clone();
        // Fixed perturbation pattern, alternating sign
        for (i, s) in noisy.iter_mut().enumerate() {
            s.distance += if i % 2 == 0 { 0.4 } else { -0.4 };
        }

        let raw_exact = trilaterate(&anchors, &exact, 0.0).unwrap();
        let raw_noisy = trilaterate(&anchors, &noisy, 0.0).unwrap();

        let err_exact = raw_exact.position.distance_to(&truth);
        let err_noisy = raw_noisy.position.distance_to(&truth);

        assert!(err_noisy > err_exact);
        assert!(raw_noisy.residual_error > raw_exact.residual_error);
    }

    #[test]
    fn test_trilaterate_dedupes_anchor_keeping_latest() {
        let anchors = square_anchors();
        let truth = RealPosition::new(5.0, 5.0);
        let mut samples = ranges_from(&anchors, truth, 2.0);

        // A stale, wildly wrong duplicate for anchor 0 must be ignored
        samples.push(DistanceSample {
            anchor: AnchorId(0),
            distance: 99.0,
            timestamp: 1.0,
        });

        let raw = trilaterate(&anchors, &samples, 2.0).unwrap();
        assert_abs_diff_eq!(raw.position.x(), 5.0, epsilon = 1e-6);
        assert!(raw.residual_error < 1e-9);
    }

    #[test]
    fn test_localizer_first_sighting_creates_track() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(1);
        let record = TrackingRecord::Ranges {
            entity,
            samples: ranges_from(&square_anchors(), RealPosition::new(5.0, 5.0), 1.0),
            timestamp: 1.0,
        };

        let fix = loc.ingest(&record).unwrap();

        assert_eq!(loc.entity_count(), 1);
        assert!(loc.is_tracking(entity));
        assert_eq!(fix.zone, Some(ZoneId(1)));
        assert_abs_diff_eq!(fix.model_x, 5.0, epsilon = 1e-3);
        assert!(loc.take_diagnostics().is_empty());
    }

    #[test]
    fn test_localizer_smooths_across_epochs() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(2);
        let anchors = square_anchors();

        for step in 0..50 {
            let t = step as f64 * 0.5;
            let truth = RealPosition::new(2.0 + 0.5 * t, 5.0);
            let record = TrackingRecord::Ranges {
                entity,
                samples: ranges_from(&anchors, truth, t),
                timestamp: t,
            };
            loc.ingest(&record).unwrap();
        }

        let p = loc.position_of(entity).unwrap();
        assert_abs_diff_eq!(p.x(), 2.0 + 0.5 * 24.5, epsilon = 0.3);
        assert_eq!(loc.fix_count(entity), Some(50));
    }

    #[test]
    fn test_localizer_rejects_stale_record() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(3);
        let anchors = square_anchors();
        let truth = RealPosition::new(5.0, 5.0);

        let fresh = TrackingRecord::Ranges {
            entity,
            samples: ranges_from(&anchors, truth, 10.0),
            timestamp: 10.0,
        };
        let stale = TrackingRecord::Ranges {
            entity,
            samples: ranges_from(&anchors, truth, 5.0),
            timestamp: 5.0,
        };

        assert!(loc.ingest(&fresh).is_some());
        assert!(loc.ingest(&stale).is_none());

        let diags = loc.take_diagnostics();
        assert_eq!(diags.len(), 1);
        assert!(matches!(
            diags[0],
            Diagnostic::StaleSample { timestamp, last_update, .. }
                if timestamp == 5.0 && last_update == 10.0
        ));
    }

    #[test]
    fn test_localizer_degenerate_geometry_reported() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(4);
        let samples = ranges_from(&square_anchors(), RealPosition::new(5.0, 5.0), 0.0);

        let record = TrackingRecord::Ranges {
            entity,
            samples: samples[..2].to_vec(),
            timestamp: 0.0,
        };

        assert!(loc.ingest(&record).is_none());
        assert!(!loc.is_tracking(entity));

        let diags = loc.take_diagnostics();
        assert!(matches!(
            diags[..],
            [Diagnostic::DegenerateGeometry { usable: 2, .. }]
        ));
    }

    #[test]
    fn test_localizer_reports_bad_samples_but_still_solves() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(5);
        let mut samples = ranges_from(&square_anchors(), RealPosition::new(5.0, 5.0), 0.0);
        samples[3].distance = -2.0;

        let record = TrackingRecord::Ranges {
            entity,
            samples,
            timestamp: 0.0,
        };

        // Three good anchors remain, so a fix still comes out
        assert!(loc.ingest(&record).is_some());

        let diags = loc.take_diagnostics();
        assert!(matches!(
            diags[..],
            [Diagnostic::BadSample { anchor: AnchorId(3), distance, .. }] if distance == -2.0
        ));
    }

    #[test]
    fn test_localizer_flags_low_confidence_fix() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(6);
        let mut samples = ranges_from(&square_anchors(), RealPosition::new(5.0, 5.0), 0.0);

        // Corrupt two ranges by several meters: solvable but inconsistent
        samples[0].distance += 3.0;
        samples[1].distance -= 3.0;

        let fix = loc.ingest(&TrackingRecord::Ranges {
            entity,
            samples,
            timestamp: 0.0,
        });
        assert!(fix.is_some());

        let diags = loc.take_diagnostics();
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::LowConfidenceFix { .. })));
    }

    #[test]
    fn test_localizer_accepts_pre_resolved_positions() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(7);

        let fix = loc
            .ingest(&TrackingRecord::Position {
                entity,
                x: 3.0,
                z: 4.0,
                accuracy: 0.5,
                timestamp: 2.0,
            })
            .unwrap();

        assert_eq!(fix.zone, Some(ZoneId(1)));
        assert_abs_diff_eq!(fix.model_x, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(fix.model_z, 4.0, epsilon = 1e-6);
    }

    #[test]
    fn test_localizer_evicts_idle_exactly_once() {
        let mut loc = test_localizer();
        let entity = EntityId::from_seed(8);
        let record = TrackingRecord::Position {
            entity,
            x: 5.0,
            z: 5.0,
            accuracy: 0.1,
            timestamp: 0.0,
        };
        loc.ingest(&record).unwrap();

        // Within the timeout: nothing happens
        assert_eq!(loc.evict_idle(5.0), 0);
        assert_eq!(loc.entity_count(), 1);

        // Past the timeout: evicted with exactly one EntityLost
        assert_eq!(loc.evict_idle(20.0), 1);
        assert_eq!(loc.entity_count(), 0);

        let diags = loc.take_diagnostics();
        assert!(matches!(
            diags[..],
            [Diagnostic::EntityLost { last_seen, .. }] if last_seen == 0.0
        ));

        // Re-evicting is a no-op and emits nothing further
        assert_eq!(loc.evict_idle(30.0), 0);
        assert!(loc.take_diagnostics().is_empty());
    }

    #[test]
    fn test_fix_lands_in_model_frame() {
        // Scale 0.1: a 10 m floor maps to one model unit
        let meta = SpaceMetadata::new(0.0, 0.0, 0.1, 0.1, 0.0).unwrap();
        let mut loc = Localizer::new(
            Arc::new(square_anchors()),
            CoordinateMapper::new(meta),
            floor_zones(),
            LocalizerConfig::default(),
        );

        let fix = loc
            .ingest(&TrackingRecord::Position {
                entity: EntityId::from_seed(9),
                x: 5.0,
                z: 5.0,
                accuracy: 0.1,
                timestamp: 0.0,
            })
            .unwrap();

        assert_abs_diff_eq!(fix.model_x, 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(fix.model_z, 0.5, epsilon = 1e-9);
        // Zone resolution happens in the real frame, unaffected by scale
        assert_eq!(fix.zone, Some(ZoneId(1)));
    }

    proptest! {
        #[test]
        fn prop_residual_grows_with_noise(
            // One anchor jittered into each quadrant keeps the geometry
            // well-spread for every draw
            a0 in (0.0..3.0f64, 0.0..3.0f64),
            a1 in (7.0..10.0f64, 0.0..3.0f64),
            a2 in (0.0..3.0f64, 7.0..10.0f64),
            a3 in (7.0..10.0f64, 7.0..10.0f64),
            tx in 2.0..8.0f64,
            tz in 2.0..8.0f64,
            magnitude in 0.05..0.3f64,
            signs in 0u8..16,
        ) {
            let anchors = AnchorSet::new(&[
                AnchorDef { id: AnchorId(0), x: a0.0, z: a0.1 },
                AnchorDef { id: AnchorId(1), x: a1.0, z: a1.1 },
                AnchorDef { id: AnchorId(2), x: a2.0, z: a2.1 },
                AnchorDef { id: AnchorId(3), x: a3.0, z: a3.1 },
            ])
            .unwrap();
            let truth = RealPosition::new(tx, tz);
            let exact = ranges_from(&anchors, truth, 0.0);

            let perturbed = |scale: f64| -> Vec<DistanceSample> {
                exact
                    .iter()
                    .enumerate()
                    .map(|(i, s)| {
                        let sign = if signs & (1 << i) != 0 { 1.0 } else { -1.0 };
                        DistanceSample {
                            distance: (s.distance + sign * scale).max(0.0),
                            ..*s
                        }
                    })
                    .collect()
            };

            let clean = trilaterate(&anchors, &exact, 0.0).unwrap();
            let mid = trilaterate(&anchors, &perturbed(magnitude), 0.0).unwrap();
            let loud = trilaterate(&anchors, &perturbed(2.0 * magnitude), 0.0).unwrap();

            prop_assert!(clean.residual_error < 1e-9);
            prop_assert!(mid.residual_error + 1e-9 >= clean.residual_error);
            prop_assert!(loud.residual_error + 1e-9 >= mid.residual_error);
        }
    }
}
