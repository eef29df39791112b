//! The "ZONE" Engine - Floor-Plan Polygons & Point Resolution
//!
//! A store floor is carved into named polygonal zones (entrance, aisles,
//! checkout lanes, exits). This module owns:
//! - Validation of zone polygons at load time
//! - Point-in-zone resolution with a deterministic overlap policy
//! - Physical adjacency between zones (feeds transition fallbacks)
//! - Interior point sampling for the flow simulation
//!
//! Overlap policy: zones may legitimately nest (a promo bay inside an
//! aisle), so resolution scans zones in ascending area order and the first
//! hit wins. Ties on area break toward the lower zone id, which makes the
//! scan order, and therefore the answer, a total deterministic function of
//! the floor plan.

use geo::{
    Area, BoundingRect, Centroid, EuclideanDistance, Intersects, Line, LineString, Point, Polygon,
    Rect,
};
use rand::Rng;
use std::collections::HashMap;

use crate::records::{ConfigError, ZoneDef, ZoneId, ZoneKind};
use crate::shopflow_space::RealPosition;

/// Polygons with an area below this are considered degenerate.
const MIN_AREA: f64 = 1e-9;

/// Zones whose boundaries come within this distance (meters) count as
/// physically adjacent. Covers both shared edges and narrow walkway gaps.
const ADJACENCY_EPSILON: f64 = 0.5;

/// Rejection-sampling attempts before falling back to the centroid.
const SAMPLE_ATTEMPTS: usize = 32;

// ============================================================================
// ZONE
// ============================================================================

/// One validated floor-plan zone.
#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    name: String,
    kind: ZoneKind,
    boundary: Polygon<f64>,
    area: f64,
    centroid: RealPosition,
    bbox: Rect<f64>,
}

impl Zone {
    /// Validate and build a zone from its serialized definition.
    ///
    /// Rejects polygons with fewer than 3 vertices, non-finite vertices,
    /// degenerate (near-zero area) rings and self-intersecting rings.
    pub fn from_def(def: &ZoneDef) -> Result<Self, ConfigError> {
        if def.boundary.len() < 3 {
            return Err(ConfigError::Zone {
                zone: def.id,
                reason: format!("polygon needs at least 3 vertices, got {}", def.boundary.len()),
            });
        }
        if def
            .boundary
            .iter()
            .any(|[x, z]| !x.is_finite() || !z.is_finite())
        {
            return Err(ConfigError::Zone {
                zone: def.id,
                reason: "polygon vertices must be finite".into(),
            });
        }

        let ring: Vec<(f64, f64)> = def.boundary.iter().map(|[x, z]| (*x, *z)).collect();
        let boundary = Polygon::new(LineString::from(ring), vec![]);

        let area = boundary.unsigned_area();
        if area < MIN_AREA {
            return Err(ConfigError::Zone {
                zone: def.id,
                reason: "polygon is degenerate (zero area)".into(),
            });
        }

        // Non-adjacent edges of a simple ring share no points at all, so
        // any contact between them is a crossing or a pinch. A crossed
        // ring can still carry nonzero area, which breaks the centroid.
        let edges: Vec<Line<f64>> = boundary.exterior().lines().collect();
        let n = edges.len();
        for i in 0..n {
            for j in (i + 2)..n {
                if i == 0 && j == n - 1 {
                    continue;
                }
                if edges[i].intersects(&edges[j]) {
                    return Err(ConfigError::Zone {
                        zone: def.id,
                        reason: "polygon boundary self-intersects".into(),
                    });
                }
            }
        }

        // A non-degenerate ring always has a centroid and a bounding box
        let centroid = boundary.centroid().ok_or_else(|| ConfigError::Zone {
            zone: def.id,
            reason: "polygon has no centroid".into(),
        })?;
        let bbox = boundary.bounding_rect().ok_or_else(|| ConfigError::Zone {
            zone: def.id,
            reason: "polygon has no bounding box".into(),
        })?;

        Ok(Self {
            id: def.id,
            name: def.name.clone(),
            kind: def.kind,
            boundary,
            area,
            centroid: RealPosition::new(centroid.x(), centroid.y()),
            bbox,
        })
    }

    #[inline]
    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> ZoneKind {
        self.kind
    }

    /// Enclosed area in square meters.
    #[inline]
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn centroid(&self) -> RealPosition {
        self.centroid
    }

    /// Closed containment test: boundary points count as inside, so a
    /// customer standing exactly on a zone edge still resolves.
    pub fn contains(&self, p: &RealPosition) -> bool {
        self.boundary.intersects(&Point::new(p.x(), p.z()))
    }

    /// Draws a point inside the zone by rejection sampling over the
    /// bounding box, falling back to the centroid if the polygon is too
    /// thin to hit.
    pub fn sample_interior(&self, rng: &mut impl Rng) -> RealPosition {
        let min = self.bbox.min();
        let max = self.bbox.max();

        for _ in 0..SAMPLE_ATTEMPTS {
            let x = rng.gen_range(min.x..=max.x);
            let z = rng.gen_range(min.y..=max.y);
            let p = RealPosition::new(x, z);
            if self.contains(&p) {
                return p;
            }
        }

        self.centroid
    }

    fn touches(&self, other: &Zone) -> bool {
        self.boundary.euclidean_distance(&other.boundary) <= ADJACENCY_EPSILON
    }
}

// ============================================================================
// ZONE SET (The Engine)
// ============================================================================

/// The validated floor plan: all zones, a resolution order and the
/// adjacency relation. Immutable after construction.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    /// All zones in definition order
    zones: Vec<Zone>,

    /// Indices into `zones`, ascending by (area, id) - the resolution scan order
    resolve_order: Vec<usize>,

    /// Zone id → index into `zones`
    index: HashMap<ZoneId, usize>,

    /// Zone id → physically adjacent zone ids, ascending
    adjacency: HashMap<ZoneId, Vec<ZoneId>>,
}

impl ZoneSet {
    /// Validate every definition and build the set.
    pub fn new(defs: &[ZoneDef]) -> Result<Self, ConfigError> {
        let mut zones = Vec::with_capacity(defs.len());
        let mut index = HashMap::with_capacity(defs.len());

        for def in defs {
            let zone = Zone::from_def(def)?;
            if index.insert(zone.id(), zones.len()).is_some() {
                return Err(ConfigError::Zone {
                    zone: zone.id(),
                    reason: "duplicate zone id".into(),
                });
            }
            zones.push(zone);
        }

        let mut resolve_order: Vec<usize> = (0..zones.len()).collect();
        resolve_order.sort_by(|&a, &b| {
            zones[a]
                .area()
                .partial_cmp(&zones[b].area())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(zones[a].id().cmp(&zones[b].id()))
        });

        let mut adjacency: HashMap<ZoneId, Vec<ZoneId>> = HashMap::with_capacity(zones.len());
        for a in &zones {
            let mut neighbors: Vec<ZoneId> = zones
                .iter()
                .filter(|b| b.id() != a.id() && a.touches(b))
                .map(|b| b.id())
                .collect();
            neighbors.sort();
            adjacency.insert(a.id(), neighbors);
        }

        Ok(Self {
            zones,
            resolve_order,
            index,
            adjacency,
        })
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn get(&self, id: ZoneId) -> Option<&Zone> {
        self.index.get(&id).map(|&i| &self.zones[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    /// All zone ids, ascending.
    pub fn zone_ids(&self) -> Vec<ZoneId> {
        let mut ids: Vec<ZoneId> = self.zones.iter().map(|z| z.id()).collect();
        ids.sort();
        ids
    }

    /// Resolve a real-frame point to the zone containing it.
    ///
    /// Smallest zone wins when zones overlap; `None` means the point is
    /// on the floor but outside every defined zone.
    pub fn resolve(&self, p: &RealPosition) -> Option<ZoneId> {
        self.resolve_order
            .iter()
            .map(|&i| &self.zones[i])
            .find(|zone| zone.contains(p))
            .map(|zone| zone.id())
    }

    /// Zones physically adjacent to `id` (shared edge or near-touching
    /// boundary), ascending. Empty for unknown or isolated zones.
    pub fn adjacent(&self, id: ZoneId) -> &[ZoneId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

// ============================================================================
// TESTS
// ============================================================================
