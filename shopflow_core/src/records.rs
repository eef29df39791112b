//! The Boundary Layer - Identifiers, Record Shapes & Diagnostics
//!
//! Everything that crosses the subsystem boundary lives here:
//! - Newtype identifiers for entities, anchors and zones
//! - Incoming tracking records (raw anchor ranges or pre-resolved positions)
//! - Outgoing position fixes for the dashboard stream
//! - Structured diagnostic events (lossy conditions that are reported, not thrown)
//! - The fatal configuration error taxonomy

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Unique identifier for a tracked customer entity (badge, cart tag, phone).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Generates a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds a deterministic identifier from a seed (simulation & tests).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a fixed range anchor (BLE beacon, UWB node) on the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub u32);

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anchor-{}", self.0)
    }
}

/// Identifier of a named floor-plan zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub u32);

impl std::fmt::Display for ZoneId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "zone-{}", self.0)
    }
}

// ============================================================================
// TRACKING RECORDS (Input)
// ============================================================================

/// One measured range between an entity and a single anchor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceSample {
    /// Anchor that produced the range
    pub anchor: AnchorId,

    /// Measured distance in meters (must be finite and non-negative)
    pub distance: f64,

    /// Measurement timestamp, seconds
    pub timestamp: f64,
}

/// The wire format received from the store's ingest pipeline.
///
/// Positioning hardware is heterogeneous: cheap BLE anchors report raw
/// ranges that still need multilateration, while UWB gateways resolve
/// positions on-device and ship coordinates directly. Both flow through
/// the same stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackingRecord {
    /// Raw anchor ranges for one entity at one epoch
    Ranges {
        entity: EntityId,
        samples: Vec<DistanceSample>,
        timestamp: f64,
    },

    /// A position already resolved upstream, with a reported accuracy
    Position {
        entity: EntityId,
        /// Real-world x coordinate, meters
        x: f64,
        /// Real-world z coordinate, meters
        z: f64,
        /// Reported 1-sigma accuracy in meters
        accuracy: f64,
        timestamp: f64,
    },
}

impl TrackingRecord {
    /// The entity this record refers to.
    pub fn entity(&self) -> EntityId {
        match self {
            TrackingRecord::Ranges { entity, .. } => *entity,
            TrackingRecord::Position { entity, .. } => *entity,
        }
    }

    /// The epoch timestamp of the record.
    pub fn timestamp(&self) -> f64 {
        match self {
            TrackingRecord::Ranges { timestamp, .. } => *timestamp,
            TrackingRecord::Position { timestamp, .. } => *timestamp,
        }
    }
}

// ============================================================================
// POSITION FIX (Output)
// ============================================================================

/// One smoothed position estimate, published per entity per tick.
///
/// Coordinates are in the model frame so the dashboard can draw directly;
/// `zone` is resolved against the floor plan (None = outside every zone).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub entity: EntityId,

    /// Model-frame x coordinate
    pub model_x: f64,

    /// Model-frame z coordinate
    pub model_z: f64,

    /// Estimated velocity in the real frame, m/s
    pub velocity_x: f64,
    pub velocity_z: f64,

    /// Zone containing the estimate, if any
    pub zone: Option<ZoneId>,

    /// Trace of the position covariance block, m² (lower = tighter fix)
    pub uncertainty: f64,

    pub timestamp: f64,
}

// ============================================================================
// DIAGNOSTICS (Structured Events)
// ============================================================================

/// Lossy conditions surfaced as events on the diagnostic stream.
///
/// These are expected operational noise, not errors: the pipeline keeps
/// running and downstream consumers decide what to alert on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// An entity produced no samples for longer than the idle timeout
    /// and its filter state was evicted.
    EntityLost { entity: EntityId, last_seen: f64 },

    /// A record arrived with a timestamp older than the entity's last
    /// accepted update and was dropped.
    StaleSample {
        entity: EntityId,
        timestamp: f64,
        last_update: f64,
    },

    /// A solve succeeded but its range residual exceeded the gate; the
    /// fix was fed to the filter with inflated measurement noise.
    LowConfidenceFix { entity: EntityId, residual_error: f64 },

    /// Too few usable anchors, or anchor geometry too close to collinear,
    /// to attempt a solve this epoch.
    DegenerateGeometry { entity: EntityId, usable: usize },

    /// A single range was non-finite, negative, or referenced an unknown
    /// anchor, and was discarded before the solve.
    BadSample {
        entity: EntityId,
        anchor: AnchorId,
        distance: f64,
    },
}

// ============================================================================
// CONFIGURATION SHAPES
// ============================================================================

/// Serialized floor-plan calibration: how the real frame maps to the model frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpaceMetadataDef {
    /// Real-world coordinates of the model-frame origin, meters
    pub origin_x: f64,
    pub origin_z: f64,

    /// Per-axis scale factors, model units per meter (must be non-zero)
    pub scale_x: f64,
    pub scale_z: f64,

    /// Rotation of the model frame relative to the real frame, radians
    pub rotation: f64,
}

/// Serialized zone definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub id: ZoneId,
    pub name: String,
    pub kind: ZoneKind,

    /// Polygon vertices in the real frame, `[x, z]` pairs, at least 3
    pub boundary: Vec<[f64; 2]>,
}

/// Functional category of a zone. Drives transition fallbacks and despawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneKind {
    Entrance,
    Aisle,
    Checkout,
    Service,
    Exit,
}

impl ZoneKind {
    /// Agents that arrive in an exit-kind zone leave the store.
    pub fn is_exit(&self) -> bool {
        matches!(self, ZoneKind::Exit)
    }
}

/// Serialized anchor definition (real-frame position of fixed hardware).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorDef {
    pub id: AnchorId,
    pub x: f64,
    pub z: f64,
}

/// One historical observation count: how many times a customer was seen
/// moving from one zone directly to another.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionCount {
    pub from: ZoneId,
    pub to: ZoneId,
    pub count: u64,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Fatal errors raised while loading or validating a store configuration.
///
/// Anything here means the store model cannot be built; there is no
/// partial recovery at load time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid space metadata: {0}")]
    Metadata(String),

    #[error("Invalid zone {zone}: {reason}")]
    Zone { zone: ZoneId, reason: String },

    #[error("Invalid anchor set: {0}")]
    Anchors(String),

    #[error("Invalid transition data: {0}")]
    Transitions(String),

    #[error("Failed to read store config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse store config: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_from_seed_deterministic() {
        let a = EntityId::from_seed(42);
        let b = EntityId::from_seed(42);
        let c = EntityId::from_seed(43);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_tracking_record_accessors() {
        let entity = EntityId::from_seed(1);
        let record = TrackingRecord::Position {
            entity,
            x: 3.0,
            z: 4.0,
            accuracy: 0.5,
            timestamp: 12.5,
        };

        assert_eq!(record.entity(), entity);
        assert_eq!(record.timestamp(), 12.5);
    }

    #[test]
    fn test_tracking_record_round_trips_through_json() {
        let record = TrackingRecord::Ranges {
            entity: EntityId::from_seed(7),
            samples: vec![DistanceSample {
                anchor: AnchorId(3),
                distance: 4.25,
                timestamp: 100.0,
            }],
            timestamp: 100.0,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"kind\":\"ranges\""));

        let back: TrackingRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_diagnostic_serializes_with_kind_tag() {
        let diag = Diagnostic::EntityLost {
            entity: EntityId::from_seed(9),
            last_seen: 55.0,
        };

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"kind\":\"entity_lost\""));
    }

    #[test]
    fn test_zone_kind_exit_flag() {
        assert!(ZoneKind::Exit.is_exit());
        assert!(!ZoneKind::Checkout.is_exit());
        assert!(!ZoneKind::Entrance.is_exit());
    }
}
