//! Store Configuration Loading
//!
//! Deserializes the per-store JSON config (calibration, zones, anchors,
//! historical transition counts) and assembles the validated, immutable
//! [`StoreModel`] everything else runs against. Validation is all-or-
//! nothing: any defect fails the load with a [`ConfigError`].

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use crate::records::{AnchorDef, ConfigError, SpaceMetadataDef, TransitionCount, ZoneDef};
use crate::shopflow_space::CoordinateMapper;
use crate::shopflow_tracking::{AnchorSet, Localizer, LocalizerConfig};
use crate::transition::TransitionMatrix;
use crate::zones::ZoneSet;

// ============================================================================
// STORE CONFIG (Serialized Shape)
// ============================================================================

/// The full serialized configuration of one store.
///
/// `anchors` and `transitions` may be omitted: a store can run on
/// pre-resolved positions only, and a freshly onboarded store has no
/// transition history yet (fallback rows cover it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub space: SpaceMetadataDef,
    pub zones: Vec<ZoneDef>,

    #[serde(default)]
    pub anchors: Vec<AnchorDef>,

    #[serde(default)]
    pub transitions: Vec<TransitionCount>,
}

// ============================================================================
// STORE MODEL (Validated)
// ============================================================================

/// The validated model of one store: coordinate calibration, floor plan,
/// anchor constellation and transition matrix. Immutable after load;
/// shared across the localizer and the flow simulation via `Arc`.
#[derive(Debug, Clone)]
pub struct StoreModel {
    pub mapper: CoordinateMapper,
    pub zones: Arc<ZoneSet>,
    pub anchors: Arc<AnchorSet>,
    pub transitions: Arc<TransitionMatrix>,
}

impl StoreModel {
    /// Validate a parsed config and assemble the model.
    pub fn from_config(config: &StoreConfig) -> Result<Self, ConfigError> {
        let mapper = CoordinateMapper::from_def(&config.space)?;
        let zones = ZoneSet::new(&config.zones)?;
        let anchors = AnchorSet::new(&config.anchors)?;
        let transitions = TransitionMatrix::from_counts(&zones, &config.transitions)?;

        Ok(Self {
            mapper,
            zones: Arc::new(zones),
            anchors: Arc::new(anchors),
            transitions: Arc::new(transitions),
        })
    }

    /// Build a localizer wired to this store.
    pub fn localizer(&self, config: LocalizerConfig) -> Localizer {
        Localizer::new(
            Arc::clone(&self.anchors),
            self.mapper,
            Arc::clone(&self.zones),
            config,
        )
    }
}

/// Parse a store config from JSON text and build the model.
pub fn parse_store(json: &str) -> Result<StoreModel, ConfigError> {
    let config: StoreConfig = serde_json::from_str(json)?;
    StoreModel::from_config(&config)
}

/// Load a store config file and build the model.
pub fn load_store(path: &Path) -> Result<StoreModel, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    parse_store(&text)
}

// ============================================================================
// TESTS
// ============================================================================
