//! ShopFlow Core - Indoor Customer Positioning & Zone-Flow Modeling
//!
//! This library powers the store analytics dashboard by solving three problems:
//! 1. **Frame Confusion Problem**: exact real-to-model coordinate mapping via
//!    a validated affine calibration per store
//! 2. **Jittery Fix Problem**: anchor-range multilateration smoothed by
//!    per-entity constant-velocity Kalman filters
//! 3. **Sparse History Problem**: zone transition matrices with adjacency
//!    fallbacks so flow stays well-defined on thin data

pub mod loader;
pub mod records;
pub mod shopflow_filter;
pub mod shopflow_space;
pub mod shopflow_tracking;
pub mod transition;
pub mod zones;

// Re-export key types for convenience
pub use loader::{load_store, parse_store, StoreConfig, StoreModel};
pub use records::{
    AnchorDef, AnchorId, ConfigError, Diagnostic, DistanceSample, EntityId, PositionFix,
    SpaceMetadataDef, TrackingRecord, TransitionCount, ZoneDef, ZoneId, ZoneKind,
};
pub use shopflow_filter::{FilterConfig, KalmanFilter};
pub use shopflow_space::{CoordinateMapper, ModelPosition, RealPosition, SpaceMetadata};
pub use shopflow_tracking::{
    trilaterate, Anchor, AnchorSet, LocalizationError, Localizer, LocalizerConfig, RawPosition,
};
pub use transition::TransitionMatrix;
pub use zones::{Zone, ZoneSet};
