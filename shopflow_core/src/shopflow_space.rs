//! The "SPACE" Engine - Coordinate Frames & Floor-Plan Calibration
//!
//! Keeps the two coordinate frames of a store strictly apart:
//! - The **real frame**: meters on the physical floor, where anchors are
//!   surveyed and ranges are measured. The floor plane is x/z (y is up).
//! - The **model frame**: the normalized frame of the 3D store model that
//!   the dashboard renders.
//!
//! The affine bridge between them (translate, rotate, per-axis scale) is
//! calibrated once per store and must invert exactly: a fix pushed to the
//! model frame and pulled back lands on the same spot.

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::records::{ConfigError, SpaceMetadataDef};

/// Scales with a magnitude below this are treated as zero and rejected.
const MIN_SCALE: f64 = 1e-12;

// ============================================================================
// POSITION NEWTYPES
// ============================================================================

/// A point in the real frame (meters on the store floor).
///
/// Deliberately not interchangeable with [`ModelPosition`]; crossing frames
/// goes through a [`CoordinateMapper`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealPosition(Vector2<f64>);

impl RealPosition {
    pub fn new(x: f64, z: f64) -> Self {
        Self(Vector2::new(x, z))
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.0.y
    }

    /// The underlying vector, for math-heavy call sites.
    #[inline]
    pub fn as_vector(&self) -> Vector2<f64> {
        self.0
    }

    pub fn from_vector(v: Vector2<f64>) -> Self {
        Self(v)
    }

    /// Euclidean distance to another real-frame point, meters.
    pub fn distance_to(&self, other: &RealPosition) -> f64 {
        (self.0 - other.0).norm()
    }

    /// Moves up to `max_step` meters toward `target`, stopping exactly on
    /// it when closer than one step. Used by the flow simulation.
    pub fn step_toward(&self, target: &RealPosition, max_step: f64) -> RealPosition {
        let delta = target.0 - self.0;
        let dist = delta.norm();
        if dist <= max_step || dist < MIN_SCALE {
            *target
        } else {
            Self(self.0 + delta * (max_step / dist))
        }
    }
}

/// A point in the model frame (normalized units of the rendered store model).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPosition(Vector2<f64>);

impl ModelPosition {
    pub fn new(x: f64, z: f64) -> Self {
        Self(Vector2::new(x, z))
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.0.x
    }

    #[inline]
    pub fn z(&self) -> f64 {
        self.0.y
    }

    #[inline]
    pub fn as_vector(&self) -> Vector2<f64> {
        self.0
    }

    pub fn from_vector(v: Vector2<f64>) -> Self {
        Self(v)
    }
}

// ============================================================================
// SPACE METADATA (Calibration)
// ============================================================================

/// Validated calibration of the real-to-model transform.
///
/// Construction rejects non-finite parameters and zero scales, so every
/// `SpaceMetadata` in circulation is invertible. The rotation's sine and
/// cosine are cached because the mapper runs on every fix of every entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceMetadata {
    origin: Vector2<f64>,
    scale: Vector2<f64>,
    rotation: f64,
    cos_r: f64,
    sin_r: f64,
}

impl SpaceMetadata {
    /// Create calibration metadata, validating all parameters.
    ///
    /// # Arguments
    /// * `origin_x`, `origin_z` - Real-frame location of the model origin, meters
    /// * `scale_x`, `scale_z` - Model units per meter along each axis (non-zero)
    /// * `rotation` - Model-frame rotation relative to the real frame, radians
    pub fn new(
        origin_x: f64,
        origin_z: f64,
        scale_x: f64,
        scale_z: f64,
        rotation: f64,
    ) -> Result<Self, ConfigError> {
        let params = [origin_x, origin_z, scale_x, scale_z, rotation];
        if params.iter().any(|p| !p.is_finite()) {
            return Err(ConfigError::Metadata(
                "all calibration parameters must be finite".into(),
            ));
        }
        if scale_x.abs() < MIN_SCALE || scale_z.abs() < MIN_SCALE {
            return Err(ConfigError::Metadata(format!(
                "scale factors must be non-zero (got {} / {})",
                scale_x, scale_z
            )));
        }

        Ok(Self {
            origin: Vector2::new(origin_x, origin_z),
            scale: Vector2::new(scale_x, scale_z),
            rotation,
            cos_r: rotation.cos(),
            sin_r: rotation.sin(),
        })
    }

    /// Build from the serialized config shape.
    pub fn from_def(def: &SpaceMetadataDef) -> Result<Self, ConfigError> {
        Self::new(
            def.origin_x,
            def.origin_z,
            def.scale_x,
            def.scale_z,
            def.rotation,
        )
    }

    /// The trivial calibration: frames coincide.
    pub fn identity() -> Self {
        Self {
            origin: Vector2::zeros(),
            scale: Vector2::new(1.0, 1.0),
            rotation: 0.0,
            cos_r: 1.0,
            sin_r: 0.0,
        }
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.origin.x, self.origin.y)
    }

    pub fn scale(&self) -> (f64, f64) {
        (self.scale.x, self.scale.y)
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }
}

// ============================================================================
// COORDINATE MAPPER (The Engine)
// ============================================================================

/// Pure bidirectional transform between the real and model frames.
///
/// Forward (real → model): translate by -origin, rotate by the calibration
/// angle, then apply per-axis scale. The inverse runs the same steps
/// backwards, so `model_to_real(real_to_model(p)) == p` up to floating
/// point rounding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    meta: SpaceMetadata,
}

impl CoordinateMapper {
    pub fn new(meta: SpaceMetadata) -> Self {
        Self { meta }
    }

    /// Build a mapper straight from the serialized config shape.
    pub fn from_def(def: &SpaceMetadataDef) -> Result<Self, ConfigError> {
        Ok(Self::new(SpaceMetadata::from_def(def)?))
    }

    pub fn metadata(&self) -> &SpaceMetadata {
        &self.meta
    }

    /// Map a real-frame point into the model frame.
    pub fn real_to_model(&self, p: &RealPosition) -> ModelPosition {
        let m = &self.meta;
        let d = p.as_vector() - m.origin;

        // Rotate into the model orientation
        let rx = d.x * m.cos_r - d.y * m.sin_r;
        let rz = d.x * m.sin_r + d.y * m.cos_r;

        ModelPosition::new(rx * m.scale.x, rz * m.scale.y)
    }

    /// Map a model-frame point back into the real frame. Exact inverse of
    /// [`Self::real_to_model`].
    pub fn model_to_real(&self, p: &ModelPosition) -> RealPosition {
        let m = &self.meta;
        let rx = p.x() / m.scale.x;
        let rz = p.z() / m.scale.y;

        // Rotate back into the real orientation
        let dx = rx * m.cos_r + rz * m.sin_r;
        let dz = -rx * m.sin_r + rz * m.cos_r;

        RealPosition::from_vector(Vector2::new(dx, dz) + m.origin)
    }
}

// ============================================================================
// TESTS
// ============================================================================
