//! The "FILTER" Engine - Constant-Velocity Kalman Smoothing
//!
//! Raw multilateration fixes jitter by tens of centimeters between epochs,
//! which makes dashboard trails unreadable and zone dwell times noisy.
//! Each tracked entity gets a 2D constant-velocity Kalman filter over the
//! state `[x, z, vx, vz]` that turns the fix stream into a smooth position
//! plus a velocity estimate.
//!
//! Numerical safety: the covariance update uses the Joseph form, and a
//! failed Cholesky factorization of the innovation triggers a covariance
//! reset so the filter re-converges instead of panicking.

use nalgebra::{Cholesky, Matrix2, Matrix2x4, Matrix4, Vector2, Vector4};
use serde::{Deserialize, Serialize};

use crate::shopflow_space::RealPosition;

/// Covariance diagonal applied on a self-healing reset (10 m standard
/// deviation, conservative for a store floor).
const RESET_VARIANCE: f64 = 100.0;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Noise configuration for a per-entity filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterConfig {
    /// White-noise acceleration spectral density, m²/s⁴ (default: 0.5 -
    /// shoppers stop and start often)
    pub process_noise_accel: f64,

    /// Base measurement variance, m² (default: 0.25, i.e. 0.5 m ranging σ)
    pub measurement_variance: f64,

    /// How strongly a solve's residual error inflates the measurement
    /// variance (default: 1.0). Zero disables residual weighting.
    pub residual_weight: f64,

    /// Position variance at track birth, m² (default: 4.0)
    pub initial_position_variance: f64,

    /// Velocity variance at track birth, m²/s² (default: 1.0)
    pub initial_velocity_variance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            process_noise_accel: 0.5,
            measurement_variance: 0.25,  // 0.5 m standard deviation
            residual_weight: 1.0,
            initial_position_variance: 4.0, // 2 m standard deviation
            initial_velocity_variance: 1.0, // 1 m/s standard deviation
        }
    }
}

// ============================================================================
// KALMAN FILTER (The Engine)
// ============================================================================

/// Constant-velocity Kalman filter for one tracked entity.
///
/// State vector: `[x, z, vx, vz]` in the real frame. Measurements are
/// position-only; velocity is inferred through the motion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KalmanFilter {
    /// State estimate [x, z, vx, vz]
    state: Vector4<f64>,

    /// 4×4 state covariance
    covariance: Matrix4<f64>,

    config: FilterConfig,
}

impl KalmanFilter {
    /// Start a filter at a first observed position with zero velocity and
    /// birth covariance from the config.
    pub fn new(initial: &RealPosition, config: FilterConfig) -> Self {
        let state = Vector4::new(initial.x(), initial.z(), 0.0, 0.0);
        let covariance = Matrix4::from_diagonal(&Vector4::new(
            config.initial_position_variance,
            config.initial_position_variance,
            config.initial_velocity_variance,
            config.initial_velocity_variance,
        ));

        Self {
            state,
            covariance,
            config,
        }
    }

    /// Prediction step: advance the state by `dt` seconds.
    ///
    /// Negative `dt` is clamped to zero - time never runs backwards here;
    /// out-of-order measurements are rejected upstream.
    pub fn predict(&mut self, dt: f64) {
        let dt = dt.max(0.0);
        if dt == 0.0 {
            return;
        }

        let f = Self::motion_model(dt);
        let q = self.process_noise(dt);

        self.state = f * self.state;
        self.covariance = f * self.covariance * f.transpose() + q;
    }

    /// Update step: fuse a position measurement.
    ///
    /// `residual_error` is the solve's range residual (or squared reported
    /// accuracy for pre-resolved fixes); larger values inflate the
    /// measurement noise so shaky fixes pull the estimate less.
    pub fn update(&mut self, measured: &RealPosition, residual_error: f64) {
        let r_var = self.config.measurement_variance
            * (1.0 + self.config.residual_weight * residual_error.max(0.0));
        let r = Matrix2::from_diagonal(&Vector2::new(r_var, r_var));

        let h = Matrix2x4::new(
            1.0, 0.0, 0.0, 0.0, //
            0.0, 1.0, 0.0, 0.0,
        );

        let z = Vector2::new(measured.x(), measured.z());
        let innovation = z - h * self.state;

        // S = H P Hᵀ + R
        let s = h * self.covariance * h.transpose() + r;

        // Cholesky recovery: a degraded innovation covariance triggers a
        // self-healing reset instead of a panic.
        let s_chol = match Cholesky::new(s) {
            Some(chol) => chol,
            None => {
                self.reset_covariance();
                return;
            }
        };

        // K = P Hᵀ S⁻¹
        let k = self.covariance * h.transpose() * s_chol.inverse();

        self.state += k * innovation;

        // Joseph form: P = (I - KH) P (I - KH)ᵀ + K R Kᵀ
        let ikh = Matrix4::identity() - k * h;
        self.covariance = ikh * self.covariance * ikh.transpose() + k * r * k.transpose();

        // Symmetrize to stop round-off drift from accumulating
        self.covariance = (self.covariance + self.covariance.transpose()) * 0.5;
    }

    /// Current position estimate.
    pub fn position(&self) -> RealPosition {
        RealPosition::new(self.state[0], self.state[1])
    }

    /// Current velocity estimate, m/s in the real frame.
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.state[2], self.state[3])
    }

    /// Trace of the position covariance block, m². The dashboard uses this
    /// as a per-fix confidence ring.
    pub fn uncertainty(&self) -> f64 {
        self.covariance[(0, 0)] + self.covariance[(1, 1)]
    }

    pub fn covariance(&self) -> &Matrix4<f64> {
        &self.covariance
    }

    /// Constant-velocity transition matrix for a step of `dt` seconds.
    fn motion_model(dt: f64) -> Matrix4<f64> {
        let mut f = Matrix4::identity();
        f[(0, 2)] = dt;
        f[(1, 3)] = dt;
        f
    }

    /// Discrete white-noise-acceleration process noise for a step of `dt`.
    fn process_noise(&self, dt: f64) -> Matrix4<f64> {
        let sigma = self.config.process_noise_accel;
        let dt2 = dt * dt;
        let q_pp = dt2 * dt2 / 4.0 * sigma;
        let q_pv = dt2 * dt / 2.0 * sigma;
        let q_vv = dt2 * sigma;

        Matrix4::new(
            q_pp, 0.0, q_pv, 0.0, //
            0.0, q_pp, 0.0, q_pv, //
            q_pv, 0.0, q_vv, 0.0, //
            0.0, q_pv, 0.0, q_vv,
        )
    }

    /// Self-healing reset after numerical degradation: keep the state,
    /// blow the covariance back up so new measurements dominate.
    fn reset_covariance(&mut self) {
        self.covariance = Matrix4::identity() * RESET_VARIANCE;
    }
}

// ============================================================================
// TESTS
// ============================================================================
