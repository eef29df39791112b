//! ShopFlow Deterministic Flow-Simulation Harness
//!
//! This crate provides a controlled environment where synthetic customers
//! walk a virtual store floor and the full positioning pipeline runs
//! deterministically end to end.
//!
//! # Core Principle: One Seed, One Trajectory
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when a tick completes
//! - **Movement**: Agents step from a single seeded RNG in fixed id order
//! - **Noise**: Sensor error derived from the same 64-bit master seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimClock (Virtual Time, advanced per tick)           │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                        │                            │
//! │  ┌────▼──────┐           ┌─────▼─────┐                      │
//! │  │ FlowEngine│           │  Oracle   │                      │
//! │  │ (agents)  │           │ (shoppers)│                      │
//! │  └───────────┘           └─────┬─────┘                      │
//! │                                │ noisy range records        │
//! │                          ┌─────▼─────┐                      │
//! │                          │ Localizer │                      │
//! │                          │ (under    │                      │
//! │                          │  test)    │                      │
//! │                          └───────────┘                      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use shopflow_sim::{ScenarioRunner, ScenarioId};
//!
//! let result = ScenarioRunner::new(42)
//!     .with_duration(30.0)
//!     .run(ScenarioId::SteadyFlow);
//! assert!(result.passed);
//! ```

mod clock;
mod engine;
mod exporter;
mod fixtures;
mod oracle;
mod runner;
pub mod scenarios;

pub use clock::{SimClock, StopSignal};
pub use engine::{AgentSnapshot, AgentState, CustomerAgent, FlowConfig, FlowEngine, SpawnError};
pub use exporter::{SimExport, SimFrame};
pub use fixtures::{demo_store, demo_store_model};
pub use oracle::{GroundTruthShopper, Oracle};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use scenarios::ScenarioId;
