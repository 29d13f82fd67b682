//! Analytics core for graduate progress tracking: weighted attrition risk
//! scoring, disengagement and bottleneck detection, advisor workload
//! fairness and allocation, risk trend projection, enrollment capacity
//! simulation and prioritized action recommendations.
//!
//! The analyzers are plain functions over typed snapshots. Stored data is
//! reached only through [`port::DataAccessPort`]; the [`jobs`] module wires
//! the two together.

pub mod allocation;
pub mod bottleneck;
pub mod config;
#[cfg(feature = "postgres")]
pub mod db;
pub mod engagement;
pub mod error;
pub mod fairness;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod port;
pub mod propagation;
pub mod recommend;
pub mod risk;
pub mod simulation;

pub use config::EngineConfig;
#[cfg(feature = "postgres")]
pub use db::PgStore;
pub use error::{EngineError, EngineResult, UpstreamError};
pub use logging::init_logging;
pub use port::{DataAccessPort, MemoryStore};
