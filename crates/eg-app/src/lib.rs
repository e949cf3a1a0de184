//! Shared application service layer for egrid.
//!
//! Composes the network, linearized and DER models of a scenario, keeps
//! them in a [`ModelCache`](eg_cache::ModelCache) keyed by scenario
//! fingerprint, and dispatches one or many scenarios serially or on a
//! worker pool.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod source;

// Re-export key types for convenience
pub use config::{AppConfig, ParallelConfig};
pub use coordinator::{ScenarioCoordinator, ScenarioModels, ScenarioOutcome, SharedModelCache};
pub use error::{AppError, AppResult, ErrorKind, ScenarioError};
pub use models::{ModelSet, build_models};
pub use source::{DirectorySource, InMemorySource, ScenarioSnapshot, ScenarioSource};
