//! Tipsy library
//!
//! Chaos operations against a Kubernetes cluster, the ledger that records
//! them and the engine that rolls them back.

pub mod chaos;
pub mod cli;
pub mod config;
pub mod error;
pub mod k8s;
pub mod rollback;
pub mod state;

pub use chaos::{ChaosContext, ChaosType};
pub use error::{ChaosError, ChaosResult};
pub use rollback::{RollbackEngine, RollbackFilter, RollbackSummary};
