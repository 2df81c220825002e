//! Persisted chaos history
//!
//! - `ChaosAction`: one performed injection, enough to undo it later
//! - `ActionLedger`: JSON-array file of actions, mutex-guarded within the process
//! - `BackupStore`: Endpoints snapshots taken before a misroute

mod action;
mod backup;
mod ledger;

pub use action::{meta, ChaosAction};
pub use backup::BackupStore;
pub use ledger::ActionLedger;
