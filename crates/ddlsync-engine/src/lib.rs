//! ddlsync engine - deployment reconciliation
//!
//! This crate converges a remote catalog to a set of resolved declarations:
//! - Query execution with backoff polling
//! - Partition archive and batched replay
//! - Fingerprint-based change detection
//! - Per-table and per-database reconciliation with rollback
//! - Orphan sweeping by provenance tag
//! - Top-level deploy/remove producing a report

pub mod archiver;
pub mod change_detector;
pub mod database_reconciler;
pub mod deployer;
pub mod error;
pub mod executor;
pub mod pagination;
pub mod snapshot_store;
pub mod statements;
pub mod sweeper;
pub mod table_reconciler;

pub use archiver::{PartitionArchiver, RestoreSummary, PARTITION_PAGE_SIZE};
pub use change_detector::has_changed;
pub use database_reconciler::{DatabaseAction, DatabaseOutcome, DatabaseReconciler, TableResult};
pub use deployer::{DeployOptions, Deployer};
pub use error::{DeployError, Result, Rollback};
pub use executor::{PollSchedule, QueryExecutor};
pub use snapshot_store::SnapshotStore;
pub use statements::MAX_QUERY_BYTES;
pub use sweeper::{OrphanSweeper, SweepOutcome, SweptKind};
pub use table_reconciler::{TableAction, TableOutcome, TableReconciler, TableState};
