//! Per-table convergence
//!
//! One pass over a table moves through these states:
//!
//! ```text
//! ABSENT ──────────────────────► RECREATING ──► DONE
//! STALE ──► (backup live DDL, drop) ─┘     └──► FAILED_ROLLBACK ──► DONE
//! UNCHANGED ───────────────────────────────────────────────────► DONE
//! ```
//!
//! Partitions are archived before anything destructive happens and replayed
//! after provenance has been stamped. The snapshot never leaves this pass
//! except through the optional [`SnapshotStore`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use ddlsync_catalog::{CatalogService, RemoteTableState};
use ddlsync_core::provenance::{HASH_KEY, STACK_KEY};
use ddlsync_core::{
    fingerprint, Diagnostic, DiagnosticCode, PartitionSnapshot, ProvenanceTag, Resource, TableSpec,
};
use serde::Serialize;

use crate::archiver::{PartitionArchiver, RestoreSummary};
use crate::change_detector::{has_changed, stored_fingerprint};
use crate::error::{DeployError, Result, Rollback};
use crate::executor::{PollSchedule, QueryExecutor};
use crate::snapshot_store::{merge_snapshots, SnapshotStore};
use crate::statements::{drop_statement, show_create_statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TableState {
    Absent,
    Unchanged,
    Stale,
    Recreating,
    FailedRollback,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAction {
    Created,
    Recreated,
    Unchanged,

    /// The declared DDL failed; the previous definition is back in place
    RolledBack { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableOutcome {
    pub catalog: String,
    pub database: String,
    pub table: String,
    pub action: TableAction,

    /// States visited, in order
    pub states: Vec<TableState>,

    /// Fingerprint of the declared DDL
    pub fingerprint: String,

    pub partitions_archived: usize,
    pub restore: RestoreSummary,

    /// Side-store file written for this pass, if any
    pub snapshot_file: Option<PathBuf>,
}

impl TableOutcome {
    pub fn resource(&self) -> Resource {
        Resource::table(&self.catalog, &self.database, &self.table)
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let name = format!("{}.{}", self.database, self.table);
        let mut diagnostics = Vec::new();

        let main = match &self.action {
            TableAction::Created => Diagnostic::of(
                DiagnosticCode::TableCreated,
                format!("Created table {} ({})", name, self.fingerprint),
            ),
            TableAction::Recreated => Diagnostic::of(
                DiagnosticCode::TableRecreated,
                format!("Recreated table {} ({})", name, self.fingerprint),
            ),
            TableAction::Unchanged => Diagnostic::of(
                DiagnosticCode::TableUnchanged,
                format!("Table {} is up to date", name),
            ),
            TableAction::RolledBack { reason } => Diagnostic::of(
                DiagnosticCode::TableRolledBack,
                format!(
                    "Declared DDL for {} failed; previous definition restored",
                    name
                ),
            )
            .with_phase("create")
            .with_reason(reason.clone()),
        };
        diagnostics.push(main.with_resource(self.resource()));

        if self.restore.partitions > 0 {
            diagnostics.push(
                Diagnostic::of(
                    DiagnosticCode::PartitionsRestored,
                    format!(
                        "Restored {} partitions on {} in {} statements",
                        self.restore.partitions, name, self.restore.statements
                    ),
                )
                .with_resource(self.resource()),
            );
        }

        diagnostics
    }
}

pub struct TableReconciler {
    service: Arc<dyn CatalogService>,
    archiver: PartitionArchiver,
    store: Option<SnapshotStore>,
    recover_snapshots: bool,
    stack_id: String,
    schedule: PollSchedule,
}

impl TableReconciler {
    pub fn new(service: Arc<dyn CatalogService>, stack_id: impl Into<String>) -> Self {
        Self {
            archiver: PartitionArchiver::new(service.clone()),
            service,
            store: None,
            recover_snapshots: false,
            stack_id: stack_id.into(),
            schedule: PollSchedule::default(),
        }
    }

    /// Persist snapshots to `store`; with `recover`, merge leftovers first
    pub fn with_snapshot_store(mut self, store: SnapshotStore, recover: bool) -> Self {
        self.store = Some(store);
        self.recover_snapshots = recover;
        self
    }

    pub fn with_poll_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_max_query_bytes(mut self, max_query_bytes: usize) -> Self {
        self.archiver = self.archiver.with_max_query_bytes(max_query_bytes);
        self
    }

    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        self.schedule
    }

    /// Converge one table; `remote` is its current state, `None` if absent
    pub async fn reconcile(
        &self,
        spec: &TableSpec,
        remote: Option<&RemoteTableState>,
    ) -> Result<TableOutcome> {
        let catalog = spec.catalog.as_str();
        let executor =
            QueryExecutor::for_table(self.service.clone(), spec).with_schedule(self.schedule);
        let declared_fingerprint = fingerprint(&spec.ddl);

        let snapshots = self.archive(spec, remote).await?;
        let snapshot_file = match &self.store {
            Some(store) if !snapshots.is_empty() => Some(
                store
                    .save(catalog, &spec.database, &spec.name, &snapshots)
                    .await?,
            ),
            _ => None,
        };

        let mut states = Vec::new();
        let action = match remote {
            Some(_) if !has_changed(spec, remote) => {
                states.push(TableState::Unchanged);
                tracing::info!(database = %spec.database, table = %spec.name, "table unchanged");
                TableAction::Unchanged
            }
            Some(existing) => {
                states.push(TableState::Stale);
                self.recreate(spec, existing, &executor, &mut states).await?
            }
            None => {
                states.push(TableState::Absent);
                states.push(TableState::Recreating);
                tracing::info!(database = %spec.database, table = %spec.name, "creating table");
                executor
                    .execute(&spec.ddl, false)
                    .await
                    .map_err(|e| create_failed(spec, &e, Rollback::NotAttempted))?;
                TableAction::Created
            }
        };

        let parameters = match &action {
            TableAction::RolledBack { .. } => self.previous_provenance(remote),
            _ => ProvenanceTag::new(declared_fingerprint.clone(), self.stack_id.clone())
                .to_parameters(),
        };
        self.service
            .update_table_parameters(catalog, &spec.database, &spec.name, &parameters)
            .await?;
        tracing::info!(
            database = %spec.database,
            table = %spec.name,
            fingerprint = parameters.get(HASH_KEY).map(String::as_str).unwrap_or(""),
            "stamped provenance"
        );

        let mut restore = RestoreSummary::default();
        if !snapshots.is_empty() {
            let current = self
                .service
                .get_table(catalog, &spec.database, &spec.name)
                .await?;
            if current.map_or(false, |t| t.is_partitioned()) {
                restore = self.archiver.restore(&executor, &spec.name, &snapshots).await?;
            } else {
                tracing::warn!(
                    database = %spec.database,
                    table = %spec.name,
                    partitions = snapshots.len(),
                    "table is no longer partitioned; archived partitions not restored"
                );
            }
        }

        if let (Some(store), Some(_)) = (&self.store, &snapshot_file) {
            store.remove(catalog, &spec.database, &spec.name).await?;
        }

        states.push(TableState::Done);
        Ok(TableOutcome {
            catalog: catalog.to_string(),
            database: spec.database.clone(),
            table: spec.name.clone(),
            action,
            states,
            fingerprint: declared_fingerprint,
            partitions_archived: snapshots.len(),
            restore,
            snapshot_file,
        })
    }

    async fn archive(
        &self,
        spec: &TableSpec,
        remote: Option<&RemoteTableState>,
    ) -> Result<Vec<PartitionSnapshot>> {
        if !spec.keep_partitions {
            return Ok(Vec::new());
        }

        let catalog = spec.catalog.as_str();
        let mut snapshots = match remote {
            Some(remote) if remote.is_partitioned() => {
                self.archiver
                    .backup(catalog, &spec.database, &spec.name)
                    .await?
            }
            _ => Vec::new(),
        };

        if let (Some(store), true) = (&self.store, self.recover_snapshots) {
            if let Some(leftover) = store.load(catalog, &spec.database, &spec.name).await? {
                tracing::info!(
                    database = %spec.database,
                    table = %spec.name,
                    partitions = leftover.len(),
                    "recovering leftover partition snapshot"
                );
                snapshots = merge_snapshots(snapshots, leftover);
            }
        }

        Ok(snapshots)
    }

    /// Drop and re-create a stale table, rolling back on a failed create
    async fn recreate(
        &self,
        spec: &TableSpec,
        existing: &RemoteTableState,
        executor: &QueryExecutor,
        states: &mut Vec<TableState>,
    ) -> Result<TableAction> {
        let is_view = existing.is_view();

        let rows = executor
            .execute(&show_create_statement(&spec.name, is_view), true)
            .await?;
        let live_ddl = rows
            .iter()
            .map(|row| row.concat())
            .collect::<Vec<_>>()
            .join("\n");

        tracing::info!(database = %spec.database, table = %spec.name, "dropping table");
        executor
            .execute(&drop_statement(&spec.name, is_view), false)
            .await?;

        states.push(TableState::Recreating);
        tracing::info!(database = %spec.database, table = %spec.name, "creating table");
        let create_err = match executor.execute(&spec.ddl, false).await {
            Ok(_) => return Ok(TableAction::Recreated),
            Err(e) => e,
        };

        if live_ddl.trim().is_empty() {
            return Err(create_failed(spec, &create_err, Rollback::NotAttempted));
        }

        tracing::warn!(
            database = %spec.database,
            table = %spec.name,
            error = %create_err,
            "create failed; restoring previous definition"
        );
        if let Err(rollback_err) = executor.execute(&live_ddl, false).await {
            return Err(create_failed(
                spec,
                &create_err,
                Rollback::Failed(rollback_err.to_string()),
            ));
        }

        states.push(TableState::FailedRollback);
        Ok(TableAction::RolledBack {
            reason: failure_reason(&create_err),
        })
    }

    /// Provenance for a rolled-back table: keep its old fingerprint so the
    /// next run tries the declared DDL again
    fn previous_provenance(&self, remote: Option<&RemoteTableState>) -> BTreeMap<String, String> {
        let mut parameters = BTreeMap::new();
        parameters.insert(STACK_KEY.to_string(), self.stack_id.clone());
        if let Some(hash) = remote.and_then(stored_fingerprint) {
            parameters.insert(HASH_KEY.to_string(), hash.to_string());
        }
        parameters
    }
}

fn failure_reason(err: &DeployError) -> String {
    err.reason()
        .map(str::to_string)
        .unwrap_or_else(|| err.to_string())
}

fn create_failed(spec: &TableSpec, err: &DeployError, rollback: Rollback) -> DeployError {
    DeployError::CreateFailed {
        table: spec.fully_qualified_name(),
        reason: failure_reason(err),
        rollback,
    }
}
