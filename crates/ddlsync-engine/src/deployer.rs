//! Top-level deploy and remove
//!
//! A deploy reconciles every selected database, collecting failures into
//! the report instead of stopping. Databases may be driven concurrently;
//! tables inside one database never are.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use ddlsync_catalog::CatalogService;
use ddlsync_core::{
    DatabaseSpec, DeploymentConfig, DeploymentSettings, Diagnostic, DiagnosticCode, Report,
    Resource,
};

use crate::database_reconciler::{DatabaseOutcome, DatabaseReconciler};
use crate::error::{DeployError, Result};
use crate::executor::PollSchedule;
use crate::snapshot_store::SnapshotStore;
use crate::statements::MAX_QUERY_BYTES;
use crate::sweeper::{OrphanSweeper, SweepOutcome};
use crate::table_reconciler::TableReconciler;

/// Narrowing and scheduling options for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployOptions {
    /// Only this database
    pub database: Option<String>,

    /// Only this table (in every selected database that declares it)
    pub table: Option<String>,

    /// Sweep orphan tables inside selected databases on filtered runs
    pub sweep_when_filtered: bool,

    /// Databases reconciled concurrently
    pub parallelism: usize,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            database: None,
            table: None,
            sweep_when_filtered: false,
            parallelism: 1,
        }
    }
}

impl DeployOptions {
    pub fn from_settings(settings: &DeploymentSettings) -> Self {
        Self {
            database: None,
            table: None,
            sweep_when_filtered: settings.sweep_when_filtered,
            parallelism: settings.parallelism.max(1),
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn is_filtered(&self) -> bool {
        self.database.is_some() || self.table.is_some()
    }

    fn selects(&self, spec: &DatabaseSpec) -> bool {
        self.database.as_deref().map_or(true, |name| spec.name.eq_ignore_ascii_case(name))
            && self
                .table
                .as_deref()
                .map_or(true, |name| spec.find_table(name).is_some())
    }
}

pub struct Deployer {
    service: Arc<dyn CatalogService>,
    stack_id: String,
    snapshot_store: Option<SnapshotStore>,
    recover_snapshots: bool,
    schedule: PollSchedule,
    max_query_bytes: usize,
}

impl Deployer {
    pub fn new(service: Arc<dyn CatalogService>, stack_id: impl Into<String>) -> Self {
        Self {
            service,
            stack_id: stack_id.into(),
            snapshot_store: None,
            recover_snapshots: false,
            schedule: PollSchedule::default(),
            max_query_bytes: MAX_QUERY_BYTES,
        }
    }

    /// Deployer for a loaded configuration's stack and side-store settings
    pub fn from_config(service: Arc<dyn CatalogService>, config: &DeploymentConfig) -> Self {
        let deployer = Self::new(service, config.deployment.stack.clone());
        match config.snapshot_dir() {
            Some(dir) => {
                deployer.with_snapshot_store(SnapshotStore::new(dir), config.deployment.recover_snapshots)
            }
            None => deployer,
        }
    }

    pub fn with_snapshot_store(mut self, store: SnapshotStore, recover: bool) -> Self {
        self.snapshot_store = Some(store);
        self.recover_snapshots = recover;
        self
    }

    pub fn with_poll_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn with_max_query_bytes(mut self, max_query_bytes: usize) -> Self {
        self.max_query_bytes = max_query_bytes;
        self
    }

    pub fn stack_id(&self) -> &str {
        &self.stack_id
    }

    fn database_reconciler(&self) -> DatabaseReconciler {
        let mut tables = TableReconciler::new(self.service.clone(), self.stack_id.clone())
            .with_poll_schedule(self.schedule)
            .with_max_query_bytes(self.max_query_bytes);
        if let Some(store) = &self.snapshot_store {
            tables = tables.with_snapshot_store(store.clone(), self.recover_snapshots);
        }
        DatabaseReconciler::new(self.service.clone(), tables)
    }

    /// Converge the catalog to `specs`
    ///
    /// Unfiltered runs sweep orphan databases across every catalog, then
    /// orphan tables in each reconciled database. Filtered runs never sweep
    /// databases and only sweep tables when `sweep_when_filtered` is set.
    pub async fn deploy(&self, specs: &[DatabaseSpec], options: &DeployOptions) -> Report {
        let filtered = options.is_filtered();
        let selected: Vec<(usize, &DatabaseSpec)> = specs
            .iter()
            .enumerate()
            .filter(|(_, spec)| options.selects(spec))
            .collect();

        tracing::info!(
            stack = %self.stack_id,
            backend = self.service.name(),
            databases = selected.len(),
            filtered = filtered,
            "starting deploy"
        );
        if filtered && selected.is_empty() {
            tracing::warn!("no declared database matches the filter");
        }

        let reconciler = self.database_reconciler();
        let reconciler = &reconciler;
        let sweep_inline = filtered && options.sweep_when_filtered;
        let table_filter = options.table.as_deref();

        let mut results: Vec<(usize, Result<DatabaseOutcome>)> = stream::iter(selected)
            .map(|(idx, spec)| async move {
                (idx, reconciler.reconcile(spec, table_filter, sweep_inline).await)
            })
            .buffer_unordered(options.parallelism.max(1))
            .collect()
            .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut report = Report::new(&self.stack_id);
        for (idx, result) in &results {
            match result {
                Ok(outcome) => report.extend(outcome.diagnostics()),
                Err(err) => report.add_diagnostic(database_failure(&specs[*idx], err)),
            }
        }

        if !filtered {
            let sweeper = OrphanSweeper::new(self.service.clone(), self.stack_id.clone());
            match sweeper.sweep_databases(specs).await {
                Ok(outcomes) => report.extend(outcomes.iter().map(SweepOutcome::diagnostic)),
                Err(err) => report.add_diagnostic(
                    Diagnostic::of(DiagnosticCode::SweepFailed, "Could not enumerate catalogs")
                        .with_phase("sweep")
                        .with_reason(err.to_string()),
                ),
            }

            for (idx, result) in &results {
                if let Ok(outcome) = result {
                    let spec = &specs[*idx];
                    let outcomes = sweeper
                        .sweep_tables(
                            spec.catalog.as_str(),
                            &spec.name,
                            &outcome.remote_tables,
                            &spec.table_names(),
                        )
                        .await;
                    report.extend(outcomes.iter().map(SweepOutcome::diagnostic));
                }
            }
        }

        tracing::info!(
            changed = report.summary.tables_changed,
            unchanged = report.summary.tables_unchanged,
            orphans = report.summary.orphans_dropped,
            errors = report.summary.errors,
            "deploy finished"
        );
        report
    }

    /// Delete declared databases (and their tables)
    ///
    /// Only the database filter applies. A database that does not exist is
    /// skipped.
    pub async fn remove(&self, specs: &[DatabaseSpec], options: &DeployOptions) -> Report {
        let mut report = Report::new(&self.stack_id);
        tracing::info!(stack = %self.stack_id, backend = self.service.name(), "starting remove");

        let selected = |s: &&DatabaseSpec| {
            options
                .database
                .as_deref()
                .map_or(true, |name| s.name.eq_ignore_ascii_case(name))
        };
        for spec in specs.iter().filter(selected) {
            let catalog = spec.catalog.as_str();
            let resource = Resource::database(catalog, &spec.name);

            let result = match self.service.get_database(catalog, &spec.name).await {
                Ok(None) => {
                    tracing::debug!(database = %spec.name, "database absent; nothing to remove");
                    continue;
                }
                Ok(Some(_)) => {
                    tracing::info!(database = %spec.name, "removing database");
                    self.service.delete_database(catalog, &spec.name).await
                }
                Err(e) => Err(e),
            };

            let diagnostic = match result {
                Ok(()) => Diagnostic::of(
                    DiagnosticCode::DatabaseRemoved,
                    format!("Removed database {}", spec.name),
                ),
                Err(e) => {
                    tracing::warn!(database = %spec.name, error = %e, "remove failed");
                    Diagnostic::of(
                        DiagnosticCode::RemoveFailed,
                        format!("Could not remove database {}", spec.name),
                    )
                    .with_phase("remove")
                    .with_reason(e.to_string())
                }
            };
            report.add_diagnostic(diagnostic.with_resource(resource));
        }

        report
    }
}

fn database_failure(spec: &DatabaseSpec, err: &DeployError) -> Diagnostic {
    Diagnostic::of(
        DiagnosticCode::DatabaseFailed,
        format!("Failed to reconcile database {}: {}", spec.name, err),
    )
    .with_resource(Resource::database(spec.catalog.as_str(), &spec.name))
    .with_phase("database")
    .with_reason(err.reason().map(str::to_string).unwrap_or_else(|| err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, tables: &[&str]) -> DatabaseSpec {
        DatabaseSpec {
            catalog: Default::default(),
            name: name.to_string(),
            output: "s3://results/".to_string(),
            location: None,
            workgroup: "primary".to_string(),
            properties: Default::default(),
            description: None,
            ddl: String::new(),
            tables: tables
                .iter()
                .map(|t| ddlsync_core::TableSpec {
                    catalog: Default::default(),
                    database: name.to_string(),
                    name: t.to_string(),
                    ddl: format!("CREATE TABLE {} (id int)", t),
                    keep_partitions: true,
                    workgroup: "primary".to_string(),
                    output: "s3://results/".to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn unfiltered_selects_everything() {
        let options = DeployOptions::default();
        assert!(!options.is_filtered());
        assert!(options.selects(&spec("a", &[])));
    }

    #[test]
    fn table_filter_selects_declaring_databases() {
        let options = DeployOptions::default().with_table("events");
        assert!(options.is_filtered());
        assert!(options.selects(&spec("a", &["events"])));
        assert!(!options.selects(&spec("b", &["users"])));
    }

    #[test]
    fn database_filter() {
        let options = DeployOptions::default().with_database("a");
        assert!(options.selects(&spec("a", &[])));
        assert!(!options.selects(&spec("b", &[])));
    }

    #[test]
    fn options_from_settings() {
        let config = DeploymentConfig::from_toml(
            r#"
            [deployment]
            stack = "prod"
            sweep_when_filtered = true
            parallelism = 4
            "#,
        )
        .unwrap();
        let options = DeployOptions::from_settings(&config.deployment);
        assert!(options.sweep_when_filtered);
        assert_eq!(options.parallelism, 4);
    }
}
