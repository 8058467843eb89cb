//! Per-database convergence
//!
//! Creates or updates the database, then drives [`TableReconciler`] over the
//! declared tables one at a time in declaration order, since later DDL may
//! depend on tables or views created earlier.

use std::sync::Arc;

use ddlsync_catalog::{CatalogService, DatabaseInput, RemoteDatabaseState, RemoteTableState};
use ddlsync_core::{DatabaseSpec, Diagnostic, DiagnosticCode, Resource, TableSpec};

use crate::error::{DeployError, Result};
use crate::executor::QueryExecutor;
use crate::pagination::collect_pages;
use crate::sweeper::{OrphanSweeper, SweepOutcome};
use crate::table_reconciler::{TableOutcome, TableReconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseAction {
    Created,
    Updated,
}

/// Result of reconciling one declared table
#[derive(Debug)]
pub struct TableResult {
    pub spec: TableSpec,
    pub result: Result<TableOutcome>,
}

impl TableResult {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match &self.result {
            Ok(outcome) => outcome.diagnostics(),
            Err(err) => vec![table_failure(&self.spec, err)],
        }
    }
}

#[derive(Debug)]
pub struct DatabaseOutcome {
    pub catalog: String,
    pub database: String,
    pub action: DatabaseAction,
    pub tables: Vec<TableResult>,

    /// Tables listed before any table was reconciled
    pub remote_tables: Vec<RemoteTableState>,

    /// Orphan tables removed during this pass (filtered runs only)
    pub swept: Vec<SweepOutcome>,
}

impl DatabaseOutcome {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let resource = Resource::database(&self.catalog, &self.database);
        let database = match self.action {
            DatabaseAction::Created => Diagnostic::of(
                DiagnosticCode::DatabaseCreated,
                format!("Created database {}", self.database),
            ),
            DatabaseAction::Updated => Diagnostic::of(
                DiagnosticCode::DatabaseUpdated,
                format!("Updated database {}", self.database),
            ),
        };

        let mut diagnostics = vec![database.with_resource(resource)];
        diagnostics.extend(self.tables.iter().flat_map(TableResult::diagnostics));
        diagnostics.extend(self.swept.iter().map(SweepOutcome::diagnostic));
        diagnostics
    }

    pub fn failed_tables(&self) -> usize {
        self.tables.iter().filter(|t| t.result.is_err()).count()
    }
}

pub struct DatabaseReconciler {
    service: Arc<dyn CatalogService>,
    tables: TableReconciler,
    sweeper: OrphanSweeper,
}

impl DatabaseReconciler {
    pub fn new(service: Arc<dyn CatalogService>, tables: TableReconciler) -> Self {
        let sweeper = OrphanSweeper::new(service.clone(), tables.stack_id());
        Self {
            service,
            tables,
            sweeper,
        }
    }

    /// Converge one database and its declared tables
    ///
    /// With `table_filter`, only the named table is reconciled. With
    /// `sweep_tables`, undeclared tables owned by this stack are dropped at
    /// the end; the full declared table list is used either way.
    ///
    /// Table failures are collected in the outcome. Only a failure to
    /// create, update or list the database itself is returned as an error.
    pub async fn reconcile(
        &self,
        spec: &DatabaseSpec,
        table_filter: Option<&str>,
        sweep_tables: bool,
    ) -> Result<DatabaseOutcome> {
        let catalog = spec.catalog.as_str();
        let action = self.converge_database(spec).await?;

        let service = &self.service;
        let remote_tables = collect_pages(|token| async move {
            service
                .list_tables(catalog, &spec.name, token.as_deref())
                .await
        })
        .await?;
        tracing::debug!(database = %spec.name, tables = remote_tables.len(), "listed remote tables");

        let mut tables = Vec::new();
        for table in spec
            .tables
            .iter()
            .filter(|t| table_filter.map_or(true, |name| t.name.eq_ignore_ascii_case(name)))
        {
            let result = match self.remote_table(spec, table, &remote_tables).await {
                Ok(remote) => self.tables.reconcile(table, remote.as_ref()).await,
                Err(e) => Err(e),
            };

            if let Err(e) = &result {
                tracing::warn!(database = %spec.name, table = %table.name, error = %e, "table reconciliation failed");
            }
            tables.push(TableResult {
                spec: table.clone(),
                result,
            });
        }

        let swept = if sweep_tables {
            self.sweeper
                .sweep_tables(catalog, &spec.name, &remote_tables, &spec.table_names())
                .await
        } else {
            Vec::new()
        };

        Ok(DatabaseOutcome {
            catalog: catalog.to_string(),
            database: spec.name.clone(),
            action,
            tables,
            remote_tables,
            swept,
        })
    }

    async fn converge_database(&self, spec: &DatabaseSpec) -> Result<DatabaseAction> {
        let catalog = spec.catalog.as_str();

        let Some(existing) = self.service.get_database(catalog, &spec.name).await? else {
            tracing::info!(database = %spec.name, "creating database");
            QueryExecutor::for_database(self.service.clone(), spec)
                .with_schedule(self.tables.poll_schedule())
                .execute(&spec.ddl, false)
                .await?;

            // An explicit `ddl` may omit the provenance properties
            if let Some(created) = self.service.get_database(catalog, &spec.name).await? {
                let missing = spec
                    .properties
                    .iter()
                    .any(|(k, v)| created.parameters.get(k) != Some(v));
                if missing {
                    tracing::debug!(database = %spec.name, "tagging created database");
                    self.merge_properties(spec, created).await?;
                }
            }
            return Ok(DatabaseAction::Created);
        };

        tracing::info!(database = %spec.name, "updating database");
        self.merge_properties(spec, existing).await?;
        Ok(DatabaseAction::Updated)
    }

    /// Overlay the declared properties on the remote ones
    async fn merge_properties(&self, spec: &DatabaseSpec, remote: RemoteDatabaseState) -> Result<()> {
        let mut parameters = remote.parameters;
        parameters.extend(spec.properties.iter().map(|(k, v)| (k.clone(), v.clone())));
        let input = DatabaseInput {
            name: spec.name.clone(),
            description: spec.description.clone().or(remote.description),
            location_uri: spec.location.clone().or(remote.location_uri),
            parameters,
        };

        self.service
            .update_database(spec.catalog.as_str(), &spec.name, &input)
            .await?;
        Ok(())
    }

    /// The table's remote state; tables declared in another catalog than
    /// their database are looked up directly
    async fn remote_table(
        &self,
        spec: &DatabaseSpec,
        table: &TableSpec,
        listed: &[RemoteTableState],
    ) -> Result<Option<RemoteTableState>> {
        if table.catalog == spec.catalog {
            let found = listed.iter().find(|r| r.name.eq_ignore_ascii_case(&table.name));
            return Ok(found.cloned());
        }

        match self
            .service
            .get_table(table.catalog.as_str(), &table.database, &table.name)
            .await
        {
            Ok(remote) => Ok(remote),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn table_failure(spec: &TableSpec, err: &DeployError) -> Diagnostic {
    let phase = match err {
        DeployError::CreateFailed { .. } => "create",
        DeployError::Snapshot(_) => "snapshot",
        _ => "reconcile",
    };
    Diagnostic::of(
        DiagnosticCode::TableFailed,
        format!("Failed to reconcile table {}: {}", spec.fully_qualified_name(), err),
    )
    .with_resource(Resource::table(spec.catalog.as_str(), &spec.database, &spec.name))
    .with_phase(phase)
    .with_reason(err.reason().map(str::to_string).unwrap_or_else(|| err.to_string()))
}
