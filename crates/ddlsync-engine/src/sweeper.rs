//! Removal of resources this stack deployed but no longer declares
//!
//! Only resources carrying this stack's provenance tag are ever eligible.
//! Untagged databases and tables, or ones tagged by another stack, are left
//! alone whether or not they are declared.

use std::collections::HashSet;
use std::sync::Arc;

use ddlsync_catalog::{CatalogService, RemoteTableState};
use ddlsync_core::provenance::{is_owned_by, is_table_owned_by};
use ddlsync_core::{DatabaseSpec, Diagnostic, DiagnosticCode, Resource};

use crate::error::Result;
use crate::pagination::collect_pages;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweptKind {
    Database,
    Table,
}

/// One orphan removal attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub kind: SweptKind,
    pub resource: Resource,

    /// Failure reason; `None` when the resource was removed
    pub error: Option<String>,
}

impl SweepOutcome {
    pub fn diagnostic(&self) -> Diagnostic {
        let diagnostic = match (&self.error, self.kind) {
            (None, SweptKind::Database) => Diagnostic::of(
                DiagnosticCode::OrphanDatabaseDropped,
                format!("Dropped orphaned database {}", self.resource),
            ),
            (None, SweptKind::Table) => Diagnostic::of(
                DiagnosticCode::OrphanTableDropped,
                format!("Dropped orphaned table {}", self.resource),
            ),
            (Some(reason), _) => Diagnostic::of(
                DiagnosticCode::SweepFailed,
                format!("Could not sweep {}", self.resource),
            )
            .with_phase("sweep")
            .with_reason(reason.clone()),
        };
        diagnostic.with_resource(self.resource.clone())
    }
}

pub struct OrphanSweeper {
    service: Arc<dyn CatalogService>,
    stack_id: String,
}

impl OrphanSweeper {
    pub fn new(service: Arc<dyn CatalogService>, stack_id: impl Into<String>) -> Self {
        Self {
            service,
            stack_id: stack_id.into(),
        }
    }

    /// Delete every database in every catalog that is tagged with this stack
    /// but not in `declared`
    ///
    /// Failing to list the catalogs aborts the sweep. Failing to list one
    /// catalog's databases, or to delete one database, is recorded and the
    /// sweep moves on.
    pub async fn sweep_databases(&self, declared: &[DatabaseSpec]) -> Result<Vec<SweepOutcome>> {
        let declared: HashSet<(&str, &str)> = declared
            .iter()
            .map(|db| (db.catalog.as_str(), db.name.as_str()))
            .collect();

        let service = &self.service;
        let catalogs = collect_pages(|token| async move {
            service.list_catalogs(token.as_deref()).await
        })
        .await?;

        let mut outcomes = Vec::new();
        for catalog in &catalogs {
            let catalog = catalog.as_str();
            let databases = match collect_pages(|token| async move {
                service.list_databases(catalog, token.as_deref()).await
            })
            .await
            {
                Ok(databases) => databases,
                Err(e) => {
                    tracing::warn!(catalog = catalog, error = %e, "could not list databases");
                    outcomes.push(SweepOutcome {
                        kind: SweptKind::Database,
                        resource: Resource::database(catalog, "*"),
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            for database in databases {
                if !is_owned_by(&database.parameters, &self.stack_id)
                    || declared.contains(&(catalog, database.name.as_str()))
                {
                    continue;
                }

                tracing::info!(catalog = catalog, database = %database.name, "dropping orphaned database");
                let error = match self.service.delete_database(catalog, &database.name).await {
                    Ok(()) => None,
                    Err(e) => {
                        tracing::warn!(database = %database.name, error = %e, "orphan database sweep failed");
                        Some(e.to_string())
                    }
                };
                outcomes.push(SweepOutcome {
                    kind: SweptKind::Database,
                    resource: Resource::database(catalog, &database.name),
                    error,
                });
            }
        }

        Ok(outcomes)
    }

    /// Delete tables of one database tagged with this stack but not declared
    pub async fn sweep_tables(
        &self,
        catalog: &str,
        database: &str,
        remote_tables: &[RemoteTableState],
        declared_tables: &[&str],
    ) -> Vec<SweepOutcome> {
        let mut outcomes = Vec::new();

        for table in remote_tables {
            if !is_table_owned_by(&table.parameters, &self.stack_id)
                || declared_tables.contains(&table.name.as_str())
            {
                continue;
            }

            tracing::info!(database = database, table = %table.name, "dropping orphaned table");
            let error = match self.service.delete_table(catalog, database, &table.name).await {
                Ok(()) => None,
                Err(e) if e.is_not_found() => None,
                Err(e) => {
                    tracing::warn!(database = database, table = %table.name, error = %e, "orphan table sweep failed");
                    Some(e.to_string())
                }
            };
            outcomes.push(SweepOutcome {
                kind: SweptKind::Table,
                resource: Resource::table(catalog, database, &table.name),
                error,
            });
        }

        outcomes
    }
}
