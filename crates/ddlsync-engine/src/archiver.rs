//! Partition backup and replay around table recreation

use std::sync::Arc;

use ddlsync_catalog::{CatalogError, CatalogService};
use ddlsync_core::PartitionSnapshot;

use crate::error::Result;
use crate::executor::QueryExecutor;
use crate::pagination::collect_pages;
use crate::statements::{add_partition_statements, MAX_QUERY_BYTES};

/// Largest partition page the catalog returns
pub const PARTITION_PAGE_SIZE: usize = 1000;

/// Result of replaying a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    pub partitions: usize,
    pub statements: usize,
}

pub struct PartitionArchiver {
    service: Arc<dyn CatalogService>,
    max_query_bytes: usize,
}

impl PartitionArchiver {
    pub fn new(service: Arc<dyn CatalogService>) -> Self {
        Self {
            service,
            max_query_bytes: MAX_QUERY_BYTES,
        }
    }

    /// Lower the statement size limit, for tests and stricter services
    pub fn with_max_query_bytes(mut self, max_query_bytes: usize) -> Self {
        self.max_query_bytes = max_query_bytes;
        self
    }

    /// Snapshot every partition of a table
    ///
    /// A table that does not exist, or has no partition keys, yields an
    /// empty snapshot.
    pub async fn backup(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
    ) -> Result<Vec<PartitionSnapshot>> {
        let remote = match self.service.get_table(catalog, database, table).await {
            Ok(Some(remote)) => remote,
            Ok(None) => return Ok(Vec::new()),
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        if !remote.is_partitioned() {
            return Ok(Vec::new());
        }

        let service = &self.service;
        let partitions = collect_pages(|token| async move {
            service
                .get_partitions(catalog, database, table, token.as_deref(), PARTITION_PAGE_SIZE)
                .await
        })
        .await?;

        let keys = &remote.partition_keys;
        let snapshots = partitions
            .into_iter()
            .map(|partition| {
                if partition.values.len() != keys.len() {
                    return Err(CatalogError::InvalidResponse(format!(
                        "partition of {}.{} has {} values for {} keys",
                        database,
                        table,
                        partition.values.len(),
                        keys.len()
                    )));
                }
                let values = keys.iter().cloned().zip(partition.values).collect();
                Ok(PartitionSnapshot::new(values, partition.location))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        tracing::info!(
            database = database,
            table = table,
            partitions = snapshots.len(),
            "backed up partitions"
        );
        Ok(snapshots)
    }

    /// Replay a snapshot as batched `ADD IF NOT EXISTS PARTITION` statements
    ///
    /// `executor` must be scoped to the table's database. An empty snapshot
    /// issues nothing.
    pub async fn restore(
        &self,
        executor: &QueryExecutor,
        table: &str,
        snapshots: &[PartitionSnapshot],
    ) -> Result<RestoreSummary> {
        if snapshots.is_empty() {
            return Ok(RestoreSummary::default());
        }

        let statements = add_partition_statements(table, snapshots, self.max_query_bytes);
        for (i, statement) in statements.iter().enumerate() {
            tracing::debug!(
                table = table,
                batch = i + 1,
                batches = statements.len(),
                bytes = statement.len(),
                "restoring partition batch"
            );
            executor.execute(statement, false).await?;
        }

        tracing::info!(
            database = executor.context().database.as_deref().unwrap_or(""),
            table = table,
            partitions = snapshots.len(),
            statements = statements.len(),
            "restored partitions"
        );
        Ok(RestoreSummary {
            partitions: snapshots.len(),
            statements: statements.len(),
        })
    }
}
