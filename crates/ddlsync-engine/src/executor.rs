//! Asynchronous query execution with bounded backoff polling
//!
//! A query is submitted once and then polled until it reaches a terminal
//! state. There is no overall deadline; use [`QueryExecutor::execute_with_timeout`]
//! to stop waiting. Stopping does not cancel the remote execution, which may
//! still complete afterwards.

use std::sync::Arc;
use std::time::Duration;

use ddlsync_catalog::{CatalogService, QueryContext, QueryState, Row};
use ddlsync_core::{DatabaseSpec, TableSpec};

use crate::error::{DeployError, Result};

/// Delay before each status poll
///
/// The first delay is `initial`, each following one grows by `step` up to
/// `max`. The sequence is non-decreasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub initial: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl PollSchedule {
    pub const DEFAULT: PollSchedule = PollSchedule {
        initial: Duration::from_millis(100),
        step: Duration::from_millis(100),
        max: Duration::from_millis(1000),
    };

    pub fn new(initial: Duration, step: Duration, max: Duration) -> Self {
        Self { initial, step, max }
    }

    /// Infinite sequence of poll delays
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        let Self { initial, step, max } = *self;
        std::iter::successors(Some(initial.min(max)), move |delay| {
            Some((*delay + step).min(max))
        })
    }
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Runs SQL against the query service for one database/catalog/workgroup
#[derive(Clone)]
pub struct QueryExecutor {
    service: Arc<dyn CatalogService>,
    context: QueryContext,
    schedule: PollSchedule,
}

impl QueryExecutor {
    pub fn new(service: Arc<dyn CatalogService>, context: QueryContext) -> Self {
        Self {
            service,
            context,
            schedule: PollSchedule::default(),
        }
    }

    /// Executor scoped to a table's database
    pub fn for_table(service: Arc<dyn CatalogService>, spec: &TableSpec) -> Self {
        Self::new(
            service,
            QueryContext {
                database: Some(spec.database.clone()),
                catalog: spec.catalog.to_string(),
                workgroup: spec.workgroup.clone(),
                output_location: spec.output.clone(),
            },
        )
    }

    /// Executor with no default database, for database-level statements
    pub fn for_database(service: Arc<dyn CatalogService>, spec: &DatabaseSpec) -> Self {
        Self::new(
            service,
            QueryContext {
                database: None,
                catalog: spec.catalog.to_string(),
                workgroup: spec.workgroup.clone(),
                output_location: spec.output.clone(),
            },
        )
    }

    pub fn with_schedule(mut self, schedule: PollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Submit `sql` and wait for it to finish
    ///
    /// Result rows are fetched only when `want_results` is set; otherwise
    /// the returned vector is empty. Every call submits a new execution.
    pub async fn execute(&self, sql: &str, want_results: bool) -> Result<Vec<Row>> {
        let execution_id = self.service.submit_query(sql, &self.context).await?;
        tracing::debug!(
            execution_id = %execution_id,
            database = self.context.database.as_deref().unwrap_or(""),
            "submitted query"
        );

        let mut delays = self.schedule.delays();
        loop {
            let delay = delays.next().unwrap_or(self.schedule.max);
            tokio::time::sleep(delay).await;

            let status = self.service.get_query_status(&execution_id).await?;
            match status.state {
                QueryState::Queued | QueryState::Running => {
                    tracing::debug!(
                        execution_id = %execution_id,
                        state = %status.state,
                        "query still running"
                    );
                }
                QueryState::Succeeded => {
                    if !want_results {
                        return Ok(Vec::new());
                    }
                    return Ok(self.service.get_query_results(&execution_id).await?);
                }
                QueryState::Failed | QueryState::Cancelled => {
                    let reason = status.reason.unwrap_or_else(|| status.state.to_string());
                    return Err(DeployError::QueryFailed {
                        execution_id,
                        state: status.state.to_string(),
                        reason,
                    });
                }
                QueryState::Other(state) => {
                    return Err(DeployError::UnexpectedQueryState {
                        execution_id,
                        state,
                    });
                }
            }
        }
    }

    /// Like [`execute`](Self::execute), but stop waiting after `timeout`
    ///
    /// The remote execution keeps running after a timeout.
    pub async fn execute_with_timeout(
        &self,
        sql: &str,
        want_results: bool,
        timeout: Duration,
    ) -> Result<Vec<Row>> {
        tokio::time::timeout(timeout, self.execute(sql, want_results))
            .await
            .map_err(|_| DeployError::Timeout(timeout))?
    }
}
