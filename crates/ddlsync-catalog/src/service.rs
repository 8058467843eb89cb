//! Catalog and query service interface consumed by the reconciliation engine

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Glue-style table type for views
pub const VIRTUAL_VIEW: &str = "VIRTUAL_VIEW";

/// Observed state of a remote table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTableState {
    pub name: String,

    /// Partition key names in key order
    #[serde(default)]
    pub partition_keys: Vec<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,

    #[serde(default)]
    pub table_type: Option<String>,
}

impl RemoteTableState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition_keys: Vec::new(),
            parameters: BTreeMap::new(),
            table_type: None,
        }
    }

    pub fn with_partition_keys(mut self, keys: &[&str]) -> Self {
        self.partition_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_table_type(mut self, table_type: impl Into<String>) -> Self {
        self.table_type = Some(table_type.into());
        self
    }

    pub fn is_partitioned(&self) -> bool {
        !self.partition_keys.is_empty()
    }

    pub fn is_view(&self) -> bool {
        self.table_type.as_deref() == Some(VIRTUAL_VIEW)
    }
}

/// Observed state of a remote database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteDatabaseState {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub location_uri: Option<String>,

    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl RemoteDatabaseState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            location_uri: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// Fields written by `create_database` / `update_database`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInput {
    pub name: String,
    pub description: Option<String>,
    pub location_uri: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

/// One partition as the catalog lists it: positional values and a location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemotePartition {
    pub values: Vec<String>,
    pub location: String,
}

impl RemotePartition {
    pub fn new(values: Vec<String>, location: impl Into<String>) -> Self {
        Self {
            values,
            location: location.into(),
        }
    }
}

/// Execution context for a submitted query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    /// Default database for unqualified names
    pub database: Option<String>,
    pub catalog: String,
    pub workgroup: String,
    pub output_location: String,
}

/// Remote query execution state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    /// Any state the service reports that this interface does not know
    Other(String),
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "QUEUED"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Other(state) => write!(f, "{}", state),
        }
    }
}

/// Status of a query execution, with the service's state-change reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatus {
    pub state: QueryState,
    pub reason: Option<String>,
}

impl QueryStatus {
    pub fn new(state: QueryState) -> Self {
        Self { state, reason: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A result row; one string per column
pub type Row = Vec<String>;

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Continuation token; `None` on the last page
    pub next_token: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }
}

/// Errors returned by a catalog service
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Remote metadata catalog plus asynchronous query service
///
/// Absence on the read paths (`get_table`, `get_database`) is `Ok(None)`;
/// `CatalogError::NotFound` is reserved for operations that require the
/// resource to exist.
#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    /// Get the service name (e.g., "memory")
    fn name(&self) -> &'static str;

    /// Submit a query; returns an opaque execution id
    async fn submit_query(&self, sql: &str, context: &QueryContext) -> Result<String, CatalogError>;

    async fn get_query_status(&self, execution_id: &str) -> Result<QueryStatus, CatalogError>;

    /// Result rows of a succeeded execution, header row excluded
    async fn get_query_results(&self, execution_id: &str) -> Result<Vec<Row>, CatalogError>;

    async fn get_table(
        &self,
        catalog: &str,
        database: &str,
        name: &str,
    ) -> Result<Option<RemoteTableState>, CatalogError>;

    async fn list_tables(
        &self,
        catalog: &str,
        database: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RemoteTableState>, CatalogError>;

    /// Merge `parameters` into the table's existing parameters
    async fn update_table_parameters(
        &self,
        catalog: &str,
        database: &str,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), CatalogError>;

    async fn delete_table(&self, catalog: &str, database: &str, name: &str)
        -> Result<(), CatalogError>;

    async fn get_partitions(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<Page<RemotePartition>, CatalogError>;

    async fn get_database(
        &self,
        catalog: &str,
        name: &str,
    ) -> Result<Option<RemoteDatabaseState>, CatalogError>;

    async fn create_database(&self, catalog: &str, input: &DatabaseInput) -> Result<(), CatalogError>;

    async fn update_database(
        &self,
        catalog: &str,
        name: &str,
        input: &DatabaseInput,
    ) -> Result<(), CatalogError>;

    /// Delete a database and every table in it
    async fn delete_database(&self, catalog: &str, name: &str) -> Result<(), CatalogError>;

    async fn list_databases(
        &self,
        catalog: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RemoteDatabaseState>, CatalogError>;

    async fn list_catalogs(&self, page_token: Option<&str>) -> Result<Page<String>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_detection() {
        let view = RemoteTableState::new("v").with_table_type(VIRTUAL_VIEW);
        assert!(view.is_view());
        assert!(!RemoteTableState::new("t").is_view());
    }

    #[test]
    fn partitioned_detection() {
        let t = RemoteTableState::new("t").with_partition_keys(&["dt", "region"]);
        assert!(t.is_partitioned());
        assert_eq!(t.partition_keys, vec!["dt", "region"]);
    }

    #[test]
    fn query_state_display() {
        assert_eq!(QueryState::Succeeded.to_string(), "SUCCEEDED");
        assert_eq!(QueryState::Other("PAUSED".into()).to_string(), "PAUSED");
    }

    #[test]
    fn not_found_is_typed() {
        assert!(CatalogError::NotFound("db.t".into()).is_not_found());
        assert!(!CatalogError::Service("Entity Not Found".into()).is_not_found());
    }
}
