//! In-memory catalog and query service
//!
//! `MemoryCatalog` keeps catalogs, databases, tables and partitions in memory
//! and simulates query execution for the statements the engine issues. It's
//! useful for:
//! - Unit and integration testing of the reconciliation engine
//! - A local, file-backed state backend for the CLI
//! - Simulating failed, cancelled and slow query executions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ddlsync_catalog::{MemoryCatalog, CatalogService};
//!
//! let catalog = MemoryCatalog::builder()
//!     .with_running_polls(2)
//!     .with_query_failure("bad_column", "COLUMN_NOT_FOUND: bad_column")
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::service::{
    CatalogError, CatalogService, DatabaseInput, Page, QueryContext, QueryState, QueryStatus,
    RemoteDatabaseState, RemotePartition, RemoteTableState, Row, VIRTUAL_VIEW,
};
use crate::statement::{QualifiedName, Statement};
use ddlsync_core::DEFAULT_CATALOG;

const DEFAULT_PAGE_SIZE: usize = 100;

/// A stored table: catalog metadata, the DDL it was created from, partitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTable {
    pub state: RemoteTableState,
    pub ddl: String,

    #[serde(default)]
    pub partitions: Vec<RemotePartition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDatabase {
    pub state: RemoteDatabaseState,

    #[serde(default)]
    pub tables: BTreeMap<String, StoredTable>,
}

/// Serializable catalog contents: catalog -> database -> table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogState {
    pub catalogs: BTreeMap<String, BTreeMap<String, StoredDatabase>>,
}

impl Default for CatalogState {
    fn default() -> Self {
        let mut catalogs = BTreeMap::new();
        catalogs.insert(DEFAULT_CATALOG.to_string(), BTreeMap::new());
        Self { catalogs }
    }
}

impl CatalogState {
    fn catalog_mut(
        &mut self,
        catalog: &str,
    ) -> Result<&mut BTreeMap<String, StoredDatabase>, CatalogError> {
        self.catalogs
            .get_mut(catalog)
            .ok_or_else(|| CatalogError::NotFound(format!("catalog {}", catalog)))
    }

    fn database(&self, catalog: &str, database: &str) -> Result<&StoredDatabase, CatalogError> {
        self.catalogs
            .get(catalog)
            .and_then(|dbs| dbs.get(database))
            .ok_or_else(|| CatalogError::NotFound(format!("database {}.{}", catalog, database)))
    }

    fn database_mut(
        &mut self,
        catalog: &str,
        database: &str,
    ) -> Result<&mut StoredDatabase, CatalogError> {
        self.catalog_mut(catalog)?
            .get_mut(database)
            .ok_or_else(|| CatalogError::NotFound(format!("database {}.{}", catalog, database)))
    }

    fn table_mut(
        &mut self,
        catalog: &str,
        database: &str,
        table: &str,
    ) -> Result<&mut StoredTable, CatalogError> {
        self.database_mut(catalog, database)?
            .tables
            .get_mut(table)
            .ok_or_else(|| {
                CatalogError::NotFound(format!("table {}.{}.{}", catalog, database, table))
            })
    }
}

#[derive(Debug, Clone)]
enum InjectedFailure {
    Fail(String),
    Cancel,
    /// Terminal state outside the known set
    State(String),
}

#[derive(Debug)]
struct Execution {
    running_polls_left: u32,
    outcome: Result<Vec<Row>, QueryStatus>,
}

/// In-memory catalog and query service
///
/// Statements take effect when submitted; the execution then reports
/// `RUNNING` for the configured number of polls before reaching its
/// terminal state. Clones share state.
#[derive(Clone)]
pub struct MemoryCatalog {
    state: Arc<RwLock<CatalogState>>,
    executions: Arc<RwLock<HashMap<String, Execution>>>,
    statements: Arc<RwLock<Vec<String>>>,
    failures: Arc<RwLock<Vec<(String, InjectedFailure)>>>,
    next_execution: Arc<AtomicU64>,
    running_polls: u32,
    page_size: usize,
}

impl MemoryCatalog {
    /// Create an empty catalog containing only the default root catalog
    pub fn new() -> Self {
        Self::from_state(CatalogState::default())
    }

    pub fn builder() -> MemoryCatalogBuilder {
        MemoryCatalogBuilder::new()
    }

    /// Create a catalog from previously saved contents
    pub fn from_state(state: CatalogState) -> Self {
        Self {
            state: Arc::new(RwLock::new(state)),
            executions: Arc::new(RwLock::new(HashMap::new())),
            statements: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(Vec::new())),
            next_execution: Arc::new(AtomicU64::new(1)),
            running_polls: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Copy of the current contents, for persisting
    pub async fn state(&self) -> CatalogState {
        self.state.read().await.clone()
    }

    pub async fn add_catalog(&self, catalog: &str) {
        self.state
            .write()
            .await
            .catalogs
            .entry(catalog.to_string())
            .or_default();
    }

    /// Add (or replace) a database, creating its catalog if needed
    pub async fn add_database(&self, catalog: &str, database: RemoteDatabaseState) {
        let mut state = self.state.write().await;
        state
            .catalogs
            .entry(catalog.to_string())
            .or_default()
            .insert(
                database.name.clone(),
                StoredDatabase {
                    state: database,
                    tables: BTreeMap::new(),
                },
            );
    }

    /// Add (or replace) a table in an existing database
    pub async fn add_table(
        &self,
        catalog: &str,
        database: &str,
        table: RemoteTableState,
        ddl: impl Into<String>,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let db = state.database_mut(catalog, database)?;
        db.tables.insert(
            table.name.clone(),
            StoredTable {
                state: table,
                ddl: ddl.into(),
                partitions: Vec::new(),
            },
        );
        Ok(())
    }

    pub async fn add_partitions(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
        partitions: impl IntoIterator<Item = RemotePartition>,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .table_mut(catalog, database, table)?
            .partitions
            .extend(partitions);
        Ok(())
    }

    pub async fn table(&self, catalog: &str, database: &str, table: &str) -> Option<StoredTable> {
        self.state
            .read()
            .await
            .catalogs
            .get(catalog)?
            .get(database)?
            .tables
            .get(table)
            .cloned()
    }

    pub async fn has_database(&self, catalog: &str, database: &str) -> bool {
        self.state.read().await.database(catalog, database).is_ok()
    }

    /// Every statement submitted so far, in order
    pub async fn statements(&self) -> Vec<String> {
        self.statements.read().await.clone()
    }

    /// Submitted statements starting with `prefix` (case-insensitive)
    pub async fn statements_starting_with(&self, prefix: &str) -> Vec<String> {
        let prefix = prefix.to_uppercase();
        self.statements
            .read()
            .await
            .iter()
            .filter(|s| s.trim_start().to_uppercase().starts_with(&prefix))
            .cloned()
            .collect()
    }

    pub async fn clear_statements(&self) {
        self.statements.write().await.clear();
    }

    /// Fail every statement containing `pattern` with `reason`
    pub async fn fail_queries_containing(&self, pattern: &str, reason: &str) {
        self.failures.write().await.push((
            pattern.to_string(),
            InjectedFailure::Fail(reason.to_string()),
        ));
    }

    /// Cancel every statement containing `pattern`
    pub async fn cancel_queries_containing(&self, pattern: &str) {
        self.failures
            .write()
            .await
            .push((pattern.to_string(), InjectedFailure::Cancel));
    }

    /// End every statement containing `pattern` in the raw state `state`
    pub async fn end_queries_containing_in_state(&self, pattern: &str, state: &str) {
        self.failures.write().await.push((
            pattern.to_string(),
            InjectedFailure::State(state.to_string()),
        ));
    }

    pub async fn clear_failures(&self) {
        self.failures.write().await.clear();
    }

    fn page<T: Clone>(&self, items: &[T], token: Option<&str>, limit: usize) -> Result<Page<T>, CatalogError> {
        let start = match token {
            Some(t) => t
                .parse::<usize>()
                .map_err(|_| CatalogError::InvalidRequest(format!("bad page token '{}'", t)))?,
            None => 0,
        };
        let limit = limit.max(1);
        let end = (start + limit).min(items.len());
        let items_page = items.get(start..end).map(<[T]>::to_vec).unwrap_or_default();
        let next_token = (end < items.len()).then(|| end.to_string());
        Ok(Page {
            items: items_page,
            next_token,
        })
    }

    async fn injected_failure(&self, sql: &str) -> Option<InjectedFailure> {
        self.failures
            .read()
            .await
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, failure)| failure.clone())
    }

    async fn apply(&self, sql: &str, context: &QueryContext) -> Result<Vec<Row>, String> {
        let resolve = |table: &QualifiedName| -> Result<(String, String), String> {
            let database = table
                .database
                .clone()
                .or_else(|| context.database.clone())
                .ok_or_else(|| format!("no database selected for {}", table.name))?;
            Ok((database, table.name.clone()))
        };

        let mut state = self.state.write().await;
        let catalog = context.catalog.as_str();

        match Statement::parse(sql) {
            Statement::CreateDatabase {
                name,
                if_not_exists,
                comment,
                location,
                properties,
            } => {
                let dbs = state.catalog_mut(catalog).map_err(|e| e.to_string())?;
                if dbs.contains_key(&name) {
                    return if if_not_exists {
                        Ok(Vec::new())
                    } else {
                        Err(format!("Database {} already exists", name))
                    };
                }
                dbs.insert(
                    name.clone(),
                    StoredDatabase {
                        state: RemoteDatabaseState {
                            name,
                            description: comment,
                            location_uri: location,
                            parameters: properties,
                        },
                        tables: BTreeMap::new(),
                    },
                );
                Ok(Vec::new())
            }
            Statement::CreateTable {
                table,
                view,
                external,
                if_not_exists,
                or_replace,
                partition_keys,
            } => {
                let (database, name) = resolve(&table)?;
                let db = state
                    .database_mut(catalog, &database)
                    .map_err(|_| format!("SCHEMA_NOT_FOUND: Schema {} does not exist", database))?;

                if db.tables.contains_key(&name) && !or_replace {
                    return if if_not_exists {
                        Ok(Vec::new())
                    } else {
                        Err(format!("Table {}.{} already exists", database, name))
                    };
                }

                let mut remote = RemoteTableState::new(&name);
                remote.partition_keys = partition_keys;
                remote.table_type = Some(
                    if view {
                        VIRTUAL_VIEW
                    } else if external {
                        "EXTERNAL_TABLE"
                    } else {
                        "MANAGED_TABLE"
                    }
                    .to_string(),
                );
                if external {
                    remote
                        .parameters
                        .insert("EXTERNAL".to_string(), "TRUE".to_string());
                }

                db.tables.insert(
                    name,
                    StoredTable {
                        state: remote,
                        ddl: sql.to_string(),
                        partitions: Vec::new(),
                    },
                );
                Ok(Vec::new())
            }
            Statement::Drop {
                table,
                view,
                if_exists,
            } => {
                let (database, name) = resolve(&table)?;
                let db = state.database_mut(catalog, &database).map_err(|e| e.to_string())?;
                match db.tables.get(&name).map(|t| t.state.is_view()) {
                    Some(is_view) if is_view != view => Err(format!(
                        "{}.{} is not a {}",
                        database,
                        name,
                        if view { "view" } else { "table" }
                    )),
                    Some(_) => {
                        db.tables.remove(&name);
                        Ok(Vec::new())
                    }
                    None if if_exists => Ok(Vec::new()),
                    None => Err(format!("Table not found {}.{}", database, name)),
                }
            }
            Statement::ShowCreate { table } => {
                let (database, name) = resolve(&table)?;
                let stored = state
                    .table_mut(catalog, &database, &name)
                    .map_err(|e| e.to_string())?;
                Ok(stored.ddl.lines().map(|line| vec![line.to_string()]).collect())
            }
            Statement::AddPartitions { table, partitions } => {
                let (database, name) = resolve(&table)?;
                let stored = state
                    .table_mut(catalog, &database, &name)
                    .map_err(|e| e.to_string())?;

                for (values, location) in partitions {
                    let keys: Vec<&str> = values.iter().map(|(k, _)| k.as_str()).collect();
                    if keys != stored.state.partition_keys {
                        return Err(format!(
                            "Partition keys {:?} do not match table keys {:?}",
                            keys, stored.state.partition_keys
                        ));
                    }
                    let raw: Vec<String> = values.into_iter().map(|(_, v)| v).collect();
                    if stored.partitions.iter().any(|p| p.values == raw) {
                        continue;
                    }
                    stored
                        .partitions
                        .push(RemotePartition::new(raw, location.unwrap_or_default()));
                }
                Ok(Vec::new())
            }
            Statement::Other => Ok(Vec::new()),
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CatalogService for MemoryCatalog {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn submit_query(&self, sql: &str, context: &QueryContext) -> Result<String, CatalogError> {
        self.statements.write().await.push(sql.to_string());

        let outcome = match self.injected_failure(sql).await {
            Some(InjectedFailure::Fail(reason)) => {
                Err(QueryStatus::new(QueryState::Failed).with_reason(reason))
            }
            Some(InjectedFailure::Cancel) => Err(QueryStatus::new(QueryState::Cancelled)),
            Some(InjectedFailure::State(state)) => Err(QueryStatus::new(QueryState::Other(state))),
            None => self
                .apply(sql, context)
                .await
                .map_err(|reason| QueryStatus::new(QueryState::Failed).with_reason(reason)),
        };

        let id = format!(
            "exec-{:06}",
            self.next_execution.fetch_add(1, Ordering::SeqCst)
        );
        tracing::debug!(execution_id = %id, "memory catalog accepted query");

        self.executions.write().await.insert(
            id.clone(),
            Execution {
                running_polls_left: self.running_polls,
                outcome,
            },
        );
        Ok(id)
    }

    async fn get_query_status(&self, execution_id: &str) -> Result<QueryStatus, CatalogError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(execution_id)
            .ok_or_else(|| CatalogError::NotFound(format!("execution {}", execution_id)))?;

        if execution.running_polls_left > 0 {
            execution.running_polls_left -= 1;
            return Ok(QueryStatus::new(QueryState::Running));
        }

        Ok(match &execution.outcome {
            Ok(_) => QueryStatus::new(QueryState::Succeeded),
            Err(status) => status.clone(),
        })
    }

    async fn get_query_results(&self, execution_id: &str) -> Result<Vec<Row>, CatalogError> {
        let executions = self.executions.read().await;
        let execution = executions
            .get(execution_id)
            .ok_or_else(|| CatalogError::NotFound(format!("execution {}", execution_id)))?;

        match &execution.outcome {
            Ok(rows) if execution.running_polls_left == 0 => Ok(rows.clone()),
            _ => Err(CatalogError::InvalidRequest(format!(
                "execution {} has not succeeded",
                execution_id
            ))),
        }
    }

    async fn get_table(
        &self,
        catalog: &str,
        database: &str,
        name: &str,
    ) -> Result<Option<RemoteTableState>, CatalogError> {
        let state = self.state.read().await;
        let db = state.database(catalog, database)?;
        Ok(db.tables.get(name).map(|t| t.state.clone()))
    }

    async fn list_tables(
        &self,
        catalog: &str,
        database: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RemoteTableState>, CatalogError> {
        let state = self.state.read().await;
        let tables: Vec<RemoteTableState> = state
            .database(catalog, database)?
            .tables
            .values()
            .map(|t| t.state.clone())
            .collect();
        self.page(&tables, page_token, self.page_size)
    }

    async fn update_table_parameters(
        &self,
        catalog: &str,
        database: &str,
        name: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let table = state.table_mut(catalog, database, name)?;
        table
            .state
            .parameters
            .extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn delete_table(
        &self,
        catalog: &str,
        database: &str,
        name: &str,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .database_mut(catalog, database)?
            .tables
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound(format!("table {}.{}.{}", catalog, database, name)))
    }

    async fn get_partitions(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<Page<RemotePartition>, CatalogError> {
        let state = self.state.read().await;
        let stored = state
            .database(catalog, database)?
            .tables
            .get(table)
            .ok_or_else(|| {
                CatalogError::NotFound(format!("table {}.{}.{}", catalog, database, table))
            })?;
        self.page(&stored.partitions, page_token, max_results)
    }

    async fn get_database(
        &self,
        catalog: &str,
        name: &str,
    ) -> Result<Option<RemoteDatabaseState>, CatalogError> {
        let state = self.state.read().await;
        let dbs = state
            .catalogs
            .get(catalog)
            .ok_or_else(|| CatalogError::NotFound(format!("catalog {}", catalog)))?;
        Ok(dbs.get(name).map(|db| db.state.clone()))
    }

    async fn create_database(&self, catalog: &str, input: &DatabaseInput) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let dbs = state.catalog_mut(catalog)?;
        if dbs.contains_key(&input.name) {
            return Err(CatalogError::AlreadyExists(format!(
                "database {}.{}",
                catalog, input.name
            )));
        }
        dbs.insert(
            input.name.clone(),
            StoredDatabase {
                state: RemoteDatabaseState {
                    name: input.name.clone(),
                    description: input.description.clone(),
                    location_uri: input.location_uri.clone(),
                    parameters: input.parameters.clone(),
                },
                tables: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn update_database(
        &self,
        catalog: &str,
        name: &str,
        input: &DatabaseInput,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        let db = state.database_mut(catalog, name)?;
        db.state.description = input.description.clone();
        db.state.location_uri = input.location_uri.clone();
        db.state.parameters = input.parameters.clone();
        Ok(())
    }

    async fn delete_database(&self, catalog: &str, name: &str) -> Result<(), CatalogError> {
        let mut state = self.state.write().await;
        state
            .catalog_mut(catalog)?
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| CatalogError::NotFound(format!("database {}.{}", catalog, name)))
    }

    async fn list_databases(
        &self,
        catalog: &str,
        page_token: Option<&str>,
    ) -> Result<Page<RemoteDatabaseState>, CatalogError> {
        let state = self.state.read().await;
        let dbs: Vec<RemoteDatabaseState> = state
            .catalogs
            .get(catalog)
            .ok_or_else(|| CatalogError::NotFound(format!("catalog {}", catalog)))?
            .values()
            .map(|db| db.state.clone())
            .collect();
        self.page(&dbs, page_token, self.page_size)
    }

    async fn list_catalogs(&self, page_token: Option<&str>) -> Result<Page<String>, CatalogError> {
        let names: Vec<String> = self.state.read().await.catalogs.keys().cloned().collect();
        self.page(&names, page_token, self.page_size)
    }
}

/// Builder for creating a MemoryCatalog with predefined contents
pub struct MemoryCatalogBuilder {
    state: CatalogState,
    failures: Vec<(String, InjectedFailure)>,
    running_polls: u32,
    page_size: usize,
}

impl MemoryCatalogBuilder {
    pub fn new() -> Self {
        Self {
            state: CatalogState::default(),
            failures: Vec::new(),
            running_polls: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_catalog(mut self, catalog: &str) -> Self {
        self.state.catalogs.entry(catalog.to_string()).or_default();
        self
    }

    pub fn with_database(mut self, catalog: &str, database: RemoteDatabaseState) -> Self {
        self.state.catalogs.entry(catalog.to_string()).or_default().insert(
            database.name.clone(),
            StoredDatabase {
                state: database,
                tables: BTreeMap::new(),
            },
        );
        self
    }

    /// Add a table; the database is created bare if missing
    pub fn with_table(
        mut self,
        catalog: &str,
        database: &str,
        table: RemoteTableState,
        ddl: &str,
        partitions: Vec<RemotePartition>,
    ) -> Self {
        let db = self
            .state
            .catalogs
            .entry(catalog.to_string())
            .or_default()
            .entry(database.to_string())
            .or_insert_with(|| StoredDatabase {
                state: RemoteDatabaseState::new(database),
                tables: BTreeMap::new(),
            });
        db.tables.insert(
            table.name.clone(),
            StoredTable {
                state: table,
                ddl: ddl.to_string(),
                partitions,
            },
        );
        self
    }

    /// Report `RUNNING` this many times before each terminal state
    pub fn with_running_polls(mut self, polls: u32) -> Self {
        self.running_polls = polls;
        self
    }

    /// Page size for table, database and catalog listings
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_query_failure(mut self, pattern: &str, reason: &str) -> Self {
        self.failures
            .push((pattern.to_string(), InjectedFailure::Fail(reason.to_string())));
        self
    }

    pub fn with_query_state(mut self, pattern: &str, state: &str) -> Self {
        self.failures
            .push((pattern.to_string(), InjectedFailure::State(state.to_string())));
        self
    }

    pub fn build(self) -> MemoryCatalog {
        let mut catalog = MemoryCatalog::from_state(self.state);
        catalog.failures = Arc::new(RwLock::new(self.failures));
        catalog.running_polls = self.running_polls;
        catalog.page_size = self.page_size;
        catalog
    }
}

impl Default for MemoryCatalogBuilder {
    fn default() -> Self {
        Self::new()
    }
}
