//! Deployment configuration (ddlsync.toml)
//!
//! The document is parsed into raw `*Config` structs, validated as a whole,
//! and then resolved into [`DatabaseSpec`] / [`TableSpec`] records. Defaults
//! cascade deployment -> database -> table during resolution only.
//!
//! The catalog stores database and table names in lowercase, so resolved
//! names are lowercased and names differing only in case are duplicates.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::model::{database_ddl, database_properties, CatalogRef, DatabaseSpec, TableSpec};

/// Default query workgroup
pub const DEFAULT_WORKGROUP: &str = "primary";

/// Deployment-wide settings (`[deployment]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSettings {
    /// Deployment/stack identity stamped on every managed resource
    pub stack: String,

    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub workgroup: Option<String>,

    /// Default query output location
    #[serde(default)]
    pub output: Option<String>,

    /// Sweep orphan tables even when a run is narrowed by a filter
    #[serde(default)]
    pub sweep_when_filtered: bool,

    /// Databases reconciled concurrently
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Directory for partition snapshot side files
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,

    /// Merge leftover snapshot files from an interrupted run
    #[serde(default)]
    pub recover_snapshots: bool,
}

fn default_parallelism() -> usize {
    1
}

fn default_keep_partitions() -> bool {
    true
}

/// A `[[databases]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub workgroup: Option<String>,

    #[serde(default)]
    pub output: Option<String>,

    #[serde(default)]
    pub location: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Explicit database DDL, replacing the derived statement
    #[serde(default)]
    pub ddl: Option<String>,

    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

/// A `[[databases.tables]]` entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub ddl: Option<String>,

    /// DDL file, relative to the config file
    #[serde(default)]
    pub ddl_file: Option<PathBuf>,

    #[serde(default = "default_keep_partitions")]
    pub keep_partitions: bool,

    #[serde(default)]
    pub catalog: Option<String>,

    #[serde(default)]
    pub workgroup: Option<String>,

    #[serde(default)]
    pub output: Option<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub deployment: DeploymentSettings,

    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,

    /// Directory `ddl_file` paths are resolved against
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl DeploymentConfig {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Check required fields and uniqueness without touching the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        if is_blank(&self.deployment.stack) {
            return Err(ConfigError::invalid("deployment.stack", "must not be empty"));
        }

        if self.deployment.parallelism == 0 {
            return Err(ConfigError::invalid("deployment.parallelism", "must be at least 1"));
        }

        let mut database_names = HashSet::new();
        for (i, db) in self.databases.iter().enumerate() {
            let db_path = format!("databases[{}]", i);

            if is_blank(&db.name) {
                return Err(ConfigError::invalid(format!("{}.name", db_path), "must not be empty"));
            }
            if !database_names.insert(catalog_name(&db.name)) {
                return Err(ConfigError::invalid(
                    format!("{}.name", db_path),
                    format!("duplicate database '{}'", db.name),
                ));
            }

            let output = db.output.as_ref().or(self.deployment.output.as_ref());
            if output.map_or(true, |o| is_blank(o)) {
                return Err(ConfigError::invalid(
                    format!("{}.output", db_path),
                    "no output location set on the database or [deployment]",
                ));
            }

            let mut table_names = HashSet::new();
            for (j, table) in db.tables.iter().enumerate() {
                let table_path = format!("{}.tables[{}]", db_path, j);

                if is_blank(&table.name) {
                    return Err(ConfigError::invalid(
                        format!("{}.name", table_path),
                        "must not be empty",
                    ));
                }
                if !table_names.insert(catalog_name(&table.name)) {
                    return Err(ConfigError::invalid(
                        format!("{}.name", table_path),
                        format!("duplicate table '{}' in database '{}'", table.name, db.name),
                    ));
                }

                match (&table.ddl, &table.ddl_file) {
                    (Some(_), Some(_)) => {
                        return Err(ConfigError::invalid(
                            table_path,
                            "set either 'ddl' or 'ddl_file', not both",
                        ))
                    }
                    (None, None) => {
                        return Err(ConfigError::invalid(
                            table_path,
                            "one of 'ddl' or 'ddl_file' is required",
                        ))
                    }
                    (Some(ddl), None) if is_blank(ddl) => {
                        return Err(ConfigError::invalid(
                            format!("{}.ddl", table_path),
                            "must not be empty",
                        ))
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Validate and produce fully resolved database specs
    ///
    /// Reads every `ddl_file` up front so that no remote call happens with a
    /// partially loaded declaration.
    pub fn resolve(&self) -> Result<Vec<DatabaseSpec>, ConfigError> {
        self.validate()?;

        let settings = &self.deployment;
        let mut specs = Vec::with_capacity(self.databases.len());

        for (i, db) in self.databases.iter().enumerate() {
            let name = catalog_name(&db.name);
            let catalog = db
                .catalog
                .as_deref()
                .or(settings.catalog.as_deref())
                .map(CatalogRef::new)
                .unwrap_or_default();
            let workgroup = db
                .workgroup
                .clone()
                .or_else(|| settings.workgroup.clone())
                .unwrap_or_else(|| DEFAULT_WORKGROUP.to_string());
            let output = db
                .output
                .clone()
                .or_else(|| settings.output.clone())
                .ok_or_else(|| ConfigError::invalid(format!("databases[{}].output", i), "missing"))?;

            let mut tables = Vec::with_capacity(db.tables.len());
            for (j, table) in db.tables.iter().enumerate() {
                let ddl = self.load_table_ddl(table, &format!("databases[{}].tables[{}]", i, j))?;

                tables.push(TableSpec {
                    catalog: table
                        .catalog
                        .as_deref()
                        .map(CatalogRef::new)
                        .unwrap_or_else(|| catalog.clone()),
                    database: name.clone(),
                    name: catalog_name(&table.name),
                    ddl,
                    keep_partitions: table.keep_partitions,
                    workgroup: table.workgroup.clone().unwrap_or_else(|| workgroup.clone()),
                    output: table.output.clone().unwrap_or_else(|| output.clone()),
                });
            }

            let table_names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
            let properties = database_properties(&db.properties, &settings.stack, &table_names);
            let ddl = db.ddl.clone().unwrap_or_else(|| {
                database_ddl(
                    &name,
                    db.description.as_deref(),
                    db.location.as_deref(),
                    &properties,
                )
            });

            specs.push(DatabaseSpec {
                catalog,
                name,
                output,
                location: db.location.clone(),
                workgroup,
                properties,
                description: db.description.clone(),
                ddl,
                tables,
            });
        }

        Ok(specs)
    }

    /// Snapshot directory resolved against the project root
    pub fn snapshot_dir(&self) -> Option<PathBuf> {
        self.deployment
            .snapshot_dir
            .as_ref()
            .map(|dir| self.project_root.join(dir))
    }

    fn load_table_ddl(&self, table: &TableConfig, path: &str) -> Result<String, ConfigError> {
        if let Some(ddl) = &table.ddl {
            return Ok(ddl.clone());
        }

        let file = table
            .ddl_file
            .as_ref()
            .ok_or_else(|| ConfigError::invalid(path, "one of 'ddl' or 'ddl_file' is required"))?;
        let full_path = self.project_root.join(file);
        let ddl = std::fs::read_to_string(&full_path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", full_path.display(), e)))?;

        if is_blank(&ddl) {
            return Err(ConfigError::invalid(
                format!("{}.ddl_file", path),
                format!("{} is empty", full_path.display()),
            ));
        }

        Ok(ddl)
    }
}

/// A database or table name as the catalog stores it
fn catalog_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration at {path}: {message}")]
    Invalid { path: String, message: String },
}

impl ConfigError {
    fn invalid(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provenance::{CREATOR_KEY, STACK_KEY, TABLES_KEY};
    use pretty_assertions::assert_eq;

    const BASIC: &str = r#"
        [deployment]
        stack = "analytics-prod"
        output = "s3://results/"

        [[databases]]
        name = "analytics"
        description = "Analytics"
        properties = { owner = "data" }

        [[databases.tables]]
        name = "events"
        ddl = "CREATE EXTERNAL TABLE analytics.events (id string)"

        [[databases.tables]]
        name = "users"
        ddl = "CREATE EXTERNAL TABLE analytics.users (id string)"
        keep_partitions = false
        workgroup = "etl"
    "#;

    #[test]
    fn resolves_defaults_cascade() {
        let config = DeploymentConfig::from_toml(BASIC).unwrap();
        let specs = config.resolve().unwrap();

        assert_eq!(specs.len(), 1);
        let db = &specs[0];
        assert_eq!(db.catalog, CatalogRef::default());
        assert_eq!(db.workgroup, DEFAULT_WORKGROUP);
        assert_eq!(db.output, "s3://results/");
        assert_eq!(db.table_names(), vec!["events", "users"]);

        let events = &db.tables[0];
        assert!(events.keep_partitions);
        assert_eq!(events.workgroup, "primary");
        assert_eq!(events.output, "s3://results/");

        let users = &db.tables[1];
        assert!(!users.keep_partitions);
        assert_eq!(users.workgroup, "etl");
    }

    #[test]
    fn resolved_properties_carry_provenance() {
        let specs = DeploymentConfig::from_toml(BASIC).unwrap().resolve().unwrap();
        let props = &specs[0].properties;

        assert_eq!(props.get(CREATOR_KEY).map(String::as_str), Some("ddlsync"));
        assert_eq!(props.get(STACK_KEY).map(String::as_str), Some("analytics-prod"));
        assert_eq!(props.get(TABLES_KEY).map(String::as_str), Some("events,users"));
        assert_eq!(props.get("owner").map(String::as_str), Some("data"));
        assert!(specs[0].ddl.starts_with("CREATE DATABASE IF NOT EXISTS `analytics`"));
        assert!(specs[0].ddl.contains("'ddlsync:stack'='analytics-prod'"));
    }

    #[test]
    fn explicit_database_ddl_wins() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"
            ddl = "CREATE DATABASE raw"
        "#;
        let specs = DeploymentConfig::from_toml(toml).unwrap().resolve().unwrap();
        assert_eq!(specs[0].ddl, "CREATE DATABASE raw");
    }

    #[test]
    fn missing_stack_is_rejected() {
        let toml = r#"
            [deployment]
            stack = " "
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref path, .. } if path == "deployment.stack"));
    }

    #[test]
    fn missing_output_is_rejected() {
        let toml = r#"
            [deployment]
            stack = "s"

            [[databases]]
            name = "raw"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref path, .. } if path == "databases[0].output"));
    }

    #[test]
    fn table_requires_exactly_one_ddl_source() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "t"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("one of 'ddl' or 'ddl_file'"));

        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "t"
            ddl = "CREATE TABLE t (a int)"
            ddl_file = "t.sql"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("not both"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "t"
            ddl = "x"

            [[databases.tables]]
            name = "t"
            ddl = "y"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("duplicate table 't'"));
    }

    #[test]
    fn names_resolve_to_lowercase() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "Analytics"

            [[databases.tables]]
            name = "Events"
            ddl = "CREATE EXTERNAL TABLE `Events` (id string)"
        "#;
        let specs = DeploymentConfig::from_toml(toml).unwrap().resolve().unwrap();
        let db = &specs[0];

        assert_eq!(db.name, "analytics");
        assert_eq!(db.table_names(), vec!["events"]);
        assert_eq!(db.tables[0].database, "analytics");
        assert_eq!(db.properties.get(TABLES_KEY).map(String::as_str), Some("events"));
        assert!(db.ddl.starts_with("CREATE DATABASE IF NOT EXISTS `analytics`"));
    }

    #[test]
    fn names_differing_only_in_case_are_duplicates() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "Events"
            ddl = "x"

            [[databases.tables]]
            name = "events"
            ddl = "y"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().validate().unwrap_err();
        assert!(err.to_string().contains("duplicate table 'events'"));
    }

    #[test]
    fn ddl_file_is_read_relative_to_config() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sql")).unwrap();
        std::fs::write(
            dir.path().join("sql/events.sql"),
            "CREATE EXTERNAL TABLE events (id string)",
        )
        .unwrap();
        let config_path = dir.path().join("ddlsync.toml");
        std::fs::write(
            &config_path,
            r#"
            [deployment]
            stack = "s"
            output = "s3://o/"
            snapshot_dir = ".ddlsync/partitions"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "events"
            ddl_file = "sql/events.sql"
            "#,
        )
        .unwrap();

        let config = DeploymentConfig::from_file(&config_path).unwrap();
        let specs = config.resolve().unwrap();

        assert_eq!(specs[0].tables[0].ddl, "CREATE EXTERNAL TABLE events (id string)");
        assert_eq!(config.snapshot_dir(), Some(dir.path().join(".ddlsync/partitions")));
    }

    #[test]
    fn missing_ddl_file_fails_resolution() {
        let toml = r#"
            [deployment]
            stack = "s"
            output = "s3://o/"

            [[databases]]
            name = "raw"

            [[databases.tables]]
            name = "events"
            ddl_file = "does/not/exist.sql"
        "#;
        let err = DeploymentConfig::from_toml(toml).unwrap().resolve().unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn config_toml_roundtrip() {
        let config = DeploymentConfig::from_toml(BASIC).unwrap();
        let toml = toml::to_string(&config).unwrap();
        let parsed = DeploymentConfig::from_toml(&toml).unwrap();
        assert_eq!(config.databases, parsed.databases);
    }
}
