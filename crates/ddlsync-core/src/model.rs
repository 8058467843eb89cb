//! Resolved declaration types
//!
//! These records are produced by [`crate::config::DeploymentConfig::resolve`]
//! and are read-only inputs for the reconciliation engine. Every default has
//! already been applied by the time a spec exists.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::provenance::{CREATOR_KEY, CREATOR_TAG, STACK_KEY, TABLES_KEY};

/// Root catalog used when configuration names none
pub const DEFAULT_CATALOG: &str = "AwsDataCatalog";

/// Identifies a query catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogRef(String);

impl CatalogRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CatalogRef {
    fn default() -> Self {
        Self(DEFAULT_CATALOG.to_string())
    }
}

impl fmt::Display for CatalogRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A fully resolved table declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Catalog the table lives in
    pub catalog: CatalogRef,

    /// Owning database name
    pub database: String,

    /// Table name (unique within the database)
    pub name: String,

    /// Opaque DDL text, passed through verbatim
    pub ddl: String,

    /// Archive and replay partitions around recreation
    pub keep_partitions: bool,

    /// Query workgroup used for this table's statements
    pub workgroup: String,

    /// Query result location used for this table's statements
    pub output: String,
}

impl TableSpec {
    /// `database.name`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }
}

impl fmt::Display for TableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.name)
    }
}

/// A fully resolved database declaration with its tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSpec {
    pub catalog: CatalogRef,

    /// Database name (unique key)
    pub name: String,

    /// Query result location
    pub output: String,

    /// Optional storage location for the database itself
    pub location: Option<String>,

    pub workgroup: String,

    /// Database properties, always including the provenance markers
    pub properties: BTreeMap<String, String>,

    pub description: Option<String>,

    /// Derived (or explicitly overridden) database DDL
    pub ddl: String,

    /// Tables in declaration order
    pub tables: Vec<TableSpec>,
}

impl DatabaseSpec {
    /// Names of the declared tables, in declaration order
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Find a declared table by name
    pub fn find_table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Stack identity recorded in the provenance properties
    pub fn stack_id(&self) -> Option<&str> {
        self.properties.get(STACK_KEY).map(String::as_str)
    }
}

/// Build the provenance property set for a database
///
/// User properties are kept; provenance keys always win.
pub fn database_properties(
    user: &BTreeMap<String, String>,
    stack_id: &str,
    table_names: &[&str],
) -> BTreeMap<String, String> {
    let mut properties = user.clone();
    properties.insert(CREATOR_KEY.to_string(), CREATOR_TAG.to_string());
    properties.insert(STACK_KEY.to_string(), stack_id.to_string());
    properties.insert(TABLES_KEY.to_string(), table_names.join(","));
    properties
}

/// Derive the `CREATE DATABASE` statement for a database declaration
pub fn database_ddl(
    name: &str,
    description: Option<&str>,
    location: Option<&str>,
    properties: &BTreeMap<String, String>,
) -> String {
    let mut ddl = format!("CREATE DATABASE IF NOT EXISTS `{}`", name);

    if let Some(description) = description {
        ddl.push_str(&format!("\nCOMMENT {}", quote_literal(description)));
    }

    if let Some(location) = location {
        ddl.push_str(&format!("\nLOCATION {}", quote_literal(location)));
    }

    if !properties.is_empty() {
        let pairs: Vec<String> = properties
            .iter()
            .map(|(k, v)| format!("{}={}", quote_literal(k), quote_literal(v)))
            .collect();
        ddl.push_str(&format!("\nWITH DBPROPERTIES ({})", pairs.join(", ")));
    }

    ddl
}

/// Quote a value as a SQL string literal, doubling embedded single quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// One archived partition: named key values plus its storage location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionSnapshot {
    /// `(key name, key value)` pairs in partition-key order
    pub values: Vec<(String, String)>,

    /// Storage location URI
    pub location: String,
}

impl PartitionSnapshot {
    pub fn new(values: Vec<(String, String)>, location: impl Into<String>) -> Self {
        Self {
            values,
            location: location.into(),
        }
    }

    /// Positional values without names
    pub fn raw_values(&self) -> Vec<&str> {
        self.values.iter().map(|(_, v)| v.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn catalog_defaults_to_root_catalog() {
        assert_eq!(CatalogRef::default().as_str(), "AwsDataCatalog");
        assert_eq!(CatalogRef::from("other").to_string(), "other");
    }

    #[test]
    fn database_ddl_includes_properties_in_key_order() {
        let mut props = BTreeMap::new();
        props.insert("b".to_string(), "2".to_string());
        props.insert("a".to_string(), "it's".to_string());

        let ddl = database_ddl("analytics", Some("Main db"), Some("s3://bucket/db/"), &props);

        assert_eq!(
            ddl,
            "CREATE DATABASE IF NOT EXISTS `analytics`\n\
             COMMENT 'Main db'\n\
             LOCATION 's3://bucket/db/'\n\
             WITH DBPROPERTIES ('a'='it''s', 'b'='2')"
        );
    }

    #[test]
    fn database_ddl_minimal() {
        let ddl = database_ddl("raw", None, None, &BTreeMap::new());
        assert_eq!(ddl, "CREATE DATABASE IF NOT EXISTS `raw`");
    }

    #[test]
    fn provenance_keys_override_user_properties() {
        let mut user = BTreeMap::new();
        user.insert(STACK_KEY.to_string(), "spoofed".to_string());
        user.insert("owner".to_string(), "data".to_string());

        let props = database_properties(&user, "prod", &["events", "users"]);

        assert_eq!(props.get(STACK_KEY).map(String::as_str), Some("prod"));
        assert_eq!(props.get(CREATOR_KEY).map(String::as_str), Some(CREATOR_TAG));
        assert_eq!(props.get(TABLES_KEY).map(String::as_str), Some("events,users"));
        assert_eq!(props.get("owner").map(String::as_str), Some("data"));
    }

    #[test]
    fn table_fqn() {
        let table = TableSpec {
            catalog: CatalogRef::default(),
            database: "analytics".to_string(),
            name: "events".to_string(),
            ddl: "CREATE TABLE events (id int)".to_string(),
            keep_partitions: true,
            workgroup: "primary".to_string(),
            output: "s3://out/".to_string(),
        };
        assert_eq!(table.fully_qualified_name(), "analytics.events");
        assert_eq!(table.to_string(), "analytics.events");
    }
}
