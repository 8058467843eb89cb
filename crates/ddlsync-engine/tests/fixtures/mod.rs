//! Shared setup for deploy integration tests
//!
//! Declarations are written as ddlsync.toml documents and resolved the same
//! way the CLI resolves them.

#![allow(dead_code)]

use std::sync::Arc;

use ddlsync_catalog::{MemoryCatalog, RemotePartition, RemoteTableState};
use ddlsync_core::provenance::{HASH_KEY, STACK_KEY};
use ddlsync_core::{fingerprint, DatabaseSpec, DeploymentConfig, DEFAULT_CATALOG};
use ddlsync_engine::Deployer;

pub const STACK: &str = "prod";

pub const EVENTS_V1: &str = "CREATE EXTERNAL TABLE `events` (\n  `id` string\n)\nLOCATION 's3://lake/events/'";

pub const EVENTS_V2: &str = "CREATE EXTERNAL TABLE `events` (\n  `id` string,\n  `kind` string\n)\nLOCATION 's3://lake/events/'";

pub const PARTITIONED_V1: &str = "CREATE EXTERNAL TABLE `events` (\n  `id` string\n)\nPARTITIONED BY (`dt` string)\nLOCATION 's3://lake/events/'";

pub const PARTITIONED_V2: &str = "CREATE EXTERNAL TABLE `events` (\n  `id` string,\n  `kind` string\n)\nPARTITIONED BY (`dt` string)\nLOCATION 's3://lake/events/'";

/// Parse a config document and resolve it into database specs
pub fn resolve(toml: &str) -> Vec<DatabaseSpec> {
    DeploymentConfig::from_toml(toml)
        .expect("fixture config parses")
        .resolve()
        .expect("fixture config resolves")
}

/// `[deployment]` header shared by every fixture document
pub fn deployment_header(stack: &str) -> String {
    format!(
        "[deployment]\nstack = \"{}\"\noutput = \"s3://query-results/\"\n",
        stack
    )
}

/// One database holding one `events` table with the given DDL
pub fn events_config(ddl: &str) -> Vec<DatabaseSpec> {
    resolve(&format!(
        "{}\n[[databases]]\nname = \"analytics\"\n\n[[databases.tables]]\nname = \"events\"\nddl = \"\"\"\n{}\"\"\"\n",
        deployment_header(STACK),
        ddl
    ))
}

/// Databases named `names`, each with a single unpartitioned table
pub fn many_databases(names: &[&str]) -> Vec<DatabaseSpec> {
    let mut toml = deployment_header(STACK);
    for name in names {
        toml.push_str(&format!(
            "\n[[databases]]\nname = \"{}\"\n\n[[databases.tables]]\nname = \"events\"\nddl = \"\"\"\n{}\"\"\"\n",
            name, EVENTS_V1
        ));
    }
    resolve(&toml)
}

pub fn deployer(catalog: &MemoryCatalog) -> Deployer {
    Deployer::new(Arc::new(catalog.clone()), STACK)
}

/// `count` daily partitions of the events table
pub fn daily_partitions(count: usize) -> Vec<RemotePartition> {
    (0..count)
        .map(|i| {
            let dt = format!("d{:05}", i);
            RemotePartition::new(vec![dt.clone()], format!("s3://lake/events/dt={}/", dt))
        })
        .collect()
}

/// Remote state of an `events` table previously deployed by `stack`
pub fn deployed_events(ddl: &str, stack: &str) -> RemoteTableState {
    RemoteTableState::new("events")
        .with_partition_keys(&["dt"])
        .with_table_type("EXTERNAL_TABLE")
        .with_parameter(HASH_KEY, fingerprint(ddl))
        .with_parameter(STACK_KEY, stack)
}

/// Catalog with `analytics.events` deployed from `PARTITIONED_V1`
pub fn partitioned_catalog(partitions: usize) -> MemoryCatalog {
    MemoryCatalog::builder()
        .with_table(
            DEFAULT_CATALOG,
            "analytics",
            deployed_events(PARTITIONED_V1, STACK),
            PARTITIONED_V1,
            daily_partitions(partitions),
        )
        .build()
}

/// Sorted (values, location) pairs currently stored for `analytics.events`
pub async fn stored_partitions(catalog: &MemoryCatalog) -> Vec<(Vec<String>, String)> {
    let table = catalog
        .table(DEFAULT_CATALOG, "analytics", "events")
        .await
        .expect("events table exists");
    let mut pairs: Vec<_> = table
        .partitions
        .into_iter()
        .map(|p| (p.values, p.location))
        .collect();
    pairs.sort();
    pairs
}
