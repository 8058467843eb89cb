//! Test fixtures for catalog integration tests
//!
//! Reusable DDL and catalog contents modelled on a small analytics
//! deployment: a partitioned events table, a plain users table and a view.

#![allow(dead_code)]

use ddlsync_catalog::{
    MemoryCatalog, QueryContext, RemoteDatabaseState, RemotePartition, RemoteTableState,
};
use ddlsync_core::DEFAULT_CATALOG;

pub const EVENTS_DDL: &str = "CREATE EXTERNAL TABLE `events` (\n  `id` string,\n  `payload` string\n)\nPARTITIONED BY (`dt` string, `region` string)\nSTORED AS PARQUET\nLOCATION 's3://lake/events/'";

pub const USERS_DDL: &str = "CREATE EXTERNAL TABLE `users` (\n  `id` bigint,\n  `email` string\n)\nLOCATION 's3://lake/users/'";

pub const DAILY_VIEW_DDL: &str =
    "CREATE OR REPLACE VIEW `daily` AS SELECT dt, count(*) AS n FROM events GROUP BY dt";

/// Query context for `database` in the default catalog
pub fn context(database: Option<&str>) -> QueryContext {
    QueryContext {
        database: database.map(str::to_string),
        catalog: DEFAULT_CATALOG.to_string(),
        workgroup: "primary".to_string(),
        output_location: "s3://query-results/".to_string(),
    }
}

/// `count` partitions of the events table, one per day and region pair
pub fn event_partitions(count: usize) -> Vec<RemotePartition> {
    (0..count)
        .map(|i| {
            let dt = format!("2024-{:02}-{:02}", i / 28 % 12 + 1, i % 28 + 1);
            let region = format!("r{}", i / (28 * 12));
            RemotePartition::new(
                vec![dt.clone(), region.clone()],
                format!("s3://lake/events/dt={}/region={}/", dt, region),
            )
        })
        .collect()
}

/// Catalog holding the `analytics` database with events and users
pub fn analytics_catalog(partitions: usize) -> MemoryCatalog {
    MemoryCatalog::builder()
        .with_database(DEFAULT_CATALOG, RemoteDatabaseState::new("analytics"))
        .with_table(
            DEFAULT_CATALOG,
            "analytics",
            RemoteTableState::new("events")
                .with_partition_keys(&["dt", "region"])
                .with_table_type("EXTERNAL_TABLE"),
            EVENTS_DDL,
            event_partitions(partitions),
        )
        .with_table(
            DEFAULT_CATALOG,
            "analytics",
            RemoteTableState::new("users").with_table_type("EXTERNAL_TABLE"),
            USERS_DDL,
            Vec::new(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn event_partitions_are_distinct() {
        let partitions = event_partitions(1000);
        let distinct: HashSet<_> = partitions.iter().map(|p| p.values.clone()).collect();
        assert_eq!(distinct.len(), 1000);
    }
}
