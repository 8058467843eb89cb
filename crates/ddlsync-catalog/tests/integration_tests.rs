//! Integration tests for the in-memory catalog service
//!
//! These exercise `MemoryCatalog` only through the `CatalogService` trait,
//! the way the reconciliation engine drives it.
//!
//! ```bash
//! cargo test -p ddlsync-catalog --test integration_tests
//! ```

mod fixtures;

use ddlsync_catalog::{
    CatalogError, CatalogService, DatabaseInput, MemoryCatalog, QueryState, RemoteDatabaseState,
    Row,
};
use ddlsync_core::DEFAULT_CATALOG;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Helper Functions
// =============================================================================

/// Submit and poll to a terminal state, returning the rows on success
async fn run(
    catalog: &dyn CatalogService,
    sql: &str,
    database: Option<&str>,
) -> Result<Vec<Row>, String> {
    let id = catalog
        .submit_query(sql, &fixtures::context(database))
        .await
        .map_err(|e| e.to_string())?;
    loop {
        let status = catalog.get_query_status(&id).await.map_err(|e| e.to_string())?;
        match status.state {
            QueryState::Succeeded => {
                return catalog.get_query_results(&id).await.map_err(|e| e.to_string())
            }
            QueryState::Failed | QueryState::Cancelled => {
                return Err(status.reason.unwrap_or_else(|| status.state.to_string()))
            }
            _ => continue,
        }
    }
}

async fn all_partitions(catalog: &dyn CatalogService, table: &str) -> usize {
    let mut token: Option<String> = None;
    let mut total = 0;
    loop {
        let page = catalog
            .get_partitions(DEFAULT_CATALOG, "analytics", table, token.as_deref(), 1000)
            .await
            .unwrap();
        total += page.items.len();
        match page.next_token {
            Some(next) => token = Some(next),
            None => return total,
        }
    }
}

// =============================================================================
// Query execution
// =============================================================================

#[tokio::test]
async fn test_create_drop_recreate_table() {
    let catalog = fixtures::analytics_catalog(3);

    run(&catalog, "DROP TABLE IF EXISTS `events`", Some("analytics"))
        .await
        .unwrap();
    assert!(catalog
        .get_table(DEFAULT_CATALOG, "analytics", "events")
        .await
        .unwrap()
        .is_none());

    run(&catalog, fixtures::EVENTS_DDL, Some("analytics")).await.unwrap();
    let table = catalog
        .get_table(DEFAULT_CATALOG, "analytics", "events")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(table.partition_keys, vec!["dt", "region"]);
    // Recreation starts with no partitions
    assert_eq!(all_partitions(&catalog, "events").await, 0);
}

#[tokio::test]
async fn test_show_create_reproduces_ddl() {
    let catalog = fixtures::analytics_catalog(0);

    let rows = run(&catalog, "SHOW CREATE TABLE `users`", Some("analytics"))
        .await
        .unwrap();
    let ddl: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();

    assert_eq!(ddl.join("\n"), fixtures::USERS_DDL);
}

#[tokio::test]
async fn test_views_use_view_statements() {
    let catalog = fixtures::analytics_catalog(0);

    run(&catalog, fixtures::DAILY_VIEW_DDL, Some("analytics")).await.unwrap();
    let view = catalog
        .get_table(DEFAULT_CATALOG, "analytics", "daily")
        .await
        .unwrap()
        .unwrap();
    assert!(view.is_view());

    let err = run(&catalog, "DROP TABLE `daily`", Some("analytics"))
        .await
        .unwrap_err();
    assert!(err.contains("not a table"));

    run(&catalog, "DROP VIEW `daily`", Some("analytics")).await.unwrap();
    assert!(catalog
        .get_table(DEFAULT_CATALOG, "analytics", "daily")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failed_query_reports_reason() {
    let catalog = fixtures::analytics_catalog(0);
    catalog
        .fail_queries_containing("bad_col", "COLUMN_NOT_FOUND: bad_col")
        .await;

    let err = run(&catalog, "CREATE TABLE t (bad_col int)", Some("analytics"))
        .await
        .unwrap_err();
    assert_eq!(err, "COLUMN_NOT_FOUND: bad_col");

    // The failed statement had no effect
    assert!(catalog
        .get_table(DEFAULT_CATALOG, "analytics", "t")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_unknown_execution() {
    let catalog = MemoryCatalog::new();
    let err = catalog.get_query_status("exec-999999").await.unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
}

// =============================================================================
// Metadata
// =============================================================================

#[tokio::test]
async fn test_partition_pages() {
    let catalog = fixtures::analytics_catalog(2500);

    let first = catalog
        .get_partitions(DEFAULT_CATALOG, "analytics", "events", None, 1000)
        .await
        .unwrap();
    assert_eq!(first.items.len(), 1000);
    assert!(first.next_token.is_some());

    assert_eq!(all_partitions(&catalog, "events").await, 2500);
}

#[tokio::test]
async fn test_database_lifecycle() {
    let catalog = MemoryCatalog::new();
    let mut parameters = BTreeMap::new();
    parameters.insert("ddlsync:stack".to_string(), "prod".to_string());

    let input = DatabaseInput {
        name: "sales".to_string(),
        description: Some("Sales data".to_string()),
        location_uri: None,
        parameters,
    };
    catalog.create_database(DEFAULT_CATALOG, &input).await.unwrap();

    let again = catalog.create_database(DEFAULT_CATALOG, &input).await;
    assert!(matches!(again, Err(CatalogError::AlreadyExists(_))));

    let updated = DatabaseInput {
        description: Some("Sales".to_string()),
        ..input.clone()
    };
    catalog
        .update_database(DEFAULT_CATALOG, "sales", &updated)
        .await
        .unwrap();
    let db = catalog.get_database(DEFAULT_CATALOG, "sales").await.unwrap().unwrap();
    assert_eq!(db.description.as_deref(), Some("Sales"));

    catalog.delete_database(DEFAULT_CATALOG, "sales").await.unwrap();
    assert!(catalog.get_database(DEFAULT_CATALOG, "sales").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_database_cascades() {
    let catalog = fixtures::analytics_catalog(10);
    catalog.delete_database(DEFAULT_CATALOG, "analytics").await.unwrap();

    let err = catalog
        .get_table(DEFAULT_CATALOG, "analytics", "events")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_catalog_listings() {
    let catalog = MemoryCatalog::builder()
        .with_page_size(1)
        .with_database(DEFAULT_CATALOG, RemoteDatabaseState::new("a"))
        .with_database(DEFAULT_CATALOG, RemoteDatabaseState::new("b"))
        .with_catalog("federated")
        .build();

    let catalogs = catalog.list_catalogs(None).await.unwrap();
    assert_eq!(catalogs.items, vec!["AwsDataCatalog".to_string()]);
    let rest = catalog
        .list_catalogs(catalogs.next_token.as_deref())
        .await
        .unwrap();
    assert_eq!(rest.items, vec!["federated".to_string()]);

    let dbs = catalog.list_databases(DEFAULT_CATALOG, None).await.unwrap();
    assert_eq!(dbs.items[0].name, "a");
    assert_eq!(dbs.next_token.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_shared_state_across_clones() {
    let catalog = Arc::new(fixtures::analytics_catalog(0));
    let service: Arc<dyn CatalogService> = catalog.clone();

    run(service.as_ref(), "DROP TABLE `users`", Some("analytics"))
        .await
        .unwrap();

    assert!(catalog.table(DEFAULT_CATALOG, "analytics", "users").await.is_none());
    assert_eq!(catalog.statements().await, vec!["DROP TABLE `users`".to_string()]);
}
