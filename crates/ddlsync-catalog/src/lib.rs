//! Remote catalog and query service for DDL reconciliation
//!
//! This crate defines the [`CatalogService`] interface the engine consumes:
//! asynchronous query submission and polling, plus metadata reads and
//! writes for catalogs, databases, tables and partitions.
//!
//! [`MemoryCatalog`] is an in-memory implementation used by the tests and
//! as the CLI's local state backend.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ddlsync_catalog::{CatalogService, MemoryCatalog, QueryContext};
//!
//! let catalog = MemoryCatalog::new();
//! let id = catalog.submit_query("CREATE DATABASE analytics", &context).await?;
//! let status = catalog.get_query_status(&id).await?;
//! ```

pub mod memory;
pub mod service;
mod statement;

pub use memory::{CatalogState, MemoryCatalog, MemoryCatalogBuilder, StoredDatabase, StoredTable};
pub use service::{
    CatalogError, CatalogService, DatabaseInput, Page, QueryContext, QueryState, QueryStatus,
    RemoteDatabaseState, RemotePartition, RemoteTableState, Row, VIRTUAL_VIEW,
};
