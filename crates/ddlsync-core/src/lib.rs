//! ddlsync core
//!
//! Domain model shared by the catalog and engine crates: resolved
//! declarations, provenance markers, DDL fingerprints, deployment
//! configuration and the deploy report.

pub mod config;
pub mod diagnostic;
pub mod fingerprint;
pub mod model;
pub mod provenance;
pub mod report;

pub use config::{ConfigError, DeploymentConfig, DeploymentSettings};
pub use diagnostic::{Diagnostic, DiagnosticCode, Resource, Severity};
pub use fingerprint::fingerprint;
pub use model::{CatalogRef, DatabaseSpec, PartitionSnapshot, TableSpec, DEFAULT_CATALOG};
pub use provenance::ProvenanceTag;
pub use report::{Report, ReportSummary, ReportVersion};
