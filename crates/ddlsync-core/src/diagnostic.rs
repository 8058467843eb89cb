//! Deployment outcome codes and diagnostics
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the report format.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Diagnostic code registry (v1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Tables
    /// Table did not exist and was created
    TableCreated,

    /// Table definition changed and the table was dropped and recreated
    TableRecreated,

    /// Fingerprint matched; only provenance was re-stamped
    TableUnchanged,

    /// Creation failed and the previous live definition was restored
    TableRolledBack,

    /// Table reconciliation failed
    TableFailed,

    /// Archived partitions were replayed onto the table
    PartitionsRestored,

    // Databases
    DatabaseCreated,
    DatabaseUpdated,
    DatabaseFailed,

    // Orphan sweeping
    OrphanTableDropped,
    OrphanDatabaseDropped,
    SweepFailed,

    // Removal
    DatabaseRemoved,
    RemoveFailed,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TableCreated => "TABLE_CREATED",
            Self::TableRecreated => "TABLE_RECREATED",
            Self::TableUnchanged => "TABLE_UNCHANGED",
            Self::TableRolledBack => "TABLE_ROLLED_BACK",
            Self::TableFailed => "TABLE_FAILED",
            Self::PartitionsRestored => "PARTITIONS_RESTORED",
            Self::DatabaseCreated => "DATABASE_CREATED",
            Self::DatabaseUpdated => "DATABASE_UPDATED",
            Self::DatabaseFailed => "DATABASE_FAILED",
            Self::OrphanTableDropped => "ORPHAN_TABLE_DROPPED",
            Self::OrphanDatabaseDropped => "ORPHAN_DATABASE_DROPPED",
            Self::SweepFailed => "SWEEP_FAILED",
            Self::DatabaseRemoved => "DATABASE_REMOVED",
            Self::RemoveFailed => "REMOVE_FAILED",
        }
    }

    /// Severity an outcome carries unless overridden
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::TableFailed | Self::DatabaseFailed | Self::SweepFailed | Self::RemoveFailed => {
                Severity::Error
            }
            Self::TableRolledBack => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - the run converged to a safe state but not the declared one
    Warn,

    /// Error - the resource was not converged
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// The remote resource a diagnostic is about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub catalog: String,
    pub database: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

impl Resource {
    pub fn database(catalog: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
            table: None,
        }
    }

    pub fn table(
        catalog: impl Into<String>,
        database: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            catalog: catalog.into(),
            database: database.into(),
            table: Some(table.into()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{}.{}.{}", self.catalog, self.database, table),
            None => write!(f, "{}.{}", self.catalog, self.database),
        }
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Affected resource
    pub resource: Option<Resource>,

    /// Phase the outcome was produced in (backup, drop, create, ...)
    pub phase: Option<String>,

    /// Remote-supplied reason, verbatim
    pub reason: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            resource: None,
            phase: None,
            reason: None,
        }
    }

    /// Create a diagnostic with the code's default severity
    pub fn of(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, code.default_severity(), message)
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
