//! Engine error types

use ddlsync_catalog::CatalogError;
use std::fmt;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, DeployError>;

/// What happened to the previous definition after a failed create
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    /// The previous live definition was re-created
    Restored,

    /// Re-creating the previous definition failed too; the table is absent
    Failed(String),

    /// There was no previous definition to go back to
    NotAttempted,
}

impl fmt::Display for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restored => write!(f, "previous definition restored"),
            Self::Failed(reason) => write!(f, "rollback failed: {}", reason),
            Self::NotAttempted => write!(f, "no previous definition to restore"),
        }
    }
}

/// Errors produced while reconciling remote state
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Query {execution_id} {state}: {reason}")]
    QueryFailed {
        execution_id: String,
        state: String,
        reason: String,
    },

    #[error("Query {execution_id} reached unexpected state {state}")]
    UnexpectedQueryState { execution_id: String, state: String },

    #[error("Gave up waiting for query after {0:?}")]
    Timeout(Duration),

    #[error("Create of {table} failed: {reason} ({rollback})")]
    CreateFailed {
        table: String,
        reason: String,
        rollback: Rollback,
    },

    #[error("Snapshot store error: {0}")]
    Snapshot(String),
}

impl DeployError {
    /// Remote reason text, when the error came from a query execution
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::QueryFailed { reason, .. } | Self::CreateFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DeployError {
    fn from(err: std::io::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}

impl From<serde_json::Error> for DeployError {
    fn from(err: serde_json::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
