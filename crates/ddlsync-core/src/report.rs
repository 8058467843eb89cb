//! Deploy report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};

use crate::diagnostic::{Diagnostic, DiagnosticCode, Severity};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Total number of diagnostics
    pub total: usize,

    pub errors: usize,
    pub warnings: usize,
    pub info: usize,

    /// Tables created or recreated
    pub tables_changed: usize,

    /// Tables left in place
    pub tables_unchanged: usize,

    /// Orphaned tables and databases removed
    pub orphans_dropped: usize,
}

impl ReportSummary {
    fn count(&mut self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warn => self.warnings += 1,
            Severity::Info => self.info += 1,
        }

        match diagnostic.code {
            DiagnosticCode::TableCreated | DiagnosticCode::TableRecreated => {
                self.tables_changed += 1
            }
            DiagnosticCode::TableUnchanged => self.tables_unchanged += 1,
            DiagnosticCode::OrphanTableDropped | DiagnosticCode::OrphanDatabaseDropped => {
                self.orphans_dropped += 1
            }
            _ => {}
        }

        self.total += 1;
    }
}

/// Deploy report (report.json v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Deployment/stack identity the run acted for
    pub stack: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All diagnostics, in the order they were produced
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    /// Create a new empty report
    pub fn new(stack: impl Into<String>) -> Self {
        Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            stack: stack.into(),
            summary: ReportSummary::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Create a report from diagnostics
    pub fn from_diagnostics(stack: impl Into<String>, diagnostics: Vec<Diagnostic>) -> Self {
        let mut report = Self::new(stack);
        report.extend(diagnostics);
        report
    }

    /// Add a diagnostic to the report
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.summary.count(&diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.add_diagnostic(diagnostic);
        }
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Diagnostics carrying a given code
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report() {
        let report = Report::new("prod");
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn report_with_diagnostics() {
        let report = Report::from_diagnostics(
            "prod",
            vec![
                Diagnostic::of(DiagnosticCode::TableCreated, "created events"),
                Diagnostic::of(DiagnosticCode::TableUnchanged, "users unchanged"),
                Diagnostic::of(DiagnosticCode::TableRolledBack, "orders rolled back"),
                Diagnostic::of(DiagnosticCode::OrphanTableDropped, "dropped old"),
                Diagnostic::of(DiagnosticCode::SweepFailed, "could not drop legacy"),
            ],
        );

        assert_eq!(report.summary.total, 5);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.warnings, 1);
        assert_eq!(report.summary.tables_changed, 1);
        assert_eq!(report.summary.tables_unchanged, 1);
        assert_eq!(report.summary.orphans_dropped, 1);
        assert!(report.has_errors());
        assert_eq!(report.with_code(DiagnosticCode::TableCreated).count(), 1);
    }

    #[test]
    fn report_serialization() {
        let report = Report::new("prod");
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"stack\": \"prod\""));
    }
}
