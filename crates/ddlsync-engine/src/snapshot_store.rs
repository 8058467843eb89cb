//! Side store for partition snapshots
//!
//! A snapshot is written before a table is dropped and removed once its
//! partitions have been replayed, so a file left behind means a run stopped
//! somewhere in between. Files are named `<catalog>.<database>.<table>.json`
//! with `%`, `.` and path separators in each part percent-escaped, so
//! distinct tables never share a file and every file stays inside the store
//! directory.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ddlsync_core::PartitionSnapshot;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotFile {
    catalog: String,
    database: String,
    table: String,
    partitions: Vec<PartitionSnapshot>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, catalog: &str, database: &str, table: &str) -> PathBuf {
        self.dir.join(format!(
            "{}.{}.{}.json",
            escape_component(catalog),
            escape_component(database),
            escape_component(table)
        ))
    }

    /// Write a snapshot, replacing any previous one for the same table
    pub async fn save(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
        partitions: &[PartitionSnapshot],
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let file = SnapshotFile {
            catalog: catalog.to_string(),
            database: database.to_string(),
            table: table.to_string(),
            partitions: partitions.to_vec(),
        };
        let path = self.path_for(catalog, database, table);
        tokio::fs::write(&path, serde_json::to_string_pretty(&file)?).await?;

        tracing::debug!(path = %path.display(), partitions = partitions.len(), "saved partition snapshot");
        Ok(path)
    }

    /// Read a leftover snapshot, if one exists
    pub async fn load(
        &self,
        catalog: &str,
        database: &str,
        table: &str,
    ) -> Result<Option<Vec<PartitionSnapshot>>> {
        let path = self.path_for(catalog, database, table);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: SnapshotFile = serde_json::from_str(&content)?;
        if (file.catalog.as_str(), file.database.as_str(), file.table.as_str())
            != (catalog, database, table)
        {
            return Err(DeployError::Snapshot(format!(
                "{} holds {}.{}.{}, expected {}.{}.{}",
                path.display(),
                file.catalog,
                file.database,
                file.table,
                catalog,
                database,
                table
            )));
        }
        Ok(Some(file.partitions))
    }

    /// Delete a snapshot; a missing file is not an error
    pub async fn remove(&self, catalog: &str, database: &str, table: &str) -> Result<()> {
        let path = self.path_for(catalog, database, table);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Percent-escape the characters that would make a name part ambiguous or
/// leave the store directory
fn escape_component(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '.' => escaped.push_str("%2E"),
            '/' => escaped.push_str("%2F"),
            '\\' => escaped.push_str("%5C"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Union of two snapshots by partition values, `archived` entries first
pub fn merge_snapshots(
    archived: Vec<PartitionSnapshot>,
    leftover: Vec<PartitionSnapshot>,
) -> Vec<PartitionSnapshot> {
    let mut seen: HashSet<Vec<(String, String)>> =
        archived.iter().map(|p| p.values.clone()).collect();
    let mut merged = archived;

    for partition in leftover {
        if seen.insert(partition.values.clone()) {
            merged.push(partition);
        }
    }

    merged
}
