//! Decide whether a table must be recreated

use ddlsync_catalog::RemoteTableState;
use ddlsync_core::provenance::HASH_KEY;
use ddlsync_core::{fingerprint, TableSpec};

/// Fingerprint stamped on the remote table, if any
pub fn stored_fingerprint(remote: &RemoteTableState) -> Option<&str> {
    remote.parameters.get(HASH_KEY).map(String::as_str)
}

/// True if the table is absent or its stamped fingerprint differs from the
/// fingerprint of the declared DDL
pub fn has_changed(spec: &TableSpec, remote: Option<&RemoteTableState>) -> bool {
    match remote {
        None => true,
        Some(remote) => stored_fingerprint(remote) != Some(fingerprint(&spec.ddl).as_str()),
    }
}
