//! Provenance markers stamped on remote databases and tables
//!
//! These keys are part of the remote contract: renaming one orphans every
//! resource deployed under the old name.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fingerprint::fingerprint;

/// Value of [`CREATOR_KEY`] on resources created by this tool
pub const CREATOR_TAG: &str = "ddlsync";

pub const CREATOR_KEY: &str = "ddlsync:creator";
pub const STACK_KEY: &str = "ddlsync:stack";
pub const TABLES_KEY: &str = "ddlsync:tables";
pub const HASH_KEY: &str = "ddlsync:hash";

/// Content fingerprint plus owning deployment identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceTag {
    pub content_hash: String,
    pub stack_id: String,
}

impl ProvenanceTag {
    pub fn new(content_hash: impl Into<String>, stack_id: impl Into<String>) -> Self {
        Self {
            content_hash: content_hash.into(),
            stack_id: stack_id.into(),
        }
    }

    /// Tag for a DDL text deployed by `stack_id`
    pub fn for_ddl(ddl: &str, stack_id: impl Into<String>) -> Self {
        Self::new(fingerprint(ddl), stack_id)
    }

    /// Parameters to merge into the remote table
    pub fn to_parameters(&self) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert(HASH_KEY.to_string(), self.content_hash.clone());
        params.insert(STACK_KEY.to_string(), self.stack_id.clone());
        params
    }

    /// Read a tag back from remote parameters, if both keys are present
    pub fn from_parameters(params: &BTreeMap<String, String>) -> Option<Self> {
        Some(Self {
            content_hash: params.get(HASH_KEY)?.clone(),
            stack_id: params.get(STACK_KEY)?.clone(),
        })
    }
}

/// Whether remote parameters mark a resource as owned by `stack_id`
///
/// Both the creator tag and the stack identity must match. Resources without
/// the markers are never considered owned.
pub fn is_owned_by(params: &BTreeMap<String, String>, stack_id: &str) -> bool {
    params.get(STACK_KEY).map(String::as_str) == Some(stack_id)
        && params.get(CREATOR_KEY).map(String::as_str) == Some(CREATOR_TAG)
}

/// Whether remote table parameters carry this stack's identity
///
/// Tables only get the hash and stack keys stamped, not the creator tag.
pub fn is_table_owned_by(params: &BTreeMap<String, String>, stack_id: &str) -> bool {
    params.get(STACK_KEY).map(String::as_str) == Some(stack_id) && params.contains_key(HASH_KEY)
}
