// src/models/diff.rs

//! Sparse diff between two snapshots of the same document.

use serde::{Deserialize, Serialize};

/// Changed metrics between two successive fetches.
///
/// A metric's `{prev, next, delta}` triple is populated only when that
/// metric actually changed. A diff with no triples means "checked,
/// unchanged", which is not the same as "never compared".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDiff {
    /// When the comparison ran, in milliseconds since the Unix epoch.
    pub ts: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_prev: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_next: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_delta: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descendants_prev: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descendants_next: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descendants_delta: Option<i64>,
}

impl DocumentDiff {
    /// Check if any tracked metric changed.
    pub fn has_changes(&self) -> bool {
        self.score_delta.is_some() || self.descendants_delta.is_some()
    }
}
