// src/models/task.rs

//! Resumable scan-task record.

use serde::{Deserialize, Serialize};

/// One bounded sweep over the schedule-key range `(from, to]`.
///
/// The task is its own cursor: `from` advances after every processed page,
/// and `finalized_at != 0` is the terminal state. At most one task is
/// active at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTask {
    pub id: String,
    /// Exclusive lower bound of the remaining range (the cursor).
    pub from: String,
    /// Inclusive upper bound of the sweep window.
    pub to: String,
    /// Maximum number of items processed per page.
    pub page_size: usize,
    /// Creation time in milliseconds.
    pub created_at: i64,
    /// Zero while active; a task is never re-opened once this is set.
    pub finalized_at: i64,
    /// Items processed across all pages so far.
    pub items_processed: usize,
    /// Set when a page aborted; finalization on error is intentional.
    pub error: Option<String>,
}

impl ScanTask {
    pub fn is_finalized(&self) -> bool {
        self.finalized_at != 0
    }
}
