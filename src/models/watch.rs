// src/models/watch.rs

//! Subscriber and watch-list records.

use serde::{Deserialize, Serialize};

use super::{Document, DocumentDiff};

/// One subscriber. Created on the first watch command, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Chat identifier of the subscriber (also the delivery address).
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub username: String,
}

/// Polling state for one watched external document.
///
/// Keyed by the document id. Never hard-deleted: when the last watcher
/// leaves, `schedule_key` becomes the unscheduled sentinel and the record
/// drops out of scan range queries while its history stays queryable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchedItem {
    pub doc_id: i64,

    /// Last-known snapshot of the external document.
    pub doc: Document,

    /// Subscriber ids currently watching this item.
    pub watchers: Vec<String>,

    /// Sortable key encoding the next due poll time, or the unscheduled
    /// sentinel when no poll is pending.
    pub schedule_key: String,

    /// Poll attempts since the item entered its current backoff sequence.
    pub attempts: u32,

    /// When the item was first watched, in milliseconds.
    pub enqueued_at: i64,

    /// Most recent computed diff, kept for observability.
    pub last_diff: Option<DocumentDiff>,
}

/// One pending or delivered notification for one subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub doc_id: i64,
    pub user_id: String,
    pub diff: DocumentDiff,
    /// Rendered Markdown message body, fixed at creation time.
    pub text: String,
    /// Creation time in milliseconds.
    pub created_at: i64,
    /// Zero while pending; set exactly once by the dispatcher.
    pub delivered_at: i64,
    /// Delivery outcome: `None` until attempted, then "ok" or an error.
    pub result: Option<String>,
}

impl Alert {
    pub fn is_pending(&self) -> bool {
        self.delivered_at == 0
    }
}
