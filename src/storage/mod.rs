// src/storage/mod.rs

//! SQLite persistence layer.
//!
//! A single [`tokio_rusqlite`] connection serializes all access, so every
//! `call` closure below is one atomic unit of work. Multi-statement
//! operations run inside an explicit transaction; range scans over
//! `schedule_key` rely on the codec's lexicographic ordering.

mod schema;

use rusqlite::{params, types::Type, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_rusqlite::Connection;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Alert, Document, DocumentDiff, ScanTask, User, WatchedItem};
use crate::schedule;

use schema::SCHEMA;

/// Singleton system row holding the "last swept to" watermark.
const SYSTEM_SWEPT_TO: &str = "swept_to";

/// Outcome of a watch upsert.
#[derive(Debug)]
pub enum WatchOutcome {
    /// The user now watches the item (item possibly created or re-armed).
    Added(WatchedItem),
    /// The user was already watching; user/doc upserts still applied.
    AlreadyWatching(WatchedItem),
    /// The user's watch quota is exhausted; nothing was added.
    LimitReached(usize),
}

/// Outcome of a watch removal.
#[derive(Debug, PartialEq, Eq)]
pub enum UnwatchOutcome {
    /// The watch was removed; `last_watcher` means the item was parked.
    Removed { last_watcher: bool },
    /// The user was not watching this item.
    NotWatching,
}

/// Reschedule metadata plus the optional new snapshot for one scanned item.
#[derive(Debug, Clone)]
pub struct ItemUpdate {
    pub doc_id: i64,
    /// Key the item held when the page read it. The write applies only
    /// while the key is unchanged, so a concurrent unwatch (or re-watch)
    /// that commits between page read and page write wins.
    pub expected_key: String,
    pub schedule_key: String,
    pub attempts: u32,
    /// New snapshot and diff; `None` when the fetch failed and only the
    /// reschedule applies.
    pub doc: Option<Document>,
    pub diff: Option<DocumentDiff>,
}

/// Aggregate record counts for the stats command.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub users: usize,
    pub items: usize,
    pub scheduled_items: usize,
    pub watches: usize,
    pub alerts_pending: usize,
    pub alerts_delivered: usize,
    pub scan_tasks: usize,
}

/// Handle to the watchdog database.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (and migrate) the database at the given path.
    pub async fn open(db_path: &str) -> Result<Self> {
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    // Watch-list operations

    /// Upsert user + item + watch relation in one transaction.
    ///
    /// Creates the item with the given schedule key when absent; re-arms a
    /// parked item (sentinel key) with a fresh key and a reset attempt
    /// counter. Idempotent for an existing watch.
    pub async fn upsert_watch(
        &self,
        user: &User,
        doc: &Document,
        schedule_key: &str,
        now_ms: i64,
        max_watch_items: usize,
    ) -> Result<WatchOutcome> {
        let user = user.clone();
        let doc = doc.clone();
        let schedule_key = schedule_key.to_string();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                upsert_user(&tx, &user)?;

                let already: bool = tx
                    .query_row(
                        "SELECT 1 FROM watches WHERE user_id = ?1 AND doc_id = ?2",
                        params![user.id, doc.id],
                        |_| Ok(()),
                    )
                    .optional()?
                    .is_some();

                if !already {
                    let watching: usize = tx.query_row(
                        "SELECT COUNT(*) FROM watches WHERE user_id = ?1",
                        params![user.id],
                        |row| row.get(0),
                    )?;
                    if watching >= max_watch_items {
                        tx.commit()?;
                        return Ok(WatchOutcome::LimitReached(max_watch_items));
                    }
                }

                let existing_key: Option<String> = tx
                    .query_row(
                        "SELECT schedule_key FROM items WHERE doc_id = ?1",
                        params![doc.id],
                        |row| row.get(0),
                    )
                    .optional()?;

                match existing_key {
                    None => {
                        tx.execute(
                            "INSERT INTO items (doc_id, doc, schedule_key, attempts, enqueued_at)
                             VALUES (?1, ?2, ?3, 0, ?4)",
                            params![doc.id, to_json(&doc)?, schedule_key, now_ms],
                        )?;
                    }
                    Some(key) if !schedule::is_scheduled(&key) => {
                        // Parked item gains a watcher again: new backoff sequence.
                        tx.execute(
                            "UPDATE items SET schedule_key = ?1, attempts = 0 WHERE doc_id = ?2",
                            params![schedule_key, doc.id],
                        )?;
                    }
                    Some(_) => {}
                }

                if !already {
                    tx.execute(
                        "INSERT INTO watches (user_id, doc_id, created_at) VALUES (?1, ?2, ?3)",
                        params![user.id, doc.id, now_ms],
                    )?;
                }

                let item = load_item(&tx, doc.id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
                tx.commit()?;

                if already {
                    Ok(WatchOutcome::AlreadyWatching(item))
                } else {
                    Ok(WatchOutcome::Added(item))
                }
            })
            .await?;
        Ok(outcome)
    }

    /// Remove one watch; parks the item when the last watcher leaves.
    pub async fn remove_watch(&self, user: &User, doc_id: i64) -> Result<UnwatchOutcome> {
        let user = user.clone();
        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                upsert_user(&tx, &user)?;

                let removed = tx.execute(
                    "DELETE FROM watches WHERE user_id = ?1 AND doc_id = ?2",
                    params![user.id, doc_id],
                )?;
                if removed == 0 {
                    tx.commit()?;
                    return Ok(UnwatchOutcome::NotWatching);
                }

                let last_watcher = park_if_unwatched(&tx, doc_id)?;
                tx.commit()?;
                Ok(UnwatchOutcome::Removed { last_watcher })
            })
            .await?;
        Ok(outcome)
    }

    /// Drop every watch of one user, parking items left without watchers.
    /// Returns the number of watches removed.
    pub async fn remove_all_watches(&self, user: &User) -> Result<usize> {
        let user = user.clone();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                upsert_user(&tx, &user)?;

                let doc_ids: Vec<i64> = {
                    let mut stmt =
                        tx.prepare("SELECT doc_id FROM watches WHERE user_id = ?1")?;
                    let ids = stmt
                        .query_map(params![user.id], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<i64>, _>>()?;
                    ids
                };

                tx.execute("DELETE FROM watches WHERE user_id = ?1", params![user.id])?;
                for doc_id in &doc_ids {
                    park_if_unwatched(&tx, *doc_id)?;
                }

                tx.commit()?;
                Ok(doc_ids.len())
            })
            .await?;
        Ok(removed)
    }

    /// All items in one user's watch set, watchers included.
    pub async fn watched_items(&self, user_id: &str) -> Result<Vec<WatchedItem>> {
        let user_id = user_id.to_string();
        let items = self
            .conn
            .call(move |conn| {
                let doc_ids: Vec<i64> = {
                    let mut stmt =
                        conn.prepare("SELECT doc_id FROM watches WHERE user_id = ?1")?;
                    let ids = stmt
                        .query_map(params![user_id], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<i64>, _>>()?;
                    ids
                };

                let mut items = Vec::with_capacity(doc_ids.len());
                for doc_id in doc_ids {
                    if let Some(item) = load_item(conn, doc_id)? {
                        items.push(item);
                    }
                }
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Load one watched item by document id.
    pub async fn item(&self, doc_id: i64) -> Result<Option<WatchedItem>> {
        let item = self
            .conn
            .call(move |conn| Ok(load_item(conn, doc_id)?))
            .await?;
        Ok(item)
    }

    /// Load one subscriber by id.
    pub async fn user(&self, user_id: &str) -> Result<Option<User>> {
        let user_id = user_id.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        "SELECT id, display_name, username FROM users WHERE id = ?1",
                        params![user_id],
                        |row| {
                            Ok(User {
                                id: row.get(0)?,
                                display_name: row.get(1)?,
                                username: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    // Scanner operations

    /// Items due in `(from, to]`, ascending by schedule key, bounded.
    pub async fn due_page(&self, from: &str, to: &str, limit: usize) -> Result<Vec<WatchedItem>> {
        let from = from.to_string();
        let to = to.to_string();
        let items = self
            .conn
            .call(move |conn| {
                let doc_ids: Vec<i64> = {
                    let mut stmt = conn.prepare(
                        "SELECT doc_id FROM items
                         WHERE schedule_key > ?1 AND schedule_key <= ?2
                         ORDER BY schedule_key ASC, doc_id ASC
                         LIMIT ?3",
                    )?;
                    let ids = stmt
                        .query_map(params![from, to, limit], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<i64>, _>>()?;
                    ids
                };

                let mut items = Vec::with_capacity(doc_ids.len());
                for doc_id in doc_ids {
                    if let Some(item) = load_item(conn, doc_id)? {
                        items.push(item);
                    }
                }
                Ok(items)
            })
            .await?;
        Ok(items)
    }

    /// Persist one scanned page: reschedules, new snapshots and alerts,
    /// all in a single transaction.
    ///
    /// Fetches run between the page read and this write, so both writes are
    /// re-validated here. A reschedule is optimistic: it applies only while
    /// the item still holds the key the page read, leaving a concurrently
    /// parked or re-armed item alone. An alert is inserted only while its
    /// `(user, doc)` watch row still exists.
    pub async fn apply_page(&self, updates: Vec<ItemUpdate>, alerts: Vec<Alert>) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                for update in &updates {
                    match (&update.doc, &update.diff) {
                        (Some(doc), diff) => {
                            tx.execute(
                                "UPDATE items
                                 SET doc = ?1, last_diff = ?2, schedule_key = ?3, attempts = ?4
                                 WHERE doc_id = ?5 AND schedule_key = ?6",
                                params![
                                    to_json(doc)?,
                                    diff.as_ref().map(to_json).transpose()?,
                                    update.schedule_key,
                                    update.attempts,
                                    update.doc_id,
                                    update.expected_key
                                ],
                            )?;
                        }
                        (None, _) => {
                            tx.execute(
                                "UPDATE items SET schedule_key = ?1, attempts = ?2
                                 WHERE doc_id = ?3 AND schedule_key = ?4",
                                params![
                                    update.schedule_key,
                                    update.attempts,
                                    update.doc_id,
                                    update.expected_key
                                ],
                            )?;
                        }
                    }
                }

                for alert in &alerts {
                    tx.execute(
                        "INSERT INTO alerts (id, doc_id, user_id, diff, text, created_at, delivered_at)
                         SELECT ?1, ?2, ?3, ?4, ?5, ?6, 0
                         WHERE EXISTS (
                             SELECT 1 FROM watches WHERE user_id = ?3 AND doc_id = ?2
                         )",
                        params![
                            alert.id,
                            alert.doc_id,
                            alert.user_id,
                            to_json(&alert.diff)?,
                            alert.text,
                            alert.created_at
                        ],
                    )?;
                }

                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Force an item due at the given key (used by the update command).
    pub async fn reschedule_item(
        &self,
        doc_id: i64,
        schedule_key: &str,
        attempts: u32,
    ) -> Result<()> {
        let schedule_key = schedule_key.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE items SET schedule_key = ?1, attempts = ?2 WHERE doc_id = ?3",
                    params![schedule_key, attempts, doc_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Scan-task operations

    /// The single active task, if any.
    pub async fn active_task(&self) -> Result<Option<ScanTask>> {
        let task = self
            .conn
            .call(|conn| {
                let task = conn
                    .query_row(
                        "SELECT id, from_key, to_key, page_size, created_at, finalized_at,
                                items_processed, error
                         FROM scan_tasks WHERE finalized_at = 0
                         ORDER BY created_at ASC LIMIT 1",
                        [],
                        task_from_row,
                    )
                    .optional()?;
                Ok(task)
            })
            .await?;
        Ok(task)
    }

    /// Load one task by id.
    pub async fn task(&self, id: &str) -> Result<Option<ScanTask>> {
        let id = id.to_string();
        let task = self
            .conn
            .call(move |conn| {
                let task = conn
                    .query_row(
                        "SELECT id, from_key, to_key, page_size, created_at, finalized_at,
                                items_processed, error
                         FROM scan_tasks WHERE id = ?1",
                        params![id],
                        task_from_row,
                    )
                    .optional()?;
                Ok(task)
            })
            .await?;
        Ok(task)
    }

    /// Create a scan task over `(watermark, to]` and advance the watermark,
    /// atomically. Returns `None` when a task is already active (admission
    /// control) or the window would be empty.
    pub async fn create_task(
        &self,
        to_key: &str,
        page_size: usize,
        now_ms: i64,
    ) -> Result<Option<ScanTask>> {
        let to_key = to_key.to_string();
        let epoch = schedule::encode(0)?;

        let task = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let active: Option<String> = tx
                    .query_row(
                        "SELECT id FROM scan_tasks WHERE finalized_at = 0 LIMIT 1",
                        [],
                        |row| row.get(0),
                    )
                    .optional()?;
                if active.is_some() {
                    return Ok(None);
                }

                let watermark: String = tx
                    .query_row(
                        "SELECT value FROM system WHERE key = ?1",
                        params![SYSTEM_SWEPT_TO],
                        |row| row.get(0),
                    )
                    .optional()?
                    .unwrap_or(epoch);

                if watermark.as_str() >= to_key.as_str() {
                    return Ok(None);
                }

                let task = ScanTask {
                    id: Uuid::new_v4().to_string(),
                    from: watermark,
                    to: to_key.clone(),
                    page_size,
                    created_at: now_ms,
                    finalized_at: 0,
                    items_processed: 0,
                    error: None,
                };
                tx.execute(
                    "INSERT INTO scan_tasks
                     (id, from_key, to_key, page_size, created_at, finalized_at, items_processed)
                     VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                    params![task.id, task.from, task.to, task.page_size, task.created_at],
                )?;
                tx.execute(
                    "INSERT INTO system (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![SYSTEM_SWEPT_TO, to_key],
                )?;

                tx.commit()?;
                Ok(Some(task))
            })
            .await?;
        Ok(task)
    }

    /// Move an active task's cursor forward and count processed items.
    pub async fn advance_task(&self, id: &str, cursor: &str, processed: usize) -> Result<()> {
        let id = id.to_string();
        let cursor = cursor.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE scan_tasks
                     SET from_key = ?1, items_processed = items_processed + ?2
                     WHERE id = ?3 AND finalized_at = 0",
                    params![cursor, processed, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Finalize a task (terminal). A no-op when already finalized.
    pub async fn finalize_task(
        &self,
        id: &str,
        now_ms: i64,
        processed: usize,
        error: Option<String>,
    ) -> Result<()> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE scan_tasks
                     SET finalized_at = ?1,
                         items_processed = items_processed + ?2,
                         error = COALESCE(?3, error)
                     WHERE id = ?4 AND finalized_at = 0",
                    params![now_ms, processed, error, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Alert operations

    /// Oldest pending alerts, bounded.
    pub async fn pending_alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        let alerts = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, doc_id, user_id, diff, text, created_at, delivered_at, result
                     FROM alerts WHERE delivered_at = 0
                     ORDER BY created_at ASC, id ASC LIMIT ?1",
                )?;
                let alerts = stmt
                    .query_map(params![limit], alert_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(alerts)
            })
            .await?;
        Ok(alerts)
    }

    /// Settle a batch of attempted alerts in one transaction. Each entry is
    /// `(alert_id, delivery_error)`. The `delivered_at = 0` guard makes the
    /// transition one-shot even under a retried call.
    pub async fn mark_dispatched(
        &self,
        results: Vec<(String, Option<String>)>,
        now_ms: i64,
    ) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for (alert_id, error) in &results {
                    let result = error.clone().unwrap_or_else(|| "ok".to_string());
                    tx.execute(
                        "UPDATE alerts SET delivered_at = ?1, result = ?2
                         WHERE id = ?3 AND delivered_at = 0",
                        params![now_ms, result, alert_id],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Rate limits

    /// Consume a rate-limit token for `(user, action)`. Returns `false`
    /// when the previous deadline has not yet passed.
    pub async fn ratelimit_try_acquire(
        &self,
        user_id: &str,
        action: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> Result<bool> {
        let user_id = user_id.to_string();
        let action = action.to_string();
        let acquired = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let deadline: Option<i64> = tx
                    .query_row(
                        "SELECT deadline FROM ratelimits WHERE user_id = ?1 AND action = ?2",
                        params![user_id, action],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(deadline) = deadline {
                    if now_ms < deadline {
                        return Ok(false);
                    }
                }
                tx.execute(
                    "INSERT INTO ratelimits (user_id, action, deadline) VALUES (?1, ?2, ?3)
                     ON CONFLICT(user_id, action) DO UPDATE SET deadline = excluded.deadline",
                    params![user_id, action, now_ms + window_ms],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(acquired)
    }

    // Statistics

    /// Record counts across all tables.
    pub async fn stats(&self) -> Result<Stats> {
        let stats = self
            .conn
            .call(|conn| {
                let count = |sql: &str| -> rusqlite::Result<usize> {
                    conn.query_row(sql, [], |row| row.get(0))
                };
                Ok(Stats {
                    users: count("SELECT COUNT(*) FROM users")?,
                    items: count("SELECT COUNT(*) FROM items")?,
                    scheduled_items: count(
                        "SELECT COUNT(*) FROM items WHERE schedule_key != '-'",
                    )?,
                    watches: count("SELECT COUNT(*) FROM watches")?,
                    alerts_pending: count("SELECT COUNT(*) FROM alerts WHERE delivered_at = 0")?,
                    alerts_delivered: count(
                        "SELECT COUNT(*) FROM alerts WHERE delivered_at != 0",
                    )?,
                    scan_tasks: count("SELECT COUNT(*) FROM scan_tasks")?,
                })
            })
            .await?;
        Ok(stats)
    }
}

// Row mapping helpers

fn upsert_user(conn: &rusqlite::Connection, user: &User) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO users (id, display_name, username) VALUES (?1, ?2, ?3)
         ON CONFLICT(id) DO UPDATE SET
             display_name = excluded.display_name,
             username = excluded.username",
        params![user.id, user.display_name, user.username],
    )?;
    Ok(())
}

/// Set the sentinel key when an item has no watchers left. Returns whether
/// the item was parked.
fn park_if_unwatched(conn: &rusqlite::Connection, doc_id: i64) -> rusqlite::Result<bool> {
    let remaining: usize = conn.query_row(
        "SELECT COUNT(*) FROM watches WHERE doc_id = ?1",
        params![doc_id],
        |row| row.get(0),
    )?;
    if remaining > 0 {
        return Ok(false);
    }
    conn.execute(
        "UPDATE items SET schedule_key = ?1 WHERE doc_id = ?2",
        params![schedule::UNSCHEDULED, doc_id],
    )?;
    Ok(true)
}

fn load_item(conn: &rusqlite::Connection, doc_id: i64) -> rusqlite::Result<Option<WatchedItem>> {
    let row = conn
        .query_row(
            "SELECT doc_id, doc, schedule_key, attempts, enqueued_at, last_diff
             FROM items WHERE doc_id = ?1",
            params![doc_id],
            |row| {
                let doc_json: String = row.get(1)?;
                let diff_json: Option<String> = row.get(5)?;
                Ok(WatchedItem {
                    doc_id: row.get(0)?,
                    doc: from_json(1, &doc_json)?,
                    watchers: Vec::new(),
                    schedule_key: row.get(2)?,
                    attempts: row.get(3)?,
                    enqueued_at: row.get(4)?,
                    last_diff: diff_json.as_deref().map(|s| from_json(5, s)).transpose()?,
                })
            },
        )
        .optional()?;

    let Some(mut item) = row else {
        return Ok(None);
    };

    let mut stmt =
        conn.prepare("SELECT user_id FROM watches WHERE doc_id = ?1 ORDER BY created_at ASC")?;
    item.watchers = stmt
        .query_map(params![doc_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    Ok(Some(item))
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanTask> {
    Ok(ScanTask {
        id: row.get(0)?,
        from: row.get(1)?,
        to: row.get(2)?,
        page_size: row.get(3)?,
        created_at: row.get(4)?,
        finalized_at: row.get(5)?,
        items_processed: row.get(6)?,
        error: row.get(7)?,
    })
}

fn alert_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let diff_json: String = row.get(3)?;
    Ok(Alert {
        id: row.get(0)?,
        doc_id: row.get(1)?,
        user_id: row.get(2)?,
        diff: from_json(3, &diff_json)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
        delivered_at: row.get(6)?,
        result: row.get(7)?,
    })
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<String, tokio_rusqlite::Error> {
    serde_json::to_string(value).map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))
}

fn from_json<T: DeserializeOwned>(column: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
