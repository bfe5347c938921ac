// src/pipeline/scan.rs

//! Scan-task creation and the resumable sweep over due items.
//!
//! A scan task covers the schedule-key window `(from, to]`. One page
//! processes at most `page_size` due items in ascending key order, commits
//! its mutations in a single store transaction, and reports a cursor. The
//! resumption loop re-reads the task before every page; `finalized_at != 0`
//! is the mandatory terminal check that keeps the machine from running
//! forever. Windows are created from a persisted watermark so consecutive
//! sweeps tile the timeline with no gaps and no overlaps.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Alert, ScanTask};
use crate::now_ms;
use crate::pipeline::diff::compute_diff;
use crate::render;
use crate::schedule;
use crate::services::DocumentSource;
use crate::storage::{ItemUpdate, Store};

/// Result of one page invocation.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// Schedule key of the last processed item, or `to` when the window is
    /// exhausted.
    pub cursor: String,
    /// Items processed in this page.
    pub processed: usize,
}

/// Result of driving one scan cycle.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Final cursor of the task, if one was active.
    pub cursor: Option<String>,
    pub items_processed: usize,
}

/// Create the next scan task when none is active.
///
/// The window starts at the persisted "swept to" watermark and ends at the
/// current time; watermark advance and task creation commit atomically.
pub async fn create_scan_task(store: &Store, config: &Config) -> Result<Option<ScanTask>> {
    let now = now_ms();
    let to_key = schedule::encode(now)?;

    let task = store
        .create_task(&to_key, config.poller.page_size, now)
        .await?;
    match &task {
        Some(task) => {
            info!(task = %task.id, from = %task.from, to = %task.to, "scan task created");
        }
        None => debug!("scan task skipped: active task or empty window"),
    }
    Ok(task)
}

/// Process one bounded page of due items within `(from, to]`.
///
/// Every item in the page is rescheduled whether or not its fetch
/// succeeded; a fetch failure only skips the snapshot update and alert
/// synthesis, so the item is retried at its already-scheduled next key.
/// Fetches run between the page read and the page write, so the write
/// re-validates: an item whose key changed in the meantime (unwatch parked
/// it, or a re-watch re-armed it) keeps its new state, and alerts for
/// watches that no longer exist are dropped.
pub async fn scan_page(
    store: &Store,
    source: &dyn DocumentSource,
    config: &Config,
    from: &str,
    to: &str,
    page_size: usize,
) -> Result<PageOutcome> {
    let items = store.due_page(from, to, page_size).await?;
    if items.is_empty() {
        return Ok(PageOutcome {
            cursor: to.to_string(),
            processed: 0,
        });
    }

    let now = now_ms();
    let backoff = config.poller.backoff()?;

    // Bounded concurrent fetches; results keyed by id so the page can be
    // applied in schedule-key order afterwards.
    let concurrency = config.hackernews.max_concurrent.max(1);
    let mut fetched: HashMap<i64, Result<crate::models::Document>> =
        stream::iter(items.iter().map(|item| {
            let id = item.doc_id;
            async move { (id, source.fetch(id).await) }
        }))
        .buffered(concurrency)
        .collect()
        .await;

    let mut updates = Vec::with_capacity(items.len());
    let mut alerts = Vec::new();

    for item in &items {
        let attempts = item.attempts + 1;
        let schedule_key = if attempts >= config.poller.max_attempts {
            debug!(doc_id = item.doc_id, attempts, "attempt budget spent, parking item");
            schedule::UNSCHEDULED.to_string()
        } else {
            let delay = config.poller.poll_delay_ms + backoff.delay_ms(attempts);
            schedule::encode(now + delay)?
        };

        match fetched.remove(&item.doc_id) {
            Some(Ok(next)) => {
                let diff = compute_diff(&item.doc, &next, now);
                if diff.has_changes() && !item.watchers.is_empty() {
                    let text = render::alert_text(&next, &diff);
                    for watcher in &item.watchers {
                        alerts.push(Alert {
                            id: Uuid::new_v4().to_string(),
                            doc_id: item.doc_id,
                            user_id: watcher.clone(),
                            diff: diff.clone(),
                            text: text.clone(),
                            created_at: now,
                            delivered_at: 0,
                            result: None,
                        });
                    }
                }
                updates.push(ItemUpdate {
                    doc_id: item.doc_id,
                    expected_key: item.schedule_key.clone(),
                    schedule_key,
                    attempts,
                    doc: Some(next),
                    diff: Some(diff),
                });
            }
            Some(Err(e)) => {
                // Partial-page best effort: the reschedule still applies.
                warn!(doc_id = item.doc_id, error = %e, "fetch failed, skipping snapshot update");
                updates.push(ItemUpdate {
                    doc_id: item.doc_id,
                    expected_key: item.schedule_key.clone(),
                    schedule_key,
                    attempts,
                    doc: None,
                    diff: None,
                });
            }
            None => {
                return Err(AppError::validation(format!(
                    "no fetch result for item {}",
                    item.doc_id
                )))
            }
        }
    }

    let processed = items.len();
    let alert_count = alerts.len();
    // A short page means the window is exhausted.
    let cursor = if processed < page_size {
        to.to_string()
    } else {
        items
            .last()
            .map(|item| item.schedule_key.clone())
            .unwrap_or_else(|| to.to_string())
    };

    store.apply_page(updates, alerts).await?;
    debug!(processed, alerts = alert_count, cursor = %cursor, "page applied");

    Ok(PageOutcome { cursor, processed })
}

/// Drive the active scan task to completion, page by page.
///
/// The task is reloaded before every page and never touched again once
/// finalized; a page failure finalizes the task with its error recorded
/// rather than retrying (operators create a fresh task over the remaining
/// range if recovery is wanted).
pub async fn run_scan_cycle(
    store: &Store,
    source: &dyn DocumentSource,
    config: &Config,
) -> Result<ScanReport> {
    let Some(task) = store.active_task().await? else {
        debug!("no active scan task");
        return Ok(ScanReport::default());
    };
    let task_id = task.id.clone();

    let mut report = ScanReport::default();
    loop {
        // Terminal-state guard: a finalized task is never resumed.
        let Some(task) = store.task(&task_id).await? else {
            break;
        };
        if task.is_finalized() {
            report.cursor = Some(task.from.clone());
            break;
        }

        match scan_page(store, source, config, &task.from, &task.to, task.page_size).await {
            Ok(page) => {
                report.items_processed += page.processed;
                report.cursor = Some(page.cursor.clone());

                let advanced = page.cursor.as_str() > task.from.as_str();
                if advanced && page.cursor.as_str() < task.to.as_str() {
                    store
                        .advance_task(&task_id, &page.cursor, page.processed)
                        .await?;
                } else {
                    store
                        .finalize_task(&task_id, now_ms(), page.processed, None)
                        .await?;
                    info!(
                        task = %task_id,
                        items = report.items_processed,
                        "scan task finalized"
                    );
                    break;
                }
            }
            Err(e) => {
                error!(task = %task_id, error = %e, "scan page failed, finalizing task");
                store
                    .finalize_task(&task_id, now_ms(), 0, Some(e.to_string()))
                    .await?;
                return Err(e);
            }
        }
    }

    Ok(report)
}
