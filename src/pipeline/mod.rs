// src/pipeline/mod.rs

//! Pipeline entry points for watchdog operations.
//!
//! - `watchlist`: watch/unwatch/list commands over the store
//! - `diff`: snapshot comparison
//! - `scan`: scan-task creation and the resumable sweep over due items
//! - `dispatch`: batched delivery of pending alerts

pub mod diff;
pub mod dispatch;
pub mod scan;
pub mod watchlist;

pub use diff::compute_diff;
pub use dispatch::{dispatch_pending_alerts, DispatchReport};
pub use scan::{create_scan_task, run_scan_cycle, scan_page, PageOutcome, ScanReport};
