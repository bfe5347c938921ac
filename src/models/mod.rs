// src/models/mod.rs

//! Domain models for the watchdog application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod diff;
mod document;
mod task;
mod watch;

// Re-export all public types
pub use diff::DocumentDiff;
pub use document::{Document, DocumentType};
pub use task::ScanTask;
pub use watch::{Alert, User, WatchedItem};
