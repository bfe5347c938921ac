// src/services/mod.rs

//! Service layer for external collaborators.
//!
//! - Document source (`HackerNewsClient`)
//! - Notification channel (`TelegramNotifier`)

mod hackernews;
mod telegram;

pub use hackernews::{parse_item_id, DocumentSource, HackerNewsClient};
pub use telegram::{Notifier, TelegramNotifier};
