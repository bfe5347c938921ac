// src/lib.rs

//! watchdog: Hacker News thread watcher
//!
//! Tracks Hacker News items on behalf of subscribers, polls them on an
//! exponential-backoff schedule, and emits one alert per change per watcher.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod ratelimit;
pub mod render;
pub mod schedule;
pub mod services;
pub mod storage;

use chrono::Utc;

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
