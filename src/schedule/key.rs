// src/schedule/key.rs

//! Schedule-key codec.
//!
//! Encodes a millisecond timestamp into a fixed-width, lexicographically
//! sortable string so that due times can be used directly as range-query
//! boundaries: `encode(t1) < encode(t2)` iff `t1 < t2`. Pure functions,
//! stable across restarts.

use crate::error::{AppError, Result};

/// Digits in an encoded key. 14 decimal digits cover timestamps past
/// the year 5000.
const KEY_WIDTH: usize = 14;

/// Largest encodable millisecond timestamp (exclusive).
const KEY_RANGE: i64 = 100_000_000_000_000;

/// Sentinel for "no poll pending". Sorts before every encoded key ('-' is
/// below '0' in ASCII), so unscheduled items never match a scan range.
pub const UNSCHEDULED: &str = "-";

/// Encode a millisecond timestamp as a sortable schedule key.
pub fn encode(timestamp_ms: i64) -> Result<String> {
    if !(0..KEY_RANGE).contains(&timestamp_ms) {
        return Err(AppError::config(format!(
            "schedule key out of range: {timestamp_ms}"
        )));
    }
    Ok(format!("{timestamp_ms:0KEY_WIDTH$}"))
}

/// Decode a schedule key back to its millisecond timestamp.
pub fn decode(key: &str) -> Result<i64> {
    if key.len() != KEY_WIDTH || !key.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::config(format!("malformed schedule key: {key:?}")));
    }
    key.parse::<i64>()
        .map_err(|e| AppError::config(format!("malformed schedule key {key:?}: {e}")))
}

/// Shift a key forward (or back) by a millisecond delta.
pub fn advance(key: &str, delta_ms: i64) -> Result<String> {
    encode(decode(key)? + delta_ms)
}

/// Whether a key denotes a real due time rather than the sentinel.
pub fn is_scheduled(key: &str) -> bool {
    key != UNSCHEDULED
}
