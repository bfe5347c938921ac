// src/schedule/mod.rs

//! Poll scheduling: the sortable schedule-key codec and the backoff policy.

mod backoff;
mod key;

pub use backoff::{backoff_delay_ms, Backoff};
pub use key::{advance, decode, encode, is_scheduled, UNSCHEDULED};
