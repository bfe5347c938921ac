// src/ratelimit.rs

//! Per-user command rate limiting backed by the store.

use crate::config::LimitsConfig;
use crate::error::{AppError, Result};
use crate::storage::Store;

/// Rate-limited action name for the unwatch-all command.
pub const ACTION_UNWATCH_ALL: &str = "unwatchall";
/// Rate-limited action name for the forced-update command.
pub const ACTION_UPDATE: &str = "update";

/// Maps command actions to their configured windows and consumes tokens
/// through the store's `(user, action)` deadline table.
#[derive(Clone)]
pub struct RateLimiter {
    store: Store,
    limits: LimitsConfig,
}

impl RateLimiter {
    pub fn new(store: Store, limits: LimitsConfig) -> Self {
        Self { store, limits }
    }

    fn window_ms(&self, action: &str) -> Result<i64> {
        match action {
            ACTION_UNWATCH_ALL => Ok(self.limits.ratelimit_unwatchall_ms),
            ACTION_UPDATE => Ok(self.limits.ratelimit_update_ms),
            other => Err(AppError::config(format!(
                "no rate limit configured for action {other:?}"
            ))),
        }
    }

    /// Try to consume a token for `(user, action)` at `now_ms`.
    ///
    /// Returns `Ok(None)` when the action is allowed; `Ok(Some(remaining_ms))`
    /// with the time left in the window when it is not.
    pub async fn try_acquire(
        &self,
        user_id: &str,
        action: &str,
        now_ms: i64,
    ) -> Result<Option<i64>> {
        let window_ms = self.window_ms(action)?;
        let acquired = self
            .store
            .ratelimit_try_acquire(user_id, action, now_ms, window_ms)
            .await?;
        if acquired {
            Ok(None)
        } else {
            // The store keeps the exact deadline; reporting the full window
            // is a conservative upper bound for the user-facing message.
            Ok(Some(window_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn limiter() -> RateLimiter {
        let store = Store::open_in_memory().await.unwrap();
        let limits = LimitsConfig {
            max_watch_items: 10,
            ratelimit_unwatchall_ms: 1_000,
            ratelimit_update_ms: 500,
        };
        RateLimiter::new(store, limits)
    }

    #[tokio::test]
    async fn test_acquire_then_blocked_within_window() {
        let limiter = limiter().await;
        assert!(limiter
            .try_acquire("u1", ACTION_UNWATCH_ALL, 0)
            .await
            .unwrap()
            .is_none());
        assert!(limiter
            .try_acquire("u1", ACTION_UNWATCH_ALL, 900)
            .await
            .unwrap()
            .is_some());
        assert!(limiter
            .try_acquire("u1", ACTION_UNWATCH_ALL, 1_000)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_actions_use_their_own_windows() {
        let limiter = limiter().await;
        limiter.try_acquire("u1", ACTION_UPDATE, 0).await.unwrap();
        // the update window is shorter than the unwatch-all one
        assert!(limiter
            .try_acquire("u1", ACTION_UPDATE, 500)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unknown_action_is_a_config_error() {
        let limiter = limiter().await;
        assert!(limiter.try_acquire("u1", "watch", 0).await.is_err());
    }
}
