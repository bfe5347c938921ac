// src/pipeline/watchlist.rs

//! Watch-list manager.
//!
//! Each operation is one store transaction spanning the user record, the
//! watch relation and the watched item, so a concurrent scan page can never
//! observe a half-applied watch.

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{Document, User, WatchedItem};
use crate::now_ms;
use crate::schedule;
use crate::storage::{Store, UnwatchOutcome, WatchOutcome};

/// Start watching a document for a user. Idempotent; re-watching a parked
/// item re-arms its schedule.
pub async fn watch(
    store: &Store,
    config: &Config,
    user: &User,
    doc: &Document,
) -> Result<WatchedItem> {
    let now = now_ms();
    let schedule_key = schedule::encode(now + config.poller.initial_delay_ms)?;

    let outcome = store
        .upsert_watch(
            user,
            doc,
            &schedule_key,
            now,
            config.limits.max_watch_items,
        )
        .await?;

    match outcome {
        WatchOutcome::Added(item) => {
            info!(
                user = %user.id,
                doc_id = doc.id,
                due = %item.schedule_key,
                "watch added"
            );
            Ok(item)
        }
        WatchOutcome::AlreadyWatching(item) => {
            debug!(user = %user.id, doc_id = doc.id, "already watching");
            Ok(item)
        }
        WatchOutcome::LimitReached(limit) => Err(AppError::WatchLimit(limit)),
    }
}

/// Stop watching a document. Parks the item when the last watcher leaves.
pub async fn unwatch(store: &Store, user: &User, doc_id: i64) -> Result<UnwatchOutcome> {
    let outcome = store.remove_watch(user, doc_id).await?;
    match &outcome {
        UnwatchOutcome::Removed { last_watcher } => {
            info!(
                user = %user.id,
                doc_id,
                last_watcher,
                "watch removed"
            );
        }
        UnwatchOutcome::NotWatching => {
            debug!(user = %user.id, doc_id, "unwatch of an unwatched item");
        }
    }
    Ok(outcome)
}

/// Stop watching everything. Returns the number of watches removed.
pub async fn unwatch_all(store: &Store, user: &User) -> Result<usize> {
    let removed = store.remove_all_watches(user).await?;
    info!(user = %user.id, removed, "watch list cleared");
    Ok(removed)
}

/// All items a user watches, sorted by document time ascending (in the
/// Telegram app, the last visible entry of a long list is the newest one).
pub async fn list(store: &Store, user_id: &str) -> Result<Vec<WatchedItem>> {
    let mut items = store.watched_items(user_id).await?;
    items.sort_by_key(|item| item.doc.time);
    Ok(items)
}

/// Make every scheduled item of one user due immediately, so the next scan
/// cycle re-polls them. Parked items stay parked. Returns how many items
/// were rescheduled.
pub async fn refresh(store: &Store, user_id: &str) -> Result<usize> {
    let due_now = schedule::encode(now_ms())?;
    let items = store.watched_items(user_id).await?;

    let mut rescheduled = 0;
    for item in items {
        if !schedule::is_scheduled(&item.schedule_key) {
            continue;
        }
        store
            .reschedule_item(item.doc_id, &due_now, item.attempts)
            .await?;
        rescheduled += 1;
    }
    info!(user = %user_id, rescheduled, "forced refresh");
    Ok(rescheduled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.limits.max_watch_items = 3;
        config
    }

    fn story(id: i64, time: i64) -> Document {
        Document {
            id,
            kind: DocumentType::Story,
            by: "tester".into(),
            time,
            title: Some(format!("Story {id}")),
            url: None,
            text: None,
            score: Some(1),
            descendants: Some(0),
            parent: None,
            poll: None,
            kids: None,
            parts: None,
            deleted: None,
            dead: None,
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.into(),
            display_name: format!("User {id}"),
            username: String::new(),
        }
    }

    #[tokio::test]
    async fn test_watch_then_unwatch_restores_state() {
        let store = Store::open_in_memory().await.unwrap();
        let config = test_config();
        let u = user("u1");

        let item = watch(&store, &config, &u, &story(1, 100)).await.unwrap();
        assert_eq!(item.watchers, vec!["u1".to_string()]);
        assert!(schedule::is_scheduled(&item.schedule_key));

        let outcome = unwatch(&store, &u, 1).await.unwrap();
        assert_eq!(outcome, UnwatchOutcome::Removed { last_watcher: true });

        let item = store.item(1).await.unwrap().unwrap();
        assert!(item.watchers.is_empty());
        assert_eq!(item.schedule_key, schedule::UNSCHEDULED);
    }

    #[tokio::test]
    async fn test_watch_limit_is_enforced() {
        let store = Store::open_in_memory().await.unwrap();
        let config = test_config();
        let u = user("u1");

        for id in 1..=3 {
            watch(&store, &config, &u, &story(id, id)).await.unwrap();
        }
        let err = watch(&store, &config, &u, &story(4, 4)).await.unwrap_err();
        assert!(matches!(err, AppError::WatchLimit(3)));
    }

    #[tokio::test]
    async fn test_list_sorted_by_document_time() {
        let store = Store::open_in_memory().await.unwrap();
        let config = test_config();
        let u = user("u1");

        watch(&store, &config, &u, &story(1, 300)).await.unwrap();
        watch(&store, &config, &u, &story(2, 100)).await.unwrap();
        watch(&store, &config, &u, &story(3, 200)).await.unwrap();

        let items = list(&store, "u1").await.unwrap();
        let ids: Vec<i64> = items.iter().map(|i| i.doc_id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_unwatch_all() {
        let store = Store::open_in_memory().await.unwrap();
        let config = test_config();
        let u1 = user("u1");
        let u2 = user("u2");

        watch(&store, &config, &u1, &story(1, 1)).await.unwrap();
        watch(&store, &config, &u1, &story(2, 2)).await.unwrap();
        watch(&store, &config, &u2, &story(2, 2)).await.unwrap();

        let removed = unwatch_all(&store, &u1).await.unwrap();
        assert_eq!(removed, 2);
        assert!(list(&store, "u1").await.unwrap().is_empty());

        // item 1 lost its only watcher, item 2 still has one
        let item1 = store.item(1).await.unwrap().unwrap();
        assert_eq!(item1.schedule_key, schedule::UNSCHEDULED);
        let item2 = store.item(2).await.unwrap().unwrap();
        assert!(schedule::is_scheduled(&item2.schedule_key));
    }

    #[tokio::test]
    async fn test_refresh_skips_parked_items() {
        let store = Store::open_in_memory().await.unwrap();
        let config = test_config();
        let u = user("u1");

        watch(&store, &config, &u, &story(1, 1)).await.unwrap();
        watch(&store, &config, &u, &story(2, 2)).await.unwrap();
        store
            .reschedule_item(2, schedule::UNSCHEDULED, 0)
            .await
            .unwrap();

        let rescheduled = refresh(&store, "u1").await.unwrap();
        assert_eq!(rescheduled, 1);

        let item1 = store.item(1).await.unwrap().unwrap();
        assert!(schedule::decode(&item1.schedule_key).unwrap() <= now_ms());
        let item2 = store.item(2).await.unwrap().unwrap();
        assert_eq!(item2.schedule_key, schedule::UNSCHEDULED);
    }
}
