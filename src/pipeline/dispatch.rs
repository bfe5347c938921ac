// src/pipeline/dispatch.rs

//! Alert dispatcher.
//!
//! Delivers pending alerts in bounded batches on its own cadence,
//! independent of scanning. Every attempted alert is settled exactly once:
//! a delivery failure is recorded on the alert and never retried.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::now_ms;
use crate::services::Notifier;
use crate::storage::Store;

/// Result of one dispatch batch.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Deliver up to `batch_size` pending alerts and settle them.
pub async fn dispatch_pending_alerts(
    store: &Store,
    notifier: &dyn Notifier,
    batch_size: usize,
) -> Result<DispatchReport> {
    let alerts = store.pending_alerts(batch_size).await?;
    if alerts.is_empty() {
        debug!("no pending alerts");
        return Ok(DispatchReport::default());
    }

    let mut report = DispatchReport {
        attempted: alerts.len(),
        failed: 0,
    };
    let mut results = Vec::with_capacity(alerts.len());

    for alert in &alerts {
        match notifier.deliver(&alert.user_id, &alert.text).await {
            Ok(()) => results.push((alert.id.clone(), None)),
            Err(e) => {
                warn!(alert = %alert.id, user = %alert.user_id, error = %e, "delivery failed");
                report.failed += 1;
                results.push((alert.id.clone(), Some(e.to_string())));
            }
        }
    }

    // Settle the whole batch, successes and failures alike (at-most-once).
    store.mark_dispatched(results, now_ms()).await?;
    info!(
        attempted = report.attempted,
        failed = report.failed,
        "alert batch dispatched"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::models::{Alert, Document, DocumentDiff, DocumentType, User};
    use crate::schedule;

    /// Notifier that records deliveries and fails for chosen subscribers.
    struct StubNotifier {
        delivered: Mutex<Vec<(String, String)>>,
        failing: Mutex<HashSet<String>>,
    }

    impl StubNotifier {
        fn new() -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                failing: Mutex::new(HashSet::new()),
            }
        }

        fn fail_for(&self, user_id: &str) {
            self.failing.lock().unwrap().insert(user_id.to_string());
        }
    }

    #[async_trait]
    impl Notifier for StubNotifier {
        async fn deliver(&self, subscriber_id: &str, text: &str) -> Result<()> {
            if self.failing.lock().unwrap().contains(subscriber_id) {
                return Err(AppError::transport(subscriber_id.to_string(), "bot blocked"));
            }
            self.delivered
                .lock()
                .unwrap()
                .push((subscriber_id.to_string(), text.to_string()));
            Ok(())
        }
    }

    fn alert(id: &str, user_id: &str, created_at: i64) -> Alert {
        Alert {
            id: id.into(),
            doc_id: 1,
            user_id: user_id.into(),
            diff: DocumentDiff::default(),
            text: format!("alert {id}"),
            created_at,
            delivered_at: 0,
            result: None,
        }
    }

    /// Watch item 1 for the given users, then enqueue their alerts.
    async fn enqueue(store: &Store, alerts: Vec<Alert>) {
        let doc = Document {
            id: 1,
            kind: DocumentType::Story,
            by: "tester".into(),
            time: 1_700_000_000,
            title: Some("A story".into()),
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
        };
        let key = schedule::encode(1_000).unwrap();
        for alert in &alerts {
            let user = User {
                id: alert.user_id.clone(),
                display_name: alert.user_id.clone(),
                username: String::new(),
            };
            store
                .upsert_watch(&user, &doc, &key, crate::now_ms(), 10)
                .await
                .unwrap();
        }
        store.apply_page(vec![], alerts).await.unwrap();
    }

    #[tokio::test]
    async fn test_batch_settles_every_attempted_alert() {
        let store = Store::open_in_memory().await.unwrap();
        let notifier = StubNotifier::new();
        notifier.fail_for("u2");

        enqueue(
            &store,
            vec![alert("a1", "u1", 1), alert("a2", "u2", 2), alert("a3", "u3", 3)],
        )
        .await;

        let report = dispatch_pending_alerts(&store, &notifier, 10).await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 1);

        // failures are terminal and observable, not retried
        assert!(store.pending_alerts(10).await.unwrap().is_empty());
        let second = dispatch_pending_alerts(&store, &notifier, 10).await.unwrap();
        assert_eq!(second.attempted, 0);

        let delivered = notifier.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_is_bounded_and_oldest_first() {
        let store = Store::open_in_memory().await.unwrap();
        let notifier = StubNotifier::new();

        enqueue(
            &store,
            vec![alert("a1", "u1", 30), alert("a2", "u1", 10), alert("a3", "u1", 20)],
        )
        .await;

        let report = dispatch_pending_alerts(&store, &notifier, 2).await.unwrap();
        assert_eq!(report.attempted, 2);

        // the newest alert is still pending
        let pending = store.pending_alerts(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "a1");
    }

    #[tokio::test]
    async fn test_empty_queue_is_a_no_op() {
        let store = Store::open_in_memory().await.unwrap();
        let notifier = StubNotifier::new();
        let report = dispatch_pending_alerts(&store, &notifier, 5).await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(report.failed, 0);
    }
}
