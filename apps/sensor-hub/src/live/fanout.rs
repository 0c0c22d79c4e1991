use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::SessionRegistry;
use crate::reading::Reading;

/// Drains the store's commit feed and broadcasts each reading, so viewers
/// see readings in exactly the order they were committed.
pub fn spawn_fanout(
    registry: Arc<SessionRegistry>,
    mut commits: mpsc::UnboundedReceiver<Reading>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = commits.recv() => {
                    let Some(reading) = next else { break };
                    let reading_id = reading.id;
                    let report = registry.broadcast(reading);
                    tracing::debug!(
                        reading_id,
                        delivered = report.delivered,
                        dropped = report.dropped,
                        closed = report.closed,
                        "broadcast reading"
                    );
                }
            }
        }
        tracing::info!("live fan-out stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn reading(id: i64) -> Reading {
        Reading {
            id,
            device_id: "A".to_string(),
            metrics: [("humidity".to_string(), 40.0)].into_iter().collect(),
            timestamp: id,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn forwards_commits_in_feed_order() {
        let registry = Arc::new(SessionRegistry::new(16));
        let mut viewer = registry.connect();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = spawn_fanout(registry.clone(), rx, cancel.clone());

        for id in 1..=5 {
            tx.send(reading(id)).unwrap();
        }
        let mut seen = Vec::new();
        for _ in 0..5 {
            let next = tokio::time::timeout(Duration::from_secs(1), viewer.recv())
                .await
                .unwrap()
                .unwrap();
            seen.push(next.id);
        }
        assert_eq!(seen, vec![1, 2, 3, 4, 5]);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn stops_when_feed_closes() {
        let registry = Arc::new(SessionRegistry::new(4));
        let (tx, rx) = mpsc::unbounded_channel::<Reading>();
        let handle = spawn_fanout(registry, rx, CancellationToken::new());
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
