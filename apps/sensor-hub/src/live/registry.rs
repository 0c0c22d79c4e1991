use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::reading::Reading;

pub type SessionId = u64;

pub const DEFAULT_SESSION_QUEUE: usize = 64;

/// Outcome of one broadcast across the sessions connected at that instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Sessions whose outbound queue was full; they miss this reading.
    pub dropped: usize,
    /// Sessions found already gone; removed from the registry.
    pub closed: usize,
}

/// Connected live viewers, each with its own bounded outbound queue.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, mpsc::Sender<Arc<Reading>>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, mpsc::Sender<Arc<Reading>>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connect(self: &Arc<Self>) -> ViewerSession {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let live = {
            let mut sessions = self.lock();
            sessions.insert(id, tx);
            sessions.len()
        };
        tracing::info!(session_id = id, live_sessions = live, "viewer connected");
        ViewerSession {
            id,
            rx,
            _guard: SessionGuard {
                id,
                registry: Arc::clone(self),
            },
        }
    }

    pub fn disconnect(&self, id: SessionId) -> bool {
        let (removed, live) = {
            let mut sessions = self.lock();
            let removed = sessions.remove(&id).is_some();
            (removed, sessions.len())
        };
        if removed {
            tracing::info!(session_id = id, live_sessions = live, "viewer disconnected");
        }
        removed
    }

    pub fn session_count(&self) -> usize {
        self.lock().len()
    }

    /// Offers `reading` to every session connected right now. Never waits:
    /// a session with a full queue simply misses this reading.
    pub fn broadcast(&self, reading: Reading) -> BroadcastReport {
        let reading = Arc::new(reading);
        let mut report = BroadcastReport::default();
        let mut sessions = self.lock();
        sessions.retain(|session_id, tx| match tx.try_send(Arc::clone(&reading)) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                tracing::warn!(
                    session_id = *session_id,
                    reading_id = reading.id,
                    "viewer queue full; dropping live update"
                );
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.closed += 1;
                false
            }
        });
        report
    }
}

struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.disconnect(self.id);
    }
}

/// One connected viewer. Dropping it disconnects the viewer.
pub struct ViewerSession {
    id: SessionId,
    rx: mpsc::Receiver<Arc<Reading>>,
    _guard: SessionGuard,
}

impl ViewerSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<Reading>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<Reading>> {
        self.rx.try_recv().ok()
    }

    /// Stream of live readings; the session stays connected while the
    /// stream is alive.
    pub fn into_stream(self) -> impl Stream<Item = Arc<Reading>> + Send + 'static {
        futures::stream::unfold(self, |mut session| async move {
            let reading = session.recv().await?;
            Some((reading, session))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reading(id: i64) -> Reading {
        Reading {
            id,
            device_id: "A".to_string(),
            metrics: [("temperature".to_string(), id as f64)].into_iter().collect(),
            timestamp: id,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn broadcast_reaches_every_connected_session_once() {
        let registry = Arc::new(SessionRegistry::new(8));
        let mut first = registry.connect();
        let mut second = registry.connect();

        let report = registry.broadcast(reading(1));
        assert_eq!(report.delivered, 2);

        assert_eq!(first.try_recv().map(|r| r.id), Some(1));
        assert_eq!(second.try_recv().map(|r| r.id), Some(1));
        assert!(first.try_recv().is_none());
        assert!(second.try_recv().is_none());
    }

    #[test]
    fn late_joiners_never_see_earlier_broadcasts() {
        let registry = Arc::new(SessionRegistry::new(8));
        let _early = registry.connect();
        registry.broadcast(reading(1));

        let mut late = registry.connect();
        assert!(late.try_recv().is_none());

        registry.broadcast(reading(2));
        assert_eq!(late.try_recv().map(|r| r.id), Some(2));
    }

    #[test]
    fn dropping_a_session_disconnects_it() {
        let registry = Arc::new(SessionRegistry::new(8));
        let session = registry.connect();
        let _other = registry.connect();
        assert_eq!(registry.session_count(), 2);

        drop(session);
        assert_eq!(registry.session_count(), 1);
        assert_eq!(registry.broadcast(reading(1)).delivered, 1);
    }

    #[test]
    fn full_queue_drops_for_that_session_only() {
        let registry = Arc::new(SessionRegistry::new(1));
        let mut slow = registry.connect();
        let mut fast = registry.connect();

        assert_eq!(registry.broadcast(reading(1)).delivered, 2);
        assert_eq!(fast.try_recv().map(|r| r.id), Some(1));

        let report = registry.broadcast(reading(2));
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(fast.try_recv().map(|r| r.id), Some(2));

        // The slow session still has reading 1 and is still registered.
        assert_eq!(slow.try_recv().map(|r| r.id), Some(1));
        assert!(slow.try_recv().is_none());
        assert_eq!(registry.session_count(), 2);
    }

    #[test]
    fn disconnect_is_idempotent() {
        let registry = Arc::new(SessionRegistry::new(4));
        let session = registry.connect();
        let id = session.id();
        assert!(registry.disconnect(id));
        assert!(!registry.disconnect(id));
        drop(session);
        assert_eq!(registry.session_count(), 0);
    }

    #[tokio::test]
    async fn stream_yields_broadcasts_in_order() {
        use futures::StreamExt;

        let registry = Arc::new(SessionRegistry::new(8));
        let stream = registry.connect().into_stream();
        registry.broadcast(reading(1));
        registry.broadcast(reading(2));

        let ids: Vec<i64> = stream.take(2).map(|r| r.id).collect().await;
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(registry.session_count(), 0);
    }
}
