//! A process-wide event bus: listeners register for an event kind and are
//! notified on dispatch. Not on the `perform_benchmarks` call path — this
//! exists for the surrounding engineering texture, the way a long-running
//! service notifies other subsystems of state changes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::timeout;

#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle(&self, event: &Event);
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: String,
    pub payload: serde_json::Value,
}

struct Registration {
    listener: Arc<dyn EventListener>,
    blocking: bool,
    timeout: Duration,
}

/// Maps an event kind to its registered listeners. Dispatch snapshots the
/// listener map under the read lock, then spawns one task per listener;
/// listeners may self-unregister mid-dispatch without disturbing the
/// snapshot already in flight.
#[derive(Default)]
pub struct EventBus {
    listeners: RwLock<HashMap<String, Vec<Registration>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, kind: impl Into<String>, listener: Arc<dyn EventListener>, blocking: bool, timeout: Duration) {
        self.listeners.write().await.entry(kind.into()).or_default().push(Registration {
            listener,
            blocking,
            timeout,
        });
    }

    /// Dispatches `event` to every listener registered for `event.kind`.
    /// Blocking listeners are awaited (bounded by their own timeout);
    /// non-blocking listeners are fired and forgotten.
    pub async fn dispatch(&self, event: Event) {
        let snapshot: Vec<(Arc<dyn EventListener>, bool, Duration)> = {
            let listeners = self.listeners.read().await;
            listeners
                .get(&event.kind)
                .map(|regs| regs.iter().map(|r| (r.listener.clone(), r.blocking, r.timeout)).collect())
                .unwrap_or_default()
        };

        let mut blocking_tasks = Vec::new();
        for (listener, blocking, wait) in snapshot {
            let event = event.clone();
            let task = tokio::spawn(async move { listener.handle(&event).await });
            if blocking {
                blocking_tasks.push((task, wait));
            }
        }
        for (task, wait) in blocking_tasks {
            if timeout(wait, task).await.is_err() {
                tracing::warn!("blocking event listener timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);

    #[async_trait]
    impl EventListener for CountingListener {
        async fn handle(&self, _event: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_dispatch_reaches_blocking_listener() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        bus.register("benchmark.completed", Arc::new(CountingListener(count.clone())), true, Duration::from_secs(1))
            .await;
        bus.dispatch(Event {
            kind: "benchmark.completed".into(),
            payload: serde_json::json!({}),
        })
        .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_ignores_unregistered_kind() {
        let bus = EventBus::new();
        bus.dispatch(Event {
            kind: "nothing.listens".into(),
            payload: serde_json::json!({}),
        })
        .await;
    }
}
