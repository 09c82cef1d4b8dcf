use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::trace;

use browserflow_core_types::{ProgressEvent, ProgressReporter, RunId, StopChecker};

/// In-memory progress bus. Events are broadcast to live subscribers and
/// retained per run so late readers can replay them.
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressEvent>,
    history: Mutex<Vec<ProgressEvent>>,
    history_limit: usize,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self {
            sender,
            history: Mutex::new(Vec::new()),
            history_limit: capacity.max(1) * 16,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    /// Recorded events for one run, oldest first.
    pub fn history(&self, run_id: &RunId) -> Vec<ProgressEvent> {
        self.history
            .lock()
            .iter()
            .filter(|event| &event.run_id == run_id)
            .cloned()
            .collect()
    }

    pub fn clear_run(&self, run_id: &RunId) {
        self.history.lock().retain(|event| &event.run_id != run_id);
    }
}

#[async_trait]
impl ProgressReporter for ProgressBus {
    async fn report(&self, event: ProgressEvent) {
        {
            let mut history = self.history.lock();
            if history.len() >= self.history_limit {
                let overflow = history.len() + 1 - self.history_limit;
                history.drain(..overflow);
            }
            history.push(event.clone());
        }
        // No subscribers is not an error for progress delivery.
        if self.sender.send(event).is_err() {
            trace!("progress event dropped: no subscribers");
        }
    }
}

/// Forwards bus events into an mpsc receiver so callers can await them
/// without handling broadcast lag.
pub fn to_mpsc(bus: Arc<ProgressBus>, capacity: usize) -> mpsc::Receiver<ProgressEvent> {
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    trace!(skipped, "progress forwarder lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    out_rx
}

/// Stop requests keyed by run id; a request is consumed when observed.
#[derive(Default)]
pub struct StopRegistry {
    requests: DashMap<RunId, ()>,
}

impl StopRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_stop(&self, run_id: &RunId) {
        self.requests.insert(run_id.clone(), ());
    }

    pub fn is_pending(&self, run_id: &RunId) -> bool {
        self.requests.contains_key(run_id)
    }
}

#[async_trait]
impl StopChecker for StopRegistry {
    async fn take_stop_request(&self, run_id: &RunId) -> bool {
        self.requests.remove(run_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use browserflow_core_types::ProgressStatus;

    #[tokio::test]
    async fn bus_broadcasts_and_keeps_history() {
        let bus = ProgressBus::new(8);
        let mut rx = to_mpsc(bus.clone(), 8);
        let run = RunId("run-a".into());

        bus.report(ProgressEvent::new(run.clone(), "a1", 0, ProgressStatus::Running))
            .await;
        bus.report(ProgressEvent::new(run.clone(), "a1", 0, ProgressStatus::Success))
            .await;
        bus.report(ProgressEvent::new(
            RunId("run-b".into()),
            "b1",
            0,
            ProgressStatus::Skipped,
        ))
        .await;

        let history = bus.history(&run);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].status, ProgressStatus::Success);

        bus.clear_run(&run);
        assert!(bus.history(&run).is_empty());
        assert_eq!(bus.history(&RunId("run-b".into())).len(), 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.action_id, "a1");
        assert_eq!(first.status, ProgressStatus::Running);
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let bus = ProgressBus::new(1);
        let run = RunId("bounded".into());
        for idx in 0..40 {
            bus.report(ProgressEvent::new(run.clone(), "a", idx, ProgressStatus::Running))
                .await;
        }
        let history = bus.history(&run);
        assert_eq!(history.len(), 16);
        assert_eq!(history.last().map(|e| e.index), Some(39));
    }

    #[tokio::test]
    async fn stop_request_is_cleared_once_observed() {
        let registry = StopRegistry::new();
        let run = RunId("stop-me".into());
        assert!(!registry.take_stop_request(&run).await);

        registry.request_stop(&run);
        assert!(registry.is_pending(&run));
        assert!(registry.take_stop_request(&run).await);
        assert!(!registry.take_stop_request(&run).await);
    }
}
