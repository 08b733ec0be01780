use tokio::sync::broadcast;

use super::PipelineEvent;

/// Fan-out of pipeline events to read-only observers
///
/// Bounded and lossy: a receiver that falls more than `capacity` events behind
/// loses the oldest ones and sees `RecvError::Lagged`. Publishing never waits.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; returns how many will see it
    pub fn publish(&self, event: PipelineEvent) -> usize {
        // no subscribers is fine
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
