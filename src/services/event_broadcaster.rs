//! Fan-out of progress events to observers.
//!
//! Each observer owns a worker task fed by its own unbounded channel, so a
//! slow or failing observer never delays the caller or the other observers,
//! and every observer sees events in emission order.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::models::ProgressEvent;
use crate::domain::ports::Observer;

struct Subscriber {
    name: &'static str,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

/// Broadcasts progress events to a fixed set of observers.
pub struct EventBroadcaster {
    subscribers: Vec<Subscriber>,
}

impl EventBroadcaster {
    /// Register `observers` and spawn their workers.
    ///
    /// Must be called inside a Tokio runtime. Workers exit once the
    /// broadcaster is dropped and their queues drain.
    pub fn new(observers: Vec<Arc<dyn Observer>>) -> Self {
        let subscribers = observers
            .into_iter()
            .map(|observer| {
                let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
                let name = observer.name();
                tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        observer.listen(&event).await;
                    }
                    debug!(observer = observer.name(), "observer worker stopped");
                });
                Subscriber { name, tx }
            })
            .collect();

        Self { subscribers }
    }

    /// Hand `event` to every observer without waiting for delivery.
    pub fn broadcast(&self, event: ProgressEvent) {
        for subscriber in &self.subscribers {
            if subscriber.tx.send(event.clone()).is_err() {
                warn!(
                    observer = subscriber.name,
                    process_id = %event.process_id,
                    "observer worker gone, dropping event"
                );
            }
        }
    }

    /// Number of subscribed observers.
    pub fn observer_count(&self) -> usize {
        self.subscribers.len()
    }
}
