//! A single task that drains a set of bus topics, one event at a time.

use std::sync::Arc;

use futures::future::select_all;
use llamaskill_core::error::{Error, Result};
use llamaskill_core::event::{Event, EventBus};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handles the events a [`TopicWorker`] receives.
#[async_trait::async_trait]
pub trait EventProcessor: Send + 'static {
    /// Handle one event. An error is logged and the event dropped; the
    /// worker keeps running.
    async fn process(&mut self, event: &Event) -> Result<()>;
}

/// A topic and its bus receiver.
pub type Subscription = (String, broadcast::Receiver<Arc<Event>>);

/// Subscribe to every topic in order. Fails on the first topic the bus
/// rejects.
pub fn subscribe(bus: &dyn EventBus, topics: &[String]) -> Result<Vec<Subscription>> {
    topics
        .iter()
        .map(|topic| Ok((topic.clone(), bus.subscribe(topic)?)))
        .collect()
}

/// Owns the task that feeds subscribed events to an [`EventProcessor`].
///
/// Events are processed strictly one after another. When several topics
/// have events pending, topics earlier in the subscription list go first.
pub struct TopicWorker<P> {
    name: String,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<P>,
}

impl<P: EventProcessor> TopicWorker<P> {
    /// Spawn the worker task over `subscriptions`, see [`subscribe`].
    ///
    /// Returns once the task is running, so events published after
    /// subscribing are guaranteed to be seen.
    pub async fn start(
        name: impl Into<String>,
        subscriptions: Vec<Subscription>,
        processor: P,
    ) -> Result<Self> {
        let name = name.into();
        let topics: Vec<&str> = subscriptions.iter().map(|(t, _)| t.as_str()).collect();
        info!(worker = %name, topics = ?topics, "Starting worker");

        let (stop_tx, stop_rx) = watch::channel(false);
        let (ready_tx, ready_rx) = oneshot::channel();

        let handle = tokio::spawn(run(name.clone(), subscriptions, processor, stop_rx, ready_tx));

        ready_rx
            .await
            .map_err(|_| Error::Internal(format!("worker '{name}' exited before starting")))?;
        debug!(worker = %name, "Worker running");

        Ok(Self {
            name,
            stop_tx,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Signal the task to stop and wait for it.
    ///
    /// An event already being processed is finished first. Returns the
    /// processor so its state survives a restart.
    pub async fn stop(self) -> Result<P> {
        // The task may already be gone if every topic closed.
        let _ = self.stop_tx.send(true);
        let processor = self
            .handle
            .await
            .map_err(|e| Error::Internal(format!("worker '{}' failed: {e}", self.name)))?;
        info!(worker = %self.name, "Worker stopped");
        Ok(processor)
    }
}

async fn run<P: EventProcessor>(
    name: String,
    mut receivers: Vec<Subscription>,
    mut processor: P,
    mut stop_rx: watch::Receiver<bool>,
    ready_tx: oneshot::Sender<()>,
) -> P {
    let _ = ready_tx.send(());

    loop {
        if *stop_rx.borrow() || receivers.is_empty() {
            break;
        }

        let next = tokio::select! {
            biased;
            _ = stop_rx.changed() => None,
            (result, index, _) = select_all(receivers.iter_mut().map(|(_, rx)| Box::pin(rx.recv()))) => {
                Some((result, index))
            }
        };

        let Some((result, index)) = next else {
            break;
        };

        match result {
            Ok(event) => {
                debug!(worker = %name, topic = %event.metadata.topic, id = %event.metadata.id, "Processing event");
                if let Err(e) = processor.process(&event).await {
                    warn!(worker = %name, topic = %event.metadata.topic, error = %e, "Dropping event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(worker = %name, topic = %receivers[index].0, skipped, "Worker lagged behind, events lost");
            }
            Err(broadcast::error::RecvError::Closed) => {
                let (topic, _) = receivers.remove(index);
                debug!(worker = %name, topic = %topic, "Topic closed");
            }
        }
    }

    processor
}
