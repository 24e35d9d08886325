//! Bus events and the topic-based event bus.
//!
//! The dialogue platform connects its components through named topics.
//! This skill consumes text signals (and optionally intentions) and
//! publishes text signals back. [`EventBus`] is the seam to the platform's
//! bus; [`InMemoryEventBus`] is an in-process implementation used by the
//! CLI and the tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::BusError;

/// Current time as UNIX milliseconds, the timestamp unit of text signals.
pub fn timestamp_now() -> i64 {
    Utc::now().timestamp_millis()
}

/// A piece of text said by (or to) the robot within a scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSignal {
    pub id: String,
    pub scenario_id: String,
    /// Creation time (ms)
    pub start: i64,
    /// Production time (ms)
    pub stop: i64,
    /// The utterance. Absent on malformed inbound events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl TextSignal {
    pub fn for_scenario(
        scenario_id: impl Into<String>,
        start: i64,
        stop: i64,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scenario_id: scenario_id.into(),
            start,
            stop,
            text: Some(text.into()),
        }
    }
}

/// Intentions announced by the dialogue manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntentionSignal {
    pub labels: Vec<String>,
}

impl IntentionSignal {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Event payloads carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Text(TextSignal),
    Intention(IntentionSignal),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub id: String,
    /// Filled in by the bus on publish
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

/// An event as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub metadata: EventMetadata,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap a payload in a fresh, not yet published event.
    pub fn for_payload(payload: EventPayload) -> Self {
        Self {
            metadata: EventMetadata {
                id: Uuid::new_v4().to_string(),
                topic: String::new(),
                timestamp: Utc::now(),
            },
            payload,
        }
    }

    /// The text signal, if this is a text event.
    pub fn text_signal(&self) -> Option<&TextSignal> {
        match &self.payload {
            EventPayload::Text(signal) => Some(signal),
            EventPayload::Intention(_) => None,
        }
    }
}

/// Topic-based publish/subscribe.
pub trait EventBus: Send + Sync {
    /// Publish an event on a topic. Having no subscribers is not an error.
    fn publish(&self, topic: &str, event: Event) -> Result<(), BusError>;

    /// Subscribe to all events published on a topic from now on.
    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Arc<Event>>, BusError>;
}

/// A broadcast-based, in-process event bus.
///
/// Uses one `tokio::sync::broadcast` channel per topic, created lazily on
/// first publish or subscribe.
pub struct InMemoryEventBus {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<Arc<Event>>>>,
}

impl InMemoryEventBus {
    /// Create a new event bus with the given per-topic capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn sender(&self, topic: &str) -> Result<broadcast::Sender<Arc<Event>>, BusError> {
        if topic.trim().is_empty() {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }
        let mut topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.clone())
    }

    /// Names of all topics seen so far.
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.lock().unwrap_or_else(PoisonError::into_inner);
        topics.keys().cloned().collect()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, topic: &str, mut event: Event) -> Result<(), BusError> {
        let sender = self.sender(topic)?;
        event.metadata.topic = topic.to_string();
        tracing::trace!(topic, event_id = %event.metadata.id, "Publishing event");
        // Ignore send errors (no subscribers = that's fine)
        let _ = sender.send(Arc::new(event));
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Arc<Event>>, BusError> {
        Ok(self.sender(topic)?.subscribe())
    }
}
