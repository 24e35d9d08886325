//! Event-bus adapter for the llamaskill gate.
//!
//! [`LlamaService`] subscribes to the configured input topic (and,
//! optionally, an intention topic), feeds each text signal through the
//! [`InboundGate`](llamaskill_agent::InboundGate) and publishes replies on
//! the output topic. Messages are handled one at a time by a single
//! [`TopicWorker`] task.

pub mod scenario;
pub mod service;
pub mod worker;

pub use scenario::{ScenarioSource, StaticScenario};
pub use service::{LlamaProcessor, LlamaService};
pub use worker::{EventProcessor, Subscription, TopicWorker, subscribe};
