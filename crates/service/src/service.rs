//! The dialogue component: routes bus events through the inbound gate and
//! publishes replies.

use std::sync::Arc;

use llamaskill_agent::{ConversationSession, InboundGate, Outcome, SessionConfigBuilder};
use llamaskill_config::{AppConfig, GateConfig, ServiceSettings};
use llamaskill_core::error::{Error, Result};
use llamaskill_core::event::{Event, EventBus, EventPayload, TextSignal, timestamp_now};
use tracing::{debug, info};

use crate::scenario::ScenarioSource;
use crate::worker::{EventProcessor, TopicWorker, subscribe};

const WORKER_NAME: &str = "llama";

/// Per-event logic run inside the worker task.
pub struct LlamaProcessor {
    settings: ServiceSettings,
    gate: InboundGate,
    bus: Arc<dyn EventBus>,
    scenario: Arc<dyn ScenarioSource>,
    active: bool,
}

impl LlamaProcessor {
    pub fn new(
        settings: ServiceSettings,
        gate: InboundGate,
        bus: Arc<dyn EventBus>,
        scenario: Arc<dyn ScenarioSource>,
    ) -> Self {
        // Without an intention topic there is nothing to wait for.
        let active = settings.topic_intention.is_none();
        Self {
            settings,
            gate,
            bus,
            scenario,
            active,
        }
    }

    /// Topics to subscribe to, intention topic first.
    pub fn topics(&self) -> Vec<String> {
        self.settings
            .topic_intention
            .iter()
            .chain(std::iter::once(&self.settings.topic_input))
            .cloned()
            .collect()
    }

    pub fn gate(&self) -> &InboundGate {
        &self.gate
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Wrap a reply as an outbound text signal for the current scenario.
    pub fn create_payload(&self, response: &str) -> Event {
        let now = timestamp_now();
        let signal =
            TextSignal::for_scenario(self.scenario.current_scenario_id(), now, now, response);
        Event::for_payload(EventPayload::Text(signal))
    }

    fn publish(&self, response: &str) -> Result<()> {
        let event = self.create_payload(response);
        debug!(topic = %self.settings.topic_output, id = %event.metadata.id, "Publishing reply");
        self.bus.publish(&self.settings.topic_output, event)?;
        Ok(())
    }

    fn on_intention(&mut self, event: &Event) -> Result<()> {
        let EventPayload::Intention(intention) = &event.payload else {
            return Err(malformed(event, "expected an intention payload"));
        };

        let was_active = self.active;
        self.active = intention
            .labels
            .iter()
            .any(|label| self.settings.intentions.contains(label));

        if self.active != was_active {
            info!(labels = ?intention.labels, active = self.active, "Intention changed");
        }
        if self.active && !was_active {
            if let Some(greeting) = self.settings.greeting.clone() {
                self.publish(&greeting)?;
            }
        }
        Ok(())
    }

    async fn on_text(&mut self, event: &Event) -> Result<()> {
        if !self.active {
            debug!(id = %event.metadata.id, "Skill inactive, ignoring utterance");
            return Ok(());
        }

        let Some(signal) = event.text_signal() else {
            return Err(malformed(event, "expected a text payload"));
        };
        let Some(text) = signal.text.as_deref() else {
            return Err(malformed(event, "missing text body"));
        };

        match self.gate.handle(text).await? {
            Outcome::Replied(response) => self.publish(&response),
            Outcome::Absorbed | Outcome::Silent => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl EventProcessor for LlamaProcessor {
    async fn process(&mut self, event: &Event) -> Result<()> {
        let topic = event.metadata.topic.as_str();
        if self.settings.topic_intention.as_deref() == Some(topic) {
            self.on_intention(event)
        } else if topic == self.settings.topic_input {
            self.on_text(event).await
        } else {
            debug!(topic, "Ignoring event on unexpected topic");
            Ok(())
        }
    }
}

fn malformed(event: &Event, reason: &str) -> Error {
    Error::MalformedEvent {
        topic: event.metadata.topic.clone(),
        reason: reason.to_string(),
    }
}

/// The llama skill as a startable, stoppable bus component.
pub struct LlamaService {
    processor: Option<LlamaProcessor>,
    worker: Option<TopicWorker<LlamaProcessor>>,
    bus: Arc<dyn EventBus>,
}

impl LlamaService {
    pub fn new(processor: LlamaProcessor, bus: Arc<dyn EventBus>) -> Self {
        Self {
            processor: Some(processor),
            worker: None,
            bus,
        }
    }

    /// Build the service and its backend session from configuration.
    ///
    /// Fails when a required `[llama]` setting is missing.
    pub fn from_config(
        config: &AppConfig,
        bus: Arc<dyn EventBus>,
        scenario: Arc<dyn ScenarioSource>,
    ) -> Result<Self> {
        let settings = config.llama.resolve().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let session_config = SessionConfigBuilder::from_config(&config.llama).build();
        let session = ConversationSession::connect(session_config)?;
        Ok(Self::with_session(settings, &config.gate, session, bus, scenario))
    }

    /// Build the service around an existing session.
    pub fn with_session(
        settings: ServiceSettings,
        gate: &GateConfig,
        session: ConversationSession,
        bus: Arc<dyn EventBus>,
        scenario: Arc<dyn ScenarioSource>,
    ) -> Self {
        let gate = InboundGate::from_config(gate, session);
        let processor = LlamaProcessor::new(settings, gate, Arc::clone(&bus), scenario);
        Self::new(processor, bus)
    }

    /// Subscribe and start the worker. Returns once it is running.
    pub async fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            debug!("Service already running");
            return Ok(());
        }
        let lost = || Error::Internal("service lost its state in a failed stop".into());

        // A rejected topic leaves the processor in place.
        let topics = self.processor.as_ref().ok_or_else(lost)?.topics();
        let subscriptions = subscribe(self.bus.as_ref(), &topics)?;

        let processor = self.processor.take().ok_or_else(lost)?;
        let worker = TopicWorker::start(WORKER_NAME, subscriptions, processor).await?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the worker and wait for it. A no-op if not running.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            debug!("Service not running, nothing to stop");
            return Ok(());
        };
        self.processor = Some(worker.stop().await?);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// The processor, while the service is stopped.
    pub fn processor(&self) -> Option<&LlamaProcessor> {
        self.processor.as_ref()
    }
}
