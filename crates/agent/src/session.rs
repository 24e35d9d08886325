//! The conversation session: a bounded chat history and the exchange with
//! the chat-completion backend.

use std::sync::Arc;
use std::time::Duration;

use llamaskill_config::LlamaConfig;
use llamaskill_core::error::Result;
use llamaskill_core::message::{Conversation, Message};
use llamaskill_core::provider::{Provider, ProviderRequest};
use llamaskill_providers::OpenAiCompatProvider;
use tracing::{debug, info};

/// Persona preamble. `{language}` is substituted at session creation.
pub const DEFAULT_PERSONA: &str = "Jij bent een robot. \
    Je geeft altijd een antwoord dat juist is en nuttig en je stelt ook zelf vragen. \
    Je geeft een kort en bondig antwoord in de taal {language}. \
    Switch niet naar het Engels over!";

/// Immutable settings a session is created from.
///
/// The system preamble is rendered from these once, when the session is
/// built. Build a new session to change language or backend.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    language: String,
    port: u16,
    model: String,
    temperature: f32,
    max_history: usize,
    api_key: String,
    persona: String,
    request_timeout: Option<Duration>,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Connection target of the local backend.
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}/v1", self.port)
    }

    /// The system preamble for this language.
    pub fn preamble(&self) -> String {
        self.persona.replace("{language}", &self.language)
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// History length at which `generate` resets the conversation.
    pub fn max_history(&self) -> usize {
        self.max_history
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

/// Builder for [`SessionConfig`].
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            config: SessionConfig {
                language: "Nederlands".into(),
                port: 9001,
                model: "local-model".into(),
                temperature: 0.5,
                max_history: 30,
                api_key: "not-needed".into(),
                persona: DEFAULT_PERSONA.into(),
                request_timeout: Some(Duration::from_secs(120)),
            },
        }
    }
}

impl SessionConfigBuilder {
    /// Start from the `[llama]` table. Unset language/port keep the defaults.
    pub fn from_config(llama: &LlamaConfig) -> Self {
        let mut builder = Self::default()
            .model(llama.model.clone())
            .temperature(llama.temperature)
            .max_history(llama.max_history)
            .api_key(llama.api_key.clone())
            .request_timeout(match llama.request_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            });

        if let Some(language) = &llama.language {
            builder = builder.language(language.as_str());
        }
        if let Some(port) = llama.port {
            builder = builder.port(port);
        }
        if let Some(persona) = &llama.persona {
            builder = builder.persona(persona.clone());
        }
        builder
    }

    /// Surrounding whitespace is dropped.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.config.language = language.into().trim().to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Values below 1 are raised to 1.
    pub fn max_history(mut self, max_history: usize) -> Self {
        self.config.max_history = max_history.max(1);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.config.api_key = api_key.into();
        self
    }

    /// Persona template; `{language}` is replaced by the language.
    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.config.persona = persona.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// A single shared conversation with the chat-completion backend.
pub struct ConversationSession {
    config: SessionConfig,
    provider: Arc<dyn Provider>,
    history: Conversation,
}

impl ConversationSession {
    /// Create a session that talks to the given provider.
    pub fn new(config: SessionConfig, provider: Arc<dyn Provider>) -> Self {
        let history = Conversation::with_system(config.preamble());
        debug!(
            conversation_id = %history.id,
            language = %config.language,
            provider = %provider.name(),
            "Session created"
        );
        Self {
            config,
            provider,
            history,
        }
    }

    /// Create a session backed by the local OpenAI-compatible server.
    pub fn connect(config: SessionConfig) -> Result<Self> {
        let provider = OpenAiCompatProvider::new(
            "local",
            config.base_url(),
            config.api_key.clone(),
            config.request_timeout,
        )?;
        Ok(Self::new(config, Arc::new(provider)))
    }

    /// Remember an utterance without replying to it.
    pub fn absorb(&mut self, text: &str) {
        self.history.push(Message::user(text));
        debug!(
            conversation_id = %self.history.id,
            turns = self.history.len(),
            "Absorbed utterance into context"
        );
    }

    /// Send `text` with the full history to the backend and return the reply.
    ///
    /// An empty reply is returned as `""`. On failure the user turn stays in
    /// the history and no assistant turn is added.
    pub async fn generate(&mut self, text: &str) -> Result<String> {
        if self.history.len() >= self.config.max_history {
            info!(
                conversation_id = %self.history.id,
                turns = self.history.len(),
                cap = self.config.max_history,
                "History cap reached, resetting conversation"
            );
            self.history.reset();
        }

        self.history.push(Message::user(text));

        let request = ProviderRequest {
            model: self.config.model.clone(),
            messages: self.history.messages().to_vec(),
            temperature: self.config.temperature,
            stream: true,
        };

        let mut rx = self.provider.stream(request).await?;

        let mut reply = String::new();
        let mut fragments = 0usize;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content {
                fragments += 1;
                reply.push_str(&content);
            }
            if chunk.done {
                break;
            }
        }

        self.history.push(Message::assistant(reply.clone()));

        debug!(
            conversation_id = %self.history.id,
            fragments,
            chars = reply.chars().count(),
            turns = self.history.len(),
            "Generated reply"
        );

        Ok(reply)
    }

    pub fn history(&self) -> &Conversation {
        &self.history
    }

    /// Number of turns, the system turn included.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// The rendered system preamble.
    pub fn preamble(&self) -> &str {
        &self.history.system().content
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, ScriptedProvider};
    use llamaskill_core::error::{Error, ProviderError};
    use llamaskill_core::message::Role;

    fn config() -> SessionConfig {
        SessionConfig::builder().language("Nederlands").port(9001).build()
    }

    #[test]
    fn builder_defaults() {
        let config = SessionConfig::builder().build();
        assert_eq!(config.language(), "Nederlands");
        assert_eq!(config.port(), 9001);
        assert_eq!(config.model(), "local-model");
        assert_eq!(config.max_history(), 30);
        assert!((config.temperature() - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn base_url_uses_port() {
        let config = SessionConfig::builder().port(1234).build();
        assert_eq!(config.base_url(), "http://localhost:1234/v1");
    }

    #[test]
    fn preamble_embeds_language() {
        let config = SessionConfig::builder().language("Frysk").build();
        let preamble = config.preamble();
        assert!(preamble.contains("in de taal Frysk."));
        assert!(!preamble.contains("{language}"));
    }

    #[test]
    fn from_config_applies_table() {
        let llama = LlamaConfig {
            language: Some("English".into()),
            port: Some(8080),
            max_history: 10,
            request_timeout_secs: 0,
            persona: Some("Speak {language}.".into()),
            ..LlamaConfig::default()
        };
        let config = SessionConfigBuilder::from_config(&llama).build();
        assert_eq!(config.language(), "English");
        assert_eq!(config.port(), 8080);
        assert_eq!(config.max_history(), 10);
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.preamble(), "Speak English.");
    }

    #[test]
    fn padded_language_is_trimmed() {
        let llama = LlamaConfig {
            language: Some(" Frysk ".into()),
            ..LlamaConfig::default()
        };
        let config = SessionConfigBuilder::from_config(&llama).build();
        assert_eq!(config.language(), "Frysk");
        assert!(config.preamble().contains("in de taal Frysk."));
    }

    #[test]
    fn new_session_holds_only_preamble() {
        let session = ConversationSession::new(config(), Arc::new(ScriptedProvider::new(vec![])));
        assert_eq!(session.len(), 1);
        assert_eq!(session.history().system().role, Role::System);
        assert!(session.preamble().contains("Nederlands"));
        assert_eq!(session.preamble(), session.config().preamble());
    }

    #[test]
    fn connect_builds_local_provider() {
        let session = ConversationSession::connect(config()).unwrap();
        assert_eq!(session.provider_name(), "local");
    }

    #[test]
    fn absorb_appends_one_user_turn() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut session = ConversationSession::new(config(), provider.clone());

        session.absorb("Leuk weertje vandaag");

        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().last().role, Role::User);
        assert_eq!(session.history().last().content, "Leuk weertje vandaag");
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn generate_concatenates_fragments_in_order() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["Goed", ", dank ", "je!"]]));
        let mut session = ConversationSession::new(config(), provider.clone());

        let reply = session.generate("Hoe gaat het?").await.unwrap();

        assert_eq!(reply, "Goed, dank je!");
        let messages = session.history().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "Hoe gaat het?");
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "Goed, dank je!");
    }

    #[tokio::test]
    async fn generate_sends_full_history_as_streaming_request() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["ok"]]));
        let mut session = ConversationSession::new(config(), provider.clone());

        session.absorb("eerste");
        session.generate("tweede").await.unwrap();

        let request = provider.last_request().unwrap();
        assert!(request.stream);
        assert_eq!(request.model, "local-model");
        assert!((request.temperature - 0.5).abs() < f32::EPSILON);
        let roles: Vec<Role> = request.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::User]);
        assert_eq!(request.messages[2].content, "tweede");
    }

    #[tokio::test]
    async fn empty_reply_is_not_an_error() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![]]));
        let mut session = ConversationSession::new(config(), provider);

        let reply = session.generate("...").await.unwrap();

        assert_eq!(reply, "");
        assert_eq!(session.history().len(), 3);
        assert_eq!(session.history().last().content, "");
    }

    #[tokio::test]
    async fn cap_reached_resets_before_appending() {
        let provider = Arc::new(ScriptedProvider::repeating("antwoord"));
        let mut session = ConversationSession::new(config(), provider);

        for i in 0..29 {
            session.absorb(&format!("zin {i}"));
        }
        assert_eq!(session.history().len(), 30);

        session.generate("nieuw").await.unwrap();

        let messages = session.history().messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "nieuw");
        assert_eq!(messages[2].content, "antwoord");
    }

    #[tokio::test]
    async fn below_cap_appends_two_turns() {
        let provider = Arc::new(ScriptedProvider::repeating("antwoord"));
        let mut session = ConversationSession::new(config(), provider);

        for i in 0..28 {
            session.absorb(&format!("zin {i}"));
        }
        assert_eq!(session.history().len(), 29);

        session.generate("nog een").await.unwrap();
        assert_eq!(session.history().len(), 31);
    }

    #[tokio::test]
    async fn cap_is_configurable() {
        let provider = Arc::new(ScriptedProvider::repeating("a"));
        let config = SessionConfig::builder().max_history(3).build();
        let mut session = ConversationSession::new(config, provider);

        session.generate("een").await.unwrap();
        assert_eq!(session.history().len(), 3);
        session.generate("twee").await.unwrap();
        assert_eq!(session.history().len(), 3);
        assert_eq!(session.history().messages()[1].content, "twee");
    }

    #[tokio::test]
    async fn backend_failure_propagates() {
        let provider = Arc::new(FailingProvider::new(ProviderError::Network(
            "connection refused".into(),
        )));
        let mut session = ConversationSession::new(config(), provider);

        let err = session.generate("hallo").await.unwrap_err();

        assert!(matches!(err, Error::Backend(ProviderError::Network(_))));
        // User turn stays as context, no assistant turn
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history().last().role, Role::User);
    }

    #[tokio::test]
    async fn mid_stream_failure_propagates() {
        let provider = Arc::new(FailingProvider::mid_stream(
            "half",
            ProviderError::StreamInterrupted("reset by peer".into()),
        ));
        let mut session = ConversationSession::new(config(), provider);

        let err = session.generate("hallo").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Backend(ProviderError::StreamInterrupted(_))
        ));
        assert_eq!(session.history().last().role, Role::User);
    }
}
