//! The inbound gate: decides per utterance whether to reply or to only
//! remember it, and drives the session accordingly.

use std::collections::HashSet;

use llamaskill_config::{GateConfig, MatchOrder};
use llamaskill_core::error::Result;
use tracing::{debug, info};

use crate::phrases::{PhraseBanks, RandomSource, ThreadRandom};
use crate::session::ConversationSession;

/// Punctuation trimmed from the end of every token.
const TRAILING_PUNCTUATION: &[char] = &['.', '?', '!', ',', ';', ':'];

/// Lowercase, drop trailing `.`/`?`, split into word tokens.
pub fn normalize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .trim_end_matches(['.', '?'])
        .split_whitespace()
        .map(|token| token.trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|token| !token.is_empty())
        .map(String::from)
        .collect()
}

fn keyword_set<S: Into<String>>(words: impl IntoIterator<Item = S>) -> HashSet<String> {
    words
        .into_iter()
        .map(|word| word.into().trim().to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

/// What to do with an utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Reply; `topic` is the matched topic word to echo, if any.
    Respond { topic: Option<String> },
    /// Only keep the utterance as context.
    Absorb,
}

/// Static keyword matcher over normalized tokens.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    topics: HashSet<String>,
    acks: HashSet<String>,
    order: MatchOrder,
}

impl KeywordClassifier {
    /// Keywords are trimmed and lowercased to match normalized tokens;
    /// blank ones are dropped.
    pub fn new<T, A, S>(topics: T, acks: A, order: MatchOrder) -> Self
    where
        T: IntoIterator<Item = S>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            topics: keyword_set(topics),
            acks: keyword_set(acks),
            order,
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(
            config.topic_keywords.iter().cloned(),
            config.ack_keywords.iter().cloned(),
            config.match_order,
        )
    }

    /// First matching token wins. With no topic words configured every
    /// utterance gets a reply.
    pub fn classify(&self, text: &str) -> Classification {
        if self.topics.is_empty() {
            return Classification::Respond { topic: None };
        }

        for token in normalize(text) {
            let is_ack = self.acks.contains(&token);
            let is_topic = self.topics.contains(&token);
            let ack_wins = match self.order {
                MatchOrder::AckFirst => is_ack,
                MatchOrder::TopicFirst => is_ack && !is_topic,
            };

            if ack_wins {
                return Classification::Respond { topic: None };
            }
            if is_topic {
                return Classification::Respond { topic: Some(token) };
            }
        }

        Classification::Absorb
    }
}

/// Result of handling one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stored as context; nothing to say.
    Absorbed,
    /// A reply to publish, acknowledgment prefix included.
    Replied(String),
    /// The backend had nothing to say.
    Silent,
}

/// Classifies utterances and answers through the session.
pub struct InboundGate {
    classifier: KeywordClassifier,
    phrases: PhraseBanks,
    session: ConversationSession,
    rng: Box<dyn RandomSource>,
}

impl InboundGate {
    pub fn new(
        classifier: KeywordClassifier,
        phrases: PhraseBanks,
        session: ConversationSession,
    ) -> Self {
        Self {
            classifier,
            phrases,
            session,
            rng: Box::new(ThreadRandom),
        }
    }

    pub fn from_config(config: &GateConfig, session: ConversationSession) -> Self {
        Self::new(
            KeywordClassifier::from_config(config),
            PhraseBanks::from_config(config),
            session,
        )
    }

    /// Replace the randomness used to pick phrases.
    pub fn with_random(mut self, rng: impl RandomSource + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    /// Handle one utterance. Backend failures propagate; nothing is
    /// produced for a failed generation.
    pub async fn handle(&mut self, text: &str) -> Result<Outcome> {
        match self.classifier.classify(text) {
            Classification::Absorb => {
                debug!("No keyword matched, absorbing");
                self.session.absorb(text);
                Ok(Outcome::Absorbed)
            }
            Classification::Respond { topic } => {
                let prefix = topic
                    .as_deref()
                    .map(|word| self.phrases.acknowledge(word, self.rng.as_mut()))
                    .unwrap_or_default();

                info!(topic = ?topic, "Generating reply");
                let reply = self.session.generate(text).await?;

                if reply.is_empty() {
                    debug!("Backend returned an empty reply");
                    return Ok(Outcome::Silent);
                }
                Ok(Outcome::Replied(prefix + &reply))
            }
        }
    }

    pub fn session(&self) -> &ConversationSession {
        &self.session
    }
}
