//! The conversational core of llamaskill.
//!
//! Two components, composed linearly:
//!
//! 1. [`InboundGate`] classifies each utterance against two keyword sets
//!    and decides to **respond** (optionally echoing the matched topic) or
//!    to **absorb** it as silent context.
//! 2. [`ConversationSession`] keeps the bounded chat history and streams
//!    replies from the chat-completion backend.

pub mod gate;
pub mod phrases;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use gate::{Classification, InboundGate, KeywordClassifier, Outcome, normalize};
pub use llamaskill_config::MatchOrder;
pub use phrases::{FixedChoices, PhraseBanks, RandomSource, ThreadRandom};
pub use session::{ConversationSession, DEFAULT_PERSONA, SessionConfig, SessionConfigBuilder};
