//! # llamaskill Core
//!
//! Domain types, traits, and error definitions for the llamaskill
//! conversational component. This crate has **no HTTP or config
//! dependencies**: it defines the model that the provider, agent and
//! service crates implement against.
//!
//! ## Layout
//!
//! - [`message`]: conversation turns and the bounded history
//! - [`provider`]: the chat-completion backend abstraction
//! - [`event`]: bus events and the topic-based [`EventBus`] trait
//! - [`error`]: error enums per bounded context

pub mod error;
pub mod event;
pub mod message;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use error::{BusError, Error, ProviderError, Result};
pub use event::{
    Event, EventBus, EventMetadata, EventPayload, InMemoryEventBus, IntentionSignal, TextSignal,
};
pub use message::{Conversation, Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
