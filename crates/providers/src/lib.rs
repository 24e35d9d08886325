//! Chat-completion backend clients for llamaskill.
//!
//! All providers implement the `llamaskill_core::Provider` trait. The only
//! production backend is a locally hosted OpenAI-compatible server
//! (llama.cpp, LM Studio, vLLM, Ollama, ...).

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
