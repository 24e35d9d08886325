//! Shared test helpers for session and gate tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use llamaskill_core::error::ProviderError;
use llamaskill_core::message::Message;
use llamaskill_core::provider::{
    ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk,
};

/// A mock provider that streams scripted replies.
///
/// Each call to `stream` consumes the next script (a list of fragments).
/// Panics if more calls are made than scripts provided, unless built with
/// [`ScriptedProvider::repeating`].
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<String>>>,
    repeat: Option<String>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Vec<&str>>) -> Self {
        Self {
            scripts: Mutex::new(
                scripts
                    .into_iter()
                    .map(|s| s.into_iter().map(String::from).collect())
                    .collect(),
            ),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every request with the same single fragment.
    pub fn repeating(text: &str) -> Self {
        Self {
            repeat: Some(text.to_string()),
            ..Self::new(vec![])
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    fn next_script(&self, request: ProviderRequest) -> Vec<String> {
        self.requests.lock().unwrap().push(request);
        if let Some(text) = &self.repeat {
            return vec![text.clone()];
        }
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: no more scripts"))
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let text = self.next_script(request).concat();
        Ok(ProviderResponse {
            message: Message::assistant(text),
            model,
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let fragments = self.next_script(request);
        let (tx, rx) = tokio::sync::mpsc::channel(fragments.len() + 1);
        for fragment in fragments {
            tx.send(Ok(StreamChunk {
                content: Some(fragment),
                done: false,
            }))
            .await
            .unwrap();
        }
        tx.send(Ok(StreamChunk {
            content: None,
            done: true,
        }))
        .await
        .unwrap();
        Ok(rx)
    }
}

/// A mock provider that fails, either up front or after one fragment.
pub struct FailingProvider {
    fragment: Option<String>,
    error: ProviderError,
}

impl FailingProvider {
    pub fn new(error: ProviderError) -> Self {
        Self {
            fragment: None,
            error,
        }
    }

    pub fn mid_stream(fragment: &str, error: ProviderError) -> Self {
        Self {
            fragment: Some(fragment.to_string()),
            error,
        }
    }
}

#[async_trait::async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(self.error.clone())
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let Some(fragment) = &self.fragment else {
            return Err(self.error.clone());
        };
        let (tx, rx) = tokio::sync::mpsc::channel(2);
        tx.send(Ok(StreamChunk {
            content: Some(fragment.clone()),
            done: false,
        }))
        .await
        .unwrap();
        tx.send(Err(self.error.clone())).await.unwrap();
        Ok(rx)
    }
}
