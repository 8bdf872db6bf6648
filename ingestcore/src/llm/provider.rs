//! Provider abstraction: hot-swappable LLM backends behind one trait (§4.3).

use async_trait::async_trait;

use super::error::LlmError;
use super::types::{CompletionRequest, CompletionResponse};

/// A provider supplies `is_available()` and `call(...)`; the router never
/// inspects provider-specific types beyond this trait.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn is_available(&self) -> bool;

    async fn call(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Anthropic Messages API adapter.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn call(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        super::transport::anthropic_call(&self.client, &self.base_url, &self.api_key, request).await
    }
}

/// OpenAI-compatible chat-completions adapter, also used for self-hosted
/// endpoints that speak the OpenAI wire format (§4.3 "self-hosted provider").
pub struct OpenAiCompatibleProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl OpenAiCompatibleProvider {
    pub fn new(provider_name: impl Into<String>, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            provider_name: provider_name.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn call(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        super::transport::openai_call(&self.client, &self.base_url, &self.api_key, &self.provider_name, request).await
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test double that replays scripted responses/errors in order.
    pub struct MockProvider {
        name: String,
        responses: Mutex<Vec<Result<CompletionResponse, LlmError>>>,
        call_count: AtomicUsize,
    }

    impl MockProvider {
        pub fn new(name: impl Into<String>, responses: Vec<Result<CompletionResponse, LlmError>>) -> Self {
            Self {
                name: name.into(),
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn call(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(LlmError::transient(&self.name, "exhausted", "no more mock responses", None));
            }
            responses.remove(0)
        }
    }
}
