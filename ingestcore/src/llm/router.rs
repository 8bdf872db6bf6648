//! Dispatches completion calls to a primary provider with one fallback
//! retry on failure (§4.3).

use std::sync::Arc;

use tracing::{debug, warn};

use super::error::LlmError;
use super::provider::LlmProvider;
use super::types::{CompletionRequest, CompletionResponse};

/// Per-stage override: triage, stage1, stage2, relevance, and enrichment
/// re-extract can each pin a different provider/model/max_tokens (§4.3).
#[derive(Debug, Clone, Default)]
pub struct StageOverride {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
}

pub struct Router {
    primary: Arc<dyn LlmProvider>,
    fallback: Option<Arc<dyn LlmProvider>>,
    fallback_model: Option<String>,
}

impl Router {
    pub fn new(primary: Arc<dyn LlmProvider>) -> Self {
        Self {
            primary,
            fallback: None,
            fallback_model: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn LlmProvider>, fallback_model: impl Into<String>) -> Self {
        self.fallback = Some(fallback);
        self.fallback_model = Some(fallback_model.into());
        self
    }

    /// Call the primary provider; on any error, if a fallback is configured,
    /// retry once on the fallback with its own model. If the fallback also
    /// fails, re-raise the original error (§4.3).
    pub async fn call(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        debug!(provider = self.primary.name(), model = %request.model, "router: calling primary");
        match self.primary.call(request.clone()).await {
            Ok(response) => Ok(response),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(primary_err);
                };
                warn!(
                    error = %primary_err,
                    fallback_provider = fallback.name(),
                    "router: primary failed, retrying once on fallback"
                );
                let mut fallback_request = request;
                if let Some(model) = &self.fallback_model {
                    fallback_request.model = model.clone();
                }
                match fallback.call(fallback_request).await {
                    Ok(response) => Ok(response),
                    Err(_fallback_err) => Err(primary_err),
                }
            }
        }
    }
}
