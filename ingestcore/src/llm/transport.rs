//! Wire-format adapters for each provider's HTTP API.
//!
//! Mirrors `AnthropicClient::complete` from the teacher's client, minus
//! streaming (the ingest pipeline never shows live tokens to a user).

use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;

use super::classifier::{classify_http_error, classify_transport_error};
use super::error::LlmError;
use super::types::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};

pub async fn anthropic_call(
    http: &Client,
    base_url: &str,
    api_key: &str,
    request: CompletionRequest,
) -> Result<CompletionResponse, LlmError> {
    let url = format!("{base_url}/v1/messages");
    let body = serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "system": request.system_prompt,
        "messages": [{"role": "user", "content": request.user_message}],
    });

    let started = Instant::now();
    let response = http
        .post(url)
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_transport_error("anthropic", e.to_string()))?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(classify_http_error("anthropic", status, &text));
    }

    let latency = started.elapsed();
    let parsed: AnthropicResponse = response
        .json()
        .await
        .map_err(|e| classify_transport_error("anthropic", e.to_string()))?;

    let text = parsed
        .content
        .into_iter()
        .find_map(|b| match b {
            AnthropicContentBlock::Text { text } => Some(text),
        })
        .unwrap_or_default();

    Ok(CompletionResponse {
        text,
        stop_reason: StopReason::from_anthropic(&parsed.stop_reason),
        provider: "anthropic".to_string(),
        model: request.model,
        usage: TokenUsage {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        },
        latency,
    })
}

pub async fn openai_call(
    http: &Client,
    base_url: &str,
    api_key: &str,
    provider_name: &str,
    request: CompletionRequest,
) -> Result<CompletionResponse, LlmError> {
    let url = format!("{base_url}/chat/completions");
    let body = serde_json::json!({
        "model": request.model,
        "max_tokens": request.max_tokens,
        "messages": [
            {"role": "system", "content": request.system_prompt},
            {"role": "user", "content": request.user_message},
        ],
    });

    let started = Instant::now();
    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|e| classify_transport_error(provider_name, e.to_string()))?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(classify_http_error(provider_name, status, &text));
    }

    let latency = started.elapsed();
    let parsed: OpenAiResponse = response
        .json()
        .await
        .map_err(|e| classify_transport_error(provider_name, e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| classify_transport_error(provider_name, "empty choices array"))?;

    Ok(CompletionResponse {
        text: choice.message.content.unwrap_or_default(),
        stop_reason: StopReason::from_openai(&choice.finish_reason),
        provider: provider_name.to_string(),
        model: request.model,
        usage: TokenUsage {
            input_tokens: parsed.usage.prompt_tokens,
            output_tokens: parsed.usage.completion_tokens,
        },
        latency,
    })
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    stop_reason: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    usage: OpenAiUsage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
