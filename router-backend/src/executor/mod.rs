//! Bounded-time chat completion calls against a single provider

use chrono::{DateTime, Utc};
use inference_router_types::{AttemptOutcomeKind, AttemptSummary, ChatMessage, ChatRequest, Usage};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

use crate::auth::AuthHeaders;
use crate::registry::Provider;

/// Body fragments that mean "try someone else": busy or overloaded
const BUSY_MARKERS: &[&str] = &[
    "busy",
    "overload",
    "too many requests",
    "rate limit",
    "capacity",
    "try again later",
    "temporarily unavailable",
];

/// Body fragments that mean the caller's balance with this provider is short
const INSUFFICIENT_BALANCE_MARKERS: &[&str] = &[
    "insufficient balance",
    "insufficient funds",
    "not enough balance",
    "balance is not enough",
    "insufficient_quota",
];

/// Why a provider attempt did not produce a completion. Every class is retriable
/// against the next candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    Busy,
    HardError,
    Timeout,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub payload: Value,
    pub usage: Usage,
    pub model: String,
    /// Provider-assigned completion id, used to fetch attestation signatures
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Success(Completion),
    Failed { class: FailureClass, detail: String },
}

#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub attempt_id: String,
    pub provider: Provider,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    pub fn failed(
        provider: &Provider,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        class: FailureClass,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            attempt_id: uuid::Uuid::new_v4().to_string(),
            provider: provider.clone(),
            started_at,
            elapsed,
            outcome: AttemptOutcome::Failed {
                class,
                detail: detail.into(),
            },
        }
    }

    pub fn kind(&self) -> AttemptOutcomeKind {
        match &self.outcome {
            AttemptOutcome::Success(_) => AttemptOutcomeKind::Success,
            AttemptOutcome::Failed { class, .. } => match class {
                FailureClass::Busy => AttemptOutcomeKind::Busy,
                FailureClass::HardError => AttemptOutcomeKind::HardError,
                FailureClass::Timeout => AttemptOutcomeKind::Timeout,
            },
        }
    }

    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::Failed { detail, .. } => Some(detail),
        }
    }

    pub fn summary(&self) -> AttemptSummary {
        AttemptSummary {
            provider_address: self.provider.address.to_hex(),
            outcome: self.kind(),
            elapsed_ms: self.elapsed.as_millis() as u64,
            detail: self.error_detail().map(str::to_string),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

/// Serialized request body for one provider. Headers are issued over these
/// exact bytes and the same bytes are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPayload {
    bytes: Vec<u8>,
}

impl RequestPayload {
    pub fn build(provider: &Provider, request: &ChatRequest) -> Result<Self, String> {
        let body = CompletionBody {
            model: &provider.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };
        let bytes = serde_json::to_vec(&body)
            .map_err(|e| format!("Failed to serialize completion request: {}", e))?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

/// Classify a non-2xx provider response
pub fn classify_failure(status: u16, body: &str) -> FailureClass {
    if matches!(status, 429 | 503 | 504) {
        return FailureClass::Busy;
    }

    let lower = body.to_lowercase();
    if BUSY_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureClass::Busy;
    }
    // Each provider keeps its own balance requirement; the next one may accept us
    if status == 402 || INSUFFICIENT_BALANCE_MARKERS.iter().any(|m| lower.contains(m)) {
        return FailureClass::Busy;
    }

    FailureClass::HardError
}

fn parse_completion(provider: &Provider, body: &str) -> Result<Completion, String> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| format!("Invalid completion JSON: {}", e))?;

    if !payload.get("choices").map(Value::is_array).unwrap_or(false) {
        return Err("Completion response has no choices".to_string());
    }

    let wire_usage: WireUsage = payload
        .get("usage")
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| format!("Invalid usage block: {}", e))?
        .unwrap_or_default();

    let total = if wire_usage.total_tokens == 0 {
        wire_usage.prompt_tokens + wire_usage.completion_tokens
    } else {
        wire_usage.total_tokens
    };

    let model = payload
        .get("model")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or(&provider.model)
        .to_string();

    let chat_id = payload.get("id").and_then(Value::as_str).map(str::to_string);

    Ok(Completion {
        usage: Usage {
            prompt_tokens: wire_usage.prompt_tokens,
            completion_tokens: wire_usage.completion_tokens,
            total_tokens: total,
        },
        model,
        chat_id,
        payload,
    })
}

fn truncate(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

pub struct InferenceExecutor {
    client: Client,
}

impl InferenceExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Issue one POST to the provider. Consumes the header set.
    pub async fn execute(
        &self,
        provider: &Provider,
        auth: AuthHeaders,
        payload: &RequestPayload,
        timeout: Duration,
    ) -> AttemptRecord {
        let started_at = Utc::now();
        let start = Instant::now();

        let headers = match auth.into_header_map() {
            Ok(h) => h,
            Err(e) => {
                return AttemptRecord::failed(
                    provider,
                    started_at,
                    start.elapsed(),
                    FailureClass::HardError,
                    e,
                )
            }
        };

        let url = provider.completions_url();
        log::debug!("[EXECUTOR] POST {} ({} bytes)", url, payload.as_bytes().len());

        let call = async {
            let response = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                .headers(headers)
                .timeout(timeout)
                .body(payload.as_bytes().to_vec())
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        // Dropping the future on expiry cancels the in-flight call
        let result = tokio::time::timeout(timeout, call).await;
        let elapsed = start.elapsed();

        let (class, detail) = match result {
            Err(_) => (
                FailureClass::Timeout,
                format!("No response within {}ms", timeout.as_millis()),
            ),
            Ok(Err(e)) if e.is_timeout() => (
                FailureClass::Timeout,
                format!("Request timed out: {}", e),
            ),
            Ok(Err(e)) => (FailureClass::HardError, format!("Request failed: {}", e)),
            Ok(Ok((status, body))) if status.is_success() => {
                match parse_completion(provider, &body) {
                    Ok(completion) => {
                        log::info!(
                            "[EXECUTOR] {} answered in {}ms ({} tokens)",
                            provider.address,
                            elapsed.as_millis(),
                            completion.usage.total_tokens
                        );
                        return AttemptRecord {
                            attempt_id: uuid::Uuid::new_v4().to_string(),
                            provider: provider.clone(),
                            started_at,
                            elapsed,
                            outcome: AttemptOutcome::Success(completion),
                        };
                    }
                    Err(e) => (FailureClass::HardError, e),
                }
            }
            Ok(Ok((status, body))) => (
                classify_failure(status.as_u16(), &body),
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 300)),
            ),
        };

        match class {
            FailureClass::HardError => log::error!(
                "[EXECUTOR] {} hard error after {}ms: {}",
                provider.address,
                elapsed.as_millis(),
                detail
            ),
            FailureClass::Busy | FailureClass::Timeout => log::warn!(
                "[EXECUTOR] {} {:?} after {}ms: {}",
                provider.address,
                class,
                elapsed.as_millis(),
                detail
            ),
        }

        AttemptRecord::failed(provider, started_at, elapsed, class, detail)
    }
}
