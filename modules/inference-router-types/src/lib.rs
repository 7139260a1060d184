//! Shared types for the inference router service and its RPC clients.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Provider address reported when no real provider produced the answer.
pub const SIMULATION_PROVIDER_ADDRESS: &str = "simulation-mode";

/// Model name reported alongside [`SIMULATION_PROVIDER_ADDRESS`].
pub const LOCAL_FALLBACK_MODEL: &str = "local-fallback";

/// Provider address reported on an `ok:false` exhausted response.
pub const NO_PROVIDER_ADDRESS: &str = "none";

// =====================================================
// Chat Types
// =====================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

/// An inbound chat completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Provider address the caller wants tried first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            preferred_provider: None,
        }
    }

    pub fn with_preferred_provider(mut self, address: impl Into<String>) -> Self {
        self.preferred_provider = Some(address.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Where the answer in a [`ChatResponse`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// A real provider produced the completion
    Provider,
    /// Every provider failed and a labeled local fallback was substituted
    Degraded,
    /// Every provider failed and no fallback was produced
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcomeKind {
    Success,
    Busy,
    HardError,
    Timeout,
}

/// One provider attempt as reported back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSummary {
    pub provider_address: String,
    pub outcome: AttemptOutcomeKind,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Result of routing one [`ChatRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub ok: bool,
    pub source: ResponseSource,
    pub provider_address: String,
    pub model: String,
    pub verified: bool,
    /// Ledger balance (smallest unit, decimal string) observed before routing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_snapshot: Option<String>,
    pub usage: Usage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: Vec<AttemptSummary>,
}

impl ChatResponse {
    /// True only when a real provider answered
    pub fn is_authentic(&self) -> bool {
        self.ok
            && self.source == ResponseSource::Provider
            && self.provider_address != SIMULATION_PROVIDER_ADDRESS
            && self.provider_address != NO_PROVIDER_ADDRESS
    }

    pub fn is_degraded(&self) -> bool {
        self.source == ResponseSource::Degraded
    }

    /// Assistant text of the first choice, if the payload is OpenAI-shaped
    pub fn content(&self) -> Option<&str> {
        self.payload
            .as_ref()?
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }
}

// =====================================================
// Provider listing
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderView {
    pub address: String,
    pub endpoint: String,
    pub model: String,
    pub verifiability: String,
    pub priority_rank: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersResponse {
    /// "discovered", "cached" or "fallback"
    pub source: String,
    pub providers: Vec<ProviderView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub owner_address: String,
    pub balance: Option<String>,
    pub min_threshold: String,
    pub top_up_performed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub owner_address: String,
    pub chain_id: u64,
    pub known_providers: usize,
    pub exhaustion_policy: String,
    pub last_known_balance: Option<String>,
}

// =====================================================
// RPC wrapper
// =====================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> RpcResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
