//! Failover Orchestrator
//!
//! Drives one chat request through the routing states:
//!
//! `Init -> EnsureFunds -> Discover -> Order -> TryNext -> (Success | Exhausted)`
//!
//! Every transition is logged under `[ROUTER]` with a reason code. Attempts
//! are strictly sequential: one provider is in flight at a time, and each
//! attempt (authentication plus the HTTP call) runs under its own deadline.
//! Provider failures are collected into the attempt trail and never raised.

#[cfg(test)]
mod failover_tests;

use chrono::Utc;
use inference_router_types::{
    AttemptSummary, ChatRequest, ChatResponse, ResponseSource, Usage, LOCAL_FALLBACK_MODEL,
    NO_PROVIDER_ADDRESS, SIMULATION_PROVIDER_ADDRESS,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::RequestAuthenticator;
use crate::config::{ExhaustionPolicy, RouterConfig};
use crate::error::RouterError;
use crate::executor::{
    AttemptOutcome, AttemptRecord, Completion, FailureClass, InferenceExecutor, RequestPayload,
};
use crate::ledger::LedgerClient;
use crate::registry::{prioritizer, DiscoverySource, Provider, ProviderRegistry};
use crate::verifier::{verify_response, ResponseVerifier};

/// Assistant text of the degraded fallback answer
pub const FALLBACK_MESSAGE: &str =
    "No compute provider is available right now. This is a local fallback reply, not model output.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RouteState {
    Init,
    EnsureFunds,
    Discover,
    Order,
    TryNext,
    Success,
    Exhausted,
}

/// Reason code attached to every state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransitionReason {
    RequestAccepted,
    FundsSufficient,
    FundsToppedUp,
    FundsUnverified,
    ProvidersDiscovered,
    ProvidersCached,
    DiscoveryDegraded,
    CandidatesOrdered,
    NoCandidates,
    AttemptSucceeded,
    ProviderBusy,
    ProviderHardError,
    ProviderTimeout,
    CandidatesExhausted,
}

impl TransitionReason {
    fn for_failure(class: FailureClass) -> Self {
        match class {
            FailureClass::Busy => TransitionReason::ProviderBusy,
            FailureClass::HardError => TransitionReason::ProviderHardError,
            FailureClass::Timeout => TransitionReason::ProviderTimeout,
        }
    }
}

/// Routing knobs taken from [`RouterConfig`]
#[derive(Debug, Clone)]
pub struct RoutingSettings {
    pub attempt_timeout: Duration,
    pub verify_timeout: Duration,
    pub exhaustion_policy: ExhaustionPolicy,
}

impl RoutingSettings {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            attempt_timeout: config.attempt_timeout,
            verify_timeout: config.verify_timeout,
            exhaustion_policy: config.exhaustion_policy,
        }
    }
}

/// State plus the data it carries into the next step
enum Step {
    Init,
    EnsureFunds,
    Discover,
    Order(Vec<Provider>),
    TryNext(VecDeque<Provider>),
    Success {
        provider: Provider,
        completion: Completion,
        verified: bool,
    },
    Exhausted,
}

impl Step {
    fn state(&self) -> RouteState {
        match self {
            Step::Init => RouteState::Init,
            Step::EnsureFunds => RouteState::EnsureFunds,
            Step::Discover => RouteState::Discover,
            Step::Order(_) => RouteState::Order,
            Step::TryNext(_) => RouteState::TryNext,
            Step::Success { .. } => RouteState::Success,
            Step::Exhausted => RouteState::Exhausted,
        }
    }
}

/// Bookkeeping for one `route` call
struct RouteRun {
    id: String,
    state: RouteState,
    balance_snapshot: Option<String>,
    trail: Vec<AttemptSummary>,
    last_error: Option<String>,
    started: Instant,
}

impl RouteRun {
    fn new() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        Self {
            id: id[..8].to_string(),
            state: RouteState::Init,
            balance_snapshot: None,
            trail: Vec::new(),
            last_error: None,
            started: Instant::now(),
        }
    }

    fn enter(&mut self, next: Step, reason: TransitionReason) -> Step {
        let to = next.state();
        log::debug!("[ROUTER] {} {} -> {} ({})", self.id, self.state, to, reason);
        self.state = to;
        next
    }

    fn record(&mut self, attempt: &AttemptRecord) {
        log::debug!(
            "[ROUTER] {} attempt {} on {}: {:?} in {}ms",
            self.id,
            attempt.attempt_id,
            attempt.provider.address,
            attempt.kind(),
            attempt.elapsed.as_millis()
        );
        self.trail.push(attempt.summary());
        if let Some(detail) = attempt.error_detail() {
            self.last_error = Some(format!("{}: {}", attempt.provider.address, detail));
        }
    }
}

pub struct FailoverOrchestrator {
    ledger: Arc<LedgerClient>,
    registry: Arc<ProviderRegistry>,
    authenticator: Arc<RequestAuthenticator>,
    executor: Arc<InferenceExecutor>,
    verifier: Arc<dyn ResponseVerifier>,
    settings: RoutingSettings,
}

impl FailoverOrchestrator {
    pub fn new(
        ledger: Arc<LedgerClient>,
        registry: Arc<ProviderRegistry>,
        authenticator: Arc<RequestAuthenticator>,
        executor: Arc<InferenceExecutor>,
        verifier: Arc<dyn ResponseVerifier>,
        settings: RoutingSettings,
    ) -> Self {
        Self {
            ledger,
            registry,
            authenticator,
            executor,
            verifier,
            settings,
        }
    }

    pub fn ledger(&self) -> &Arc<LedgerClient> {
        &self.ledger
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Route a chat request. Only an unroutable request is an `Err`; provider
    /// failures end in the configured exhaustion response.
    pub async fn route(&self, request: &ChatRequest) -> Result<ChatResponse, RouterError> {
        validate_request(request)?;

        let mut run = RouteRun::new();
        let mut step = Step::Init;

        loop {
            step = match step {
                Step::Init => run.enter(Step::EnsureFunds, TransitionReason::RequestAccepted),

                Step::EnsureFunds => {
                    let funds = self.ledger.ensure_default_funds().await;
                    run.balance_snapshot = funds.balance.map(|b| b.to_string());
                    let reason = match (funds.top_up_performed, funds.balance) {
                        (true, _) => TransitionReason::FundsToppedUp,
                        (false, Some(b)) if b >= self.ledger.min_threshold() => {
                            TransitionReason::FundsSufficient
                        }
                        _ => TransitionReason::FundsUnverified,
                    };
                    run.enter(Step::Discover, reason)
                }

                Step::Discover => {
                    let discovery = self.registry.discover().await;
                    let reason = match discovery.source {
                        DiscoverySource::Discovered => TransitionReason::ProvidersDiscovered,
                        DiscoverySource::Cached => TransitionReason::ProvidersCached,
                        DiscoverySource::Fallback(_) => TransitionReason::DiscoveryDegraded,
                    };
                    run.enter(Step::Order(discovery.providers), reason)
                }

                Step::Order(discovered) => {
                    let preferred = prioritizer::parse_preference(request.preferred_provider.as_deref());
                    let ordered = prioritizer::order(discovered, preferred.as_ref(), self.registry.known());
                    if ordered.is_empty() {
                        run.enter(Step::Exhausted, TransitionReason::NoCandidates)
                    } else {
                        log::debug!("[ROUTER] {} {} candidate(s) queued", run.id, ordered.len());
                        run.enter(Step::TryNext(ordered.into()), TransitionReason::CandidatesOrdered)
                    }
                }

                Step::TryNext(mut queue) => match queue.pop_front() {
                    None => run.enter(Step::Exhausted, TransitionReason::CandidatesExhausted),
                    Some(provider) => {
                        let attempt = self.attempt(&provider, request).await;
                        run.record(&attempt);
                        match attempt.outcome {
                            AttemptOutcome::Success(completion) => {
                                let verified = verify_response(
                                    &self.verifier,
                                    &provider,
                                    &completion.payload,
                                    completion.chat_id.as_deref(),
                                    self.settings.verify_timeout,
                                )
                                .await
                                .is_verified();
                                run.enter(
                                    Step::Success {
                                        provider,
                                        completion,
                                        verified,
                                    },
                                    TransitionReason::AttemptSucceeded,
                                )
                            }
                            AttemptOutcome::Failed { class, .. } => {
                                run.enter(Step::TryNext(queue), TransitionReason::for_failure(class))
                            }
                        }
                    }
                },

                Step::Success {
                    provider,
                    completion,
                    verified,
                } => {
                    log::info!(
                        "[ROUTER] {} served by {} ({}) after {} attempt(s) in {}ms, verified={}",
                        run.id,
                        provider.address,
                        completion.model,
                        run.trail.len(),
                        run.started.elapsed().as_millis(),
                        verified
                    );
                    return Ok(ChatResponse {
                        ok: true,
                        source: ResponseSource::Provider,
                        provider_address: provider.address.to_hex(),
                        model: completion.model,
                        verified,
                        balance_snapshot: run.balance_snapshot,
                        usage: completion.usage,
                        payload: Some(completion.payload),
                        error: None,
                        attempts: run.trail,
                    });
                }

                Step::Exhausted => return Ok(self.exhausted(run)),
            };
        }
    }

    /// One provider attempt: authenticate, then execute, both inside one deadline
    async fn attempt(&self, provider: &Provider, request: &ChatRequest) -> AttemptRecord {
        let started_at = Utc::now();
        let start = Instant::now();
        let deadline = self.settings.attempt_timeout;

        let payload = match RequestPayload::build(provider, request) {
            Ok(p) => p,
            Err(e) => {
                return AttemptRecord::failed(provider, started_at, start.elapsed(), FailureClass::HardError, e)
            }
        };

        let auth = match tokio::time::timeout(
            deadline,
            self.authenticator.authenticate(provider, payload.as_bytes()),
        )
        .await
        {
            Ok(Ok(headers)) => headers,
            Ok(Err(e)) => {
                log::error!("[ROUTER] Authentication for {} failed: {}", provider.address, e);
                return AttemptRecord::failed(provider, started_at, start.elapsed(), FailureClass::HardError, e);
            }
            Err(_) => {
                log::warn!("[ROUTER] Authentication for {} hit the attempt deadline", provider.address);
                return AttemptRecord::failed(
                    provider,
                    started_at,
                    start.elapsed(),
                    FailureClass::Timeout,
                    format!("Authentication exceeded {}ms", deadline.as_millis()),
                );
            }
        };

        let remaining = deadline.saturating_sub(start.elapsed());
        if remaining.is_zero() {
            return AttemptRecord::failed(
                provider,
                started_at,
                start.elapsed(),
                FailureClass::Timeout,
                format!("No time left of {}ms after authentication", deadline.as_millis()),
            );
        }

        let mut record = self.executor.execute(provider, auth, &payload, remaining).await;
        record.started_at = started_at;
        record.elapsed = start.elapsed();
        record
    }

    fn exhausted(&self, run: RouteRun) -> ChatResponse {
        let error = RouterError::AllProvidersExhausted {
            attempts: run.trail.len(),
            last_error: run
                .last_error
                .clone()
                .unwrap_or_else(|| "no candidate providers".to_string()),
        };

        match self.settings.exhaustion_policy {
            ExhaustionPolicy::Degraded => {
                log::warn!(
                    "[ROUTER] {} {}; returning local fallback",
                    run.id,
                    error
                );
                ChatResponse {
                    ok: true,
                    source: ResponseSource::Degraded,
                    provider_address: SIMULATION_PROVIDER_ADDRESS.to_string(),
                    model: LOCAL_FALLBACK_MODEL.to_string(),
                    verified: false,
                    balance_snapshot: run.balance_snapshot,
                    usage: Usage::default(),
                    payload: Some(fallback_payload(&run.id)),
                    error: None,
                    attempts: run.trail,
                }
            }
            ExhaustionPolicy::Error => {
                log::error!("[ROUTER] {} {}", run.id, error);
                ChatResponse {
                    ok: false,
                    source: ResponseSource::Failed,
                    provider_address: NO_PROVIDER_ADDRESS.to_string(),
                    model: NO_PROVIDER_ADDRESS.to_string(),
                    verified: false,
                    balance_snapshot: run.balance_snapshot,
                    usage: Usage::default(),
                    payload: None,
                    error: Some(error.to_string()),
                    attempts: run.trail,
                }
            }
        }
    }
}

fn validate_request(request: &ChatRequest) -> Result<(), RouterError> {
    if request.messages.is_empty() {
        return Err(RouterError::InvalidRequest("messages must not be empty".to_string()));
    }
    if request.max_tokens == 0 {
        return Err(RouterError::InvalidRequest("max_tokens must be positive".to_string()));
    }
    if !request.temperature.is_finite() || request.temperature < 0.0 {
        return Err(RouterError::InvalidRequest(format!(
            "temperature must be a non-negative number, got {}",
            request.temperature
        )));
    }
    Ok(())
}

/// OpenAI-shaped body for the degraded answer
fn fallback_payload(route_id: &str) -> Value {
    json!({
        "id": format!("fallback-{}", route_id),
        "object": "chat.completion",
        "model": LOCAL_FALLBACK_MODEL,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": FALLBACK_MESSAGE},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0}
    })
}
