//! End-to-end tests for the failover loop against mock providers.
//!
//! Each provider is a wiremock server speaking the OpenAI-compatible
//! completion protocol; ledger, discovery, handshake and verification are the
//! in-crate mocks.

use super::*;
use crate::auth::SignedHeaderIssuer;
use crate::registry::{KnownProviderTable, Verifiability};
use crate::test_support::{
    completion_json, discovered_from, known_table_of, provider, test_wallet, MockDiscovery,
    MockHandshake, MockLedger, MockVerifier,
};
use ethers::types::U256;
use inference_router_types::{AttemptOutcomeKind, ChatMessage};
use reqwest::Client;
use std::sync::atomic::Ordering;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    discovery: Option<MockDiscovery>,
    known: KnownProviderTable,
    handshake: MockHandshake,
    require_handshake: bool,
    verifier: Arc<dyn ResponseVerifier>,
    ledger: Arc<MockLedger>,
    policy: ExhaustionPolicy,
    attempt_timeout: Duration,
}

impl Harness {
    fn discovering(providers: &[&Provider]) -> Self {
        Self {
            discovery: Some(MockDiscovery::returning(
                providers.iter().map(|p| discovered_from(p)).collect(),
            )),
            known: KnownProviderTable::empty(),
            handshake: MockHandshake::ok(),
            require_handshake: false,
            verifier: Arc::new(MockVerifier::accepting()),
            ledger: Arc::new(MockLedger::with_balance(10_000)),
            policy: ExhaustionPolicy::Degraded,
            attempt_timeout: Duration::from_secs(5),
        }
    }

    fn policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    fn build(self) -> FailoverOrchestrator {
        let ledger = LedgerClient::new(
            self.ledger,
            U256::from(100u64),
            U256::from(1_000u64),
            Duration::from_millis(500),
        );
        let registry = ProviderRegistry::new(
            self.discovery
                .map(|d| Arc::new(d) as Arc<dyn crate::registry::DiscoveryService>),
            Arc::new(self.known),
            Duration::from_millis(500),
        );
        let authenticator = RequestAuthenticator::new(
            Arc::new(self.handshake),
            Arc::new(SignedHeaderIssuer::new(test_wallet(), 16601)),
            self.require_handshake,
            Duration::from_millis(200),
        );
        FailoverOrchestrator::new(
            Arc::new(ledger),
            Arc::new(registry),
            Arc::new(authenticator),
            Arc::new(InferenceExecutor::new(Client::new())),
            self.verifier,
            RoutingSettings {
                attempt_timeout: self.attempt_timeout,
                verify_timeout: Duration::from_millis(500),
                exhaustion_policy: self.policy,
            },
        )
    }
}

fn request() -> ChatRequest {
    ChatRequest::new(vec![ChatMessage::user("What is the capital of France?")])
}

async fn answering(id: &str, content: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_json(id, content)))
        .mount(&server)
        .await;
    server
}

async fn failing(status: u16, body: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&server)
        .await;
    server
}

async fn stalling(delay: Duration) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_json("late", "late"))
                .set_delay(delay),
        )
        .mount(&server)
        .await;
    server
}

fn outcomes(response: &ChatResponse) -> Vec<AttemptOutcomeKind> {
    response.attempts.iter().map(|a| a.outcome).collect()
}

#[tokio::test]
async fn test_fails_over_to_third_provider() {
    let a = failing(503, "model overloaded").await;
    let b = failing(500, "internal error").await;
    let c = answering("chat-c", "Paris").await;
    let (pa, pb, pc) = (provider(1, &a.uri()), provider(2, &b.uri()), provider(3, &c.uri()));

    let response = Harness::discovering(&[&pa, &pb, &pc])
        .build()
        .route(&request())
        .await
        .unwrap();

    assert!(response.ok);
    assert!(response.is_authentic());
    assert_eq!(response.provider_address, pc.address.to_hex());
    assert_eq!(response.payload, Some(completion_json("chat-c", "Paris")));
    assert_eq!(response.content(), Some("Paris"));
    assert_eq!(response.usage.total_tokens, 12);
    assert_eq!(
        outcomes(&response),
        vec![
            AttemptOutcomeKind::Busy,
            AttemptOutcomeKind::HardError,
            AttemptOutcomeKind::Success
        ]
    );
}

#[tokio::test]
async fn test_every_attempt_gets_fresh_headers() {
    // Three providers behind one server, so every request lands in one log
    let server = failing(503, "busy").await;
    let providers: Vec<Provider> = (1..=3).map(|n| provider(n, &server.uri())).collect();
    let refs: Vec<&Provider> = providers.iter().collect();

    let response = Harness::discovering(&refs).build().route(&request()).await.unwrap();
    assert_eq!(response.attempts.len(), 3);

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 3);

    let header = |name: &str| -> Vec<String> {
        received
            .iter()
            .map(|r| {
                r.headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string()
            })
            .collect()
    };

    for name in ["signature", "signature-input", "x-request-nonce"] {
        let mut values = header(name);
        assert!(values.iter().all(|v| !v.is_empty()), "{} missing", name);
        values.sort();
        values.dedup();
        assert_eq!(values.len(), 3, "{} reused across attempts", name);
    }
}

#[tokio::test]
async fn test_preferred_provider_is_tried_first() {
    let a = answering("chat-a", "from a").await;
    let b = answering("chat-b", "from b").await;
    let (pa, pb) = (provider(1, &a.uri()), provider(2, &b.uri()));

    let response = Harness::discovering(&[&pa, &pb])
        .build()
        .route(&request().with_preferred_provider(pb.address.to_hex().to_uppercase()))
        .await
        .unwrap();

    assert_eq!(response.provider_address, pb.address.to_hex());
    assert_eq!(response.attempts.len(), 1);
    assert!(a.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_known_good_ranked_ahead_of_discovery_order() {
    let a = answering("chat-a", "from a").await;
    let b = answering("chat-b", "from b").await;
    let (pa, pb) = (provider(1, &a.uri()), provider(2, &b.uri()));

    let mut harness = Harness::discovering(&[&pa, &pb]);
    harness.known = known_table_of(&[(&pb, 1)]);
    let response = harness.build().route(&request()).await.unwrap();

    assert_eq!(response.provider_address, pb.address.to_hex());
}

#[tokio::test]
async fn test_exhaustion_time_is_bounded_by_attempt_timeouts() {
    let mut servers = Vec::new();
    for _ in 0..3 {
        servers.push(stalling(Duration::from_secs(10)).await);
    }
    let providers: Vec<Provider> = servers
        .iter()
        .enumerate()
        .map(|(i, s)| provider(i as u8 + 1, &s.uri()))
        .collect();
    let refs: Vec<&Provider> = providers.iter().collect();

    let start = Instant::now();
    let response = Harness::discovering(&refs)
        .attempt_timeout(Duration::from_millis(300))
        .build()
        .route(&request())
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(elapsed < Duration::from_millis(3 * 300 + 1_500), "took {:?}", elapsed);
    assert_eq!(outcomes(&response), vec![AttemptOutcomeKind::Timeout; 3]);
    assert!(response.is_degraded());
}

#[tokio::test]
async fn test_degraded_fallback_is_labeled() {
    let a = failing(503, "overloaded").await;
    let pa = provider(1, &a.uri());

    let response = Harness::discovering(&[&pa]).build().route(&request()).await.unwrap();

    assert!(response.ok);
    assert_eq!(response.source, ResponseSource::Degraded);
    assert_eq!(response.provider_address, SIMULATION_PROVIDER_ADDRESS);
    assert_eq!(response.model, LOCAL_FALLBACK_MODEL);
    assert!(!response.verified);
    assert!(!response.is_authentic());
    assert_eq!(response.content(), Some(FALLBACK_MESSAGE));
    assert!(response
        .attempts
        .iter()
        .all(|a| a.provider_address != response.provider_address));
}

#[tokio::test]
async fn test_error_policy_reports_last_error() {
    let a = failing(503, "overloaded").await;
    let b = failing(401, "bad signature").await;
    let (pa, pb) = (provider(1, &a.uri()), provider(2, &b.uri()));

    let response = Harness::discovering(&[&pa, &pb])
        .policy(ExhaustionPolicy::Error)
        .build()
        .route(&request())
        .await
        .unwrap();

    assert!(!response.ok);
    assert_eq!(response.source, ResponseSource::Failed);
    assert_eq!(response.provider_address, NO_PROVIDER_ADDRESS);
    assert!(response.payload.is_none());
    let error = response.error.unwrap();
    assert!(error.contains("all providers exhausted after 2 attempt(s)"));
    assert!(error.contains("bad signature"));
}

#[tokio::test]
async fn test_zero_balance_tops_up_then_routes() {
    let a = answering("chat-a", "funded").await;
    let pa = provider(1, &a.uri());

    let mut harness = Harness::discovering(&[&pa]);
    let ledger = Arc::new(MockLedger::with_balance(0));
    harness.ledger = ledger.clone();
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.is_authentic());
    assert_eq!(ledger.top_ups.load(Ordering::SeqCst), 1);
    assert_eq!(response.balance_snapshot.as_deref(), Some("1000"));
}

#[tokio::test]
async fn test_ledger_outage_does_not_block_routing() {
    let a = answering("chat-a", "still here").await;
    let pa = provider(1, &a.uri());

    let mut harness = Harness::discovering(&[&pa]);
    let ledger = Arc::new(MockLedger::with_balance(0));
    ledger.fail_reads.store(true, Ordering::SeqCst);
    harness.ledger = ledger.clone();
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.is_authentic());
    assert!(response.balance_snapshot.is_none());
    assert_eq!(ledger.top_ups.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_verification_error_keeps_answer_unverified() {
    let a = answering("chat-a", "attested").await;
    let mut pa = provider(1, &a.uri());
    pa.verifiability = Verifiability::Attested;

    let mut harness = Harness::discovering(&[&pa]);
    harness.verifier = Arc::new(MockVerifier::erroring());
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.ok);
    assert!(!response.verified);
    assert_eq!(response.content(), Some("attested"));
}

#[tokio::test]
async fn test_verifier_receives_completion_id() {
    let a = answering("chat-a", "attested").await;
    let mut pa = provider(1, &a.uri());
    pa.verifiability = Verifiability::Attested;

    let verifier = Arc::new(MockVerifier::accepting());
    let mut harness = Harness::discovering(&[&pa]);
    harness.verifier = verifier.clone();
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.verified);
    assert_eq!(*verifier.chat_ids.lock(), vec![Some("chat-a".to_string())]);
}

#[tokio::test]
async fn test_attested_answer_marked_verified() {
    let a = answering("chat-a", "attested").await;
    let mut pa = provider(1, &a.uri());
    pa.verifiability = Verifiability::Attested;

    let response = Harness::discovering(&[&pa]).build().route(&request()).await.unwrap();
    assert!(response.verified);
}

#[tokio::test]
async fn test_empty_discovery_routes_through_known_table() {
    let a = answering("chat-a", "from table").await;
    let pa = provider(1, &a.uri());

    let mut harness = Harness::discovering(&[]);
    harness.known = known_table_of(&[(&pa, 1)]);
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.is_authentic());
    assert_eq!(response.provider_address, pa.address.to_hex());
}

#[tokio::test]
async fn test_no_candidates_is_exhausted_without_attempts() {
    let mut harness = Harness::discovering(&[]);
    harness.discovery = Some(MockDiscovery::failing("indexer down"));
    let response = harness
        .policy(ExhaustionPolicy::Error)
        .build()
        .route(&request())
        .await
        .unwrap();

    assert!(!response.ok);
    assert!(response.attempts.is_empty());
    assert!(response.error.unwrap().contains("no candidate providers"));
}

#[tokio::test]
async fn test_required_handshake_failure_moves_to_next_provider() {
    let a = answering("chat-a", "unreachable").await;
    let b = answering("chat-b", "Paris").await;
    let pa = provider(1, &a.uri());
    let pb = provider(2, &b.uri());

    let mut harness = Harness::discovering(&[&pa, &pb]);
    harness.handshake = MockHandshake::failing_for(pa.address);
    harness.require_handshake = true;
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.is_authentic());
    assert_eq!(response.provider_address, pb.address.to_hex());
    assert_eq!(response.content(), Some("Paris"));
    assert_eq!(
        outcomes(&response),
        vec![AttemptOutcomeKind::HardError, AttemptOutcomeKind::Success]
    );
    assert!(a.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_required_handshake_failing_everywhere_degrades() {
    let a = answering("chat-a", "unreachable").await;
    let pa = provider(1, &a.uri());

    let mut harness = Harness::discovering(&[&pa]);
    harness.handshake = MockHandshake::failing();
    harness.require_handshake = true;
    let response = harness.build().route(&request()).await.unwrap();

    assert!(response.is_degraded());
    assert_eq!(outcomes(&response), vec![AttemptOutcomeKind::HardError]);
    assert!(a.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_messages_rejected() {
    let err = Harness::discovering(&[])
        .build()
        .route(&ChatRequest::new(Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::InvalidRequest(_)));
}
