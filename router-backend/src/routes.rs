//! Axum route handlers for the router RPC API.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use inference_router_types::*;
use std::sync::Arc;

use crate::context::RouterContext;
use crate::error::RouterError;
use crate::registry::prioritizer;

pub struct AppState {
    pub ctx: RouterContext,
}

pub fn router(state: Arc<AppState>) -> axum::Router {
    let cors = tower_http::cors::CorsLayer::permissive();

    axum::Router::new()
        .route("/rpc/chat", axum::routing::post(chat))
        .route("/rpc/providers", axum::routing::get(providers))
        .route("/rpc/balance", axum::routing::get(balance))
        .route("/rpc/status", axum::routing::get(status))
        .with_state(state)
        .layer(cors)
}

// POST /rpc/chat
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> (StatusCode, Json<RpcResponse<ChatResponse>>) {
    match state.ctx.orchestrator.route(&req).await {
        Ok(resp) if resp.ok => (StatusCode::OK, Json(RpcResponse::ok(resp))),
        Ok(resp) => {
            let error = resp.error.clone();
            (
                StatusCode::BAD_GATEWAY,
                Json(RpcResponse {
                    success: false,
                    data: Some(resp),
                    error,
                }),
            )
        }
        Err(e @ RouterError::InvalidRequest(_)) => {
            (StatusCode::BAD_REQUEST, Json(RpcResponse::err(e.to_string())))
        }
        Err(e) => {
            log::error!("[RPC] chat failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(RpcResponse::err(e.to_string())))
        }
    }
}

// GET /rpc/providers
pub async fn providers(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<ProvidersResponse>>) {
    let registry = state.ctx.orchestrator.registry();
    let discovery = registry.discover().await;
    let source = discovery.source.as_str().to_string();
    let ordered = prioritizer::order(discovery.providers, None, registry.known());

    (
        StatusCode::OK,
        Json(RpcResponse::ok(ProvidersResponse {
            source,
            providers: ordered.iter().map(|p| p.view()).collect(),
        })),
    )
}

// GET /rpc/balance
pub async fn balance(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<BalanceResponse>>) {
    let ledger = state.ctx.orchestrator.ledger();
    if let Err(e) = ledger.current_balance().await {
        log::warn!("[RPC] balance read failed, reporting last known: {}", e);
    }
    let account = ledger.account();

    (
        StatusCode::OK,
        Json(RpcResponse::ok(BalanceResponse {
            owner_address: account.owner_address,
            balance: account.total_balance.map(|b| b.to_string()),
            min_threshold: account.min_threshold.to_string(),
            top_up_performed: false,
        })),
    )
}

// GET /rpc/status
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<RpcResponse<StatusResponse>>) {
    let ctx = &state.ctx;
    (
        StatusCode::OK,
        Json(RpcResponse::ok(StatusResponse {
            uptime_secs: ctx.started_at.elapsed().as_secs(),
            owner_address: ctx.owner_address(),
            chain_id: ctx.config.chain_id,
            known_providers: ctx.config.known_providers.len(),
            exhaustion_policy: ctx.config.exhaustion_policy.to_string(),
            last_known_balance: ctx
                .orchestrator
                .ledger()
                .last_known_balance()
                .map(|b| b.to_string()),
        })),
    )
}
