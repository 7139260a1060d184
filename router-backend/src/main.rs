//! Inference Router Service: standalone binary routing chat completions
//! across on-chain compute providers.
//!
//! Default: http://127.0.0.1:9110/

use inference_router::routes::{self, AppState};
use inference_router::{RouterConfig, RouterContext};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::init();

    let config = match RouterConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(2);
        }
    };
    let port = config.port;

    let ctx = match RouterContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => {
            log::error!("Failed to initialize router: {}", e);
            std::process::exit(2);
        }
    };

    log::info!("Routing as {}", ctx.owner_address());

    // Fund the ledger before the first request arrives
    let funds = ctx.orchestrator.ledger().ensure_default_funds().await;
    match funds.balance {
        Some(b) => log::info!("[LEDGER] Starting balance {} (top-up: {})", b, funds.top_up_performed),
        None => log::warn!("[LEDGER] Starting balance unknown"),
    }

    let app = routes::router(Arc::new(AppState { ctx }));

    let addr = format!("127.0.0.1:{}", port);
    log::info!("Inference Router Service listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
