//! HTTP/WebSocket server for the onboarding API
//!
//! Clients call commands through `POST /api/invoke` and listen for notices on
//! `GET /ws/events`.

mod auth;
mod events;
mod proxy;
pub mod routes;
pub mod state;

pub use auth::{generate_auth_token, AuthLayer};
pub use events::{EventBroadcaster, ServerEvent};
pub use proxy::{invoke_handler, InvokeRequest, InvokeResponse};
pub use state::{Collaborators, ServerAppState};

use crate::shutdown::{ShutdownHandler, ShutdownResult};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue,
    },
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};

/// How often idle sessions are looked for
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Version information for the server
#[derive(serde::Serialize)]
struct VersionInfo {
    name: String,
    version: String,
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // Explicit headers: a wildcard is rejected by browsers alongside Authorization
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(allowed)
    }
}

/// The application router with auth and CORS applied
pub fn build_router(state: ServerAppState) -> Router {
    // Layer order: cors (outer) -> auth -> handler, so preflight skips auth
    Router::new()
        .route("/api/invoke", post(proxy::invoke_handler))
        .route("/ws/events", get(events::ws_handler))
        .route("/health", get(health_handler))
        .route("/api/version", get(version_handler))
        .layer(AuthLayer::new(state.auth_token.clone()))
        .layer(cors_layer(&state.config.server.cors_origins))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until shutdown is requested
pub async fn run_server(state: ServerAppState) -> Result<(), String> {
    let bind = state.config.server.bind.clone();
    let port = state.config.server.port;
    let addr: SocketAddr = format!("{}:{}", bind, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let cors_display = if state.config.server.cors_origins.is_empty() {
        "*".to_string()
    } else {
        state.config.server.cors_origins.join(", ")
    };

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Twyne Onboarding Server                      ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Server URL: http://{}:{:<24}  ║", bind, port);
    println!("║  Auth Token: {}  ║", state.auth_token);
    println!("║  CORS Origins: {:<45}║", cors_display);
    println!("║  Storage: {:<50}║", format!("{:?}", state.config.storage.backend));
    println!("║                                                               ║");
    println!("║  Endpoints:                                                   ║");
    println!("║    POST /api/invoke      - Command proxy                     ║");
    println!("║    GET  /api/version     - Server version info               ║");
    println!("║    GET  /ws/events       - WebSocket notices                 ║");
    println!("║    GET  /health          - Health check                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    log::info!("Server listening on http://{}", addr);

    let shutdown_state = state.shutdown_state.clone();
    let shutdown_signal = async move {
        shutdown_state.requested().await;
        log::info!("Draining in-flight requests");
    };

    let sweeper = tokio::spawn(sweep_idle_sessions(state.clone()));

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal)
        .await
        .map_err(|e| format!("Server error: {}", e))?;
    sweeper.abort();

    // Keep anonymous conversations across restarts
    let sessions = state.sessions.clone();
    ShutdownHandler::with_state(state.shutdown_state.clone())
        .handle_shutdown(|| async move {
            ShutdownResult {
                drafts_saved: sessions.flush_drafts().await,
                errors: Vec::new(),
            }
        })
        .await;
    Ok(())
}

/// Periodically drop live sessions nobody has touched for a while
async fn sweep_idle_sessions(state: ServerAppState) {
    let max_idle = state.config.onboarding.idle_timeout();
    let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL.min(max_idle));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = state.sessions.evict_idle(max_idle).await;
                if evicted > 0 {
                    log::info!("Evicted {} idle onboarding sessions", evicted);
                }
            }
            _ = state.shutdown_state.requested() => {
                log::debug!("Session sweeper shutting down");
                break;
            }
        }
    }
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn version_handler() -> Json<VersionInfo> {
    Json(VersionInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
