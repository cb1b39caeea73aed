//! HTTP entropy server backed by the entropy cache.
//!
//! Serves random bytes from the non-blocking cache. When the cache is busy,
//! drained, or the request is larger than the buffer, the bytes come from the
//! OS CSPRNG instead, and the response says which path served them.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};

use entropy_cache_core::{ArchRandom, CacheStats, Served};

/// Largest request accepted by `/api/v1/random`.
pub const MAX_LENGTH: usize = 65536;

/// Shared server state.
struct AppState {
    rng: ArchRandom,
}

#[derive(Deserialize)]
struct RandomParams {
    length: Option<usize>,
    #[serde(rename = "type")]
    data_type: Option<String>,
}

#[derive(Serialize)]
struct RandomResponse {
    #[serde(rename = "type")]
    data_type: String,
    length: usize,
    data: serde_json::Value,
    success: bool,
    /// `"cache"` or `"fallback"`.
    source: &'static str,
    /// Error message if request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    available: bool,
    bytes_served: u64,
}

/// Encode bytes in the requested output format.
fn encode(bytes: &[u8], data_type: &str) -> serde_json::Value {
    match data_type {
        "uint8" => {
            serde_json::Value::Array(bytes.iter().map(|&b| serde_json::Value::from(b)).collect())
        }
        _ => serde_json::Value::String(hex::encode(bytes)),
    }
}

fn served_label(served: Served) -> &'static str {
    match served {
        Served::Cache => "cache",
        Served::Fallback => "fallback",
    }
}

async fn handle_random(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RandomParams>,
) -> (StatusCode, Json<RandomResponse>) {
    let length = params.length.unwrap_or(32).clamp(1, MAX_LENGTH);
    let data_type = params.data_type.unwrap_or_else(|| "hex".to_string());

    let mut bytes = vec![0u8; length];
    match state.rng.fill_or_else(&mut bytes, getrandom::fill) {
        Ok(served) => (
            StatusCode::OK,
            Json(RandomResponse {
                data: encode(&bytes, &data_type),
                data_type,
                length,
                success: true,
                source: served_label(served),
                error: None,
            }),
        ),
        Err(e) => {
            log::error!("os fallback failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(RandomResponse {
                    data_type,
                    length: 0,
                    data: serde_json::Value::Array(vec![]),
                    success: false,
                    source: served_label(Served::Fallback),
                    error: Some(e.to_string()),
                }),
            )
        }
    }
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let available = state.rng.is_available();
    Json(HealthResponse {
        status: if available { "healthy" } else { "degraded" },
        available,
        bytes_served: state.rng.bytes_served(),
    })
}

async fn handle_stats(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<Option<CacheStats>>) {
    let stats = state.rng.stats();
    let status = if stats.is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(stats))
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "entropy-cache server",
        "version": entropy_cache_core::VERSION,
        "available": state.rng.is_available(),
        "capacity": entropy_cache_core::BUFFER_SIZE,
        "endpoints": {
            "/": "This API index",
            "/api/v1/random": {
                "method": "GET",
                "description": "Get random bytes (cache first, OS fallback)",
                "params": {
                    "length": format!("Number of bytes (1-{MAX_LENGTH}, default: 32)"),
                    "type": "Output format: hex, uint8 (default: hex)",
                }
            },
            "/health": "Health check",
            "/stats": "Cache counters",
        },
    }))
}

/// Build the axum router.
pub fn build_router(rng: ArchRandom) -> Router {
    let state = Arc::new(AppState { rng });

    Router::new()
        .route("/", get(handle_index))
        .route("/api/v1/random", get(handle_random))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .with_state(state)
}

/// Run the HTTP entropy server until the process receives Ctrl-C.
pub async fn run_server(rng: ArchRandom, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(rng);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("shutdown requested");
        })
        .await
}

/// Lowercase hex encoding, shared with the CLI.
pub mod hex {
    pub fn encode(data: &[u8]) -> String {
        data.iter().map(|b| format!("{b:02x}")).collect()
    }
}
