//! Companion server: compiled SPA assets plus a backend reverse proxy.
//!
//! The original deployment put a small Node process in front of the SPA; this
//! is the same thin wrapper over axum. It serves three things:
//!
//! | Path | Behavior |
//! |------|----------|
//! | `GET /readyz`, `GET /livez` | Health endpoints for orchestrators |
//! | `/api/svc`, `/api/ml`, `/api/monitoring`, `/api/tfy-build` | Reverse-proxied to the configured upstreams (prefix stripped) |
//! | everything else | Static files from `static_dir`, falling back to `index.html` for SPA routes |
//!
//! Proxying buffers request and response bodies (they are JSON API calls, not
//! bulk transfers), forwards method, query string, and non-hop-by-hop
//! headers, and maps upstream failures to a `502` with the standard error
//! body. CORS is permissive to support embedded apps.

use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::{Config, ServerConfig};

/// Proxied request bodies are buffered; anything past this is rejected.
const MAX_PROXY_BODY: usize = 50 * 1024 * 1024;

struct ProxyState {
    http: reqwest::Client,
    /// `(path prefix, upstream base URL)`, matched longest-prefix-wins is not
    /// needed — the four prefixes never nest.
    routes: Vec<(String, String)>,
}

/// Start the companion server. Requires the `[server]` config section.
pub async fn run_server(config: &Config) -> Result<()> {
    let server = config
        .server
        .as_ref()
        .ok_or_else(|| anyhow!("[server] section missing from config"))?;

    let app = build_router(server);

    println!("DocsQA server listening on http://{}", server.bind);
    println!("  static:  {}", server.static_dir.display());
    println!("  /api/svc -> {}", server.svc_upstream);
    println!("  /api/ml  -> {}", server.ml_upstream);

    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Build the router separately from binding so tests can drive it directly.
pub fn build_router(server: &ServerConfig) -> Router {
    let state = Arc::new(ProxyState {
        http: reqwest::Client::new(),
        routes: vec![
            ("/api/svc".to_string(), server.svc_upstream.clone()),
            ("/api/ml".to_string(), server.ml_upstream.clone()),
            (
                "/api/monitoring".to_string(),
                server.monitoring_upstream.clone(),
            ),
            ("/api/tfy-build".to_string(), server.build_upstream.clone()),
        ],
    });

    let static_service = ServeDir::new(&server.static_dir)
        .fallback(ServeFile::new(server.static_dir.join("index.html")));

    Router::new()
        .route("/readyz", get(handle_readyz))
        .route("/livez", get(handle_livez))
        .route("/api/svc", any(handle_proxy))
        .route("/api/svc/{*rest}", any(handle_proxy))
        .route("/api/ml", any(handle_proxy))
        .route("/api/ml/{*rest}", any(handle_proxy))
        .route("/api/monitoring", any(handle_proxy))
        .route("/api/monitoring/{*rest}", any(handle_proxy))
        .route("/api/tfy-build", any(handle_proxy))
        .route("/api/tfy-build/{*rest}", any(handle_proxy))
        .fallback_service(static_service)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_readyz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ready".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn handle_livez() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "alive".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.into(),
            },
        }),
    )
        .into_response()
}

// ============ Reverse proxy ============

async fn handle_proxy(State(state): State<Arc<ProxyState>>, req: Request) -> Response {
    let path = req.uri().path().to_string();
    let route = state
        .routes
        .iter()
        .find(|(prefix, _)| path == *prefix || path.starts_with(&format!("{}/", prefix)))
        .cloned();

    let Some((prefix, upstream)) = route else {
        return error_response(StatusCode::NOT_FOUND, "not_found", "no proxy route");
    };

    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_PROXY_BODY).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "body_too_large",
                "proxied request body exceeds the buffer limit",
            )
        }
    };

    let target = target_url(&upstream, &prefix, parts.uri.path(), parts.uri.query());

    let mut headers = parts.headers.clone();
    strip_connection_headers(&mut headers);

    let upstream_resp = state
        .http
        .request(parts.method.clone(), &target)
        .headers(headers)
        .body(bytes)
        .send()
        .await;

    match upstream_resp {
        Ok(resp) => {
            let status = resp.status();
            let mut builder = Response::builder().status(status);
            for (name, value) in resp.headers() {
                if !is_connection_header(name.as_str()) {
                    builder = builder.header(name, value);
                }
            }
            match resp.bytes().await {
                Ok(body) => builder
                    .body(Body::from(body))
                    .unwrap_or_else(|e| {
                        error_response(StatusCode::BAD_GATEWAY, "upstream", e.to_string())
                    }),
                Err(e) => error_response(StatusCode::BAD_GATEWAY, "upstream", e.to_string()),
            }
        }
        Err(e) => error_response(
            StatusCode::BAD_GATEWAY,
            "upstream_unreachable",
            e.to_string(),
        ),
    }
}

/// Rewrite an incoming path to its upstream URL, stripping the proxy prefix
/// and preserving the query string.
fn target_url(upstream: &str, prefix: &str, path: &str, query: Option<&str>) -> String {
    let stripped = path.strip_prefix(prefix).unwrap_or(path);
    let mut target = format!(
        "{}{}",
        upstream.trim_end_matches('/'),
        if stripped.is_empty() { "/" } else { stripped }
    );
    if let Some(q) = query {
        target.push('?');
        target.push_str(q);
    }
    target
}

const CONNECTION_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

fn is_connection_header(name: &str) -> bool {
    CONNECTION_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

fn strip_connection_headers(headers: &mut axum::http::HeaderMap) {
    for name in CONNECTION_HEADERS {
        headers.remove(*name);
    }
}
