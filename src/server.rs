// Profile Gate - HTTP Transport
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// axum adapter around the dispatcher. Derives the caller context from the
// peer address, proxy headers (when trusted) and User-Agent, and lifts the
// intent credential out of its header. Every response carries permissive
// CORS headers so browser-hosted agents can call in.

use crate::config::GateConfig;
use crate::mcp::{error_response, CallerContext, Dispatcher, ProtocolError, SERVER_NAME, SERVER_VERSION};
use anyhow::Context;
use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

/// Shared state for every handler
pub struct ServerState {
    pub dispatcher: Arc<Dispatcher>,
    pub config: GateConfig,
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/mcp", get(mcp_info).post(handle_mcp).options(preflight))
        .route("/.well-known/mcp.json", get(discovery).options(preflight))
        .route("/guestbook", get(list_guestbook).post(submit_guestbook).options(preflight))
        .route("/health", get(health))
        .fallback(fallback)
        .layer(middleware::map_response_with_state(Arc::clone(&state), apply_cors))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: GateConfig, dispatcher: Arc<Dispatcher>) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;
    let state = Arc::new(ServerState { dispatcher, config });
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("http bind failed on {}", addr))?;
    log::info!("Starting {} v{} on http://{}", SERVER_NAME, SERVER_VERSION, addr);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("ctrl-c handler failed: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}

// ============================================================================
// CALLER CONTEXT
// ============================================================================

fn header_text<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Proxy-reported client address: CF-Connecting-IP, else first X-Forwarded-For hop
fn forwarded_origin(headers: &HeaderMap) -> Option<String> {
    if let Some(ip) = header_text(headers, "cf-connecting-ip") {
        return Some(ip.to_string());
    }
    header_text(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn caller_context(config: &GateConfig, peer: SocketAddr, headers: &HeaderMap) -> CallerContext {
    let origin = if config.trust_proxy_headers {
        forwarded_origin(headers).unwrap_or_else(|| peer.ip().to_string())
    } else {
        peer.ip().to_string()
    };
    let client = header_text(headers, header::USER_AGENT.as_str()).unwrap_or("unknown");
    let credential = header_text(headers, &config.intent_header).map(str::to_string);
    CallerContext::new(&origin, client, credential)
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Buffer a request body up to the configured cap. None when it runs over
/// (or the client went away mid-body).
async fn read_body(body: Body, max: usize) -> Option<Bytes> {
    match axum::body::to_bytes(body, max).await {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            log::warn!("request body rejected: {}", e);
            None
        }
    }
}

/// POST /mcp: JSON-RPC, single or batch
async fn handle_mcp(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(body) = read_body(body, state.config.max_body_bytes).await else {
        let err = ProtocolError::InvalidRequest("request body too large".to_string());
        return (StatusCode::PAYLOAD_TOO_LARGE, Json(error_response(Value::Null, &err))).into_response();
    };
    let caller = caller_context(&state.config, peer, &headers);
    match state.dispatcher.handle(&caller, &body).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// GET /mcp: plain-text pointer for humans who wander in
async fn mcp_info(State(state): State<Arc<ServerState>>) -> Response {
    let d = &state.dispatcher;
    let text = format!(
        "{} v{}\n\nThis is a JSON-RPC 2.0 (MCP) endpoint. POST requests here.\n\
         Endpoint: {}\nDiscovery: /.well-known/mcp.json\nTools: {}\n\
         Gated tools unlock after leave_message, or with an intent credential in the {} header.\n",
        SERVER_NAME,
        SERVER_VERSION,
        d.settings().endpoint,
        d.catalog().names().join(", "),
        d.settings().intent_header,
    );
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()
}

/// GET /.well-known/mcp.json
async fn discovery(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(state.dispatcher.discovery_document())
}

/// GET /guestbook: public listing, newest first
async fn list_guestbook(State(state): State<Arc<ServerState>>) -> Json<Value> {
    match state.dispatcher.list_guestbook().await {
        Ok(entries) => Json(json!({ "count": entries.len(), "entries": entries })),
        Err(e) => {
            log::error!("guestbook listing failed: {}", e);
            Json(json!({
                "count": 0,
                "entries": [],
                "error": true,
                "message": "guestbook is temporarily unavailable",
            }))
        }
    }
}

/// POST /guestbook: direct submission, leave_message argument shape
async fn submit_guestbook(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let Some(body) = read_body(body, state.config.max_body_bytes).await else {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": "payload_too_large", "message": "request body too large" })),
        )
            .into_response();
    };
    let fields = match serde_json::from_slice::<Value>(&body) {
        Ok(Value::Object(map)) => map,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_request", "message": "body must be a JSON object" })),
            )
                .into_response();
        }
    };

    let caller = caller_context(&state.config, peer, &headers);
    state.dispatcher.prime(&caller);
    match state.dispatcher.submit_message(&caller, &fields).await {
        Ok(result) => (StatusCode::CREATED, Json(result)).into_response(),
        Err(ProtocolError::InvalidParams(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_params", "message": message })),
        )
            .into_response(),
        Err(e) => {
            log::error!("guestbook submission failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "unavailable", "message": "guestbook is temporarily unavailable" })),
            )
                .into_response()
        }
    }
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions": state.dispatcher.sessions().len(),
        "version": SERVER_VERSION,
    }))
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    (StatusCode::NOT_FOUND, Json(json!({ "error": "not_found" }))).into_response()
}

async fn apply_cors(State(state): State<Arc<ServerState>>, mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    let allowed = format!("content-type, accept, user-agent, {}", state.config.intent_header);
    if let Ok(value) = HeaderValue::from_str(&allowed) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, value);
    }
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

// ============================================================================
// TESTS
// ============================================================================
