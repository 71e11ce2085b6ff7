//! HTTP front door
//!
//! One fallback handler multiplexes the whole surface: WebSocket
//! upgrades on any path, the client script for `GET *.js`, the demo
//! page for any other `GET`, and 400 for the rest.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::presence::PresenceHub;
use crate::session;

use super::config::ServerConfig;
use super::script::{render_script, ScriptConfig};

/// Shared state handed to every request
pub(super) struct AppState {
    pub(super) hub: Arc<PresenceHub>,
    pub(super) config: ServerConfig,
    pub(super) next_endpoint_id: AtomicU64,
}

/// Build the router serving the entire surface
pub(super) fn router(state: Arc<AppState>) -> Router {
    Router::new().fallback(handle_request).with_state(state)
}

/// Route one request: upgrade, script, page, or reject
async fn handle_request(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let peer = real_ip(request.headers(), addr);

    if is_websocket_upgrade(request.headers()) {
        return upgrade(state, peer, request).await;
    }

    if request.method() != Method::GET {
        tracing::debug!(peer = %peer, method = %request.method(), "Rejecting non-GET request");
        return StatusCode::BAD_REQUEST.into_response();
    }

    if request.uri().path().ends_with(".js") {
        serve_script(&state, request.uri(), request.headers()).await
    } else {
        serve_demo_page(&state, &peer, request.uri().path()).await
    }
}

/// Accept a WebSocket upgrade and hand the socket to a session
async fn upgrade(state: Arc<AppState>, peer: String, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let (mut parts, _body) = request.into_parts();

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::warn!(peer = %peer, error = %rejection, "WebSocket upgrade failed");
            return rejection.into_response();
        }
    };

    let endpoint_id = state.next_endpoint_id.fetch_add(1, Ordering::Relaxed);
    tracing::debug!(
        endpoint = endpoint_id,
        peer = %peer,
        path = %path,
        "Upgrading connection"
    );

    let hub = Arc::clone(&state.hub);
    let config = state.config.clone();
    ws.max_message_size(state.config.max_frame_size)
        .max_frame_size(state.config.max_frame_size)
        .on_upgrade(move |socket| session::serve(socket, endpoint_id, peer, hub, config))
}

/// Render and serve the client script with request-derived config
async fn serve_script(state: &AppState, uri: &Uri, headers: &HeaderMap) -> Response {
    let path = state.config.asset_dir.join("livecount.js");
    let template = match tokio::fs::read_to_string(&path).await {
        Ok(template) => template,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Client script asset missing");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let config = ScriptConfig::from_request(uri, headers);
    match render_script(&template, &config) {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/javascript; charset=utf-8"),
                (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render client script");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Serve the demo page
async fn serve_demo_page(state: &AppState, peer: &str, path: &str) -> Response {
    let file = state.config.asset_dir.join("demo.html");
    match tokio::fs::read_to_string(&file).await {
        Ok(body) => {
            tracing::debug!(peer = %peer, path = %path, "Serving demo page");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(path = %file.display(), error = %e, "Demo page asset missing");
            StatusCode::BAD_REQUEST.into_response()
        }
    }
}

/// Whether the request asks for a WebSocket upgrade
fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
}

/// Resolve the peer address, honoring proxy-forwarded headers
///
/// Order: X-Forwarded-For (first entry), X-Real-IP, CF-Connecting-IP,
/// then the socket address.
fn real_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }
    if let Some(ip) = header_str(headers, "x-real-ip") {
        return ip.to_string();
    }
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return ip.to_string();
    }
    addr.to_string()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
