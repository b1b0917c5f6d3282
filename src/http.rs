//! HTTP routes.
//!
//! `/t` serves the current snapshot (`check`, `force`, and `checkjs` for
//! JSONP clients), `/r` serves history files as JSONP.

use axum::extract::{RawQuery, State};
use axum::http::{header::CONTENT_TYPE, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

use common::{Result, Snapshot};
use refresh::{HistoryFileCache, RefreshCache};

const JAVASCRIPT: &str = "text/javascript";

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<RefreshCache>,
    pub history: Arc<HistoryFileCache>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/t", get(traffic))
        .route("/r", get(history))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Check,
    CheckJs,
    Force,
    Unknown,
}

impl Command {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "CHECK" => Some(Self::Check),
            "CHECKJS" => Some(Self::CheckJs),
            "FORCE" => Some(Self::Force),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// JSONP callbacks are limited to plain (dotted) identifiers.
fn valid_callback(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$'))
}

/// Command and JSONP callback from a `/t` query such as `checkjs&callback=cb`.
fn parse_traffic_query(query: Option<&str>) -> (Option<Command>, Option<String>) {
    let mut command = None;
    let mut callback = None;
    for part in query.unwrap_or_default().split('&') {
        if let Some(c) = Command::from_name(part) {
            command = Some(c);
        } else if let Some((key, value)) = part.split_once('=') {
            if key.eq_ignore_ascii_case("callback") && valid_callback(value) {
                callback = Some(value.to_string());
            }
        }
    }
    (command, callback)
}

/// History key and JSONP callback from a `/r` query such as `03-2017-4&callback=cb`.
fn parse_history_query(query: Option<&str>) -> (Option<String>, Option<String>) {
    let mut parts = query.unwrap_or_default().split('&');
    let key = parts
        .next()
        .filter(|k| !k.is_empty() && !k.contains('='))
        .map(str::to_string);
    let callback = parts
        .filter_map(|p| p.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case("callback"))
        .map(|(_, v)| v)
        .filter(|v| valid_callback(v))
        .map(str::to_string);
    (key, callback)
}

fn snapshot_body(result: Result<Arc<Snapshot>>) -> String {
    match result {
        Ok(snapshot) => serde_json::to_string(snapshot.as_ref())
            .unwrap_or_else(|e| json!({ "ERROR": e.to_string() }).to_string()),
        Err(e) => json!({ "ERROR": e.to_string() }).to_string(),
    }
}

fn wrapped_body(result: Result<Arc<Snapshot>>) -> String {
    match result {
        Ok(snapshot) => json!({ "DATA": snapshot.as_ref() }).to_string(),
        Err(e) => json!({ "ERROR": e.to_string() }).to_string(),
    }
}

fn jsonp(callback: Option<&str>, payload: &str) -> Response {
    let body = match callback {
        Some(cb) => format!("{}({});", cb, payload),
        None => payload.to_string(),
    };
    ([(CONTENT_TYPE, JAVASCRIPT)], body).into_response()
}

async fn traffic(State(st): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let (command, callback) = parse_traffic_query(query.as_deref());
    match command {
        Some(Command::Check) => snapshot_body(st.cache.retrieve().await).into_response(),
        Some(Command::Force) => snapshot_body(st.cache.force().await).into_response(),
        Some(Command::CheckJs) => {
            let payload = wrapped_body(st.cache.retrieve().await);
            jsonp(callback.as_deref(), &payload)
        }
        Some(Command::Unknown) => "UNKNOWN".into_response(),
        None => "NO COMMAND".into_response(),
    }
}

async fn history(State(st): State<AppState>, RawQuery(query): RawQuery) -> Response {
    let (key, callback) = parse_history_query(query.as_deref());
    let Some(key) = key else {
        return (StatusCode::BAD_REQUEST, "Missing history key").into_response();
    };

    match st.history.get(&key).await {
        Ok(payload) => jsonp(callback.as_deref(), &payload),
        Err(e) => {
            warn!("History request for {} failed: {}", key, e);
            (StatusCode::SERVICE_UNAVAILABLE, "Error loading file").into_response()
        }
    }
}
