//! Streamable HTTP transport adapter
//!
//! Each tool call is a discrete JSON-RPC exchange on `POST /`. `initialize`
//! creates a session whose id travels in the `Mcp-Session-Id` header; every
//! later call must present it. `GET /` holds open a server-initiated event
//! channel for the session and `DELETE /` ends it. The session store is the
//! registry's runtime context: it only accepts sessions between `open` and
//! `close`, which the lifecycle manager drives.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::stream;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::AppError;
use crate::lifecycle::SessionContext;
use crate::mcp::rpc::{is_json_rpc_error, json_rpc_error, json_rpc_error_with_data};
use crate::mcp::server::handle_json_rpc_value;
use crate::registry::ToolRegistry;

pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

const SESSION_TTL: Duration = Duration::from_secs(300);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Session bookkeeping for one registry's streamable endpoint.
pub struct SessionStore {
    name: &'static str,
    ttl: Duration,
    accepting: AtomicBool,
    sessions: Arc<RwLock<HashMap<String, Instant>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(name: &'static str) -> Self {
        Self::with_ttl(name, SESSION_TTL)
    }

    pub fn with_ttl(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            accepting: AtomicBool::new(false),
            sessions: Arc::new(RwLock::new(HashMap::new())),
            sweeper: Mutex::new(None),
        }
    }

    pub async fn create(&self) -> Result<String, AppError> {
        self.ensure_accepting()?;

        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Instant::now());
        Ok(session_id)
    }

    /// Refreshes the idle clock of a live session.
    pub async fn touch(&self, session_id: &str) -> Result<(), AppError> {
        self.ensure_accepting()?;

        match self.sessions.write().await.get_mut(session_id) {
            Some(last_seen) => {
                *last_seen = Instant::now();
                Ok(())
            }
            None => Err(AppError::not_found(
                "unknown_session",
                "session not found or expired",
            )),
        }
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    fn ensure_accepting(&self) -> Result<(), AppError> {
        if self.accepting.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::internal(format!(
                "session context {} is not running",
                self.name
            )))
        }
    }
}

#[async_trait]
impl SessionContext for SessionStore {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn open(&self) -> Result<(), AppError> {
        let sessions = Arc::clone(&self.sessions);
        let ttl = self.ttl;
        let sweep_period = ttl.min(Duration::from_secs(60));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                sessions
                    .write()
                    .await
                    .retain(|_, last_seen| last_seen.elapsed() <= ttl);
            }
        });

        *self.sweeper.lock().await = Some(handle);
        self.accepting.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        self.sessions.write().await.clear();
    }
}

#[derive(Clone)]
pub struct StreamableState {
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
}

pub fn router(registry: Arc<ToolRegistry>, sessions: Arc<SessionStore>) -> Router {
    let state = StreamableState { registry, sessions };

    Router::new()
        .route(
            "/",
            post(handle_post)
                .get(handle_open_stream)
                .delete(handle_end_session),
        )
        .with_state(state)
}

async fn handle_post(
    State(state): State<StreamableState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(err) = require_accept(&headers, &["application/json", "text/event-stream"]) {
        return err.into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(_) => {
            return (
                StatusCode::OK,
                Json(json_rpc_error(None, -32700, "Parse error")),
            )
                .into_response()
        }
    };

    if payload.is_array() {
        return (
            StatusCode::OK,
            Json(json_rpc_error_with_data(
                None,
                -32600,
                "Invalid Request",
                Some(json!({
                    "code": "batch_not_supported",
                    "message": "batch requests are not supported on this transport",
                    "details": {}
                })),
            )),
        )
            .into_response();
    }

    let is_initialize = payload.get("method").and_then(Value::as_str) == Some("initialize");
    if !is_initialize {
        let session_id = match require_session_header(&headers) {
            Ok(session_id) => session_id,
            Err(err) => return err.into_response(),
        };
        if let Err(err) = state.sessions.touch(session_id).await {
            return err.into_response();
        }
    }

    match handle_json_rpc_value(&state.registry, payload).await {
        None => StatusCode::ACCEPTED.into_response(),
        Some(response) => {
            let session_id = if is_initialize && !is_json_rpc_error(&response) {
                match state.sessions.create().await {
                    Ok(session_id) => Some(session_id),
                    Err(err) => return err.into_response(),
                }
            } else {
                None
            };

            let mut http_response = (StatusCode::OK, Json(response)).into_response();
            if let Some(session_id) = session_id {
                http_response.headers_mut().insert(
                    MCP_SESSION_ID_HEADER,
                    HeaderValue::from_str(&session_id).expect("session id header value"),
                );
            }
            http_response
        }
    }
}

async fn handle_open_stream(
    State(state): State<StreamableState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    require_accept(&headers, &["text/event-stream"])?;
    let session_id = require_session_header(&headers)?;
    state.sessions.touch(session_id).await?;

    // Server-initiated messages are not used; the channel idles on keep-alives.
    let channel = stream::pending::<Result<Event, Infallible>>();
    Ok(Sse::new(channel).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)))
}

async fn handle_end_session(
    State(state): State<StreamableState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let session_id = require_session_header(&headers)?;
    if state.sessions.remove(session_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found(
            "unknown_session",
            "session not found or expired",
        ))
    }
}

fn require_session_header(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .ok_or_else(|| {
            AppError::bad_request("missing_session", "Mcp-Session-Id header is required")
        })?
        .to_str()
        .map_err(|_| {
            AppError::bad_request("invalid_session", "Mcp-Session-Id header must be valid UTF-8")
        })
}

fn require_accept(headers: &HeaderMap, required: &[&str]) -> Result<(), AppError> {
    let accept = headers
        .get(header::ACCEPT)
        .ok_or_else(|| {
            AppError::not_acceptable("missing_accept", "Accept header is required")
        })?
        .to_str()
        .map_err(|_| AppError::not_acceptable("invalid_accept", "Accept header must be valid UTF-8"))?;

    for needle in required {
        if !accept_contains(accept, needle) {
            return Err(AppError::not_acceptable(
                "invalid_accept",
                format!("Accept header must include {}", required.join(" and ")),
            ));
        }
    }

    Ok(())
}

fn accept_contains(accept: &str, needle: &str) -> bool {
    accept
        .split(',')
        .any(|part| part.trim().starts_with(needle) || part.trim() == "*/*")
}
