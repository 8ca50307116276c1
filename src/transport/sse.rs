//! Push-stream transport adapter
//!
//! `GET /` opens a long-lived event stream per client. The first event names
//! the session-scoped message endpoint; JSON-RPC requests posted there are
//! acknowledged with 202 and answered over the stream. A client that drops
//! its stream abandons any response still in flight.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{OriginalUri, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Router,
};
use futures::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::mcp::rpc::{json_rpc_error, json_rpc_error_with_data};
use crate::mcp::server::handle_json_rpc_value;
use crate::registry::ToolRegistry;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);
const SESSION_CHANNEL_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct SseState {
    registry: Arc<ToolRegistry>,
    sessions: Arc<RwLock<HashMap<Uuid, mpsc::Sender<Value>>>>,
}

pub fn router(registry: Arc<ToolRegistry>) -> Router {
    let state = SseState {
        registry,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };

    Router::new()
        .route("/", get(handle_sse))
        .route("/messages", post(handle_message))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    session_id: Uuid,
}

async fn handle_sse(
    State(state): State<SseState>,
    OriginalUri(uri): OriginalUri,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = Uuid::new_v4();
    let (tx, rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
    state.sessions.write().await.insert(session_id, tx);

    info!(
        server = state.registry.server_name(),
        session = %session_id,
        "sse session opened"
    );

    let endpoint = message_endpoint(uri.path(), session_id);
    let handshake = stream::once(async move { Event::default().event("endpoint").data(endpoint) });
    let responses = ReceiverStream::new(rx)
        .map(|payload| Event::default().event("message").data(payload.to_string()));

    Sse::new(handshake.chain(responses).map(Ok::<_, Infallible>))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}

async fn handle_message(
    State(state): State<SseState>,
    Query(query): Query<MessageQuery>,
    body: Bytes,
) -> Response {
    let sender = state.sessions.read().await.get(&query.session_id).cloned();
    let Some(sender) = sender else {
        return AppError::not_found("unknown_session", "session not found or expired")
            .into_response();
    };

    let outcome = match serde_json::from_slice::<Value>(&body) {
        Err(_) => Some(json_rpc_error(None, -32700, "Parse error")),
        Ok(payload) if payload.is_array() => Some(json_rpc_error_with_data(
            None,
            -32600,
            "Invalid Request",
            Some(serde_json::json!({
                "code": "batch_not_supported",
                "message": "batch requests are not supported on this transport",
                "details": {}
            })),
        )),
        Ok(payload) => handle_json_rpc_value(&state.registry, payload).await,
    };

    if let Some(response) = outcome {
        if sender.send(response).await.is_err() {
            // Stream consumer is gone; the result is abandoned.
            state.sessions.write().await.remove(&query.session_id);
            warn!(
                server = state.registry.server_name(),
                session = %query.session_id,
                "sse session dropped before response delivery"
            );
        }
    }

    StatusCode::ACCEPTED.into_response()
}

fn message_endpoint(sse_path: &str, session_id: Uuid) -> String {
    let base = sse_path.trim_end_matches('/');
    format!("{base}/messages?session_id={session_id}")
}
