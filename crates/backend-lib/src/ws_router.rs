// ============================
// relay-backend-lib/src/ws_router.rs
// ============================
//! HTTP surface: the WebSocket endpoint and the read-only debug endpoints.
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderValue, Method, Uri},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use relay_common::{ClientEvent, CommunityId, ParticipantId, PollKey, ServerEvent};
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{debug, warn, Level};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::AppError;
use crate::polls::PollSnapshot;
use crate::rooms::OUTBOUND_CAPACITY;
use crate::AppState;

/// Handshake data a client supplies in the upgrade request's query string
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.settings);

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/active-polls", get(active_polls))
        .route("/api/community-users", get(community_users))
        .fallback(not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .with_state(state)
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let origins = if settings.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            settings
                .cors_allowed_origins
                .iter()
                .filter_map(|origin| HeaderValue::from_str(origin).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Handler for WebSocket connections
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, params.user_id))
}

async fn handle_connection(socket: WebSocket, state: Arc<AppState>, user_id: Option<String>) {
    let connection = Uuid::new_v4();
    let participant = user_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| connection.to_string());

    let (mut tx, mut rx) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_CAPACITY);

    if let Err(e) = state.relay.connect(connection, participant, outbound_tx) {
        warn!(%connection, "rejecting connection: {e}");
        return;
    }

    // Writer: runs until the relay drops this connection's queue or the
    // socket stops accepting frames
    tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&event).map_err(AppError::from) {
                Ok(json) => json,
                Err(e) => {
                    warn!(%connection, code = e.error_code(), "event not sent: {e}");
                    continue;
                },
            };
            if tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = rx.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    if let Err(e) = state.relay.dispatch(connection, event) {
                        warn!(%connection, "closing connection: {e}");
                        break;
                    }
                },
                Err(e) => warn!(%connection, "malformed frame dropped: {e}"),
            },
            Message::Close(_) => break,
            _ => {},
        }
    }

    debug!(%connection, "socket closed");
    let _ = state.relay.disconnect(connection);
}

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(uri.path().to_string())
}

/// Current state of every poll (debug only)
async fn active_polls(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<PollKey, PollSnapshot>>, AppError> {
    Ok(Json(state.relay.active_polls().await?))
}

/// Current members of every community (debug only)
async fn community_users(
    State(state): State<Arc<AppState>>,
) -> Result<Json<BTreeMap<CommunityId, Vec<ParticipantId>>>, AppError> {
    Ok(Json(state.relay.community_users().await?))
}
