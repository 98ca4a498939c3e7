//! WebSocket upgrade endpoint for creators watching their donations.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::models::user::UserId;
use crate::routes::params::parse_user_id;
use crate::AppState;

use super::connection::Connection;
use super::supervisor::supervise;

/// Creators never send anything meaningful; inbound frames only prove liveness.
const MAX_INBOUND_FRAME_BYTES: usize = 512;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
pub struct WsParams {
    creator_id: Option<String>,
}

/// `GET /ws?creator_id=<id>`
///
/// The query is validated before the upgrade so a bad request gets a plain
/// HTTP 400 instead of an open socket.
async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let creator_id = match parse_user_id("creator_id", params.creator_id.as_deref()) {
        Ok(id) => id,
        Err(e) => return e.into_response(),
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.max_message_size(MAX_INBOUND_FRAME_BYTES)
        .on_upgrade(move |socket| handle_connection(socket, state, creator_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, creator_id: UserId) {
    let (sink, stream) = socket.split();

    let conn = Connection::new(creator_id, sink);
    state.registry.register(conn.clone());

    tracing::info!(
        conn_id = %conn.id(),
        creator_id,
        connections = state.registry.connection_count(creator_id),
        "hub connection opened"
    );

    supervise(conn, stream, state.registry.clone(), state.config.hub).await;
}
