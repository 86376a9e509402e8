use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

use crate::auth::middleware::{authenticate, bearer_token};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
) -> Response {
    // Browsers cannot set headers on a WebSocket handshake, so the query wins
    let token = query.token.as_deref().or_else(|| bearer_token(&headers));

    let user_id = match token.map(|t| authenticate(t, &state.config)) {
        Some(Ok(user)) => user.id,
        Some(Err(_)) => {
            tracing::warn!("WebSocket auth failed: invalid or expired token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
        None => {
            tracing::warn!("WebSocket auth failed: missing token");
            return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let Some(mut rx) = state.ws_tx.as_ref().map(|tx| tx.subscribe()) else {
        tracing::warn!(user_id = %user_id, "Change feed disabled, closing WebSocket");
        let _ = sender.send(Message::Close(None)).await;
        return;
    };

    tracing::debug!(user_id = %user_id, "WebSocket connection established");

    // Forward this user's change events
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(user_id = %user_id, skipped, "WebSocket subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if event.user_id() != user_id {
                continue;
            }
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    // Drain client frames until it closes
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!(user_id = %user_id, "WebSocket connection closed");
}
