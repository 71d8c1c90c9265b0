//! Realtime notification channel.
//!
//! A single upgrade endpoint. The client authenticates once at connect time
//! with a session token passed as a query parameter (browsers cannot set
//! headers on WebSocket upgrades), joins its recipient-scoped group and
//! receives `{type, ...}` JSON frames pushed by the [`crate::notify`] hub.
//!
//! The client may send `{"action": "ping"}` for a liveness check and
//! `{"action": "mark-all-read"}` as a convenience; read state is always
//! owned by the stored rows, never by the connection.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::{api::models::users::CurrentUser, auth::session, db::handlers::Notifications, errors::Error, AppState};

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    /// Session token (same JWT as the bearer/cookie token)
    pub token: String,
}

#[tracing::instrument(skip_all)]
pub async fn notifications_ws(
    State(state): State<AppState>,
    Query(query): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // Authenticate before upgrading; a bad token never gets a socket
    let user = match session::verify_session_token(&query.token, &state.config) {
        Ok(user) => user,
        Err(_) => return Error::Unauthenticated { message: None }.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: CurrentUser) {
    tracing::debug!(user_id = %user.id, "Realtime notification connection opened");

    let mut updates = state.notifier.hub().subscribe(user.id);
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            frame = updates.recv() => {
                match frame {
                    Ok(frame) => {
                        if sender.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Slow consumer: skipped frames are still in the store
                        tracing::warn!(user_id = %user.id, skipped, "Realtime consumer lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            message = receiver.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_client_message(&state, &user, text.as_str()).await {
                            if sender.send(Message::Text(reply.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(user_id = %user.id, error = %e, "Realtime connection error");
                        break;
                    }
                }
            }
        }
    }

    tracing::debug!(user_id = %user.id, "Realtime notification connection closed");
}

/// Handle a client-sent frame; returns the reply to send, if any.
async fn handle_client_message(state: &AppState, user: &CurrentUser, text: &str) -> Option<String> {
    let Ok(message) = serde_json::from_str::<serde_json::Value>(text) else {
        return None;
    };

    match message.get("action").and_then(|v| v.as_str()) {
        Some("ping") => Some(serde_json::json!({"type": "pong"}).to_string()),
        Some("mark-all-read") => {
            // Convenience only; the REST endpoint is authoritative
            let result = async {
                let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
                let mut repo = Notifications::new(&mut conn);
                repo.mark_all_read(user.id).await.map_err(Error::Database)
            }
            .await;

            match result {
                Ok(updated) => Some(serde_json::json!({"type": "read-state", "status": "ok", "updated": updated}).to_string()),
                Err(e) => {
                    tracing::error!(user_id = %user.id, error = %e, "mark-all-read over realtime channel failed");
                    Some(serde_json::json!({"type": "read-state", "status": "error"}).to_string())
                }
            }
        }
        _ => None,
    }
}
