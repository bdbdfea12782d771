use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::bootstrap::app_context::AppContext;
use crate::presentation::ws::dispatcher::Dispatcher;
use crate::presentation::ws::protocol::ClientMessage;

#[derive(Debug, Deserialize, Clone)]
pub struct AuthQuery {
    pub token: Option<String>,
}

fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let cookie_hdr = headers.get(axum::http::header::COOKIE)?.to_str().ok()?;
    for part in cookie_hdr.split(';') {
        let kv = part.trim();
        if let Some((k, v)) = kv.split_once('=') {
            if k.trim() == "access_token" {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// C1 handshake. Resolves a bearer credential from the query string, the
/// `Authorization` header, or a cookie (in that order), authenticates it,
/// and upgrades the socket only on success -- rejection closes the
/// connection before any dispatcher state is allocated (§4.1).
pub async fn axum_ws_entry(
    ws: WebSocketUpgrade,
    Query(query): Query<AuthQuery>,
    headers: HeaderMap,
    State(ctx): State<AppContext>,
) -> Result<impl IntoResponse, StatusCode> {
    let token = query
        .token
        .or_else(|| {
            headers
                .get(axum::http::header::AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.strip_prefix("Bearer ").map(|s| s.to_string()))
        })
        .or_else(|| token_from_cookie(&headers));

    let identity = ctx
        .auth_gate
        .authenticate(token.as_deref())
        .await
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

    Ok(ws.on_upgrade(move |socket| peer(socket, ctx, identity)))
}

async fn peer(socket: WebSocket, ctx: AppContext, identity: crate::domain::identity::Identity) {
    let session_id = Uuid::new_v4();
    tracing::debug!(%session_id, user_id = %identity.id, "ws:connected");

    let (mut sink, mut stream) = socket.split();
    let capacity = ctx.cfg.session_outbound_capacity;
    let (mut outbound, kill) = ctx.sessions.register(session_id, capacity).await;

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut dispatcher = Dispatcher::new(ctx.clone(), session_id, identity);
    loop {
        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                let AxumMessage::Text(text) = frame else {
                    continue;
                };
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => dispatcher.handle(msg).await,
                    Err(e) => tracing::warn!(%session_id, error = %e, "ws:malformed_message_dropped"),
                }
            }
            _ = kill.notified() => {
                tracing::warn!(%session_id, "ws:force_closed_backpressure");
                break;
            }
        }
    }

    dispatcher.on_disconnect().await;
    writer.abort();
    tracing::info!(%session_id, "ws:disconnected");
}
