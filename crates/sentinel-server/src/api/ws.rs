//! WebSocket stream of alerts, status frames and dispatched commands.
use crate::state::{AppState, Topic};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;

/// Handler for WebSocket connections.
/// GET /v1/ws?topics=alert,status
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsQuery>,
) -> axum::response::Response {
    let topics = params.topics.as_deref().map(parse_topics);
    ws.on_upgrade(move |socket| handle_socket(socket, state, topics))
        .into_response()
}

#[derive(Debug, Deserialize, Default)]
pub struct WsQuery {
    /// Comma-separated topic filter; everything when absent
    topics: Option<String>,
}

fn parse_topics(raw: &str) -> Vec<Topic> {
    raw.split(',').filter_map(Topic::parse).collect()
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, topics: Option<Vec<Topic>>) {
    let mut rx = state.subscribe();
    tracing::debug!(?topics, "Stream subscriber connected");

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Ping(payload))) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                }
            }
            event = rx.recv() => {
                match event {
                    Ok(msg) => {
                        if let Some(topics) = topics.as_deref() {
                            if !topics.contains(&msg.topic) {
                                continue;
                            }
                        }
                        if socket.send(Message::Text(msg.payload.as_ref().to_owned())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Status frames supersede each other; alerts are also logged server-side.
                        tracing::warn!(skipped, "Stream subscriber lagging");
                        continue;
                    }
                    Err(_) => break,
                }
            }
        }
    }
    tracing::debug!("Stream subscriber disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_topics_are_dropped_from_filter() {
        assert_eq!(
            parse_topics("alert,telemetry,command"),
            vec![Topic::Alert, Topic::Command]
        );
    }
}
