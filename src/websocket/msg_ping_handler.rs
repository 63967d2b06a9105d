use tracing::{debug, error};
use std::sync::Arc;
use axum::{
    extract::ws::{Message, WebSocket},
};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use tokio::sync::Mutex;
use crate::models::messages::{PingMessage, PongMessage, SendMessage};
use chrono::Utc;

/// Handle PingMessage
pub async fn handle_ping_message(_ping_msg: &PingMessage, moment_id: &str, sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>) {
    debug!("Ping message received for moment {}", moment_id);

    // Reply with pong
    let pong = SendMessage::Pong(PongMessage { date: Utc::now().to_rfc3339() });
    let pong_msg = match serde_json::to_string(&pong) {
        Ok(msg) => msg,
        Err(e) => {
            error!("Failed to serialize Pong message for moment {}: {}", moment_id, e);
            return;
        }
    };
    if sender.lock().await.send(Message::Text(pong_msg)).await.is_err() {
        error!("Failed to send Pong message for moment {}", moment_id);
    }
}
