use std::sync::Arc;
use axum::{
    extract::{Path, State, ws::{Message, WebSocket, WebSocketUpgrade}},
    response::Response,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::messages::{CountMessage, ReceivedMessage};
use crate::state::AppState;
use crate::websocket::msg_ping_handler::handle_ping_message;

/// WebSocket handler streaming a moment's presence count
pub async fn presence_ws(
    Path(moment_id): Path<String>,
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    info!("New presence WebSocket connection attempt for moment {}", moment_id);
    ws.on_upgrade(move |socket| handle_socket(socket, moment_id, state))
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, moment_id: String, state: Arc<AppState>) {

    // Generate unique connection ID to identify this client in logs
    let connection_id = Uuid::new_v4().to_string();
    info!("Presence WebSocket established for moment {} with connection_id {}", moment_id, connection_id);

    // Split the socket into sender and receiver
    let (sender, mut receiver) = socket.split();

    // Both tasks write to the socket
    let sender1 = Arc::new(Mutex::new(sender));
    let sender2 = sender1.clone();

    // Local join/leave results arrive through the hub
    let mut rbc = state.hub.subscribe(&moment_id).await;

    // Listen to the client; only pings are expected
    let recv_room = moment_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let text = match msg {
                Message::Text(text) => text,
                Message::Close(_) => break,
                _ => continue,
            };
            match serde_json::from_str::<ReceivedMessage>(&text) {
                Ok(ReceivedMessage::Ping(ping_msg)) => {
                    handle_ping_message(&ping_msg, &recv_room, &sender1).await;
                }
                Err(e) => {
                    debug!("Ignoring message for moment {}: {}", recv_room, e);
                }
            }
        }
    });

    // Push the count on connect, then whenever it changes. Polling picks up
    // other replicas and simulations, the hub delivers local changes at once.
    let push_state = state.clone();
    let push_room = moment_id.clone();
    let mut send_task = tokio::spawn(async move {
        let mut last_sent: Option<u64> = None;
        let mut ticker = interval(push_state.config.push_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let count = tokio::select! {
                _ = ticker.tick() => match push_state.tracker.count(&push_room).await {
                    Ok(count) => count,
                    Err(e) => {
                        warn!("Presence poll for moment {} failed: {}", push_room, e);
                        continue;
                    }
                },
                received = rbc.recv() => match received {
                    Ok(count) => count,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };

            if last_sent == Some(count) {
                continue;
            }
            last_sent = Some(count);
            if send_count(&sender2, &push_room, count).await.is_err() {
                break;
            }
        }
    });

    // Wait for either task to finish (and finish the other)
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
            let _ = recv_task.await;
        }
        _ = (&mut recv_task) => {
            send_task.abort();
            let _ = send_task.await;
        }
    };

    state.hub.release(&moment_id).await;
    info!("Presence WebSocket terminated for connection_id {}", connection_id);
}

async fn send_count(
    sender: &Arc<Mutex<SplitSink<WebSocket, Message>>>,
    moment_id: &str,
    count: u64,
) -> Result<(), ()> {
    let payload = serde_json::to_string(&CountMessage { count }).map_err(|e| {
        error!("Failed to serialize count for moment {}: {}", moment_id, e);
    })?;
    sender
        .lock()
        .await
        .send(Message::Text(payload))
        .await
        .map_err(|e| {
            debug!("Client for moment {} went away: {}", moment_id, e);
        })
}
