// Third party imports
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

// Internal imports
use crate::broadcaster::EventBroadcaster;

/// Phục vụ một observer WebSocket cho tới khi client ngắt kết nối
pub async fn serve_observer(socket: WebSocket, broadcaster: EventBroadcaster) {
    let client_id = Uuid::new_v4().to_string();
    let mut events = broadcaster.subscribe();
    info!(client_id = %client_id, observers = broadcaster.observer_count(), "Observer mới kết nối");

    // Chia socket thành sender và receiver
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Không thể serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client_id = %client_id, skipped, "Observer chậm, bỏ qua event");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) if text == "ping" => {
                    if sender.send(Message::Text("pong".to_string())).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => debug!(client_id = %client_id, "Bỏ qua message từ observer"),
            },
        }
    }

    let _ = sender.close().await;
    info!(client_id = %client_id, "Observer ngắt kết nối");
}
