//! WebSocket live channel
//!
//! One bidirectional streaming connection per client. Server-to-client
//! frames are the JSON-serialized message union; the only supported
//! client-to-server frame is the close handshake - anything else is
//! logged and dropped without breaking the connection. The delivery
//! loop waits on the next queued message and on peer signals
//! simultaneously, so a shutdown or disconnect interrupts a loop that
//! would otherwise wait forever.

use axum::{
    extract::{
        ws::{Message as WsFrame, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use mp_bus::Message;

use crate::state::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before the initial snapshot so nothing broadcast in
    // between is missed.
    let mut sub = state.bus.subscribe();
    let mut shutdown = state.shutdown.clone();

    let session_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket connected: {}", &session_id[..8]);

    // Clients start from the authoritative state and self-correct from
    // there.
    let hello = Message::SetupStatusUpdate {
        status: state.orchestrator.status().await,
    };
    if send_frame(&mut sender, &hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = sub.recv() => {
                match msg {
                    Some(msg) => {
                        if send_frame(&mut sender, &msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = receiver.next() => {
                match frame {
                    Some(Ok(WsFrame::Close(_))) | None => {
                        debug!("WebSocket peer closed");
                        break;
                    }
                    Some(Ok(WsFrame::Text(text))) => {
                        // Inbound frames other than close are not part
                        // of the protocol: log, drop, keep serving.
                        warn!(len = text.len(), "Ignoring unsupported client frame");
                    }
                    Some(Ok(WsFrame::Binary(data))) => {
                        warn!(len = data.len(), "Ignoring binary client frame");
                    }
                    Some(Ok(_)) => {} // ping/pong handled by the transport
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                // Graceful close handshake before releasing resources.
                let _ = sender.send(WsFrame::Close(None)).await;
                break;
            }
        }
    }

    info!("WebSocket disconnected: {}", &session_id[..8]);
}

async fn send_frame(
    sender: &mut (impl SinkExt<WsFrame> + Unpin),
    message: &Message,
) -> Result<(), ()> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to serialize outbound message: {}", e);
            return Ok(());
        }
    };
    sender.send(WsFrame::Text(json)).await.map_err(|_| ())
}
