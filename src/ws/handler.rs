//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// Capacity of the per-connection outbound queue
const OUTBOX_SIZE: usize = 64;

/// Errors while writing to a client socket
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket send failed: {0}")]
    Socket(#[from] axum::Error),
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    // the connection id doubles as the player id
    let player_id = Uuid::new_v4();
    info!(player_id = %player_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();

    run_session(player_id, &state, ws_sink, ws_stream).await;

    // Cleanup on disconnect
    state.rooms.leave(player_id);

    info!(player_id = %player_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    player_id: Uuid,
    state: &AppState,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
) {
    let rate_limiter = ConnectionRateLimiter::new();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMsg>(OUTBOX_SIZE);

    // Spawn writer task: outbox -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(player_id = %player_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    let mut forwarder: Option<JoinHandle<()>> = None;

    // Reader loop: WebSocket -> room registry
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(player_id = %player_id, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(ClientMsg::Join(request)) => {
                        let Some(ticket) = state.rooms.join(player_id, request.into_profile())
                        else {
                            continue;
                        };

                        let joined = ServerMsg::Joined {
                            room_id: ticket.room_id,
                            player_id,
                            player_number: ticket.player_number,
                        };
                        if out_tx.send(joined).await.is_err() {
                            debug!(player_id = %player_id, "Outbox closed");
                            break;
                        }

                        forwarder = Some(tokio::spawn(forward_room(
                            player_id,
                            ticket.events,
                            out_tx.clone(),
                        )));
                    }
                    Ok(ClientMsg::Flap) => {
                        state.rooms.flap(player_id);
                    }
                    Err(e) => {
                        warn!(player_id = %player_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(player_id = %player_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(player_id = %player_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(player_id = %player_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(player_id = %player_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(player_id = %player_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    if let Some(forwarder) = forwarder {
        forwarder.abort();
    }
    writer_handle.abort();
}

/// Forward room broadcasts into the connection's outbox
async fn forward_room(
    player_id: Uuid,
    mut events: broadcast::Receiver<ServerMsg>,
    out_tx: mpsc::Sender<ServerMsg>,
) {
    loop {
        match events.recv().await {
            Ok(msg) => {
                if out_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(
                    player_id = %player_id,
                    lagged_count = n,
                    "Client lagged, skipping {} room messages", n
                );
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(player_id = %player_id, "Room channel closed");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), SessionError> {
    let json = serde_json::to_string(msg)?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
