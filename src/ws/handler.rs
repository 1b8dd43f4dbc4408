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
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::WorldCommand;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{ClientMsg, Frame};

/// Direct (non-broadcast) messages queued per connection
const OUTBOX_CAPACITY: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (ws_sink, ws_stream) = socket.split();
    let (outbox_tx, outbox_rx) = mpsc::channel::<Frame>(OUTBOX_CAPACITY);
    let frames_rx = state.world.subscribe();

    let writer_handle = tokio::spawn(run_writer(conn_id, ws_sink, outbox_rx, frames_rx));

    run_reader(conn_id, ws_stream, &state, outbox_tx).await;

    // Signal disconnect to the world
    if state
        .world
        .commands
        .send(WorldCommand::Disconnect { conn_id })
        .await
        .is_err()
    {
        debug!(conn_id = %conn_id, "World closed before disconnect");
    }

    writer_handle.abort();
    info!(conn_id = %conn_id, "WebSocket connection closed");
}

/// Writer task: direct messages and broadcast frames -> WebSocket
async fn run_writer(
    conn_id: Uuid,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut outbox_rx: mpsc::Receiver<Frame>,
    mut frames_rx: broadcast::Receiver<Frame>,
) {
    loop {
        let frame = tokio::select! {
            direct = outbox_rx.recv() => match direct {
                Some(frame) => frame,
                None => break,
            },
            broadcast = frames_rx.recv() => match broadcast {
                Ok(frame) => frame,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(conn_id = %conn_id, lagged_count = n, "Client lagged, skipping {} frames", n);
                    // Continue - don't disconnect for lag
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(conn_id = %conn_id, "Broadcast channel closed");
                    break;
                }
            },
        };

        if let Err(e) = ws_sink.send(Message::Text(frame.to_string())).await {
            debug!(conn_id = %conn_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}

/// Reader loop: WebSocket -> world
async fn run_reader(
    conn_id: Uuid,
    mut ws_stream: SplitStream<WebSocket>,
    state: &AppState,
    outbox_tx: mpsc::Sender<Frame>,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        let text = match result {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn_id, "Received binary message, ignoring");
                continue;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        };

        if !rate_limiter.check_input() {
            warn!(conn_id = %conn_id, "Rate limited inbound message");
            continue;
        }

        let client_msg = match serde_json::from_str::<ClientMsg>(&text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Failed to parse client message");
                continue;
            }
        };

        let command = match client_msg {
            ClientMsg::Init(init) => {
                // Load outside the world task so a slow store never stalls a tick
                let record = match state.store.load(&init.player_id).await {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(player_id = %init.player_id, error = %e, "Failed to load player, using defaults");
                        None
                    }
                };
                WorldCommand::Join {
                    conn_id,
                    player_id: init.player_id,
                    record,
                    outbox: outbox_tx.clone(),
                }
            }
            ClientMsg::PlayerInput(input) => WorldCommand::Input { conn_id, input },
            ClientMsg::ChatMessage(chat) => {
                if !rate_limiter.check_chat() {
                    warn!(conn_id = %conn_id, "Rate limited chat message");
                    continue;
                }
                WorldCommand::Chat {
                    conn_id,
                    message: chat.message,
                }
            }
        };

        if state.world.commands.send(command).await.is_err() {
            debug!(conn_id = %conn_id, "World command channel closed");
            break;
        }
    }
}
