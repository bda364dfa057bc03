//! WebSocket upgrade handler and relay loop
//!
//! Each connection gets a private outbox channel drained by a writer task;
//! the read loop parses frames and hands them to the room registry, which
//! forwards them to the counterpart seat. The relay never interprets game
//! state beyond the envelope it needs for routing.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::util::rate_limit::PeerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// How long a fresh connection may sit idle before its first `join`
const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outbox depth per connection; a peer this far behind is effectively gone
const OUTBOX_DEPTH: usize = 64;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let peer_id = Uuid::new_v4();
    info!(peer_id = %peer_id, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, peer_id, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, peer_id: Uuid, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_DEPTH);

    // Writer task: outbox -> WebSocket
    let writer_peer_id = peer_id;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(peer_id = %writer_peer_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // The first frame has to be a join; everything else waits for a seat
    let room_id = match await_join(peer_id, &mut ws_stream).await {
        JoinAttempt::Joined(room_id) => room_id,
        JoinAttempt::Refused(code, message) => {
            let _ = outbox_tx
                .send(ServerMsg::Error {
                    code: code.to_string(),
                    message: message.to_string(),
                })
                .await;
            drop(outbox_tx);
            let _ = writer_handle.await;
            return;
        }
        JoinAttempt::Gone => {
            writer_handle.abort();
            return;
        }
    };

    // The registry sends the role frame and pairing notifications itself
    if let Err(e) = state.rooms.join(&room_id, peer_id, outbox_tx.clone()).await {
        warn!(room_id = %room_id, peer_id = %peer_id, error = %e, "Join refused");
        let _ = outbox_tx
            .send(ServerMsg::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            })
            .await;
        drop(outbox_tx);
        let _ = writer_handle.await;
        return;
    }

    run_relay(peer_id, &room_id, &mut ws_stream, &state).await;

    // Cleanup on disconnect
    state.rooms.leave(&room_id, peer_id).await;
    writer_handle.abort();

    info!(room_id = %room_id, peer_id = %peer_id, "WebSocket connection closed");
}

enum JoinAttempt {
    Joined(String),
    Refused(&'static str, &'static str),
    /// Socket dropped before joining; nobody left to notify
    Gone,
}

/// Wait for the opening `join` frame, skipping transport chatter
async fn await_join(peer_id: Uuid, ws_stream: &mut SplitStream<WebSocket>) -> JoinAttempt {
    let first_text = timeout(JOIN_TIMEOUT, async {
        loop {
            match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Binary(_))) => {
                    warn!(peer_id = %peer_id, "Binary frame before join");
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Err(e)) => {
                    debug!(peer_id = %peer_id, error = %e, "WebSocket error before join");
                    return None;
                }
            }
        }
    })
    .await;

    match first_text {
        Ok(Some(text)) => match serde_json::from_str::<ClientMsg>(&text) {
            Ok(ClientMsg::Join { room_id }) => JoinAttempt::Joined(room_id),
            Ok(_) => {
                warn!(peer_id = %peer_id, "First frame was not a join");
                JoinAttempt::Refused("join_required", "Join a room before sending frames")
            }
            Err(e) => {
                warn!(peer_id = %peer_id, error = %e, "Unparseable join frame");
                JoinAttempt::Refused("join_required", "Join a room before sending frames")
            }
        },
        Ok(None) => JoinAttempt::Gone,
        Err(_) => {
            info!(peer_id = %peer_id, "Join handshake timed out");
            JoinAttempt::Refused("join_timeout", "No join received in time")
        }
    }
}

/// Read loop: WebSocket -> counterpart seat
async fn run_relay(
    peer_id: Uuid,
    room_id: &str,
    ws_stream: &mut SplitStream<WebSocket>,
    state: &AppState,
) {
    let rate_limiter = PeerRateLimiter::new();

    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(room_id = %room_id, peer_id = %peer_id, "Rate limited frame");
                    continue;
                }

                let msg = match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(room_id = %room_id, peer_id = %peer_id, error = %e, "Unparseable frame");
                        continue;
                    }
                };

                // Frames are bound to the room joined on this connection
                if msg.room_id() != room_id {
                    warn!(
                        room_id = %room_id,
                        peer_id = %peer_id,
                        claimed = %msg.room_id(),
                        "Dropped frame for a foreign room"
                    );
                    continue;
                }

                match msg.to_relayed() {
                    Some(relayed) => state.rooms.forward(room_id, peer_id, relayed),
                    None => {
                        debug!(room_id = %room_id, peer_id = %peer_id, "Duplicate join ignored");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(room_id = %room_id, peer_id = %peer_id, "Binary frame ignored");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(room_id = %room_id, peer_id = %peer_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(room_id = %room_id, peer_id = %peer_id, error = %e, "WebSocket error");
                break;
            }
        }
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
