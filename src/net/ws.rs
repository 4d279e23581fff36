//! Spectator WebSocket fanout.
//!
//! One task per socket: replay the current snapshot on connect, then
//! forward every event from the broadcast channel as a JSON frame on the
//! `shooter` channel. Slow readers that lag the channel just skip ahead.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::game::snapshot::WorldView;
use crate::msg::events::WsEvent;

#[derive(Serialize)]
struct Frame<'a> {
    channel: &'static str,
    #[serde(flatten)]
    event: &'a WsEvent,
}

fn encode(event: &WsEvent) -> Option<Message> {
    serde_json::to_string(&Frame { channel: "shooter", event })
        .ok()
        .map(|s| Message::Text(s.into()))
}

pub async fn spectator_socket(
    socket: WebSocket,
    mut events_rx: broadcast::Receiver<WsEvent>,
    initial: Arc<WorldView>,
) {
    let (mut sink, mut stream) = socket.split();

    // Catch the client up before the live feed.
    if initial.has_match() {
        let snapshot = WsEvent::Snapshot(initial.snapshot.clone());
        if let Some(frame) = encode(&snapshot) {
            if sink.send(frame).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        let Some(frame) = encode(&event) else { continue };
                        if sink.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("Spectator socket lagged, skipped {skipped} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    // Spectators have nothing to say; drop anything else.
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    debug!("Spectator socket closed");
}
