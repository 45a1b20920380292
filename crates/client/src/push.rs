//! Push-channel connection loop.
//!
//! [`spawn_push_loop`] keeps a WebSocket to the server open for the local
//! user: connect, pump frames both ways until the socket drops, then
//! reconnect with backoff. Inbound frames are parsed into
//! [`PushMessage`]s for the session; outbound [`ClientMessage`]s are
//! written as text frames. On every reconnect the server replays recent
//! matches, which is what recovers deliveries lost while disconnected.

use futures::{SinkExt, StreamExt};
use kindred_core::protocol::{ClientMessage, PushMessage};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::connection::{PushClient, PushStream};
use crate::messages::{encode_message, parse_message};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

/// Why a single connection stopped being pumped.
#[derive(Debug, PartialEq, Eq)]
enum ConnectionEnd {
    /// The socket closed or errored; reconnect.
    Dropped,
    /// Cancelled, or the session went away; stop for good.
    Shutdown,
}

/// Spawn the connect / pump / reconnect loop.
pub fn spawn_push_loop(
    client: PushClient,
    inbound: mpsc::UnboundedSender<PushMessage>,
    outbound: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(user_id = client.user_id(), "Starting push loop");
        run_push_loop(&client, &inbound, outbound, &cancel).await;
        tracing::info!(user_id = client.user_id(), "Push loop exited");
    })
}

async fn run_push_loop(
    client: &PushClient,
    inbound: &mpsc::UnboundedSender<PushMessage>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    cancel: &CancellationToken,
) {
    let reconnect_config = ReconnectConfig::default();

    let mut conn = match client.connect().await {
        Ok(conn) => conn,
        Err(e) => {
            tracing::warn!(error = %e, "Push connection failed, entering reconnect loop");
            match reconnect_loop(client, &reconnect_config, cancel).await {
                Some(conn) => conn,
                None => return,
            }
        }
    };

    loop {
        match pump(conn.ws_stream, inbound, &mut outbound, cancel).await {
            ConnectionEnd::Shutdown => return,
            ConnectionEnd::Dropped => {
                tracing::info!(user_id = client.user_id(), "Push connection lost");
            }
        }

        conn = match reconnect_loop(client, &reconnect_config, cancel).await {
            Some(conn) => conn,
            None => return,
        };
    }
}

/// Pump one connection until it drops or the loop is shut down.
async fn pump(
    ws_stream: PushStream,
    inbound: &mpsc::UnboundedSender<PushMessage>,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
    cancel: &CancellationToken,
) -> ConnectionEnd {
    let (mut sink, mut stream) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return ConnectionEnd::Shutdown;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(message) = handle_text_frame(&text) {
                        if inbound.send(message).is_err() {
                            return ConnectionEnd::Shutdown;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    tracing::info!(?frame, "Push connection closed by server");
                    return ConnectionEnd::Dropped;
                }
                // Pings are answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Push receive error");
                    return ConnectionEnd::Dropped;
                }
                None => return ConnectionEnd::Dropped,
            },
            message = outbound.recv() => {
                let Some(message) = message else {
                    return ConnectionEnd::Shutdown;
                };
                match encode_message(&message) {
                    Ok(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            // Dismissals are best-effort; durable state already holds them.
                            tracing::warn!(error = %e, "Failed to send push frame");
                            return ConnectionEnd::Dropped;
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "Failed to encode client frame"),
                }
            }
        }
    }
}

fn handle_text_frame(text: &str) -> Option<PushMessage> {
    match parse_message(text) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::error!(error = %e, "Discarded malformed push frame");
            None
        }
    }
}
