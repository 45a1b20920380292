use std::sync::Arc;
use std::time::Duration;

use kindred_client::api::KindredApi;
use kindred_client::config::ClientConfig;
use kindred_client::connection::PushClient;
use kindred_client::notifier::MatchNotifier;
use kindred_client::push::spawn_push_loop;
use kindred_client::session::{DiscoverySession, SessionCommand, SessionPorts};
use kindred_client::store::FilePopupStore;
use kindred_client::sync::{SyncChannel, TabSignalHub};
use kindred_client::tracker::PopupTracker;
use kindred_client::watch::spawn_store_watcher;
use kindred_core::discovery::DiscoveryQueue;
use kindred_core::popup::DismissAction;
use kindred_core::processor::SwipeProcessor;
use kindred_core::swipe::SwipeAction;
use kindred_core::undo::UndoStack;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Headless discovery client.
///
/// Reads commands from stdin, one per line, and prints session events to
/// stdout as JSON lines:
///
/// ```text
/// like [user_id]        dislike [user_id]
/// undo                  retry
/// dismiss <match_id> message|continue
/// ```
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing (stderr, stdout carries events) ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- Configuration ---
    let config = ClientConfig::from_env();
    tracing::info!(
        user_id = config.user_id,
        api_url = %config.api_url,
        state_dir = %config.popup_state_dir.display(),
        "Loaded client configuration"
    );

    let cancel = CancellationToken::new();

    // --- Popup state + sync channel ---
    let store = Arc::new(FilePopupStore::new(&config.popup_state_dir));
    let tracker = PopupTracker::new(config.user_id, store.clone());
    // Picks up dismissals from tabs in other processes.
    let watcher_handle = match spawn_store_watcher(
        store,
        config.user_id,
        tracker.change_feed(),
        cancel.child_token(),
    ) {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Popup store watcher unavailable, relying on sync signals");
            None
        }
    };
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let sync = SyncChannel::new(config.user_id, Arc::new(TabSignalHub::new())).with_push(outbound_tx);
    let notifier = MatchNotifier::new(tracker, sync);

    // --- Session ---
    let processor = SwipeProcessor::new(
        DiscoveryQueue::new(config.low_water_mark),
        UndoStack::new(config.undo_depth),
    );
    let ports = SessionPorts::from_api(KindredApi::new(config.api_url.clone(), config.token.clone()));
    let session = DiscoverySession::new(processor, notifier, ports, config.refill_batch);
    let mut events = session.subscribe();

    // --- Push connection ---
    let (push_tx, push_rx) = mpsc::unbounded_channel();
    let push_client = PushClient::new(config.user_id, config.ws_url.clone(), config.token.clone());
    let push_handle = spawn_push_loop(push_client, push_tx, outbound_rx, cancel.child_token());

    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let session_handle = tokio::spawn(session.run(command_rx, push_rx, cancel.child_token()));

    let printer_handle = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!(error = %e, "Failed to encode session event"),
                },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // --- Command input ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => command_tx.send(command)?,
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
    }

    // --- Cleanup ---
    cancel.cancel();
    drop(command_tx);
    let _ = tokio::time::timeout(Duration::from_secs(5), session_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), push_handle).await;
    if let Some(handle) = watcher_handle {
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;
    }
    let _ = tokio::time::timeout(Duration::from_secs(1), printer_handle).await;

    tracing::info!("Client shut down");
    Ok(())
}

fn parse_command(line: &str) -> Result<SessionCommand, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let arg = parts.next();

    let parse_id = |raw: &str| {
        raw.parse::<i64>()
            .map_err(|_| format!("not a valid id: {raw}"))
    };

    let swipe = |action: SwipeAction| -> Result<SessionCommand, String> {
        Ok(match arg {
            Some(raw) => SessionCommand::Swipe {
                target_user_id: parse_id(raw)?,
                action,
            },
            None => SessionCommand::SwipeCurrent(action),
        })
    };

    match verb {
        "like" => swipe(SwipeAction::Like),
        "dislike" => swipe(SwipeAction::Dislike),
        "undo" => Ok(SessionCommand::Undo),
        "retry" => Ok(SessionCommand::ResetExhausted),
        "dismiss" => {
            let match_id = parse_id(arg.ok_or("usage: dismiss <match_id> message|continue")?)?;
            let action = match parts.next() {
                Some("message") => DismissAction::Message,
                Some("continue") | None => DismissAction::Continue,
                Some(other) => return Err(format!("unknown dismiss action: {other}")),
            };
            Ok(SessionCommand::Dismiss { match_id, action })
        }
        other => Err(format!("unknown command: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_swipes() {
        assert_eq!(
            parse_command("like").unwrap(),
            SessionCommand::SwipeCurrent(SwipeAction::Like)
        );
        assert_eq!(
            parse_command("dislike 42").unwrap(),
            SessionCommand::Swipe {
                target_user_id: 42,
                action: SwipeAction::Dislike
            }
        );
    }

    #[test]
    fn parses_dismiss() {
        assert_eq!(
            parse_command("dismiss 7 message").unwrap(),
            SessionCommand::Dismiss {
                match_id: 7,
                action: DismissAction::Message
            }
        );
        assert!(parse_command("dismiss").is_err());
        assert!(parse_command("dismiss 7 wave").is_err());
    }

    #[test]
    fn rejects_unknown_commands() {
        assert!(parse_command("superlike").is_err());
        assert!(parse_command("like abc").is_err());
    }
}
