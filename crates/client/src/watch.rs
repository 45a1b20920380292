//! Change feed for the file-backed popup store.
//!
//! Tabs running as separate processes share nothing but the user's popup
//! file. [`spawn_store_watcher`] watches the store directory, re-reads the
//! file whenever it is replaced and publishes the per-match differences as
//! [`PopupChange`]s on the tracker's change stream. A tab therefore learns
//! about a dismissal made elsewhere even when the sync signal never reached
//! it.

use std::path::Path;
use std::sync::mpsc as std_mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use kindred_core::types::DbId;
use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::store::{FilePopupStore, PopupStates, PopupStore, StoreError};
use crate::tracker::PopupChange;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Matches whose state differs between two snapshots, in `after`'s form.
/// The store never deletes entries, so removals are not reported.
pub fn diff_states(before: &PopupStates, after: &PopupStates) -> Vec<PopupChange> {
    after
        .iter()
        .filter(|(match_id, state)| before.get(match_id) != Some(state))
        .map(|(&match_id, &state)| PopupChange { match_id, state })
        .collect()
}

/// Start watching `user_id`'s popup file, publishing changes into `feed`
/// until `cancel` fires.
///
/// Setup errors are returned directly; the baseline snapshot is taken
/// before this returns, so no write made afterwards is missed.
pub fn spawn_store_watcher(
    store: Arc<FilePopupStore>,
    user_id: DbId,
    feed: broadcast::Sender<PopupChange>,
    cancel: CancellationToken,
) -> Result<JoinHandle<()>, StoreError> {
    let dir = store.dir().to_path_buf();
    std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
        path: dir.clone(),
        source,
    })?;

    let watch_error = |source| StoreError::Watch {
        path: dir.clone(),
        source,
    };
    let (watch_tx, watch_rx) = std_mpsc::channel();
    let mut watcher =
        RecommendedWatcher::new(watch_tx, NotifyConfig::default()).map_err(watch_error)?;
    // The file is replaced by rename, so watch its directory rather than
    // the file's inode.
    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .map_err(watch_error)?;

    let baseline = store.load(user_id)?;
    let target = store.path_for(user_id);

    Ok(tokio::task::spawn_blocking(move || {
        let _watcher = watcher;
        watch_loop(&store, user_id, &target, baseline, &watch_rx, &feed, &cancel);
    }))
}

fn watch_loop(
    store: &FilePopupStore,
    user_id: DbId,
    target: &Path,
    mut last: PopupStates,
    watch_rx: &std_mpsc::Receiver<notify::Result<Event>>,
    feed: &broadcast::Sender<PopupChange>,
    cancel: &CancellationToken,
) {
    tracing::debug!(user_id, path = %target.display(), "Popup store watcher started");
    loop {
        if cancel.is_cancelled() {
            break;
        }
        match watch_rx.recv_timeout(POLL_INTERVAL) {
            Ok(Ok(event)) => {
                let touches_target = event
                    .paths
                    .iter()
                    .any(|path| path.file_name() == target.file_name());
                if !touches_target {
                    continue;
                }
                match store.load(user_id) {
                    Ok(current) => {
                        for change in diff_states(&last, &current) {
                            tracing::debug!(
                                user_id,
                                match_id = change.match_id,
                                state = ?change.state,
                                "Popup state changed on disk",
                            );
                            let _ = feed.send(change);
                        }
                        last = current;
                    }
                    Err(e) => tracing::warn!(user_id, error = %e, "Popup store reload failed"),
                }
            }
            Ok(Err(e)) => tracing::warn!(user_id, error = %e, "Popup store watcher error"),
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(user_id, "Popup store watcher stopped");
}
