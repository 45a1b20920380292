//! Durable, per-user popup state.
//!
//! Each local user gets an isolated map of `match_id -> PopupState`, so a
//! shared device never leaks one user's seen-state to another.
//! [`FilePopupStore`] keeps one JSON file per user, replaces it atomically
//! and serializes writers across processes with an advisory file lock;
//! [`MemoryPopupStore`] is for tests and for tabs sharing one process.
//!
//! Every call here is blocking. Async callers go through
//! [`PopupTracker`](crate::tracker::PopupTracker), which runs them on the
//! blocking pool.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use kindred_core::popup::PopupState;
use kindred_core::types::{DbId, MatchId};

pub type PopupStates = BTreeMap<MatchId, PopupState>;

/// Decides the next state of one match from its current one. `None` leaves
/// the store untouched.
pub type UpdateStep<'a> = &'a (dyn Fn(PopupState) -> Option<PopupState> + Send + Sync);

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Popup store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Popup store file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Popup store watcher failed for {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Popup store task failed: {0}")]
    Task(String),
}

/// Storage backend for [`PopupTracker`](crate::tracker::PopupTracker).
pub trait PopupStore: Send + Sync {
    fn load(&self, user_id: DbId) -> Result<PopupStates, StoreError>;

    /// Read-modify-write one match's state as a single atomic step.
    ///
    /// `step` sees the current state (`Unseen` when absent). Returns the
    /// state written, or `None` when `step` declined. Two updates of the
    /// same user never interleave, whichever tab or process issues them.
    fn update(
        &self,
        user_id: DbId,
        match_id: MatchId,
        step: UpdateStep<'_>,
    ) -> Result<Option<PopupState>, StoreError>;
}

fn apply_step(
    states: &mut PopupStates,
    match_id: MatchId,
    step: UpdateStep<'_>,
) -> Option<PopupState> {
    let current = states.get(&match_id).copied().unwrap_or_default();
    let next = step(current)?;
    states.insert(match_id, next);
    Some(next)
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// One `popups-<user_id>.json` file per user under `dir`, guarded by a
/// sibling `popups-<user_id>.lock`.
#[derive(Debug)]
pub struct FilePopupStore {
    dir: PathBuf,
    /// Serializes updates from tabs in this process. The file lock covers
    /// other processes.
    write_lock: Mutex<()>,
}

impl FilePopupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, user_id: DbId) -> PathBuf {
        self.dir.join(format!("popups-{user_id}.json"))
    }

    fn lock_path_for(&self, user_id: DbId) -> PathBuf {
        self.dir.join(format!("popups-{user_id}.lock"))
    }

    fn io_error(path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Replace the user's file with `states` via write-then-rename.
    fn write(&self, user_id: DbId, states: &PopupStates) -> Result<(), StoreError> {
        let path = self.path_for(user_id);
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4()));

        let bytes = serde_json::to_vec_pretty(states).map_err(|source| StoreError::Corrupt {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&tmp, bytes).map_err(|e| Self::io_error(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            Self::io_error(&path, e)
        })
    }
}

impl PopupStore for FilePopupStore {
    fn load(&self, user_id: DbId) -> Result<PopupStates, StoreError> {
        let path = self.path_for(user_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(PopupStates::new()),
            Err(e) => return Err(Self::io_error(&path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn update(
        &self,
        user_id: DbId,
        match_id: MatchId,
        step: UpdateStep<'_>,
    ) -> Result<Option<PopupState>, StoreError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;
        let _file_lock = FileLock::acquire(&self.lock_path_for(user_id))?;

        let mut states = self.load(user_id)?;
        let Some(next) = apply_step(&mut states, match_id, step) else {
            return Ok(None);
        };
        self.write(user_id, &states)?;
        Ok(Some(next))
    }
}

/// Exclusive advisory lock on a sidecar file, released on drop.
///
/// The data file itself is replaced by rename on every write, so the lock
/// has to live on a file whose inode never changes.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn acquire(path: &Path) -> Result<Self, StoreError> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| FilePopupStore::io_error(path, e))?;
        lock_exclusive(&file).map_err(|e| FilePopupStore::io_error(path, e))?;
        Ok(Self { _file: file })
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: `file` owns a valid descriptor for the duration of the call.
    // The lock is released when the descriptor is closed.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> io::Result<()> {
    // Only the in-process mutex applies here.
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryPopupStore {
    users: Mutex<HashMap<DbId, PopupStates>>,
}

impl MemoryPopupStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PopupStore for MemoryPopupStore {
    fn load(&self, user_id: DbId) -> Result<PopupStates, StoreError> {
        let users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(users.get(&user_id).cloned().unwrap_or_default())
    }

    fn update(
        &self,
        user_id: DbId,
        match_id: MatchId,
        step: UpdateStep<'_>,
    ) -> Result<Option<PopupState>, StoreError> {
        let mut users = self.users.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(apply_step(users.entry(user_id).or_default(), match_id, step))
    }
}
