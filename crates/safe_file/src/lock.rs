//! Cross-process, reentrant file locking.
//!
//! A [`LockingFile`] composes two mechanisms: a per-instance reentrant
//! readers-writer lock that orders threads of this process, and one OS
//! `flock` on the auxiliary `.lock` file that orders processes. The OS lock
//! exists exactly while at least one in-process acquisition is outstanding;
//! its mode follows the most recent acquisition. The lock-type stack
//! records each outstanding acquisition so that `unlock` knows which half
//! of the readers-writer lock to give back.
//!
//! Lock ordering: the readers-writer lock is always taken before the state
//! monitor, never the other way around.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use thiserror::Error;

use crate::canonical::CanonicalFile;
use crate::rw_lock::ReentrantRwLock;

/// Flavor of a lock acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Error)]
pub enum LockError {
    /// `unlock` with no outstanding acquisition.
    #[error("nothing to unlock")]
    NotLocked,
    #[error("lock file operation failed")]
    Io(#[from] io::Error),
}

/// `flock(2)` plumbing, EINTR-retried.
pub(crate) mod sys {
    use std::fs::File;
    use std::io;
    use std::os::unix::io::AsRawFd;

    use super::LockMode;

    /// Returns false when `block` is unset and the lock is held elsewhere.
    pub fn flock(file: &File, mode: LockMode, block: bool) -> io::Result<bool> {
        let mut op = match mode {
            LockMode::Shared => libc::LOCK_SH,
            LockMode::Exclusive => libc::LOCK_EX,
        };
        if !block {
            op |= libc::LOCK_NB;
        }
        loop {
            if unsafe { libc::flock(file.as_raw_fd(), op) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EINTR) => continue,
                Some(libc::EWOULDBLOCK) if !block => return Ok(false),
                _ => return Err(err),
            }
        }
    }

    pub fn funlock(file: &File) -> io::Result<()> {
        if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

/// Pins every `LockingFile` that currently holds its OS lock, so the
/// weak-valued registry cannot drop one mid-hold.
static PINNED: LazyLock<Mutex<HashMap<PathBuf, Arc<LockingFile>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct OsLockState {
    /// One entry per outstanding acquisition, newest last.
    holds: Vec<LockMode>,
    /// Open lock file while the OS lock is held.
    file: Option<File>,
    /// Mode the OS lock is currently held in.
    mode: Option<LockMode>,
}

pub struct LockingFile {
    canonical: Arc<CanonicalFile>,
    lock_path: PathBuf,
    rw: ReentrantRwLock,
    state: Mutex<OsLockState>,
    weak_self: Weak<LockingFile>,
}

impl LockingFile {
    pub(crate) fn new(canonical: Arc<CanonicalFile>) -> Arc<Self> {
        let lock_path = lock_path_for(canonical.path());
        Arc::new_cyclic(|weak_self| LockingFile {
            canonical,
            lock_path,
            rw: ReentrantRwLock::new(),
            state: Mutex::new(OsLockState {
                holds: Vec::new(),
                file: None,
                mode: None,
            }),
            weak_self: weak_self.clone(),
        })
    }

    /// The protected path.
    pub fn path(&self) -> &Path {
        self.canonical.path()
    }

    /// The auxiliary `.lock` path the OS lock lives on.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Blocks until the lock is held in `mode`.
    pub fn lock(&self, mode: LockMode) -> Result<(), LockError> {
        self.rw.acquire(mode);
        match self.acquire_os(mode, true) {
            Ok(_) => Ok(()),
            Err(e) => {
                self.rw.release(mode);
                Err(e)
            },
        }
    }

    /// One attempt; never blocks beyond the OS calls themselves.
    pub fn try_lock(&self, mode: LockMode) -> Result<bool, LockError> {
        if !self.rw.try_acquire(mode) {
            return Ok(false);
        }
        match self.acquire_os(mode, false) {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.rw.release(mode);
                Ok(false)
            },
            Err(e) => {
                self.rw.release(mode);
                Err(e)
            },
        }
    }

    /// Polls until acquired or the deadline passes. The thread-level
    /// acquisition is released again if the OS lock cannot be obtained in
    /// time.
    pub fn try_lock_for(&self, mode: LockMode, timeout: Duration) -> Result<bool, LockError> {
        let deadline = Instant::now() + timeout;
        if !self.rw.try_acquire_until(mode, deadline) {
            return Ok(false);
        }
        loop {
            match self.acquire_os(mode, false) {
                Ok(true) => return Ok(true),
                Ok(false) => {
                    if Instant::now() > deadline {
                        self.rw.release(mode);
                        return Ok(false);
                    }
                    thread::sleep(POLL_INTERVAL.min(deadline.saturating_duration_since(Instant::now()).max(Duration::from_millis(1))));
                },
                Err(e) => {
                    self.rw.release(mode);
                    return Err(e);
                },
            }
        }
    }

    /// Pops the newest acquisition. When the stack empties, the OS lock is
    /// released and the lock file closed, and deleted if a brief exclusive
    /// delete probe succeeds — a lock held by another process keeps the
    /// file on disk.
    pub fn unlock(&self) -> Result<(), LockError> {
        let mut state = self.state.lock();
        let Some(mode) = state.holds.pop() else {
            return Err(LockError::NotLocked);
        };
        let result = if state.holds.is_empty() {
            self.release_os(&mut state)
        } else {
            Ok(())
        };
        drop(state);
        if !self.rw.release(mode) {
            tracing::warn!(
                path = %self.lock_path.display(),
                "unlock of an exclusive hold from a thread that does not own it",
            );
        }
        result
    }

    /// Makes the OS lock match `mode` and pushes a hold. Under the state
    /// monitor; the caller already holds the readers-writer lock.
    fn acquire_os(&self, mode: LockMode, block: bool) -> Result<bool, LockError> {
        let mut state = self.state.lock();
        if state.file.is_none() {
            let file = self.open_lock_file()?;
            if !sys::flock(&file, mode, block)? {
                return Ok(false);
            }
            tracing::debug!(path = %self.lock_path.display(), ?mode, "acquired file lock");
            state.file = Some(file);
            state.mode = Some(mode);
            self.pin();
        } else if state.mode != Some(mode) {
            // Re-issuing flock on the same descriptor swaps the mode. Like
            // a close-and-reopen, the swap can momentarily admit another
            // process; in-process callers are ordered by the held
            // readers-writer lock.
            let file = state.file.as_ref().expect("lock file is open");
            if !sys::flock(file, mode, block)? {
                // A failed swap has already dropped the old lock; take it
                // back so the outstanding holds stay protected.
                let previous = state.mode.expect("mode is set while the lock file is open");
                sys::flock(file, previous, true)?;
                return Ok(false);
            }
            tracing::debug!(path = %self.lock_path.display(), ?mode, "converted file lock");
            state.mode = Some(mode);
        }
        state.holds.push(mode);
        Ok(true)
    }

    fn release_os(&self, state: &mut OsLockState) -> Result<(), LockError> {
        let Some(file) = state.file.take() else {
            return Ok(());
        };
        let mode = state.mode.take();
        let may_delete = match mode {
            Some(LockMode::Exclusive) => true,
            _ => sys::flock(&file, LockMode::Exclusive, false).unwrap_or(false),
        };
        if may_delete {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::debug!(path = %self.lock_path.display(), "could not delete lock file: {e}");
            }
        }
        let unlocked = sys::funlock(&file);
        drop(file);
        self.unpin();
        tracing::debug!(path = %self.lock_path.display(), "released file lock");
        unlocked?;
        Ok(())
    }

    fn open_lock_file(&self) -> io::Result<File> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)?;
        if file.metadata()?.len() == 0 {
            let marker = format!(
                "DO NOT DELETE OR RENAME THIS FILE\n\n\
                 This file is used to prevent concurrent updates of:\n{}\n\n\
                 Created at : {}\n",
                self.canonical.uri(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
            file.write_all(marker.as_bytes())?;
        }
        Ok(file)
    }

    fn pin(&self) {
        if let Some(strong) = self.weak_self.upgrade() {
            PINNED.lock().insert(self.lock_path.clone(), strong);
        }
    }

    fn unpin(&self) {
        PINNED.lock().remove(&self.lock_path);
    }
}

/// For a directory `D` the lock file is `D/.lock`; for anything else it is
/// the path with `.lock` appended.
fn lock_path_for(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(".lock")
    } else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(".lock");
        PathBuf::from(raw)
    }
}
