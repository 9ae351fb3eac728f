//! Atomic "write-temp-then-rename" publication under the lock-file
//! protocol. From the outside, the destination path is either absent or
//! fully written; partial contents are never visible there.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{Builder, NamedTempFile};
use thiserror::Error;

use crate::canonical;
use crate::knobs::KEEP_BAD_TEMP_FILE;
use crate::lock::{sys, LockError, LockMode, LockingFile};

pub const TEMP_PREFIX: &str = "__SETL__.";
pub const TEMP_SUFFIX: &str = ".pending";

/// What probing a destination path can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// The destination exists.
    Complete,
    /// No destination and no lock file.
    Missing,
    /// No destination, and a writer currently holds the lock.
    InProgress,
    /// No destination, and the lock file has no holder: a previous
    /// attempt crashed.
    Failed,
}

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("safe-file locking failed")]
    Lock(#[from] LockError),
    #[error("safe-file write failed")]
    Io(#[from] io::Error),
    /// The stream was already closed.
    #[error("the stream is closed")]
    Closed,
}

/// Construction-time switches; the defaults come from the environment once.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    /// Keep the temporary file after a failed or abandoned write.
    pub keep_bad_temp_file: bool,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            keep_bad_temp_file: *KEEP_BAD_TEMP_FILE,
        }
    }
}

/// An open safe-file write: an exclusive hold on the destination's
/// [`LockingFile`], and a temporary sibling file that receives every write
/// until `close(true)` renames it onto the destination. Dropping the stream
/// without closing aborts it.
pub struct SafeFileOutput {
    destination: PathBuf,
    locking: Arc<LockingFile>,
    temp: Option<NamedTempFile>,
    keep_bad_temp_file: bool,
}

impl SafeFileOutput {
    /// Opens the destination for safe writing, blocking on the lock.
    /// Returns `None` when `overwrite` is unset and the destination
    /// already exists.
    pub fn open(path: impl AsRef<Path>, overwrite: bool) -> Result<Option<Self>, OutputError> {
        Self::open_with(path, overwrite, OutputOptions::default())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        overwrite: bool,
        options: OutputOptions,
    ) -> Result<Option<Self>, OutputError> {
        let locking = canonical::locking_file(path.as_ref()).map_err(LockError::Io)?;
        locking.lock(LockMode::Exclusive)?;

        let open = || -> Result<Option<NamedTempFile>, OutputError> {
            let destination = locking.path();
            if !overwrite && destination.exists() {
                return Ok(None);
            }
            let parent = destination
                .parent()
                .ok_or_else(|| io::Error::other("destination has no parent directory"))?;
            let temp = Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(TEMP_SUFFIX)
                .tempfile_in(parent)?;
            Ok(Some(temp))
        };
        match open() {
            Ok(Some(temp)) => {
                tracing::debug!(
                    destination = %locking.path().display(),
                    temp = %temp.path().display(),
                    "opened safe file",
                );
                Ok(Some(SafeFileOutput {
                    destination: locking.path().to_path_buf(),
                    locking: locking.clone(),
                    temp: Some(temp),
                    keep_bad_temp_file: options.keep_bad_temp_file,
                }))
            },
            Ok(None) => {
                locking.unlock()?;
                Ok(None)
            },
            Err(e) => {
                if let Err(unlock_error) = locking.unlock() {
                    tracing::warn!("could not unlock after failed open: {unlock_error}");
                }
                Err(e)
            },
        }
    }

    pub fn path(&self) -> &Path {
        &self.destination
    }

    fn file(&mut self) -> io::Result<&mut File> {
        self.temp
            .as_mut()
            .map(NamedTempFile::as_file_mut)
            .ok_or_else(|| io::Error::other("the stream is closed"))
    }

    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.file()?.write_all(&[byte])
    }

    /// Drains `reader` into the stream through `buffer`, returning the
    /// number of bytes transferred.
    pub fn transfer_from<R: Read>(&mut self, reader: &mut R, buffer: &mut [u8]) -> io::Result<u64> {
        let file = self.file()?;
        let mut total = 0u64;
        loop {
            let n = reader.read(buffer)?;
            if n == 0 {
                return Ok(total);
            }
            file.write_all(&buffer[..n])?;
            total += n as u64;
        }
    }

    /// Publishes (`commit`) or abandons the stream, then unlocks. On
    /// commit the temporary file is renamed onto the destination, which
    /// atomically replaces whatever was there.
    pub fn close(mut self, commit: bool) -> Result<(), OutputError> {
        self.finish(commit)
    }

    fn finish(&mut self, commit: bool) -> Result<(), OutputError> {
        let Some(temp) = self.temp.take() else {
            return Err(OutputError::Closed);
        };
        let result = if commit {
            match temp.as_file().sync_all() {
                Ok(()) => match temp.persist(&self.destination) {
                    Ok(_published) => {
                        tracing::debug!(
                            destination = %self.destination.display(),
                            "published safe file",
                        );
                        Ok(())
                    },
                    Err(persist_error) => {
                        let error = persist_error.error;
                        self.discard(persist_error.file);
                        Err(OutputError::Io(error))
                    },
                },
                Err(e) => {
                    self.discard(temp);
                    Err(OutputError::Io(e))
                },
            }
        } else {
            self.discard(temp);
            Ok(())
        };
        // The lock is given back on every path; a secondary unlock failure
        // must not mask the write failure.
        match self.locking.unlock() {
            Ok(()) => result,
            Err(unlock_error) => {
                if result.is_err() {
                    tracing::warn!("could not unlock after failed write: {unlock_error}");
                    result
                } else {
                    Err(unlock_error.into())
                }
            },
        }
    }

    fn discard(&self, temp: NamedTempFile) {
        if self.keep_bad_temp_file {
            match temp.keep() {
                Ok((_file, path)) => {
                    tracing::warn!(temp = %path.display(), "keeping temporary file for post-mortem");
                },
                Err(e) => tracing::warn!("could not keep temporary file: {e}"),
            }
        }
        // Dropping a NamedTempFile deletes it.
    }

    /// One observation of the destination's state. The sequence seen by a
    /// repeated prober is a prefix of Missing, InProgress, Complete, with
    /// Failed only after a crashed writer.
    pub fn probe(path: impl AsRef<Path>) -> Result<Progress, OutputError> {
        let canonical = canonical::canonical_file(path.as_ref()).map_err(LockError::Io)?;
        if canonical.path().exists() {
            return Ok(Progress::Complete);
        }
        let lock_path = {
            // Probing must not instantiate (or pin) a LockingFile; it only
            // looks at the lock file itself.
            let mut raw = canonical.path().as_os_str().to_os_string();
            raw.push(".lock");
            PathBuf::from(raw)
        };
        match File::open(&lock_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Progress::Missing),
            Err(e) => Err(OutputError::Io(e)),
            Ok(file) => {
                if sys::flock(&file, LockMode::Exclusive, false).map_err(LockError::Io)? {
                    let _ = sys::funlock(&file);
                    Ok(Progress::Failed)
                } else {
                    Ok(Progress::InProgress)
                }
            },
        }
    }

    /// Blocks while a writer holds the destination, then reports whether
    /// the destination exists. Taking the lock shared removes the race: at
    /// the moment of observation no writer can be mid-publication.
    pub fn wait_for(path: impl AsRef<Path>) -> Result<bool, OutputError> {
        let locking = canonical::locking_file(path.as_ref()).map_err(LockError::Io)?;
        locking.lock(LockMode::Shared)?;
        let complete = locking.path().exists();
        locking.unlock()?;
        Ok(complete)
    }
}

impl Write for SafeFileOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file()?.flush()
    }
}

impl Drop for SafeFileOutput {
    fn drop(&mut self) {
        if let Some(temp) = self.temp.take() {
            self.discard(temp);
            if let Err(e) = self.locking.unlock() {
                tracing::warn!("could not unlock abandoned safe file: {e}");
            }
        }
    }
}
