//! Cross-process file locking and atomic file publication.
//!
//! [`locking_file`] hands out one shared [`LockingFile`] per filesystem
//! entity, reentrant within the process and backed by an OS lock on an
//! auxiliary `.lock` file across processes. [`SafeFileOutput`] builds the
//! safe-publication protocol on top: writes go to a temporary sibling file
//! under an exclusive lock, and only a committed close renames it onto the
//! destination, so observers see either nothing or the finished file.

mod canonical;
mod knobs;
mod lock;
mod output;
mod rw_lock;

pub use crate::canonical::{canonical_file, locking_file, CanonicalFile};
pub use crate::knobs::env_config;
pub use crate::lock::{LockError, LockMode, LockingFile};
pub use crate::output::{OutputError, OutputOptions, Progress, SafeFileOutput};
