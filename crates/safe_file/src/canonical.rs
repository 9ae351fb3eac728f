//! Process-wide registries keyed on canonical paths. Both maps are
//! weak-valued: an entry lives exactly as long as somebody outside holds
//! the instance (or, for a `LockingFile`, while it is pinned by an
//! outstanding OS lock).

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::Mutex;

use crate::lock::LockingFile;

/// A filesystem entity under its canonical path: absolute, symlinks
/// resolved, relative components collapsed.
#[derive(Debug, PartialEq, Eq)]
pub struct CanonicalFile {
    path: PathBuf,
}

impl CanonicalFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `file://` URI of the path, as written into lock-file markers.
    pub fn uri(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

static CANONICAL_FILES: LazyLock<Mutex<HashMap<PathBuf, Weak<CanonicalFile>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

static LOCKING_FILES: LazyLock<Mutex<HashMap<PathBuf, Weak<LockingFile>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Canonicalises `path` even when its tail does not exist yet: missing
/// components are resolved against their canonicalised parent.
fn canonicalize_lenient(path: &Path) -> io::Result<PathBuf> {
    match std::fs::canonicalize(path) {
        Ok(resolved) => Ok(resolved),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()?.join(path)
            };
            let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
                return Err(e);
            };
            Ok(canonicalize_lenient(parent)?.join(name))
        },
        Err(e) => Err(e),
    }
}

/// Two lookups for the same filesystem entity return the same instance,
/// through any spelling of its path, while any reference is alive.
pub fn canonical_file(path: impl AsRef<Path>) -> io::Result<Arc<CanonicalFile>> {
    let path = path.as_ref();
    let mut map = CANONICAL_FILES.lock();
    if let Some(hit) = map.get(path).and_then(Weak::upgrade) {
        return Ok(hit);
    }
    let resolved = canonicalize_lenient(path)?;
    if let Some(hit) = map.get(&resolved).and_then(Weak::upgrade) {
        // Remember the non-canonical spelling to short-circuit the next
        // lookup.
        map.insert(path.to_path_buf(), Arc::downgrade(&hit));
        return Ok(hit);
    }
    let file = Arc::new(CanonicalFile {
        path: resolved.clone(),
    });
    map.retain(|_, entry| entry.strong_count() > 0);
    map.insert(resolved, Arc::downgrade(&file));
    if path != file.path() {
        map.insert(path.to_path_buf(), Arc::downgrade(&file));
    }
    Ok(file)
}

/// The shared `LockingFile` for whatever filesystem entity `path` names.
pub fn locking_file(path: impl AsRef<Path>) -> io::Result<Arc<LockingFile>> {
    let canonical = canonical_file(path)?;
    let mut map = LOCKING_FILES.lock();
    if let Some(hit) = map.get(canonical.path()).and_then(Weak::upgrade) {
        return Ok(hit);
    }
    let file = LockingFile::new(canonical.clone());
    map.retain(|_, entry| entry.strong_count() > 0);
    map.insert(canonical.path().to_path_buf(), Arc::downgrade(&file));
    Ok(file)
}
