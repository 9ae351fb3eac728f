//! Environment-driven configuration, read once at first use.

use std::env;
use std::fmt::Debug;
use std::str::FromStr;
use std::sync::LazyLock;

/// Reads `name` from the environment, falling back to `default` when the
/// variable is absent, not unicode, or does not parse.
pub fn env_config<T>(name: &str, default: T) -> T
where
    T: Debug + FromStr,
    T::Err: Debug,
{
    let Ok(raw) = env::var(name) else {
        return default;
    };
    match raw.parse::<T>() {
        Ok(value) => {
            tracing::info!("{name}={value:?} (from environment)");
            value
        },
        Err(e) => {
            tracing::warn!("ignoring unparseable {name}={raw:?} ({e:?}), using {default:?}");
            default
        },
    }
}

/// Retain the temporary file of a failed safe-file write for post-mortem.
/// Off by default; also overridable per stream at construction time.
pub static KEEP_BAD_TEMP_FILE: LazyLock<bool> =
    LazyLock::new(|| env_config("SAFE_FILE_KEEP_BAD_TEMP", false));
