//! JSON file-backed persistence for tunnelwarden state.
//!
//! [`JsonStore`] snapshots a serializable value to `<dir>/<name>.json` and
//! loads it back on startup. Writes go through a temp file and rename so a
//! crash mid-write never leaves a torn snapshot. A missing or unreadable
//! file loads as the type's default, with a log line rather than an error:
//! the stores built on this treat disk state as a best-effort snapshot.

#![forbid(unsafe_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// A named JSON snapshot in a state directory.
pub struct JsonStore {
    path: PathBuf,
}

impl JsonStore {
    /// Creates a store for `<dir>/<name>.json`.
    #[must_use]
    pub fn new(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.json")),
        }
    }

    /// Returns the snapshot path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the snapshot, or the default value when absent or unreadable.
    #[must_use]
    pub fn load<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "snapshot unreadable, starting empty");
                    T::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot on disk");
                T::default()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "snapshot unreadable, starting empty");
                T::default()
            }
        }
    }

    /// Writes the snapshot atomically (temp file + rename).
    pub fn save<T>(&self, value: &T) -> io::Result<()>
    where
        T: Serialize,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
