//! Persistence backends.
//!
//! Backends are opaque snapshot stores: one byte blob per database name.
//! The engine owns all snapshot format interpretation; backends only load,
//! save, and remove blobs.

use crate::error::{EngineError, EngineResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A snapshot store keyed by database name.
///
/// # Implementors
///
/// - [`MemoryBackend`] - for testing
/// - [`FileBackend`] - one snapshot file per database under a root directory
pub trait Backend: Send + Sync {
    /// Loads the snapshot for `name`, or `None` if it does not exist.
    fn load(&self, name: &str) -> EngineResult<Option<Vec<u8>>>;

    /// Saves the snapshot for `name`, replacing any previous one.
    fn save(&self, name: &str, bytes: &[u8]) -> EngineResult<()>;

    /// Removes the snapshot for `name`. Removing an absent snapshot is a
    /// no-op.
    fn remove(&self, name: &str) -> EngineResult<()>;

    /// Whether a snapshot exists for `name`.
    fn contains(&self, name: &str) -> EngineResult<bool>;
}

/// In-memory backend for tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    fn load(&self, name: &str) -> EngineResult<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(name).cloned())
    }

    fn save(&self, name: &str, bytes: &[u8]) -> EngineResult<()> {
        self.blobs.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> EngineResult<()> {
        self.blobs.lock().remove(name);
        Ok(())
    }

    fn contains(&self, name: &str) -> EngineResult<bool> {
        Ok(self.blobs.lock().contains_key(name))
    }
}

/// File backend: one snapshot file per database under a root directory.
#[derive(Debug)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    /// Opens the backend at a root directory, creating it if missing.
    pub fn open(root: impl AsRef<Path>) -> EngineResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> EngineResult<PathBuf> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
        {
            return Err(EngineError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(format!("{name}.db")))
    }
}

impl Backend for FileBackend {
    fn load(&self, name: &str) -> EngineResult<Option<Vec<u8>>> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, name: &str, bytes: &[u8]) -> EngineResult<()> {
        let path = self.path_for(name)?;
        let tmp = path.with_extension("db.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> EngineResult<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, name: &str) -> EngineResult<bool> {
        Ok(self.path_for(name)?.exists())
    }
}
