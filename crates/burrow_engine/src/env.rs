//! Environment: the registry of named databases.

use crate::backend::{Backend, FileBackend, MemoryBackend};
use crate::database::{self, Database, UpgradeTxn};
use crate::error::EngineResult;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Owns named databases and the persistence backend behind them.
///
/// `open` is idempotent: while a database is open, subsequent opens return
/// the same handle. `close` drops the handle; the snapshot stays in the
/// backend, so a later `open` transparently restores the data. `delete` is
/// permanent and removes both.
pub struct Environment {
    backend: Arc<dyn Backend>,
    databases: Mutex<HashMap<String, Arc<Database>>>,
}

impl Environment {
    /// Creates an environment backed by memory only.
    #[must_use]
    pub fn memory() -> Self {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    /// Creates an environment persisting snapshots under a directory.
    pub fn at_dir(root: impl AsRef<Path>) -> EngineResult<Self> {
        Ok(Self::with_backend(Box::new(FileBackend::open(root)?)))
    }

    /// Creates an environment over an arbitrary backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend: Arc::from(backend),
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a database at the requested schema version.
    ///
    /// If the stored version is behind, the upgrade callback runs exactly
    /// once; requesting a version below the stored one is a
    /// `VersionDowngrade` error. Opening a database that does not exist
    /// creates it (at version 0, then upgraded).
    pub fn open<F>(&self, name: &str, version: u32, upgrade: F) -> EngineResult<Arc<Database>>
    where
        F: FnOnce(&mut UpgradeTxn<'_>) -> EngineResult<()>,
    {
        let mut databases = self.databases.lock();
        if let Some(db) = databases.get(name) {
            db.upgrade_to(version, upgrade)?;
            return Ok(Arc::clone(db));
        }

        let inner = match database::load(self.backend.as_ref(), name)? {
            Some(inner) => inner,
            None => {
                tracing::debug!(database = name, "creating database");
                crate::database::DatabaseInner::new(0)
            }
        };
        let db = Arc::new(Database::new(name, inner, Arc::clone(&self.backend)));
        db.upgrade_to(version, upgrade)?;
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(db)
    }

    /// Releases the open handle for `name`, if any.
    ///
    /// The persisted snapshot is untouched.
    pub fn close(&self, name: &str) {
        self.databases.lock().remove(name);
    }

    /// Permanently deletes a database: open handle and persisted snapshot.
    pub fn delete(&self, name: &str) -> EngineResult<()> {
        self.databases.lock().remove(name);
        self.backend.remove(name)?;
        tracing::info!(database = name, "database deleted");
        Ok(())
    }

    /// Whether a database exists, open or persisted.
    pub fn contains(&self, name: &str) -> EngineResult<bool> {
        if self.databases.lock().contains_key(name) {
            return Ok(true);
        }
        self.backend.contains(name)
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("open_databases", &self.databases.lock().len())
            .finish_non_exhaustive()
    }
}
