//! Named databases and versioned schema upgrades.

use crate::backend::Backend;
use crate::error::{EngineError, EngineResult};
use crate::store::{IndexDef, ObjectStore};
use crate::transaction::{ReadTxn, WriteTxn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// The versioned content of a database: its schema version and stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DatabaseInner {
    pub(crate) version: u32,
    pub(crate) stores: BTreeMap<String, ObjectStore>,
}

impl DatabaseInner {
    pub(crate) fn new(version: u32) -> Self {
        Self {
            version,
            stores: BTreeMap::new(),
        }
    }

    pub(crate) fn store(&self, name: &str) -> EngineResult<&ObjectStore> {
        self.stores
            .get(name)
            .ok_or_else(|| EngineError::store_not_found(name))
    }

    pub(crate) fn store_mut(&mut self, name: &str) -> EngineResult<&mut ObjectStore> {
        self.stores
            .get_mut(name)
            .ok_or_else(|| EngineError::store_not_found(name))
    }

    pub(crate) fn insert_store(&mut self, store: ObjectStore) {
        self.stores.insert(store.name().to_string(), store);
    }

    pub(crate) fn rebuild_indexes(&mut self) {
        for store in self.stores.values_mut() {
            store.rebuild_indexes();
        }
    }
}

/// Transaction handed to a schema upgrade callback.
///
/// Upgrades are additive: stores and indexes can be created, never dropped.
/// The callback runs against a staged copy of the database; an error leaves
/// the database exactly as it was.
pub struct UpgradeTxn<'a> {
    inner: &'a mut DatabaseInner,
    old_version: u32,
}

impl<'a> UpgradeTxn<'a> {
    fn new(inner: &'a mut DatabaseInner, old_version: u32) -> Self {
        Self { inner, old_version }
    }

    /// The schema version the database held before this upgrade.
    #[must_use]
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    /// Creates an object store with the given primary key path.
    pub fn create_store(&mut self, name: &str, key_path: Vec<String>) -> EngineResult<()> {
        if self.inner.stores.contains_key(name) {
            return Err(EngineError::StoreExists {
                name: name.to_string(),
            });
        }
        self.inner.insert_store(ObjectStore::new(name, key_path));
        Ok(())
    }

    /// Creates a secondary index on an existing store.
    pub fn create_index(
        &mut self,
        store: &str,
        name: &str,
        key_path: Vec<String>,
    ) -> EngineResult<()> {
        self.inner.store_mut(store)?.create_index(IndexDef {
            name: name.to_string(),
            key_path,
        })
    }
}

/// A named database: versioned stores behind a readers-writer lock.
///
/// Read transactions share the lock; write transactions hold it exclusively
/// for their whole extent, which serializes readwrite transactions
/// database-wide. After a committed write the snapshot is persisted through
/// the environment's backend.
pub struct Database {
    name: String,
    inner: RwLock<DatabaseInner>,
    backend: Arc<dyn Backend>,
}

impl Database {
    pub(crate) fn new(
        name: impl Into<String>,
        inner: DatabaseInner,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(inner),
            backend,
        }
    }

    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current schema version.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.inner.read().version
    }

    /// Returns the names of the database's stores.
    #[must_use]
    pub fn store_names(&self) -> Vec<String> {
        self.inner.read().stores.keys().cloned().collect()
    }

    /// Runs a read-only transaction.
    pub fn read_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&ReadTxn<'_>) -> Result<T, E>,
    {
        let inner = self.inner.read();
        let txn = ReadTxn::new(&inner);
        f(&txn)
    }

    /// Runs a readwrite transaction.
    ///
    /// The closure's mutations are buffered; they commit atomically when it
    /// returns `Ok` and are discarded when it returns `Err`. The committed
    /// snapshot is persisted before this returns.
    pub fn write_transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<EngineError>,
        F: FnOnce(&mut WriteTxn<'_>) -> Result<T, E>,
    {
        let mut inner = self.inner.write();
        let mut txn = WriteTxn::new(&mut inner);
        match f(&mut txn) {
            Ok(value) => {
                txn.commit().map_err(E::from)?;
                drop(txn);
                persist(self.backend.as_ref(), &self.name, &inner).map_err(E::from)?;
                Ok(value)
            }
            Err(e) => {
                txn.abort();
                Err(e)
            }
        }
    }

    /// Upgrades the schema to `version` if it is ahead of the stored one.
    ///
    /// The upgrade callback runs exactly once, against a staged copy; a
    /// request below the stored version is a downgrade error.
    pub(crate) fn upgrade_to<F>(&self, version: u32, upgrade: F) -> EngineResult<()>
    where
        F: FnOnce(&mut UpgradeTxn<'_>) -> EngineResult<()>,
    {
        let mut inner = self.inner.write();
        if version < inner.version {
            return Err(EngineError::VersionDowngrade {
                current: inner.version,
                requested: version,
            });
        }
        if version > inner.version {
            let old_version = inner.version;
            let mut staged = inner.clone();
            {
                let mut txn = UpgradeTxn::new(&mut staged, old_version);
                upgrade(&mut txn)?;
            }
            staged.version = version;
            persist(self.backend.as_ref(), &self.name, &staged)?;
            tracing::debug!(
                database = %self.name,
                from = old_version,
                to = version,
                "schema upgraded"
            );
            *inner = staged;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version())
            .finish_non_exhaustive()
    }
}

/// Serializes a database snapshot through the backend.
pub(crate) fn persist(
    backend: &dyn Backend,
    name: &str,
    inner: &DatabaseInner,
) -> EngineResult<()> {
    let bytes = serde_json::to_vec(inner)
        .map_err(|e| EngineError::corrupted(format!("snapshot encode: {e}")))?;
    backend.save(name, &bytes)
}

/// Loads a database snapshot from the backend, if one exists.
pub(crate) fn load(backend: &dyn Backend, name: &str) -> EngineResult<Option<DatabaseInner>> {
    match backend.load(name)? {
        None => Ok(None),
        Some(bytes) => {
            let mut inner: DatabaseInner = serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::corrupted(format!("snapshot decode: {e}")))?;
            inner.rebuild_indexes();
            Ok(Some(inner))
        }
    }
}
