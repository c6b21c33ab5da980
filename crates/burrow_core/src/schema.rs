//! The unified schema and its versioned upgrades.
//!
//! All collections share one database. Version 1 introduces the records
//! store (composite primary key on the partition attribute and the record
//! id, plus three secondary indexes) and the timestamps store; version 2
//! additively introduces the collections metadata store. Upgrades are
//! monotonic and additive; there is no downgrade path.

use crate::error::{StoreError, StoreResult};
use crate::record::FIELD_COLLECTION;
use burrow_engine::{Database, Environment};
use std::sync::Arc;

/// Store holding every collection's records.
pub(crate) const RECORDS: &str = "records";
/// Store holding one last-synced timestamp entry per collection.
pub(crate) const TIMESTAMPS: &str = "timestamps";
/// Store holding one metadata entry per collection.
pub(crate) const COLLECTIONS: &str = "collections";

/// Partition-only index over the records store.
pub(crate) const IDX_COLLECTION: &str = "by_collection";
/// Index on `(_collection, _status)`.
pub(crate) const IDX_STATUS: &str = "by_status";
/// Index on `(_collection, last_modified)`.
pub(crate) const IDX_LAST_MODIFIED: &str = "by_last_modified";

/// Key field of the timestamps and collections stores.
pub(crate) const KEY_COLLECTION: &str = "collection";

/// Current schema version.
pub(crate) const SCHEMA_VERSION: u32 = 2;

/// Opens the unified database, running any pending schema upgrades.
///
/// Failure to open or upgrade is fatal to the caller; no retry is
/// attempted here.
pub(crate) fn open_database(env: &Environment, name: &str) -> StoreResult<Arc<Database>> {
    env.open(name, SCHEMA_VERSION, |txn| {
        if txn.old_version() < 1 {
            tracing::debug!(database = name, "creating unified schema v1");
            txn.create_store(
                RECORDS,
                vec![FIELD_COLLECTION.to_string(), "id".to_string()],
            )?;
            txn.create_index(RECORDS, IDX_COLLECTION, vec![FIELD_COLLECTION.to_string()])?;
            txn.create_index(
                RECORDS,
                IDX_STATUS,
                vec![FIELD_COLLECTION.to_string(), "_status".to_string()],
            )?;
            txn.create_index(
                RECORDS,
                IDX_LAST_MODIFIED,
                vec![FIELD_COLLECTION.to_string(), "last_modified".to_string()],
            )?;
            txn.create_store(TIMESTAMPS, vec![KEY_COLLECTION.to_string()])?;
        }
        if txn.old_version() < 2 {
            tracing::debug!(database = name, "creating unified schema v2");
            txn.create_store(COLLECTIONS, vec![KEY_COLLECTION.to_string()])?;
        }
        Ok(())
    })
    .map_err(|e| StoreError::connection(format!("open `{name}`: {e}")))
}
