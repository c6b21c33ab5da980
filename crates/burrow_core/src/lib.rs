//! # Burrow Core
//!
//! Embedded per-collection record store: the local persistence layer of an
//! offline-capable sync client.
//!
//! This crate provides:
//! - JSON records keyed by collection and id, with sync bookkeeping
//!   attributes (`_status`, `last_modified`)
//! - Filtered and sorted listing through a query planner and secondary
//!   indexes, including a sorted-candidate merge-join
//! - Atomic multi-operation transactions with record preloading
//! - Last-synced timestamp and collection metadata accessors
//! - One-shot migration of the legacy per-collection database layout
//!
//! # Example
//!
//! ```rust,ignore
//! use burrow_core::{CollectionStore, Environment, ListParams};
//! use std::sync::Arc;
//!
//! let env = Arc::new(Environment::at_dir("data")?);
//! let articles = CollectionStore::new(env, "articles");
//! articles.open()?;
//!
//! articles.execute_transaction(&[], |txn| {
//!     txn.create(serde_json::json!({"title": "hello"}).as_object().cloned().unwrap())?;
//!     Ok(())
//! })?;
//!
//! let unsynced = articles.list(
//!     &ListParams::new().filter("_status", serde_json::json!(["created", "updated"])),
//! )?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod filters;
mod migration;
mod planner;
mod record;
mod scan;
mod schema;
mod store;
mod transaction;

pub use burrow_engine::Environment;
pub use error::{StoreError, StoreResult};
pub use filters::{expand_dotted, record_matches, sort_records, FilterMap};
pub use migration::MigrationReport;
pub use planner::{plan, IndexedField, Strategy};
pub use record::{record_id, Record, Status, FIELD_ID, FIELD_LAST_MODIFIED, FIELD_STATUS};
pub use store::{CollectionStore, ListParams, StoreOptions};
pub use transaction::TransactionProxy;
