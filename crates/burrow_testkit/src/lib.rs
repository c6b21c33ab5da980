//! # Burrow Testkit
//!
//! Shared fixtures and proptest generators for burrow test suites.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fixtures;
mod generators;

pub use fixtures::{
    file_store, memory_store, memory_store_with_env, sample_record, seed_legacy_database,
};
pub use generators::{record_batch, small_ids};
