//! Proptest generators.

use proptest::prelude::*;
use serde_json::{json, Value};

const ALPHABET: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

/// Lists of ids drawn from a small alphabet, duplicates included.
///
/// Meant for exercising candidate-list queries: gaps, repeats, and ids
/// that match nothing all occur naturally.
pub fn small_ids(max_len: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(
        prop::sample::select(ALPHABET.to_vec()).prop_map(str::to_string),
        0..=max_len,
    )
}

/// Batches of records with distinct ids from the same small alphabet.
///
/// `last_modified` increases with position so timestamp-advance behavior
/// is deterministic. Keep `max_len` well below the alphabet size.
pub fn record_batch(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
    prop::collection::btree_set(prop::sample::select(ALPHABET.to_vec()), 0..=max_len).prop_map(
        |ids| {
            ids.into_iter()
                .enumerate()
                .map(|(i, id)| {
                    json!({
                        "id": id,
                        "_status": "synced",
                        "last_modified": i as i64 + 1,
                    })
                })
                .collect()
        },
    )
}
