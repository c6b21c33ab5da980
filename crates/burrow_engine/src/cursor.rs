//! Ascending cursors over store and index entries.

use crate::key::Key;
use serde_json::Value;

/// One cursor position.
#[derive(Debug, Clone)]
pub(crate) struct CursorEntry {
    pub(crate) key: Key,
    pub(crate) primary_key: Key,
    pub(crate) value: Value,
}

/// A resumable, ordered iterator over a range of entries.
///
/// Cursors iterate a stable snapshot taken when they are opened. For store
/// cursors the cursor key and the primary key coincide; for index cursors
/// the cursor key is the index key.
#[derive(Debug)]
pub struct Cursor {
    entries: Vec<CursorEntry>,
    pos: usize,
}

impl Cursor {
    pub(crate) fn new(entries: Vec<CursorEntry>) -> Self {
        Self { entries, pos: 0 }
    }

    /// The key at the current position, or `None` when exhausted.
    #[must_use]
    pub fn key(&self) -> Option<&Key> {
        self.entries.get(self.pos).map(|e| &e.key)
    }

    /// The primary key at the current position.
    #[must_use]
    pub fn primary_key(&self) -> Option<&Key> {
        self.entries.get(self.pos).map(|e| &e.primary_key)
    }

    /// The value at the current position.
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        self.entries.get(self.pos).map(|e| &e.value)
    }

    /// Steps to the next entry.
    pub fn advance(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }

    /// Repositions to the first entry at or after `target`.
    ///
    /// This is the skip-seek primitive: the cursor jumps directly instead of
    /// stepping through intermediate entries. Seeking never moves backwards.
    pub fn seek(&mut self, target: &Key) {
        let rest = &self.entries[self.pos..];
        let offset = rest.partition_point(|e| e.key < *target);
        self.pos += offset;
    }
}
