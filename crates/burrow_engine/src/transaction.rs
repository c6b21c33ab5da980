//! Buffered transactions.
//!
//! A write transaction buffers its mutations and applies them to the
//! database only when the closure it runs in returns `Ok`; a returned `Err`
//! discards the buffer. Reads inside a write transaction observe the
//! committed state overlaid with the transaction's own buffered writes
//! (range reads over the primary order included); index reads observe the
//! committed state.

use crate::cursor::{Cursor, CursorEntry};
use crate::database::DatabaseInner;
use crate::error::{EngineError, EngineResult};
use crate::key::{Key, KeyRange};
use serde_json::Value;
use std::collections::BTreeMap;

/// State of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// A buffered mutation.
#[derive(Debug, Clone)]
enum Op {
    Put {
        store: String,
        key: Key,
        value: Value,
    },
    Delete {
        store: String,
        key: Key,
    },
    Clear {
        store: String,
        range: KeyRange,
    },
}

/// A read-only transaction.
///
/// Read transactions run under a shared lock and may overlap each other,
/// but never overlap a write transaction on the same database.
pub struct ReadTxn<'a> {
    db: &'a DatabaseInner,
}

impl<'a> ReadTxn<'a> {
    pub(crate) fn new(db: &'a DatabaseInner) -> Self {
        Self { db }
    }

    /// Reads a record by primary key.
    pub fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        Ok(self.db.store(store)?.get(key).cloned())
    }

    /// Returns all values whose primary key lies in the range, key-ordered.
    pub fn get_all(&self, store: &str, range: &KeyRange) -> EngineResult<Vec<Value>> {
        Ok(self
            .db
            .store(store)?
            .entries_in(range)
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Returns all values whose index key lies in the range.
    pub fn index_get_all(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> EngineResult<Vec<Value>> {
        Ok(self
            .db
            .store(store)?
            .index_entries_in(index, range)?
            .into_iter()
            .map(|(_, _, v)| v)
            .collect())
    }

    /// Opens an ascending cursor over the store's primary order.
    pub fn open_cursor(&self, store: &str, range: &KeyRange) -> EngineResult<Cursor> {
        let entries = self
            .db
            .store(store)?
            .entries_in(range)
            .into_iter()
            .map(|(k, v)| CursorEntry {
                key: k.clone(),
                primary_key: k,
                value: v,
            })
            .collect();
        Ok(Cursor::new(entries))
    }

    /// Opens an ascending cursor over an index.
    pub fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> EngineResult<Cursor> {
        let entries = self
            .db
            .store(store)?
            .index_entries_in(index, range)?
            .into_iter()
            .map(|(ik, pk, v)| CursorEntry {
                key: ik,
                primary_key: pk,
                value: v,
            })
            .collect();
        Ok(Cursor::new(entries))
    }
}

/// A buffered readwrite transaction.
pub struct WriteTxn<'a> {
    db: &'a mut DatabaseInner,
    ops: Vec<Op>,
    state: TxnState,
}

impl<'a> WriteTxn<'a> {
    pub(crate) fn new(db: &'a mut DatabaseInner) -> Self {
        Self {
            db,
            ops: Vec::new(),
            state: TxnState::Active,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Reads a record by primary key, seeing this transaction's own writes.
    pub fn get(&self, store: &str, key: &Key) -> EngineResult<Option<Value>> {
        self.ensure_active()?;
        for op in self.ops.iter().rev() {
            match op {
                Op::Put {
                    store: s,
                    key: k,
                    value,
                } if s == store && k == key => return Ok(Some(value.clone())),
                Op::Delete { store: s, key: k } if s == store && k == key => return Ok(None),
                Op::Clear { store: s, range } if s == store && range.contains(key) => {
                    return Ok(None)
                }
                _ => {}
            }
        }
        Ok(self.db.store(store)?.get(key).cloned())
    }

    /// Returns all values whose primary key lies in the range, key-ordered,
    /// seeing this transaction's own writes.
    pub fn get_all(&self, store: &str, range: &KeyRange) -> EngineResult<Vec<Value>> {
        Ok(self
            .effective_entries(store, range)?
            .into_iter()
            .map(|(_, v)| v)
            .collect())
    }

    /// Returns all values whose index key lies in the range (committed view).
    pub fn index_get_all(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> EngineResult<Vec<Value>> {
        self.ensure_active()?;
        Ok(self
            .db
            .store(store)?
            .index_entries_in(index, range)?
            .into_iter()
            .map(|(_, _, v)| v)
            .collect())
    }

    /// Opens an ascending cursor over the store's primary order, seeing this
    /// transaction's own writes.
    pub fn open_cursor(&self, store: &str, range: &KeyRange) -> EngineResult<Cursor> {
        let entries = self
            .effective_entries(store, range)?
            .into_iter()
            .map(|(k, v)| CursorEntry {
                key: k.clone(),
                primary_key: k,
                value: v,
            })
            .collect();
        Ok(Cursor::new(entries))
    }

    /// Opens an ascending cursor over an index (committed view).
    pub fn open_index_cursor(
        &self,
        store: &str,
        index: &str,
        range: &KeyRange,
    ) -> EngineResult<Cursor> {
        self.ensure_active()?;
        let entries = self
            .db
            .store(store)?
            .index_entries_in(index, range)?
            .into_iter()
            .map(|(ik, pk, v)| CursorEntry {
                key: ik,
                primary_key: pk,
                value: v,
            })
            .collect();
        Ok(Cursor::new(entries))
    }

    /// Buffers an insert-or-replace of `value`, keyed by the store's key path.
    ///
    /// Returns the extracted primary key.
    pub fn put(&mut self, store: &str, value: Value) -> EngineResult<Key> {
        self.ensure_active()?;
        let key = self.db.store(store)?.key_of(&value)?;
        self.ops.push(Op::Put {
            store: store.to_string(),
            key: key.clone(),
            value,
        });
        Ok(key)
    }

    /// Buffers a delete by primary key.
    pub fn delete(&mut self, store: &str, key: &Key) -> EngineResult<()> {
        self.ensure_active()?;
        self.db.store(store)?;
        self.ops.push(Op::Delete {
            store: store.to_string(),
            key: key.clone(),
        });
        Ok(())
    }

    /// Buffers removal of every record whose primary key lies in the range.
    pub fn clear(&mut self, store: &str, range: KeyRange) -> EngineResult<()> {
        self.ensure_active()?;
        self.db.store(store)?;
        self.ops.push(Op::Clear {
            store: store.to_string(),
            range,
        });
        Ok(())
    }

    /// Returns the number of buffered operations.
    #[must_use]
    pub fn op_count(&self) -> usize {
        self.ops.len()
    }

    /// Applies the buffered operations to the database.
    pub(crate) fn commit(&mut self) -> EngineResult<()> {
        self.ensure_active()?;
        for op in self.ops.drain(..) {
            match op {
                Op::Put { store, key, value } => {
                    self.db.store_mut(&store)?.put(key, value);
                }
                Op::Delete { store, key } => {
                    self.db.store_mut(&store)?.delete(&key);
                }
                Op::Clear { store, range } => {
                    self.db.store_mut(&store)?.clear_range(&range);
                }
            }
        }
        self.state = TxnState::Committed;
        Ok(())
    }

    /// Discards the buffered operations.
    pub(crate) fn abort(&mut self) {
        self.ops.clear();
        self.state = TxnState::Aborted;
    }

    fn ensure_active(&self) -> EngineResult<()> {
        match self.state {
            TxnState::Active => Ok(()),
            TxnState::Committed => Err(EngineError::TransactionFinished { state: "committed" }),
            TxnState::Aborted => Err(EngineError::TransactionFinished { state: "aborted" }),
        }
    }

    fn effective_entries(
        &self,
        store: &str,
        range: &KeyRange,
    ) -> EngineResult<Vec<(Key, Value)>> {
        self.ensure_active()?;
        let mut map: BTreeMap<Key, Value> =
            self.db.store(store)?.entries_in(range).into_iter().collect();
        for op in &self.ops {
            match op {
                Op::Put {
                    store: s,
                    key,
                    value,
                } if s == store && range.contains(key) => {
                    map.insert(key.clone(), value.clone());
                }
                Op::Delete { store: s, key } if s == store => {
                    map.remove(key);
                }
                Op::Clear { store: s, range: r } if s == store => {
                    map.retain(|k, _| !r.contains(k));
                }
                _ => {}
            }
        }
        Ok(map.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseInner;
    use crate::store::ObjectStore;
    use serde_json::json;

    fn inner_with_store() -> DatabaseInner {
        let mut inner = DatabaseInner::new(1);
        inner.insert_store(ObjectStore::new("items", vec!["id".into()]));
        inner
    }

    #[test]
    fn writes_apply_on_commit_only() {
        let mut inner = inner_with_store();
        {
            let mut txn = WriteTxn::new(&mut inner);
            txn.put("items", json!({"id": "a", "n": 1})).unwrap();
            assert_eq!(txn.state(), TxnState::Active);
            txn.commit().unwrap();
        }
        assert_eq!(inner.store("items").unwrap().len(), 1);
    }

    #[test]
    fn abort_discards_buffer() {
        let mut inner = inner_with_store();
        {
            let mut txn = WriteTxn::new(&mut inner);
            txn.put("items", json!({"id": "a"})).unwrap();
            txn.abort();
        }
        assert!(inner.store("items").unwrap().is_empty());
    }

    #[test]
    fn no_operation_after_commit() {
        let mut inner = inner_with_store();
        let mut txn = WriteTxn::new(&mut inner);
        txn.commit().unwrap();
        let err = txn.put("items", json!({"id": "a"})).unwrap_err();
        assert!(matches!(err, EngineError::TransactionFinished { .. }));
    }

    #[test]
    fn reads_see_own_writes() {
        let mut inner = inner_with_store();
        let mut txn = WriteTxn::new(&mut inner);
        txn.put("items", json!({"id": "a", "n": 1})).unwrap();

        let got = txn.get("items", &Key::Text("a".into())).unwrap();
        assert_eq!(got, Some(json!({"id": "a", "n": 1})));

        txn.delete("items", &Key::Text("a".into())).unwrap();
        assert!(txn.get("items", &Key::Text("a".into())).unwrap().is_none());
    }

    #[test]
    fn cursor_sees_overlay() {
        let mut inner = inner_with_store();
        {
            let mut txn = WriteTxn::new(&mut inner);
            txn.put("items", json!({"id": "a"})).unwrap();
            txn.put("items", json!({"id": "c"})).unwrap();
            txn.commit().unwrap();
        }
        let mut txn = WriteTxn::new(&mut inner);
        txn.put("items", json!({"id": "b"})).unwrap();
        let mut cursor = txn.open_cursor("items", &KeyRange::All).unwrap();
        let mut seen = Vec::new();
        while let Some(key) = cursor.key().cloned() {
            seen.push(key);
            cursor.advance();
        }
        assert_eq!(
            seen,
            vec![
                Key::Text("a".into()),
                Key::Text("b".into()),
                Key::Text("c".into())
            ]
        );
    }

    #[test]
    fn unknown_store_is_rejected_at_op_time() {
        let mut inner = inner_with_store();
        let mut txn = WriteTxn::new(&mut inner);
        let err = txn.put("missing", json!({"id": "a"})).unwrap_err();
        assert!(matches!(err, EngineError::StoreNotFound { .. }));
    }
}
