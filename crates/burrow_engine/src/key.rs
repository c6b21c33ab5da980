//! Ordered keys and key ranges.
//!
//! Keys are the ordering primitive of the engine: object stores and indexes
//! keep their entries sorted by `Key`. Composite keys (`Key::Seq`) compare
//! element-wise, which is what makes range-bounded partition scans and the
//! sorted-candidate merge in higher layers work.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// An ordered store key.
///
/// The total order ranks integers below strings below sequences; within
/// sequences, comparison is element-wise with shorter-is-less on a shared
/// prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Text(String),
    /// Composite key, compared element-wise.
    Seq(Vec<Key>),
}

impl Key {
    /// Rank used for cross-variant ordering.
    const fn rank(&self) -> u8 {
        match self {
            Key::Int(_) => 0,
            Key::Text(_) => 1,
            Key::Seq(_) => 2,
        }
    }

    /// Builds a key from a JSON value.
    ///
    /// Strings and integral numbers are valid key material; arrays become
    /// composite keys. Anything else is rejected.
    pub fn from_value(value: &Value) -> EngineResult<Self> {
        match value {
            Value::String(s) => Ok(Key::Text(s.clone())),
            Value::Number(n) => n
                .as_i64()
                .map(Key::Int)
                .ok_or_else(|| EngineError::data(format!("non-integral number key: {n}"))),
            Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(Key::from_value)
                    .collect::<EngineResult<Vec<_>>>()?;
                Ok(Key::Seq(parts))
            }
            other => Err(EngineError::data(format!(
                "value is not key material: {other}"
            ))),
        }
    }

    /// Extracts a key from a JSON object following a key path.
    ///
    /// A single-element path yields the field's scalar key; a multi-element
    /// path yields a composite key of the named fields, in order.
    pub fn extract(value: &Value, key_path: &[String]) -> EngineResult<Self> {
        let field_key = |field: &String| -> EngineResult<Key> {
            let v = value
                .get(field)
                .ok_or_else(|| EngineError::data(format!("missing key field `{field}`")))?;
            Key::from_value(v)
        };
        match key_path {
            [] => Err(EngineError::data("empty key path")),
            [single] => field_key(single),
            many => {
                let parts = many.iter().map(field_key).collect::<EngineResult<Vec<_>>>()?;
                Ok(Key::Seq(parts))
            }
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Int(a), Key::Int(b)) => a.cmp(b),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            (Key::Seq(a), Key::Seq(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A contiguous range of keys.
#[derive(Debug, Clone)]
pub enum KeyRange {
    /// Every key.
    All,
    /// Exactly one key.
    Only(Key),
    /// A bounded interval.
    Bound {
        /// Lower bound, if any.
        lower: Option<Key>,
        /// Upper bound, if any.
        upper: Option<Key>,
        /// Whether the lower bound is exclusive.
        lower_open: bool,
        /// Whether the upper bound is exclusive.
        upper_open: bool,
    },
    /// Every composite key whose leading elements equal the prefix.
    Prefix(Vec<Key>),
}

impl KeyRange {
    /// Range matching exactly one key.
    #[must_use]
    pub fn only(key: Key) -> Self {
        KeyRange::Only(key)
    }

    /// Closed interval `[lower, upper]`.
    #[must_use]
    pub fn bound(lower: Key, upper: Key) -> Self {
        KeyRange::Bound {
            lower: Some(lower),
            upper: Some(upper),
            lower_open: false,
            upper_open: false,
        }
    }

    /// Half-open interval `[lower, ..)`.
    #[must_use]
    pub fn lower_bound(lower: Key) -> Self {
        KeyRange::Bound {
            lower: Some(lower),
            upper: None,
            lower_open: false,
            upper_open: false,
        }
    }

    /// Range over composite keys sharing a leading prefix.
    #[must_use]
    pub fn prefix(prefix: Vec<Key>) -> Self {
        KeyRange::Prefix(prefix)
    }

    /// Whether the range contains the key.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        match self {
            KeyRange::All => true,
            KeyRange::Only(k) => k == key,
            KeyRange::Bound {
                lower,
                upper,
                lower_open,
                upper_open,
            } => {
                if let Some(lo) = lower {
                    match key.cmp(lo) {
                        Ordering::Less => return false,
                        Ordering::Equal if *lower_open => return false,
                        _ => {}
                    }
                }
                if let Some(hi) = upper {
                    match key.cmp(hi) {
                        Ordering::Greater => return false,
                        Ordering::Equal if *upper_open => return false,
                        _ => {}
                    }
                }
                true
            }
            KeyRange::Prefix(prefix) => match key {
                Key::Seq(parts) => {
                    parts.len() >= prefix.len() && parts[..prefix.len()] == prefix[..]
                }
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ints_order_below_strings_below_sequences() {
        let i = Key::Int(999);
        let t = Key::Text("a".into());
        let s = Key::Seq(vec![Key::Int(0)]);
        assert!(i < t);
        assert!(t < s);
    }

    #[test]
    fn sequences_compare_element_wise() {
        let a = Key::Seq(vec![Key::Text("books".into()), Key::Text("1".into())]);
        let b = Key::Seq(vec![Key::Text("books".into()), Key::Text("2".into())]);
        let c = Key::Seq(vec![Key::Text("cars".into()), Key::Text("0".into())]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn shorter_sequence_sorts_before_extension() {
        let prefix = Key::Seq(vec![Key::Text("books".into())]);
        let full = Key::Seq(vec![Key::Text("books".into()), Key::Text("a".into())]);
        assert!(prefix < full);
    }

    #[test]
    fn extract_composite_key() {
        let record = json!({"_collection": "books", "id": "b1", "title": "x"});
        let key = Key::extract(&record, &["_collection".into(), "id".into()]).unwrap();
        assert_eq!(
            key,
            Key::Seq(vec![Key::Text("books".into()), Key::Text("b1".into())])
        );
    }

    #[test]
    fn extract_rejects_missing_field() {
        let record = json!({"id": "b1"});
        assert!(Key::extract(&record, &["missing".into()]).is_err());
    }

    #[test]
    fn non_integral_number_is_not_key_material() {
        assert!(Key::from_value(&json!(1.5)).is_err());
        assert!(Key::from_value(&json!(7)).is_ok());
    }

    #[test]
    fn prefix_range_matches_partition() {
        let range = KeyRange::prefix(vec![Key::Text("books".into())]);
        let inside = Key::Seq(vec![Key::Text("books".into()), Key::Text("b1".into())]);
        let outside = Key::Seq(vec![Key::Text("cars".into()), Key::Text("b1".into())]);
        assert!(range.contains(&inside));
        assert!(!range.contains(&outside));
        assert!(!range.contains(&Key::Text("books".into())));
    }

    #[test]
    fn bound_range_endpoints() {
        let range = KeyRange::bound(Key::Int(2), Key::Int(5));
        assert!(range.contains(&Key::Int(2)));
        assert!(range.contains(&Key::Int(5)));
        assert!(!range.contains(&Key::Int(6)));
        assert!(!range.contains(&Key::Int(1)));
    }
}
