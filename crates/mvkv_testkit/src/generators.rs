//! Property-based test generators using proptest.
//!
//! Keys are drawn from a small alphabet so that generated operations collide
//! often enough to exercise conflicts.

use mvkv_core::{Key, KeyRange, Value};
use proptest::prelude::*;

/// Strategy for keys over a small alphabet.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    prop::string::string_regex("[a-e]{1,3}")
        .expect("Invalid regex")
        .prop_map(Key::from)
}

/// Strategy for arbitrary binary keys, including the empty key.
pub fn binary_key_strategy() -> impl Strategy<Value = Key> {
    prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::from)
}

/// Strategy for values (arbitrary bytes).
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::from)
}

/// Strategy for key ranges, bounded or not.
pub fn key_range_strategy() -> impl Strategy<Value = KeyRange> {
    (key_strategy(), prop::option::of(key_strategy()))
        .prop_map(|(start, end)| KeyRange { start, end })
}

/// A single operation inside a transaction.
#[derive(Debug, Clone)]
pub enum TxnOperation {
    /// Put a key
    Put {
        /// Key
        key: Key,
        /// Value
        value: Value,
    },
    /// Delete a key
    Delete {
        /// Key
        key: Key,
    },
    /// Get a key
    Get {
        /// Key
        key: Key,
    },
    /// Scan a range
    Scan {
        /// Range
        range: KeyRange,
    },
}

/// Strategy for generating transaction operations.
pub fn txn_operation_strategy() -> impl Strategy<Value = TxnOperation> {
    prop_oneof![
        3 => (key_strategy(), value_strategy())
            .prop_map(|(key, value)| TxnOperation::Put { key, value }),
        1 => key_strategy().prop_map(|key| TxnOperation::Delete { key }),
        2 => key_strategy().prop_map(|key| TxnOperation::Get { key }),
        1 => key_range_strategy().prop_map(|range| TxnOperation::Scan { range }),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<TxnOperation>> {
    prop::collection::vec(txn_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn keys_use_small_alphabet(key in key_strategy()) {
            prop_assert!(!key.is_empty());
            prop_assert!(key.as_bytes().iter().all(|b| (b'a'..=b'e').contains(b)));
        }

        #[test]
        fn sequence_length_in_bounds(ops in operation_sequence_strategy(2, 10)) {
            prop_assert!(ops.len() >= 2 && ops.len() < 10);
        }

        #[test]
        fn successor_bounds_point_range(key in binary_key_strategy()) {
            let range = KeyRange::point(&key);
            prop_assert!(range.contains_key(&key));
            prop_assert!(!range.is_empty_range());
        }
    }
}
