//! Ledger trait definition.

use crate::batch::{BatchOp, WriteBatch};
use crate::error::LedgerResult;

/// A key-value world-state.
///
/// Ledgers are **opaque key-value stores**. They store byte values under
/// string keys and enumerate keys by prefix. Record encoding and key layout
/// are owned by the caller.
///
/// # Invariants
///
/// - `get` returns exactly the bytes most recently `put` under that key
/// - `scan_prefix` returns entries in ascending key order
/// - `apply` makes every operation of the batch visible, or none of them
/// - Ledgers must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryLedger`] - For testing
/// - [`super::FileLedger`] - For persistent state
pub trait Ledger: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.apply(batch)
    }

    /// Removes `key`. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &str) -> LedgerResult<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.apply(batch)
    }

    /// Returns every `(key, value)` pair whose key starts with `prefix`,
    /// in ascending key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the scan fails.
    fn scan_prefix(&self, prefix: &str) -> LedgerResult<Vec<(String, Vec<u8>)>>;

    /// Applies all operations of `batch` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be made durable. In that case
    /// none of its operations are visible.
    fn apply(&self, batch: WriteBatch) -> LedgerResult<()>;
}

/// Applies a batch to an ordered map. Shared by the in-process ledgers.
pub(crate) fn apply_to_map(
    map: &mut std::collections::BTreeMap<String, Vec<u8>>,
    batch: WriteBatch,
) {
    for op in batch {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key, value);
            }
            BatchOp::Delete { key } => {
                map.remove(&key);
            }
        }
    }
}

/// Collects the entries of an ordered map that start with `prefix`.
pub(crate) fn scan_map(
    map: &std::collections::BTreeMap<String, Vec<u8>>,
    prefix: &str,
) -> Vec<(String, Vec<u8>)> {
    map.range(prefix.to_string()..)
        .take_while(|(key, _)| key.starts_with(prefix))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
