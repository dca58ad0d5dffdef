//! In-memory ledger for testing.

use crate::batch::WriteBatch;
use crate::error::LedgerResult;
use crate::ledger::{apply_to_map, scan_map, Ledger};
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory ledger.
///
/// This ledger keeps all state in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral resource managers that don't need persistence
///
/// # Thread Safety
///
/// This ledger is thread-safe and can be shared across threads. Batches are
/// applied under a single write lock, so readers never observe half a batch.
///
/// # Example
///
/// ```rust
/// use resman_ledger::{InMemoryLedger, Ledger};
///
/// let ledger = InMemoryLedger::new();
/// ledger.put("k", b"v").unwrap();
/// assert_eq!(ledger.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    state: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryLedger {
    /// Creates a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger with pre-existing entries.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (String, Vec<u8>)>) -> Self {
        Self {
            state: RwLock::new(entries.into_iter().collect()),
        }
    }

    /// Returns a copy of every entry.
    #[must_use]
    pub fn entries(&self) -> Vec<(String, Vec<u8>)> {
        self.state
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Returns true if the ledger holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }
}

impl Ledger for InMemoryLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.state.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        Ok(scan_map(&self.state.read(), prefix))
    }

    fn apply(&self, batch: WriteBatch) -> LedgerResult<()> {
        apply_to_map(&mut self.state.write(), batch);
        Ok(())
    }
}
