//! Atomic multi-key updates.

use serde::{Deserialize, Serialize};

/// A single operation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum BatchOp {
    /// Insert or overwrite a key.
    Put {
        /// Ledger key.
        key: String,
        /// Value bytes.
        value: Vec<u8>,
    },
    /// Remove a key.
    Delete {
        /// Ledger key.
        key: String,
    },
}

impl BatchOp {
    /// Returns the key this operation touches.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => key,
        }
    }
}

/// An ordered set of writes applied to a ledger as one unit.
///
/// Operations are applied in insertion order, so a later operation on the
/// same key wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a put.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.ops.push(BatchOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    /// Queues a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete { key: key.into() });
    }

    /// Returns the queued operations.
    #[must_use]
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    /// Returns the number of queued operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchOp;
    type IntoIter = std::vec::IntoIter<BatchOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_preserves_order() {
        let mut batch = WriteBatch::new();
        batch.put("a", b"1".to_vec());
        batch.delete("a");
        batch.put("b", b"2".to_vec());

        let keys: Vec<_> = batch.ops().iter().map(BatchOp::key).collect();
        assert_eq!(keys, vec!["a", "a", "b"]);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn batch_json_shape() {
        let mut batch = WriteBatch::new();
        batch.delete("k");
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(json, r#"{"ops":[{"op":"delete","key":"k"}]}"#);
    }
}
