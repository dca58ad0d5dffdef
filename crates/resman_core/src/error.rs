//! Error types for the resource manager.

use crate::types::{ClientIdentity, TxId, TxState};
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in resource manager operations.
///
/// Every variant is a hard failure: the operation that returned it left the
/// ledger untouched. Lock conflicts are not errors; they surface as an
/// unsuccessful `set_value`/`get_value` after a self-abort.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Ledger error.
    #[error("ledger error: {0}")]
    Ledger(#[from] resman_ledger::LedgerError),

    /// A stored record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The caller does not own the transaction.
    #[error("{caller} is not the owner of transaction {tx_id}")]
    NotOwner {
        /// The transaction.
        tx_id: TxId,
        /// The identity that made the call.
        caller: ClientIdentity,
    },

    /// No transaction with this id exists.
    #[error("transaction {tx_id} does not exist")]
    TransactionNotFound {
        /// The transaction.
        tx_id: TxId,
    },

    /// The transaction is not in a state that permits the operation.
    #[error("transaction {tx_id} is {state}, expected one of {expected:?}")]
    InvalidState {
        /// The transaction.
        tx_id: TxId,
        /// Its current state.
        state: TxState,
        /// States the operation accepts.
        expected: Vec<TxState>,
    },

    /// `begin` was called with an id that is already in use.
    #[error("transaction {tx_id} already exists")]
    AlreadyExists {
        /// The transaction.
        tx_id: TxId,
    },
}

impl CoreError {
    /// Creates an ownership error.
    pub fn not_owner(tx_id: &TxId, caller: &ClientIdentity) -> Self {
        Self::NotOwner {
            tx_id: tx_id.clone(),
            caller: caller.clone(),
        }
    }

    /// Creates a transaction not found error.
    pub fn not_found(tx_id: &TxId) -> Self {
        Self::TransactionNotFound {
            tx_id: tx_id.clone(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(tx_id: &TxId, state: TxState, expected: &[TxState]) -> Self {
        Self::InvalidState {
            tx_id: tx_id.clone(),
            state,
            expected: expected.to_vec(),
        }
    }

    /// Creates an already exists error.
    pub fn already_exists(tx_id: &TxId) -> Self {
        Self::AlreadyExists {
            tx_id: tx_id.clone(),
        }
    }

    /// Returns true for errors about the transaction's state.
    ///
    /// A missing transaction counts as being in the wrong state.
    #[must_use]
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. } | Self::TransactionNotFound { .. }
        )
    }

    /// Returns true for ownership violations.
    #[must_use]
    pub fn is_ownership_error(&self) -> bool {
        matches!(self, Self::NotOwner { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_errors_include_missing_transactions() {
        let tx = TxId::new("tx1");
        assert!(CoreError::not_found(&tx).is_state_error());
        assert!(CoreError::invalid_state(&tx, TxState::Committed, &[TxState::Prepared])
            .is_state_error());
        assert!(!CoreError::already_exists(&tx).is_state_error());
    }

    #[test]
    fn ownership_error_message() {
        let err = CoreError::not_owner(&TxId::new("tx1"), &ClientIdentity::new("user2"));
        assert!(err.is_ownership_error());
        assert!(!err.is_state_error());
        assert_eq!(err.to_string(), "user2 is not the owner of transaction tx1");
    }

    #[test]
    fn invalid_state_message() {
        let err = CoreError::invalid_state(
            &TxId::new("tx1"),
            TxState::Committed,
            &[TxState::Started, TxState::Aborted],
        );
        assert_eq!(
            err.to_string(),
            "transaction tx1 is COMMITTED, expected one of [Started, Aborted]"
        );
    }
}
