//! Records persisted in the ledger.
//!
//! Records are stored as JSON under a composite key made of their collection
//! name and their natural id.

use crate::clock::Timestamp;
use crate::types::{ClientIdentity, LockType, TxId, TxState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A record type with its own collection in the ledger.
pub trait Record: Serialize + DeserializeOwned {
    /// Collection name used as the key prefix.
    const COLLECTION: &'static str;

    /// The record's natural id within its collection.
    fn record_id(&self) -> &str;
}

/// A named, lockable value.
///
/// Variables are created lazily the first time a transaction tries to lock
/// them and are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    name: String,
    value: Option<String>,
    before_image: Option<String>,
    write_lock_holder: Option<TxId>,
    read_lock_holders: BTreeSet<TxId>,
}

impl Record for Variable {
    const COLLECTION: &'static str = "variablelist";

    fn record_id(&self) -> &str {
        &self.name
    }
}

impl Variable {
    /// Creates an unlocked variable with no value.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            before_image: None,
            write_lock_holder: None,
            read_lock_holders: BTreeSet::new(),
        }
    }

    /// Returns the variable's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current value.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Returns the value saved when the current writer took its lock.
    #[must_use]
    pub fn before_image(&self) -> Option<&str> {
        self.before_image.as_deref()
    }

    /// Returns the transaction holding the write lock.
    #[must_use]
    pub fn write_lock_holder(&self) -> Option<&TxId> {
        self.write_lock_holder.as_ref()
    }

    /// Returns the transactions holding read locks.
    #[must_use]
    pub fn read_lock_holders(&self) -> &BTreeSet<TxId> {
        &self.read_lock_holders
    }

    /// Returns true if no transaction holds any lock.
    #[must_use]
    pub fn is_unlocked(&self) -> bool {
        self.write_lock_holder.is_none() && self.read_lock_holders.is_empty()
    }

    /// Returns true if `tx` holds any lock on this variable.
    #[must_use]
    pub fn is_locked_by(&self, tx: &TxId) -> bool {
        self.write_lock_holder.as_ref() == Some(tx) || self.read_lock_holders.contains(tx)
    }

    /// Returns true if `tx` already holds a lock at least as strong as
    /// `lock_type`.
    #[must_use]
    pub fn holds(&self, tx: &TxId, lock_type: LockType) -> bool {
        match lock_type {
            LockType::Write => self.write_lock_holder.as_ref() == Some(tx),
            LockType::Read => self.is_locked_by(tx),
        }
    }

    /// Returns true if `lock_type` can be granted to `tx` without evicting
    /// anyone.
    #[must_use]
    pub fn can_grant(&self, tx: &TxId, lock_type: LockType) -> bool {
        match lock_type {
            LockType::Read => self.write_lock_holder.is_none(),
            LockType::Write => {
                self.write_lock_holder.is_none()
                    && self.read_lock_holders.iter().all(|holder| holder == tx)
            }
        }
    }

    /// Returns every other transaction holding a lock, write holder first.
    #[must_use]
    pub fn holders_other_than(&self, tx: &TxId) -> Vec<TxId> {
        self.write_lock_holder
            .iter()
            .chain(self.read_lock_holders.iter())
            .filter(|holder| *holder != tx)
            .cloned()
            .collect()
    }

    pub(crate) fn set_value(&mut self, value: Option<String>) {
        self.value = value;
    }

    /// Saves the current value so an abort can restore it.
    pub(crate) fn capture_before_image(&mut self) {
        self.before_image = self.value.clone();
    }

    /// Grants a lock. A write lock replaces the holder's own read lock.
    pub(crate) fn grant(&mut self, tx: &TxId, lock_type: LockType) {
        match lock_type {
            LockType::Read => {
                self.read_lock_holders.insert(tx.clone());
            }
            LockType::Write => {
                self.read_lock_holders.remove(tx);
                self.write_lock_holder = Some(tx.clone());
            }
        }
    }

    /// Drops every lock `tx` holds. Returns true if anything changed.
    ///
    /// When `tx` held the write lock the before-image is cleared, after
    /// being restored into the value if `rollback` is set.
    pub(crate) fn release(&mut self, tx: &TxId, rollback: bool) -> bool {
        let mut changed = self.read_lock_holders.remove(tx);
        if self.write_lock_holder.as_ref() == Some(tx) {
            self.write_lock_holder = None;
            let before = self.before_image.take();
            if rollback {
                self.value = before;
            }
            changed = true;
        }
        changed
    }
}

/// Bookkeeping for one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxDetails {
    id: TxId,
    owner: ClientIdentity,
    state: TxState,
    timeout: Timestamp,
}

impl Record for TxDetails {
    const COLLECTION: &'static str = "txdetailslist";

    fn record_id(&self) -> &str {
        self.id.as_str()
    }
}

impl TxDetails {
    /// Creates a started transaction.
    pub fn new(id: TxId, owner: ClientIdentity, timeout: Timestamp) -> Self {
        Self {
            id,
            owner,
            state: TxState::Started,
            timeout,
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn id(&self) -> &TxId {
        &self.id
    }

    /// Returns the identity that began the transaction.
    #[must_use]
    pub fn owner(&self) -> &ClientIdentity {
        &self.owner
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Returns the instant after which the transaction's locks may be revoked.
    #[must_use]
    pub fn timeout(&self) -> Timestamp {
        self.timeout
    }

    /// Returns true once `now` is strictly past the timeout.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.timeout
    }

    pub(crate) fn set_state(&mut self, state: TxState) {
        self.state = state;
    }
}
