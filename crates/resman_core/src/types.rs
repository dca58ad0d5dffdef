//! Identifiers and small value types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A caller-supplied transaction id.
///
/// Ids are chosen by the client, usually the global transaction id of the
/// surrounding two-phase commit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    /// Creates a transaction id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a fresh random id.
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TxId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for TxId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The identity of the caller of an operation.
///
/// The hosting runtime authenticates the caller; the resource manager only
/// compares identities for equality. The default identity is empty and owns
/// nothing.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Creates a caller identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle state of a transaction.
///
/// ```text
/// STARTED --prepare--> PREPARED --commit--> COMMITTED
///    |                    |
///    +------abort---------+------> ABORTED --abort--> ABORTED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxState {
    /// Reading and writing variables.
    Started,
    /// Voted yes; waiting for the coordinator's decision.
    Prepared,
    /// Changes are final and locks are released.
    Committed,
    /// Changes were rolled back and locks are released.
    Aborted,
}

impl TxState {
    /// Returns true for `Committed` and `Aborted`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }

    /// Returns the wire name of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::Prepared => "PREPARED",
            Self::Committed => "COMMITTED",
            Self::Aborted => "ABORTED",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of lock requested on a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockType {
    /// Shared lock, taken by `get_value`.
    Read,
    /// Exclusive lock, taken by `set_value`.
    Write,
}

/// Result of a `get_value` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValueRead {
    /// False when the read lock could not be obtained and the transaction
    /// aborted itself.
    pub successful: bool,
    /// The variable's value; `None` when unsuccessful or never written.
    pub value: Option<String>,
}

impl ValueRead {
    pub(crate) fn granted(value: Option<String>) -> Self {
        Self {
            successful: true,
            value,
        }
    }

    pub(crate) fn denied() -> Self {
        Self::default()
    }
}

/// Vote cast by `prepare`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    /// The transaction is prepared and can commit.
    Yes,
    /// The transaction was already aborted.
    No,
}

impl Vote {
    /// Returns true for `Vote::Yes`.
    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Self::Yes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tx_state_wire_names() {
        assert_eq!(serde_json::to_string(&TxState::Started).unwrap(), r#""STARTED""#);
        assert_eq!(
            serde_json::from_str::<TxState>(r#""PREPARED""#).unwrap(),
            TxState::Prepared
        );
        assert_eq!(TxState::Aborted.to_string(), "ABORTED");
    }

    #[test]
    fn terminal_states() {
        assert!(!TxState::Started.is_terminal());
        assert!(!TxState::Prepared.is_terminal());
        assert!(TxState::Committed.is_terminal());
        assert!(TxState::Aborted.is_terminal());
    }

    #[test]
    fn random_ids_differ() {
        assert_ne!(TxId::random(), TxId::random());
        assert_eq!(TxId::random().as_str().len(), 36);
    }

    #[test]
    fn ids_serialize_as_plain_strings() {
        assert_eq!(serde_json::to_string(&TxId::new("tx1")).unwrap(), r#""tx1""#);
        assert_eq!(
            serde_json::to_string(&ClientIdentity::from("user1")).unwrap(),
            r#""user1""#
        );
    }
}
