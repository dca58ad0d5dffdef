//! Resource manager statistics.
//!
//! ```rust
//! use resman_core::{ClientIdentity, ResourceManager};
//!
//! let rm = ResourceManager::in_memory();
//! let user = ClientIdentity::new("user1");
//! rm.set_value(&user, "tx1", "x", "1").unwrap();
//!
//! let stats = rm.stats();
//! assert_eq!(stats.transactions_started, 1);
//! assert_eq!(stats.locks_granted, 1);
//! ```

use crate::events::RmEvent;
use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-manager decision, counted when its operation commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockStat {
    /// A lock was newly granted.
    Granted,
    /// A request found other holders.
    Conflict,
    /// A live transaction was aborted to free its locks.
    ForcedAbort,
    /// A requester aborted itself after losing a conflict.
    SelfAbort,
}

/// Resource manager counters.
///
/// All counters are atomic and monotonically increasing. Every counter
/// reflects committed operations only: transaction counters follow published
/// events, and lock decisions are buffered with the operation's writes and
/// counted once they reach the ledger.
#[derive(Debug, Default)]
pub struct ResourceManagerStats {
    // Transaction counters
    transactions_started: AtomicU64,
    transactions_prepared: AtomicU64,
    votes_no: AtomicU64,
    transactions_committed: AtomicU64,
    transactions_aborted: AtomicU64,

    // Lock counters
    locks_granted: AtomicU64,
    lock_conflicts: AtomicU64,
    forced_aborts: AtomicU64,
    self_aborts: AtomicU64,
}

impl ResourceManagerStats {
    /// Creates a new stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a published event.
    pub(crate) fn record_event(&self, event: &RmEvent) {
        let counter = match event {
            RmEvent::TransactionStarted { .. } => &self.transactions_started,
            RmEvent::Voted { vote, .. } if vote.is_yes() => &self.transactions_prepared,
            RmEvent::Voted { .. } => &self.votes_no,
            RmEvent::TransactionCommitted { .. } => &self.transactions_committed,
            RmEvent::TransactionAborted { .. } => &self.transactions_aborted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts a lock decision of a committed operation.
    pub(crate) fn record_lock(&self, stat: LockStat) {
        let counter = match stat {
            LockStat::Granted => &self.locks_granted,
            LockStat::Conflict => &self.lock_conflicts,
            LockStat::ForcedAbort => &self.forced_aborts,
            LockStat::SelfAbort => &self.self_aborts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_prepared: self.transactions_prepared.load(Ordering::Relaxed),
            votes_no: self.votes_no.load(Ordering::Relaxed),
            transactions_committed: self.transactions_committed.load(Ordering::Relaxed),
            transactions_aborted: self.transactions_aborted.load(Ordering::Relaxed),
            locks_granted: self.locks_granted.load(Ordering::Relaxed),
            lock_conflicts: self.lock_conflicts.load(Ordering::Relaxed),
            forced_aborts: self.forced_aborts.load(Ordering::Relaxed),
            self_aborts: self.self_aborts.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of resource manager statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Transactions started, explicitly or lazily.
    pub transactions_started: u64,
    /// Transactions that voted yes.
    pub transactions_prepared: u64,
    /// `prepare` calls on aborted transactions.
    pub votes_no: u64,
    /// Transactions committed.
    pub transactions_committed: u64,
    /// Transactions aborted for any reason.
    pub transactions_aborted: u64,
    /// Locks granted, including grants after eviction.
    pub locks_granted: u64,
    /// Lock requests that found other holders.
    pub lock_conflicts: u64,
    /// Expired transactions aborted by a conflicting request. Stale locks
    /// of finished or unknown transactions are released without counting.
    pub forced_aborts: u64,
    /// Transactions that aborted themselves after losing a conflict.
    pub self_aborts: u64,
}
