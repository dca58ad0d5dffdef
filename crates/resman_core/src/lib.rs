//! # resman core
//!
//! A resource manager for two-phase commit over a key-value ledger.
//!
//! This crate provides:
//! - Variables with read/write locks and before-images for rollback
//! - Transactions moving through `STARTED`, `PREPARED`, `COMMITTED` and `ABORTED`
//! - A fail-fast lock manager that evicts holders past their lock duration
//! - Lifecycle events published after each operation becomes durable
//!
//! State lives in a [`resman_ledger::Ledger`]; every public operation is one
//! atomic batch against it.
//!
//! ```rust
//! use resman_core::{ClientIdentity, ResourceManager};
//!
//! let rm = ResourceManager::in_memory();
//! let (alice, bob) = (ClientIdentity::new("alice"), ClientIdentity::new("bob"));
//!
//! assert!(rm.set_value(&alice, "tx1", "seat-12A", "alice").unwrap());
//!
//! // bob's transaction loses the conflict and aborts itself.
//! assert!(!rm.set_value(&bob, "tx2", "seat-12A", "bob").unwrap());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod error;
mod events;
mod lock;
mod manager;
mod record;
mod stats;
mod types;
mod working_set;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use events::{EventFeed, EventRecord, EventSink, RmEvent};
pub use manager::ResourceManager;
pub use record::{Record, TxDetails, Variable};
pub use stats::{ResourceManagerStats, StatsSnapshot};
pub use types::{ClientIdentity, LockType, TxId, TxState, ValueRead, Vote};
