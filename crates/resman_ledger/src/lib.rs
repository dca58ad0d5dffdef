//! # resman Ledger
//!
//! Key-value ledger substrate for the resman resource manager.
//!
//! This crate provides the lowest-level storage abstraction used by
//! `resman_core`. A ledger is an **opaque key-value world-state**: it stores
//! byte values under string keys and can enumerate keys sharing a prefix.
//! It does not interpret the records it stores.
//!
//! ## Design Principles
//!
//! - Ledgers are simple key-value stores (get, put, delete, prefix scan)
//! - Multi-key updates go through [`WriteBatch`] and are applied atomically
//! - Must be `Send + Sync` for concurrent access
//! - Record encoding and key layout belong to the caller; this crate only
//!   provides the composite-key helpers
//!
//! ## Available Ledgers
//!
//! - [`InMemoryLedger`] - For testing and ephemeral state
//! - [`FileLedger`] - Append-only log file replayed on open
//!
//! ## Example
//!
//! ```rust
//! use resman_ledger::{composite_key, InMemoryLedger, Ledger};
//!
//! let ledger = InMemoryLedger::new();
//! let key = composite_key("variablelist", &["x1"]).unwrap();
//! ledger.put(&key, b"{}").unwrap();
//! assert_eq!(ledger.get(&key).unwrap(), Some(b"{}".to_vec()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod file;
mod frame;
mod key;
mod ledger;
mod memory;

pub use batch::{BatchOp, WriteBatch};
pub use error::{LedgerError, LedgerResult};
pub use file::FileLedger;
pub use key::{collection_prefix, composite_key, split_composite_key, KEY_DELIMITER};
pub use ledger::Ledger;
pub use memory::InMemoryLedger;
