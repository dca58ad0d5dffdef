//! # resman testkit
//!
//! Test utilities for the resman resource manager.
//!
//! This crate provides:
//! - Test rigs over in-memory and file ledgers with a manual clock
//! - Property-based workload generators using proptest
//! - Invariant checks over persisted variables and transactions
//! - End-to-end client scenarios
//! - A multi-threaded contention harness
//!
//! ## Usage
//!
//! ```rust
//! use resman_testkit::prelude::*;
//!
//! with_rig(|rig| {
//!     assert!(rig.set_value(&user(1), "tx1", "x1", "ghareeb").unwrap());
//!     assert_eq!(check_all(rig).unwrap(), Ok(()));
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod invariants;
pub mod scenarios;
pub mod stress;

#[cfg(test)]
mod properties;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::invariants::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use invariants::*;
pub use stress::*;
