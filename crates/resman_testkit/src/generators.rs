//! Property-based test generators using proptest.
//!
//! Workloads are sequences of [`Op`]s over a small pool of transactions and
//! variables, so that conflicts are frequent.

use crate::fixtures::{user, TestRig};
use proptest::prelude::*;
use resman_core::CoreResult;
use std::time::Duration;

/// Strategy for generating variable values.
pub fn value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9 ]{0,12}").expect("Invalid regex")
}

/// Strategy for generating variable names that are valid key components.
pub fn variable_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_.:-]{0,15}").expect("Invalid regex")
}

/// One client call in a generated workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// `set_value` by the transaction's owner.
    Set {
        /// Transaction index.
        tx: usize,
        /// Variable index.
        var: usize,
        /// Value to write.
        value: String,
    },
    /// `get_value` by the transaction's owner.
    Get {
        /// Transaction index.
        tx: usize,
        /// Variable index.
        var: usize,
    },
    /// `prepare` by the transaction's owner.
    Prepare {
        /// Transaction index.
        tx: usize,
    },
    /// `commit` by the transaction's owner.
    Commit {
        /// Transaction index.
        tx: usize,
    },
    /// `abort` by the transaction's owner.
    Abort {
        /// Transaction index.
        tx: usize,
    },
    /// Let logical time pass.
    Tick {
        /// Milliseconds to advance.
        millis: u64,
    },
}

impl Op {
    /// Applies the call to a rig.
    ///
    /// Transaction `i` is called `tx{i}`, owned by `user{i}`, and variable
    /// `j` is called `v{j}`. Hard errors are returned; soft failures from
    /// lock conflicts are not errors.
    pub fn apply(&self, rig: &TestRig) -> CoreResult<()> {
        match self {
            Self::Set { tx, var, value } => {
                rig.set_value(&user(*tx), &tx_name(*tx), &var_name(*var), value.as_str())?;
            }
            Self::Get { tx, var } => {
                rig.get_value(&user(*tx), &tx_name(*tx), &var_name(*var))?;
            }
            Self::Prepare { tx } => {
                rig.prepare(&user(*tx), &tx_name(*tx))?;
            }
            Self::Commit { tx } => rig.commit(&user(*tx), &tx_name(*tx))?,
            Self::Abort { tx } => rig.abort(&user(*tx), &tx_name(*tx))?,
            Self::Tick { millis } => rig.advance(Duration::from_millis(*millis)),
        }
        Ok(())
    }
}

/// Name of transaction `i` in generated workloads.
pub fn tx_name(i: usize) -> String {
    format!("tx{i}")
}

/// Name of variable `j` in generated workloads.
pub fn var_name(j: usize) -> String {
    format!("v{j}")
}

/// Strategy for one call over `txs` transactions and `vars` variables.
pub fn op_strategy(txs: usize, vars: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..txs, 0..vars, value_strategy())
            .prop_map(|(tx, var, value)| Op::Set { tx, var, value }),
        3 => (0..txs, 0..vars).prop_map(|(tx, var)| Op::Get { tx, var }),
        1 => (0..txs).prop_map(|tx| Op::Prepare { tx }),
        1 => (0..txs).prop_map(|tx| Op::Commit { tx }),
        1 => (0..txs).prop_map(|tx| Op::Abort { tx }),
        1 => (0..400u64).prop_map(|millis| Op::Tick { millis }),
    ]
}

/// Strategy for a workload of up to `max_len` calls.
pub fn workload_strategy(txs: usize, vars: usize, max_len: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(txs, vars), 1..max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use resman_ledger::composite_key;

    proptest! {
        #[test]
        fn generated_names_are_valid_keys(name in variable_name_strategy()) {
            prop_assert!(composite_key("variablelist", &[name.as_str()]).is_ok());
        }

        #[test]
        fn ops_stay_in_range(op in op_strategy(3, 2)) {
            match op {
                Op::Set { tx, var, .. } | Op::Get { tx, var } => {
                    prop_assert!(tx < 3);
                    prop_assert!(var < 2);
                }
                Op::Prepare { tx } | Op::Commit { tx } | Op::Abort { tx } => prop_assert!(tx < 3),
                Op::Tick { millis } => prop_assert!(millis < 400),
            }
        }
    }

    #[test]
    fn apply_uses_owner_per_transaction() {
        let rig = TestRig::memory();
        Op::Set {
            tx: 2,
            var: 0,
            value: "a".to_string(),
        }
        .apply(&rig)
        .unwrap();

        let details = rig.transaction("tx2").unwrap().unwrap();
        assert_eq!(details.owner(), &user(2));
        assert_eq!(rig.variable("v0").unwrap().unwrap().value(), Some("a"));
    }
}
