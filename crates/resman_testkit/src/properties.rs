//! Property tests over generated workloads.

use crate::fixtures::{user, TestRig};
use crate::generators::{tx_name, value_strategy, var_name, workload_strategy, Op};
use crate::invariants::{check_all, check_mutual_exclusion};
use proptest::prelude::*;
use resman_core::{Config, ResourceManager, TxState};
use std::time::Duration;

fn short_lock_rig() -> TestRig {
    TestRig::memory_with(Config::new().max_lock_duration(Duration::from_millis(250)))
}

fn terminal_holds_nothing(rm: &ResourceManager) -> bool {
    rm.transactions().unwrap().iter().all(|details| {
        !details.state().is_terminal()
            || rm.locked_variables(details.id().as_str()).unwrap().is_empty()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// No variable is ever write-locked by one transaction while another
    /// holds any lock on it.
    #[test]
    fn mutual_exclusion_holds_throughout(ops in workload_strategy(4, 3, 60)) {
        let rig = short_lock_rig();
        for op in &ops {
            let _ = op.apply(&rig);
            let check = check_mutual_exclusion(&rig).unwrap();
            prop_assert!(check.is_ok(), "after {:?}: {:?}", op, check);
        }
    }

    /// Finished transactions never keep locks.
    #[test]
    fn terminal_transactions_hold_no_locks(ops in workload_strategy(4, 3, 60)) {
        let rig = short_lock_rig();
        for op in &ops {
            let _ = op.apply(&rig);
            prop_assert!(terminal_holds_nothing(&rig), "after {:?}", op);
            let check = check_all(&rig).unwrap();
            prop_assert!(check.is_ok(), "after {:?}: {:?}", op, check);
        }
    }

    /// Aborting restores every variable to its value before the
    /// transaction's first write.
    #[test]
    fn abort_restores_values(
        committed in prop::collection::vec(value_strategy(), 3),
        writes in prop::collection::vec((0..3usize, value_strategy()), 1..12),
        prepare_first in any::<bool>(),
    ) {
        let rig = TestRig::memory();
        let setup = user(0);
        for (j, value) in committed.iter().enumerate() {
            rig.set_value(&setup, "setup", &var_name(j), value.as_str()).unwrap();
        }
        rig.prepare(&setup, "setup").unwrap();
        rig.commit(&setup, "setup").unwrap();

        let u = user(1);
        for (j, value) in &writes {
            prop_assert!(rig.set_value(&u, "tx1", &var_name(*j), value.as_str()).unwrap());
        }
        if prepare_first {
            rig.prepare(&u, "tx1").unwrap();
        }
        rig.abort(&u, "tx1").unwrap();

        for (j, value) in committed.iter().enumerate() {
            let var = rig.variable(&var_name(j)).unwrap().unwrap();
            prop_assert_eq!(var.value(), Some(value.as_str()));
            prop_assert!(var.is_unlocked());
        }
    }

    /// Committing keeps the last value written to each variable.
    #[test]
    fn commit_keeps_last_writes(
        writes in prop::collection::vec((0..3usize, value_strategy()), 1..12),
    ) {
        let rig = TestRig::memory();
        let u = user(1);
        let mut expected = std::collections::BTreeMap::new();
        for (j, value) in &writes {
            prop_assert!(rig.set_value(&u, "tx1", &var_name(*j), value.as_str()).unwrap());
            expected.insert(*j, value.clone());
        }
        rig.prepare(&u, "tx1").unwrap();
        rig.commit(&u, "tx1").unwrap();

        for (j, value) in expected {
            let var = rig.variable(&var_name(j)).unwrap().unwrap();
            prop_assert_eq!(var.value(), Some(value.as_str()));
            prop_assert!(!var.is_locked_by(&"tx1".into()));
            prop_assert_eq!(var.before_image(), None);
        }
        prop_assert!(rig.locked_variables("tx1").unwrap().is_empty());
    }

    /// A second abort changes nothing and does not fail.
    #[test]
    fn repeated_abort_is_a_no_op(ops in workload_strategy(3, 3, 40)) {
        let rig = short_lock_rig();
        for op in &ops {
            let _ = op.apply(&rig);
        }

        let aborted: Vec<_> = rig
            .transactions()
            .unwrap()
            .into_iter()
            .filter(|details| details.state() == TxState::Aborted)
            .collect();

        for details in aborted {
            let variables = rig.variables().unwrap();
            let transactions = rig.transactions().unwrap();
            let sequence = rig.events().latest_sequence();

            rig.abort(details.owner(), details.id().as_str()).unwrap();

            prop_assert_eq!(rig.variables().unwrap(), variables);
            prop_assert_eq!(rig.transactions().unwrap(), transactions);
            prop_assert_eq!(rig.events().latest_sequence(), sequence);
        }
    }

    /// One live holder is enough to refuse a conflicting request, however
    /// many expired holders share the variable.
    #[test]
    fn live_holder_blocks_eviction(expired in 0..4usize, live in 1..3usize) {
        let rig = short_lock_rig();
        for i in 0..expired {
            prop_assert!(rig.get_value(&user(i), &tx_name(i), "x").unwrap().successful);
        }
        rig.advance(Duration::from_millis(300));
        for i in expired..expired + live {
            prop_assert!(rig.get_value(&user(i), &tx_name(i), "x").unwrap().successful);
        }

        let writer = expired + live;
        let before = rig.variable("x").unwrap().unwrap();
        prop_assert!(!rig.set_value(&user(writer), &tx_name(writer), "x", "w").unwrap());

        prop_assert_eq!(rig.variable("x").unwrap().unwrap(), before);
        for i in 0..writer {
            let details = rig.transaction(&tx_name(i)).unwrap().unwrap();
            prop_assert_eq!(details.state(), TxState::Started);
        }
        prop_assert_eq!(rig.stats().forced_aborts, 0);
    }
}

#[test]
fn all_expired_holders_are_evicted_together() {
    let rig = short_lock_rig();
    for i in 0..3 {
        assert!(rig.get_value(&user(i), &tx_name(i), "x").unwrap().successful);
    }
    rig.advance(Duration::from_millis(300));

    assert!(rig.set_value(&user(9), &tx_name(9), "x", "w").unwrap());
    for i in 0..3 {
        let details = rig.transaction(&tx_name(i)).unwrap().unwrap();
        assert_eq!(details.state(), TxState::Aborted);
    }
    assert_eq!(rig.stats().forced_aborts, 3);
    assert_eq!(
        rig.variable("x").unwrap().unwrap().write_lock_holder(),
        Some(&tx_name(9).into())
    );
}

#[test]
fn generated_workload_replays_deterministically() {
    let ops = vec![
        Op::Set {
            tx: 0,
            var: 0,
            value: "a".to_string(),
        },
        Op::Get { tx: 1, var: 0 },
        Op::Tick { millis: 300 },
        Op::Get { tx: 2, var: 0 },
        Op::Prepare { tx: 2 },
        Op::Commit { tx: 2 },
    ];

    let rig = short_lock_rig();
    for op in &ops {
        op.apply(&rig).unwrap();
    }

    assert_eq!(rig.transaction("tx0").unwrap().unwrap().state(), TxState::Aborted);
    assert_eq!(rig.transaction("tx1").unwrap().unwrap().state(), TxState::Aborted);
    assert_eq!(rig.transaction("tx2").unwrap().unwrap().state(), TxState::Committed);
    assert_eq!(rig.variable("v0").unwrap().unwrap().value(), None);
}
