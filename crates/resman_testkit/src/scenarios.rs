//! End-to-end client scenarios.
//!
//! Each scenario drives a resource manager through a short two-phase-commit
//! story and asserts on the observable outcome. They are written against
//! [`ResourceManager`] so they run over any ledger and clock.

use crate::fixtures::user;
use resman_core::{ResourceManager, RmEvent, TxState, ValueRead, Vote};

fn state(rm: &ResourceManager, tx_id: &str) -> TxState {
    rm.transaction(tx_id)
        .expect("Failed to read transaction")
        .expect("Transaction should exist")
        .state()
}

fn last_event(rm: &ResourceManager) -> RmEvent {
    rm.events()
        .poll(rm.events().latest_sequence().saturating_sub(1), 1)
        .pop()
        .expect("An event should have been published")
        .event
}

/// A reader meets an uncommitted write, loses, and aborts itself. The
/// writer is untouched.
pub fn write_read_conflict(rm: &ResourceManager) {
    assert!(rm.set_value(&user(1), "tx1", "x1", "ghareeb").unwrap());

    let read = rm.get_value(&user(2), "tx2", "x1").unwrap();
    assert_eq!(read, ValueRead::default());
    assert!(!read.successful);
    assert_eq!(read.value, None);

    assert_eq!(state(rm, "tx2"), TxState::Aborted);
    assert_eq!(state(rm, "tx1"), TxState::Started);
}

/// A write is prepared, voted on and committed.
pub fn prepare_and_commit(rm: &ResourceManager) {
    let owner = user(1);
    assert!(rm.set_value(&owner, "tx1", "x1", "ghareeb").unwrap());

    assert_eq!(rm.prepare(&owner, "tx1").unwrap(), Vote::Yes);
    assert_eq!(state(rm, "tx1"), TxState::Prepared);

    let vote = last_event(rm);
    assert_eq!(vote.name(), "Voted");
    let payload: serde_json::Value = serde_json::from_slice(&vote.payload()).unwrap();
    assert_eq!(payload["owner"], "user1");
    assert_eq!(payload["txId"], "tx1");
    assert_eq!(payload["isYes"], "true");

    rm.commit(&owner, "tx1").unwrap();
    assert_eq!(state(rm, "tx1"), TxState::Committed);

    let x1 = rm.variable("x1").unwrap().unwrap();
    assert_eq!(x1.value(), Some("ghareeb"));
    assert!(x1.is_unlocked());
}

/// A user abort restores the previous value and frees the variable.
pub fn user_abort_rolls_back(rm: &ResourceManager) {
    let owner = user(1);
    assert!(rm.set_value(&owner, "tx1", "x1", "ghareeb").unwrap());
    let x1 = rm.variable("x1").unwrap().unwrap();
    assert_eq!(x1.value(), Some("ghareeb"));
    assert_eq!(x1.before_image(), None);

    rm.abort(&owner, "tx1").unwrap();
    assert_eq!(state(rm, "tx1"), TxState::Aborted);

    let x1 = rm.variable("x1").unwrap().unwrap();
    assert_eq!(x1.value(), None);
    assert!(x1.is_unlocked());

    assert!(rm.set_value(&owner, "tx2", "x1", "reem").unwrap());
}

/// A writer that outlives its lock duration is evicted by the next writer.
///
/// `rm` must be configured with a short lock duration and `let_time_pass`
/// must move its clock past it.
pub fn expired_writer_is_evicted(rm: &ResourceManager, let_time_pass: impl FnOnce()) {
    assert!(rm.set_value(&user(1), "tx1", "x1", "ghareeb").unwrap());
    let_time_pass();

    assert!(rm.set_value(&user(2), "tx2", "x1", "reem").unwrap());
    assert_eq!(state(rm, "tx1"), TxState::Aborted);
    assert_eq!(state(rm, "tx2"), TxState::Started);
    assert_eq!(rm.variable("x1").unwrap().unwrap().before_image(), None);
}

/// Preparing a transaction that was evicted votes no instead of failing.
///
/// Same requirements on `rm` and `let_time_pass` as
/// [`expired_writer_is_evicted`].
pub fn prepare_after_eviction_votes_no(rm: &ResourceManager, let_time_pass: impl FnOnce()) {
    let owner = user(1);
    assert!(rm.set_value(&owner, "tx1", "x1", "ghareeb").unwrap());
    let_time_pass();
    assert!(rm.set_value(&user(2), "tx2", "x1", "reem").unwrap());

    assert_eq!(rm.prepare(&owner, "tx1").unwrap(), Vote::No);
    assert_eq!(state(rm, "tx1"), TxState::Aborted);

    let vote = last_event(rm);
    assert_eq!(vote.name(), "Voted");
    let payload: serde_json::Value = serde_json::from_slice(&vote.payload()).unwrap();
    assert_eq!(payload["txId"], "tx1");
    assert_eq!(payload["isYes"], "false");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{init_tracing, TestRig};
    use resman_core::Config;
    use std::sync::Arc;
    use std::time::Duration;

    fn short_locks() -> Config {
        Config::new().max_lock_duration(Duration::from_millis(5))
    }

    #[test]
    fn scenario_write_read_conflict() {
        init_tracing();
        write_read_conflict(&TestRig::memory());
        write_read_conflict(&TestRig::file());
    }

    #[test]
    fn scenario_prepare_and_commit() {
        prepare_and_commit(&TestRig::memory());
        prepare_and_commit(&TestRig::file());
    }

    #[test]
    fn scenario_user_abort() {
        user_abort_rolls_back(&TestRig::memory());
        user_abort_rolls_back(&TestRig::file());
    }

    #[test]
    fn scenario_eviction_on_wall_clock() {
        let rm = ResourceManager::with_config(
            Arc::new(resman_ledger::InMemoryLedger::new()),
            short_locks(),
        );
        expired_writer_is_evicted(&rm, || std::thread::sleep(Duration::from_millis(100)));
    }

    #[test]
    fn scenario_eviction_on_manual_clock() {
        let rig = TestRig::memory_with(short_locks());
        expired_writer_is_evicted(&rig, || rig.advance(Duration::from_millis(100)));
    }

    #[test]
    fn scenario_vote_no_after_eviction() {
        let rig = TestRig::memory_with(short_locks());
        prepare_after_eviction_votes_no(&rig, || rig.advance(Duration::from_millis(6)));

        let rig = TestRig::file_with(short_locks());
        prepare_after_eviction_votes_no(&rig, || rig.advance(Duration::from_millis(6)));
    }

    #[test]
    fn eviction_waits_for_strictly_past_timeout() {
        let rig = TestRig::memory_with(short_locks());
        assert!(rig.set_value(&user(1), "tx1", "x1", "a").unwrap());

        rig.advance(Duration::from_millis(5));
        assert!(!rig.set_value(&user(2), "tx2", "x1", "b").unwrap());
        assert_eq!(state(&rig, "tx1"), TxState::Started);
    }

    #[test]
    fn event_stream_for_a_commit() {
        let rig = TestRig::memory();
        let events = rig.subscribe();
        prepare_and_commit(&rig);

        let names: Vec<_> = events.try_iter().map(|r| r.event.name()).collect();
        assert_eq!(
            names,
            vec!["TransactionStarted", "Voted", "TransactionCommitted"]
        );
    }
}
