//! Invariant checks over the persisted state of a resource manager.
//!
//! Each check returns a description of the first violation it finds, so
//! that property tests can report it with `prop_assert!`.

use resman_core::{CoreResult, ResourceManager, TxState};
use std::collections::HashMap;

/// Outcome of an invariant check.
pub type Check = Result<(), String>;

/// A write lock never coexists with another lock on the same variable.
pub fn check_mutual_exclusion(rm: &ResourceManager) -> CoreResult<Check> {
    for var in rm.variables()? {
        if let Some(writer) = var.write_lock_holder() {
            if !var.read_lock_holders().is_empty() {
                return Ok(Err(format!(
                    "{} is write-locked by {writer} and read-locked by {:?}",
                    var.name(),
                    var.read_lock_holders()
                )));
            }
        }
    }
    Ok(Ok(()))
}

/// Committed and aborted transactions hold no locks, and only write-locked
/// variables carry a before-image.
pub fn check_terminal_locks_released(rm: &ResourceManager) -> CoreResult<Check> {
    let states: HashMap<_, _> = rm
        .transactions()?
        .into_iter()
        .map(|details| (details.id().clone(), details.state()))
        .collect();

    for var in rm.variables()? {
        let holders = var.write_lock_holder().into_iter().chain(var.read_lock_holders());
        for holder in holders {
            match states.get(holder) {
                Some(TxState::Started | TxState::Prepared) => {}
                Some(state) => {
                    return Ok(Err(format!(
                        "{holder} is {state} but still locks {}",
                        var.name()
                    )));
                }
                None => return Ok(Err(format!("unknown {holder} locks {}", var.name()))),
            }
        }
        if var.write_lock_holder().is_none() && var.before_image().is_some() {
            return Ok(Err(format!("{} keeps a before-image without a writer", var.name())));
        }
    }
    Ok(Ok(()))
}

/// Runs every check.
pub fn check_all(rm: &ResourceManager) -> CoreResult<Check> {
    if let Err(violation) = check_mutual_exclusion(rm)? {
        return Ok(Err(violation));
    }
    check_terminal_locks_released(rm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{user, TestRig};

    #[test]
    fn fresh_manager_is_consistent() {
        let rig = TestRig::memory();
        assert_eq!(check_all(&rig).unwrap(), Ok(()));
    }

    #[test]
    fn checks_pass_through_a_full_lifecycle() {
        let rig = TestRig::memory();
        let u = user(1);
        rig.set_value(&u, "tx1", "x", "1").unwrap();
        rig.get_value(&u, "tx1", "y").unwrap();
        assert_eq!(check_all(&rig).unwrap(), Ok(()));

        rig.prepare(&u, "tx1").unwrap();
        rig.commit(&u, "tx1").unwrap();
        assert_eq!(check_all(&rig).unwrap(), Ok(()));
    }
}
