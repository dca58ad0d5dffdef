//! Read/write locks on variables.
//!
//! The lock manager never waits. A request is granted at once, granted after
//! evicting holders whose time is up, or refused.
//!
//! | held by others | READ     | WRITE    |
//! |----------------|----------|----------|
//! | nothing        | grant    | grant    |
//! | read locks     | grant    | conflict |
//! | a write lock   | conflict | conflict |
//!
//! On conflict every other holder is examined. Only when all of them can be
//! evicted are they force-aborted and the lock granted; otherwise nobody is
//! touched and the request fails.
//!
//! A prepared holder is never evictable: once expired it still blocks the
//! variable until its owner commits or aborts.

use crate::clock::Timestamp;
use crate::error::CoreResult;
use crate::record::{TxDetails, Variable};
use crate::stats::LockStat;
use crate::types::{LockType, TxId, TxState};
use crate::working_set::WorkingSet;
use tracing::{debug, warn};

/// Outcome of a lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LockOutcome {
    /// The requester now holds the lock.
    pub(crate) successful: bool,
    /// The lock was not held by the requester before this request.
    pub(crate) is_new_lock: bool,
}

impl LockOutcome {
    const ALREADY_HELD: Self = Self {
        successful: true,
        is_new_lock: false,
    };
    const GRANTED: Self = Self {
        successful: true,
        is_new_lock: true,
    };
    const DENIED: Self = Self {
        successful: false,
        is_new_lock: false,
    };
}

/// A lock outcome together with the variable as it stands afterwards.
#[derive(Debug)]
pub(crate) struct Acquired {
    pub(crate) outcome: LockOutcome,
    pub(crate) variable: Variable,
}

/// Aborts a transaction on behalf of another one.
///
/// Implemented by the coordinator; the owner check does not apply. The
/// implementation counts [`LockStat::ForcedAbort`] for holders it actually
/// aborts.
pub(crate) trait Evictor {
    fn force_abort(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<()>;
}

/// Grants and releases variable locks.
///
/// Decisions are counted through the working set, so they only reach the
/// statistics if the operation commits.
#[derive(Debug, Default)]
pub(crate) struct LockManager;

impl LockManager {
    pub(crate) fn new() -> Self {
        Self
    }

    /// Requests a lock on `name` for `tx_id`, creating the variable if needed.
    pub(crate) fn acquire(
        &self,
        ws: &mut WorkingSet<'_>,
        name: &str,
        tx_id: &TxId,
        lock_type: LockType,
        evictor: &dyn Evictor,
    ) -> CoreResult<Acquired> {
        let mut variable = match ws.load::<Variable>(name)? {
            Some(variable) => variable,
            None => {
                let variable = Variable::new(name);
                ws.store(&variable)?;
                variable
            }
        };

        if variable.holds(tx_id, lock_type) {
            debug!(variable = name, tx = %tx_id, ?lock_type, "lock already held");
            return Ok(Acquired {
                outcome: LockOutcome::ALREADY_HELD,
                variable,
            });
        }

        if !variable.can_grant(tx_id, lock_type) {
            ws.count(LockStat::Conflict);
            let holders = variable.holders_other_than(tx_id);
            let now = ws.now();

            for holder in &holders {
                if !holder_is_evictable(ws, holder, now)? {
                    debug!(
                        variable = name,
                        tx = %tx_id,
                        holder = %holder,
                        ?lock_type,
                        "lock refused: live holder"
                    );
                    return Ok(Acquired {
                        outcome: LockOutcome::DENIED,
                        variable,
                    });
                }
            }

            for holder in &holders {
                warn!(
                    variable = name,
                    tx = %tx_id,
                    holder = %holder,
                    "evicting expired lock holder"
                );
                evictor.force_abort(ws, holder)?;
            }

            // Eviction rewrote the variable.
            variable = ws
                .load::<Variable>(name)?
                .unwrap_or_else(|| Variable::new(name));
        }

        variable.grant(tx_id, lock_type);
        ws.store(&variable)?;
        ws.count(LockStat::Granted);
        debug!(variable = name, tx = %tx_id, ?lock_type, "lock granted");

        Ok(Acquired {
            outcome: LockOutcome::GRANTED,
            variable,
        })
    }

    /// Drops every lock held by `tx_id`.
    ///
    /// With `rollback` set, variables it write-locked get their before-image
    /// back. Returns the number of variables touched.
    pub(crate) fn release_all(
        &self,
        ws: &mut WorkingSet<'_>,
        tx_id: &TxId,
        rollback: bool,
    ) -> CoreResult<usize> {
        let mut released = 0;
        for mut variable in ws.load_all::<Variable>()? {
            if variable.release(tx_id, rollback) {
                ws.store(&variable)?;
                released += 1;
            }
        }
        debug!(tx = %tx_id, released, rollback, "locks released");
        Ok(released)
    }
}

/// Names of the variables `tx_id` holds any lock on, in name order.
pub(crate) fn locked_variables(ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<Vec<String>> {
    Ok(ws
        .load_all::<Variable>()?
        .into_iter()
        .filter(|variable| variable.is_locked_by(tx_id))
        .map(|variable| variable.name().to_string())
        .collect())
}

/// A holder may be evicted if it is a started transaction past its timeout.
///
/// Prepared transactions have voted and wait for the coordinator, so they
/// keep their locks. A holder that is finished or unknown holds a stale lock.
fn holder_is_evictable(
    ws: &mut WorkingSet<'_>,
    holder: &TxId,
    now: Timestamp,
) -> CoreResult<bool> {
    Ok(match ws.load::<TxDetails>(holder.as_str())? {
        None => true,
        Some(details) => match details.state() {
            TxState::Started => details.is_expired(now),
            TxState::Prepared => false,
            TxState::Committed | TxState::Aborted => true,
        },
    })
}
