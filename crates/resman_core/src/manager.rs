//! The transaction coordinator.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::events::{EventFeed, EventRecord, EventSink, RmEvent};
use crate::lock::{self, Evictor, LockManager};
use crate::record::{TxDetails, Variable};
use crate::stats::{LockStat, ResourceManagerStats, StatsSnapshot};
use crate::types::{ClientIdentity, LockType, TxId, TxState, ValueRead, Vote};
use crate::working_set::WorkingSet;
use parking_lot::Mutex;
use resman_ledger::{InMemoryLedger, Ledger};
use std::collections::VecDeque;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy)]
enum AbortReason {
    Requested,
    LockConflict,
    Evicted,
}

/// A resource manager taking part in two-phase commit.
///
/// Clients read and write named variables inside transactions. Each access
/// takes a read or write lock that is held until the transaction commits or
/// aborts. The first write of a transaction to a variable saves the old
/// value so that an abort can restore it.
///
/// ## Operations
///
/// Every operation is atomic: it either applies all of its writes to the
/// ledger or none of them. Operations are serialized, so they never observe
/// each other half-done. Events raised by an operation are published only
/// after its writes are durable, in the order the operations committed.
///
/// Publishing happens after the operation has let go of the manager, so an
/// [`EventSink`] may call back into it. Events raised by such a nested call
/// are queued behind the event being delivered.
///
/// ## Lock conflicts
///
/// Locks never wait. When `set_value` or `get_value` meets a lock held by a
/// live transaction, the calling transaction aborts itself and the call
/// reports `false`. Holders that outlived their lock duration are evicted
/// instead.
///
/// # Example
///
/// ```rust
/// use resman_core::{ClientIdentity, ResourceManager, TxState};
///
/// let rm = ResourceManager::in_memory();
/// let user = ClientIdentity::new("user1");
///
/// assert!(rm.set_value(&user, "tx1", "x1", "hello").unwrap());
/// assert!(rm.prepare(&user, "tx1").unwrap().is_yes());
/// rm.commit(&user, "tx1").unwrap();
///
/// assert_eq!(rm.variable("x1").unwrap().unwrap().value(), Some("hello"));
/// assert_eq!(rm.transaction("tx1").unwrap().unwrap().state(), TxState::Committed);
/// ```
pub struct ResourceManager {
    config: Config,
    ledger: Arc<dyn Ledger>,
    clock: Arc<dyn Clock>,
    feed: Arc<EventFeed>,
    sinks: Vec<Arc<dyn EventSink>>,
    locks: LockManager,
    stats: ResourceManagerStats,
    /// Operations run one at a time.
    op_lock: Mutex<()>,
    /// Committed events not yet published, in commit order.
    outbox: Mutex<VecDeque<RmEvent>>,
    /// Held by the thread draining the outbox.
    publisher: Mutex<()>,
}

impl ResourceManager {
    /// Creates a resource manager over `ledger` with default configuration.
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self::with_config(ledger, Config::default())
    }

    /// Creates a resource manager over `ledger`.
    pub fn with_config(ledger: Arc<dyn Ledger>, config: Config) -> Self {
        Self {
            feed: Arc::new(EventFeed::with_max_history(config.event_history)),
            config,
            ledger,
            clock: Arc::new(SystemClock),
            sinks: Vec::new(),
            locks: LockManager::new(),
            stats: ResourceManagerStats::new(),
            op_lock: Mutex::new(()),
            outbox: Mutex::new(VecDeque::new()),
            publisher: Mutex::new(()),
        }
    }

    /// Creates a resource manager over a fresh in-memory ledger.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLedger::new()))
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Adds a sink that receives every published event after the built-in
    /// feed.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Returns the built-in event feed.
    #[must_use]
    pub fn events(&self) -> &EventFeed {
        &self.feed
    }

    /// Subscribes to published events.
    pub fn subscribe(&self) -> Receiver<EventRecord> {
        self.feed.subscribe()
    }

    /// Returns a snapshot of the statistics.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // === Client operations ===

    /// Starts a transaction owned by `caller`.
    ///
    /// Starting is optional: `set_value` and `get_value` start unknown
    /// transactions on their own.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if `tx_id` is in use, whatever its state.
    pub fn begin(&self, caller: &ClientIdentity, tx_id: &str) -> CoreResult<()> {
        let tx_id = TxId::new(tx_id);
        self.run(caller, |ws| {
            if ws.load::<TxDetails>(tx_id.as_str())?.is_some() {
                return Err(CoreError::already_exists(&tx_id));
            }
            self.start(ws, &tx_id)?;
            Ok(())
        })
    }

    /// Writes `value` to the variable `name` under a write lock.
    ///
    /// Returns `false` if the lock is held by a live transaction. In that
    /// case `tx_id` has been aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not started or belongs to
    /// someone else.
    pub fn set_value(
        &self,
        caller: &ClientIdentity,
        tx_id: &str,
        name: &str,
        value: impl Into<String>,
    ) -> CoreResult<bool> {
        let tx_id = TxId::new(tx_id);
        let value = value.into();
        self.run(caller, |ws| {
            self.require_started(ws, &tx_id)?;
            self.require_same_owner(ws, &tx_id)?;

            let acquired = self.locks.acquire(ws, name, &tx_id, LockType::Write, self)?;
            if !acquired.outcome.successful {
                self.self_abort(ws, &tx_id, name)?;
                return Ok(false);
            }

            let mut variable = acquired.variable;
            if acquired.outcome.is_new_lock {
                variable.capture_before_image();
            }
            variable.set_value(Some(value));
            ws.store(&variable)?;
            Ok(true)
        })
    }

    /// Reads the variable `name` under a read lock.
    ///
    /// Returns an unsuccessful read if the variable is write-locked by a live
    /// transaction. In that case `tx_id` has been aborted.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction is not started or belongs to
    /// someone else.
    pub fn get_value(
        &self,
        caller: &ClientIdentity,
        tx_id: &str,
        name: &str,
    ) -> CoreResult<ValueRead> {
        let tx_id = TxId::new(tx_id);
        self.run(caller, |ws| {
            self.require_started(ws, &tx_id)?;
            self.require_same_owner(ws, &tx_id)?;

            let acquired = self.locks.acquire(ws, name, &tx_id, LockType::Read, self)?;
            if !acquired.outcome.successful {
                self.self_abort(ws, &tx_id, name)?;
                return Ok(ValueRead::denied());
            }
            Ok(ValueRead::granted(
                acquired.variable.value().map(str::to_string),
            ))
        })
    }

    /// Votes on the transaction.
    ///
    /// A started transaction becomes prepared and votes yes. An aborted one
    /// stays aborted and votes no. Both publish a `Voted` event.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the owner or the transaction is
    /// missing, prepared or committed.
    pub fn prepare(&self, caller: &ClientIdentity, tx_id: &str) -> CoreResult<Vote> {
        let tx_id = TxId::new(tx_id);
        self.run(caller, |ws| {
            let mut details = self.require_same_owner(ws, &tx_id)?;
            require_states(&details, &[TxState::Started, TxState::Aborted])?;

            let vote = if details.state() == TxState::Started {
                details.set_state(TxState::Prepared);
                ws.store(&details)?;
                Vote::Yes
            } else {
                Vote::No
            };

            info!(tx = %tx_id, ?vote, "transaction voted");
            ws.emit(RmEvent::Voted {
                owner: details.owner().clone(),
                tx_id: tx_id.clone(),
                vote,
            });
            Ok(vote)
        })
    }

    /// Commits a prepared transaction and releases its locks.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the owner or the transaction is
    /// not prepared.
    pub fn commit(&self, caller: &ClientIdentity, tx_id: &str) -> CoreResult<()> {
        let tx_id = TxId::new(tx_id);
        self.run(caller, |ws| {
            let mut details = self.require_same_owner(ws, &tx_id)?;
            require_states(&details, &[TxState::Prepared])?;

            details.set_state(TxState::Committed);
            ws.store(&details)?;
            let released = self.locks.release_all(ws, &tx_id, false)?;

            info!(tx = %tx_id, released, "transaction committed");
            ws.emit(RmEvent::TransactionCommitted { tx_id: tx_id.clone() });
            Ok(())
        })
    }

    /// Rolls back the transaction's writes and releases its locks.
    ///
    /// Aborting an aborted transaction does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the caller is not the owner or the transaction is
    /// missing or committed.
    pub fn abort(&self, caller: &ClientIdentity, tx_id: &str) -> CoreResult<()> {
        let tx_id = TxId::new(tx_id);
        self.run(caller, |ws| {
            let details = self.require_same_owner(ws, &tx_id)?;
            require_states(
                &details,
                &[TxState::Prepared, TxState::Aborted, TxState::Started],
            )?;

            if details.state() == TxState::Aborted {
                debug!(tx = %tx_id, "transaction already aborted");
                return Ok(());
            }
            self.roll_back(ws, details, AbortReason::Requested)
        })
    }

    // === Inspection ===

    /// Reads a variable without locking it.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    pub fn variable(&self, name: &str) -> CoreResult<Option<Variable>> {
        self.read(|ws| ws.load(name))
    }

    /// Reads every variable, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    pub fn variables(&self) -> CoreResult<Vec<Variable>> {
        self.read(|ws| ws.load_all())
    }

    /// Reads a transaction's details.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    pub fn transaction(&self, tx_id: &str) -> CoreResult<Option<TxDetails>> {
        self.read(|ws| ws.load(tx_id))
    }

    /// Reads every transaction, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    pub fn transactions(&self) -> CoreResult<Vec<TxDetails>> {
        self.read(|ws| ws.load_all())
    }

    /// Returns the names of the variables `tx_id` holds a lock on.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger read fails.
    pub fn locked_variables(&self, tx_id: &str) -> CoreResult<Vec<String>> {
        let tx_id = TxId::new(tx_id);
        self.read(|ws| lock::locked_variables(ws, &tx_id))
    }

    // === Internals ===

    /// Runs one operation. Its writes and events take effect only if it
    /// returns `Ok`.
    fn run<T>(
        &self,
        caller: &ClientIdentity,
        op: impl FnOnce(&mut WorkingSet<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let value = {
            let _guard = self.op_lock.lock();
            let mut ws =
                WorkingSet::new(self.ledger.as_ref(), caller.clone(), self.clock.now());

            let value = match op(&mut ws) {
                Ok(value) => value,
                Err(e) => {
                    debug!(caller = %caller, error = %e, "operation rejected");
                    return Err(e);
                }
            };

            let committed = ws.commit()?;
            for stat in committed.lock_stats {
                self.stats.record_lock(stat);
            }
            self.outbox.lock().extend(committed.events);
            value
        };

        self.flush_outbox();
        Ok(value)
    }

    /// Publishes queued events until the outbox is empty.
    ///
    /// Only one thread drains at a time. Anyone else, including a sink
    /// calling back into the manager, leaves its events for the drainer.
    fn flush_outbox(&self) {
        while let Some(publisher) = self.publisher.try_lock() {
            while let Some(event) = self.next_outgoing() {
                self.publish(event);
            }
            drop(publisher);
            // Events queued by a thread that found the publisher busy.
            if self.outbox.lock().is_empty() {
                break;
            }
        }
    }

    fn next_outgoing(&self) -> Option<RmEvent> {
        self.outbox.lock().pop_front()
    }

    fn read<T>(&self, op: impl FnOnce(&mut WorkingSet<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut ws = WorkingSet::new(
            self.ledger.as_ref(),
            ClientIdentity::default(),
            self.clock.now(),
        );
        op(&mut ws)
    }

    fn publish(&self, event: RmEvent) {
        self.stats.record_event(&event);
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
        self.feed.emit(event);
    }

    fn start(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<TxDetails> {
        let timeout = ws.now().saturating_add(self.config.max_lock_duration);
        let details = TxDetails::new(tx_id.clone(), ws.caller().clone(), timeout);
        ws.store(&details)?;

        debug!(tx = %tx_id, owner = %ws.caller(), %timeout, "transaction started");
        ws.emit(RmEvent::TransactionStarted {
            tx_id: tx_id.clone(),
        });
        Ok(details)
    }

    /// Loads the transaction, starting it if unknown.
    fn ensure_started(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<TxDetails> {
        match ws.load::<TxDetails>(tx_id.as_str())? {
            Some(details) => Ok(details),
            None => self.start(ws, tx_id),
        }
    }

    fn require_started(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<()> {
        let details = self.ensure_started(ws, tx_id)?;
        require_states(&details, &[TxState::Started])
    }

    fn require_same_owner(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<TxDetails> {
        let details = ws
            .load::<TxDetails>(tx_id.as_str())?
            .ok_or_else(|| CoreError::not_found(tx_id))?;
        if details.owner() != ws.caller() {
            return Err(CoreError::not_owner(tx_id, ws.caller()));
        }
        Ok(details)
    }

    fn self_abort(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId, variable: &str) -> CoreResult<()> {
        warn!(tx = %tx_id, variable, "lock conflict, aborting transaction");
        ws.count(LockStat::SelfAbort);
        let details = ws
            .load::<TxDetails>(tx_id.as_str())?
            .ok_or_else(|| CoreError::not_found(tx_id))?;
        self.roll_back(ws, details, AbortReason::LockConflict)
    }

    /// Restores before-images, releases every lock and marks the transaction
    /// aborted.
    fn roll_back(
        &self,
        ws: &mut WorkingSet<'_>,
        mut details: TxDetails,
        reason: AbortReason,
    ) -> CoreResult<()> {
        let tx_id = details.id().clone();
        details.set_state(TxState::Aborted);
        ws.store(&details)?;
        let released = self.locks.release_all(ws, &tx_id, true)?;

        info!(tx = %tx_id, ?reason, released, "transaction aborted");
        ws.emit(RmEvent::TransactionAborted { tx_id });
        Ok(())
    }
}

impl Evictor for ResourceManager {
    fn force_abort(&self, ws: &mut WorkingSet<'_>, tx_id: &TxId) -> CoreResult<()> {
        match ws.load::<TxDetails>(tx_id.as_str())? {
            Some(details) if !details.state().is_terminal() => {
                ws.count(LockStat::ForcedAbort);
                self.roll_back(ws, details, AbortReason::Evicted)
            }
            details => {
                // A lock left behind by a finished or unknown transaction.
                let committed = details.is_some_and(|d| d.state() == TxState::Committed);
                self.locks.release_all(ws, tx_id, !committed)?;
                Ok(())
            }
        }
    }
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("config", &self.config)
            .field("sinks", &self.sinks.len())
            .finish_non_exhaustive()
    }
}

fn require_states(details: &TxDetails, allowed: &[TxState]) -> CoreResult<()> {
    if allowed.contains(&details.state()) {
        Ok(())
    } else {
        Err(CoreError::invalid_state(details.id(), details.state(), allowed))
    }
}
