//! Per-call view of the ledger.

use crate::clock::Timestamp;
use crate::error::CoreResult;
use crate::events::RmEvent;
use crate::record::Record;
use crate::stats::LockStat;
use crate::types::ClientIdentity;
use resman_ledger::{collection_prefix, composite_key, Ledger, WriteBatch};
use std::collections::{BTreeMap, HashMap};

/// What a committed operation leaves to be published.
#[derive(Debug, Default)]
pub(crate) struct Committed {
    pub(crate) events: Vec<RmEvent>,
    pub(crate) lock_stats: Vec<LockStat>,
}

/// Reads, writes and events of one public operation.
///
/// Reads go through a cache that also reflects this call's own writes.
/// Nothing reaches the ledger until [`WorkingSet::commit`], which applies all
/// writes as one batch and hands back the events and lock decisions to
/// publish. Dropping the working set instead discards the whole operation.
pub(crate) struct WorkingSet<'a> {
    ledger: &'a dyn Ledger,
    caller: ClientIdentity,
    now: Timestamp,
    cache: HashMap<String, Option<Vec<u8>>>,
    pending: BTreeMap<String, Vec<u8>>,
    events: Vec<RmEvent>,
    lock_stats: Vec<LockStat>,
}

impl<'a> WorkingSet<'a> {
    pub(crate) fn new(ledger: &'a dyn Ledger, caller: ClientIdentity, now: Timestamp) -> Self {
        Self {
            ledger,
            caller,
            now,
            cache: HashMap::new(),
            pending: BTreeMap::new(),
            events: Vec::new(),
            lock_stats: Vec::new(),
        }
    }

    /// Identity of the caller of this operation.
    pub(crate) fn caller(&self) -> &ClientIdentity {
        &self.caller
    }

    /// Logical time of this operation.
    pub(crate) fn now(&self) -> Timestamp {
        self.now
    }

    fn get(&mut self, key: &str) -> CoreResult<Option<Vec<u8>>> {
        if let Some(value) = self.pending.get(key) {
            return Ok(Some(value.clone()));
        }
        if let Some(cached) = self.cache.get(key) {
            return Ok(cached.clone());
        }
        let value = self.ledger.get(key)?;
        self.cache.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Reads a record by id.
    pub(crate) fn load<T: Record>(&mut self, id: &str) -> CoreResult<Option<T>> {
        let key = composite_key(T::COLLECTION, &[id])?;
        match self.get(&key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Buffers an upsert of a record.
    pub(crate) fn store<T: Record>(&mut self, record: &T) -> CoreResult<()> {
        let key = composite_key(T::COLLECTION, &[record.record_id()])?;
        let bytes = serde_json::to_vec(record)?;
        self.pending.insert(key, bytes);
        Ok(())
    }

    /// Reads every record of a collection, including buffered writes, in key
    /// order.
    pub(crate) fn load_all<T: Record>(&mut self) -> CoreResult<Vec<T>> {
        let prefix = collection_prefix(T::COLLECTION)?;
        let mut merged: BTreeMap<String, Vec<u8>> =
            self.ledger.scan_prefix(&prefix)?.into_iter().collect();
        for (key, value) in self.pending.range(prefix.clone()..) {
            if !key.starts_with(&prefix) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }

        merged
            .values()
            .map(|bytes| serde_json::from_slice(bytes).map_err(Into::into))
            .collect()
    }

    /// Buffers an event for publication after commit.
    pub(crate) fn emit(&mut self, event: RmEvent) {
        self.events.push(event);
    }

    /// Buffers a lock decision for counting after commit.
    pub(crate) fn count(&mut self, stat: LockStat) {
        self.lock_stats.push(stat);
    }

    /// Applies the buffered writes as one batch and returns what is left to
    /// publish.
    pub(crate) fn commit(self) -> CoreResult<Committed> {
        if !self.pending.is_empty() {
            let mut batch = WriteBatch::new();
            for (key, value) in self.pending {
                batch.put(key, value);
            }
            self.ledger.apply(batch)?;
        }
        Ok(Committed {
            events: self.events,
            lock_stats: self.lock_stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Variable;
    use crate::types::TxId;
    use resman_ledger::InMemoryLedger;

    fn working_set(ledger: &InMemoryLedger) -> WorkingSet<'_> {
        WorkingSet::new(ledger, ClientIdentity::new("user1"), Timestamp::from_millis(1))
    }

    #[test]
    fn writes_are_invisible_until_commit() {
        let ledger = InMemoryLedger::new();
        let mut ws = working_set(&ledger);

        ws.store(&Variable::new("x")).unwrap();
        assert!(ws.load::<Variable>("x").unwrap().is_some());
        assert!(ledger.is_empty());

        ws.commit().unwrap();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn dropping_discards_writes_and_events() {
        let ledger = InMemoryLedger::new();
        {
            let mut ws = working_set(&ledger);
            ws.store(&Variable::new("x")).unwrap();
            ws.emit(RmEvent::TransactionStarted {
                tx_id: TxId::new("tx1"),
            });
        }
        assert!(ledger.is_empty());
    }

    #[test]
    fn load_all_merges_pending_writes() {
        let ledger = InMemoryLedger::new();
        {
            let mut ws = working_set(&ledger);
            ws.store(&Variable::new("a")).unwrap();
            ws.store(&Variable::new("c")).unwrap();
            ws.commit().unwrap();
        }

        let mut ws = working_set(&ledger);
        let mut b = Variable::new("a");
        b.set_value(Some("changed".to_string()));
        ws.store(&b).unwrap();
        ws.store(&Variable::new("b")).unwrap();

        let all = ws.load_all::<Variable>().unwrap();
        let names: Vec<_> = all.iter().map(Variable::name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(all[0].value(), Some("changed"));
    }

    #[test]
    fn commit_returns_events_in_order() {
        let ledger = InMemoryLedger::new();
        let mut ws = working_set(&ledger);
        ws.emit(RmEvent::TransactionStarted {
            tx_id: TxId::new("a"),
        });
        ws.emit(RmEvent::TransactionAborted {
            tx_id: TxId::new("a"),
        });

        let committed = ws.commit().unwrap();
        assert_eq!(committed.events[0].name(), "TransactionStarted");
        assert_eq!(committed.events[1].name(), "TransactionAborted");
    }

    #[test]
    fn lock_stats_are_returned_only_on_commit() {
        let ledger = InMemoryLedger::new();
        let mut ws = working_set(&ledger);
        ws.count(LockStat::Conflict);
        ws.count(LockStat::Granted);

        let committed = ws.commit().unwrap();
        assert_eq!(
            committed.lock_stats,
            vec![LockStat::Conflict, LockStat::Granted]
        );
    }

    #[test]
    fn record_keys_are_composite() {
        let ledger = InMemoryLedger::new();
        let mut ws = working_set(&ledger);
        ws.store(&Variable::new("x1")).unwrap();
        ws.commit().unwrap();

        let key = composite_key("variablelist", &["x1"]).unwrap();
        assert!(ledger.get(&key).unwrap().is_some());
    }
}
