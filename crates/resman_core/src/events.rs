//! Events published by the resource manager.
//!
//! Events are buffered while an operation runs and handed to the sinks only
//! after its writes reached the ledger. A failed operation publishes nothing.
//!
//! # Usage
//!
//! ```rust
//! use resman_core::{ClientIdentity, ResourceManager};
//!
//! let rm = ResourceManager::in_memory();
//! let events = rm.subscribe();
//!
//! let user = ClientIdentity::new("user1");
//! rm.begin(&user, "tx1").unwrap();
//!
//! let record = events.try_recv().unwrap();
//! assert_eq!(record.event.name(), "TransactionStarted");
//! assert_eq!(record.event.payload(), br#"{"txId":"tx1"}"#.to_vec());
//! ```

use crate::types::{ClientIdentity, TxId, Vote};
use parking_lot::RwLock;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// A lifecycle event of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RmEvent {
    /// A transaction was created, explicitly or by its first read or write.
    TransactionStarted {
        /// The transaction.
        tx_id: TxId,
    },
    /// `prepare` cast a vote.
    Voted {
        /// Owner of the transaction.
        owner: ClientIdentity,
        /// The transaction.
        tx_id: TxId,
        /// The vote.
        vote: Vote,
    },
    /// A prepared transaction committed.
    TransactionCommitted {
        /// The transaction.
        tx_id: TxId,
    },
    /// A transaction was rolled back, by its owner, by itself after a lock
    /// conflict, or by a transaction that evicted it.
    TransactionAborted {
        /// The transaction.
        tx_id: TxId,
    },
}

impl RmEvent {
    /// Returns the event name as seen by clients.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TransactionStarted { .. } => "TransactionStarted",
            Self::Voted { .. } => "Voted",
            Self::TransactionCommitted { .. } => "TransactionCommitted",
            Self::TransactionAborted { .. } => "TransactionAborted",
        }
    }

    /// Returns the transaction the event is about.
    #[must_use]
    pub fn tx_id(&self) -> &TxId {
        match self {
            Self::TransactionStarted { tx_id }
            | Self::Voted { tx_id, .. }
            | Self::TransactionCommitted { tx_id }
            | Self::TransactionAborted { tx_id } => tx_id,
        }
    }

    /// Returns the UTF-8 JSON payload.
    ///
    /// The vote is encoded as the string `"true"` or `"false"`.
    #[must_use]
    pub fn payload(&self) -> Vec<u8> {
        let value = match self {
            Self::Voted { owner, tx_id, vote } => json!({
                "owner": owner,
                "txId": tx_id,
                "isYes": if vote.is_yes() { "true" } else { "false" },
            }),
            _ => json!({ "txId": self.tx_id() }),
        };
        value.to_string().into_bytes()
    }
}

/// Receives events once the operation that raised them is durable.
pub trait EventSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: RmEvent);
}

/// An event with its position in the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    /// Position in the feed, starting at 1.
    pub sequence: u64,
    /// The event.
    pub event: RmEvent,
}

#[derive(Debug, Default)]
struct FeedState {
    next_sequence: u64,
    history: VecDeque<EventRecord>,
}

/// An event sink that distributes events to subscribers.
///
/// The feed:
/// - Numbers events in publication order
/// - Supports multiple subscribers
/// - Keeps a bounded history for catch-up polling
/// - Is thread-safe
#[derive(Debug)]
pub struct EventFeed {
    subscribers: RwLock<Vec<Sender<EventRecord>>>,
    state: RwLock<FeedState>,
    max_history: usize,
}

impl EventFeed {
    /// Creates a feed with the default history limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a feed with a specific history limit.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            state: RwLock::new(FeedState::default()),
            max_history,
        }
    }

    /// Subscribes to the feed.
    ///
    /// Returns a receiver for all future events. Dropping it unsubscribes.
    pub fn subscribe(&self) -> Receiver<EventRecord> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Returns events with sequence > `cursor`, up to `limit`.
    #[must_use]
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<EventRecord> {
        self.state
            .read()
            .history
            .iter()
            .filter(|r| r.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the sequence number of the last published event, or 0.
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.state.read().next_sequence
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of events in history.
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.state.read().history.len()
    }
}

impl Default for EventFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for EventFeed {
    fn emit(&self, event: RmEvent) {
        let record = {
            let mut state = self.state.write();
            state.next_sequence += 1;
            let record = EventRecord {
                sequence: state.next_sequence,
                event,
            };
            state.history.push_back(record.clone());
            while state.history.len() > self.max_history {
                state.history.pop_front();
            }
            record
        };

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(record.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(id: &str) -> RmEvent {
        RmEvent::TransactionStarted {
            tx_id: TxId::new(id),
        }
    }

    #[test]
    fn vote_payload_uses_string_booleans() {
        let event = RmEvent::Voted {
            owner: ClientIdentity::new("user1"),
            tx_id: TxId::new("tx1"),
            vote: Vote::No,
        };
        let payload: serde_json::Value = serde_json::from_slice(&event.payload()).unwrap();
        assert_eq!(
            payload,
            json!({"owner": "user1", "txId": "tx1", "isYes": "false"})
        );
        assert_eq!(event.name(), "Voted");
    }

    #[test]
    fn tx_payload() {
        let event = RmEvent::TransactionAborted {
            tx_id: TxId::new("tx9"),
        };
        assert_eq!(event.payload(), br#"{"txId":"tx9"}"#.to_vec());
        assert_eq!(event.name(), "TransactionAborted");
    }

    #[test]
    fn subscribe_receives_events_in_order() {
        let feed = EventFeed::new();
        let rx = feed.subscribe();

        feed.emit(started("a"));
        feed.emit(started("b"));

        let first = rx.recv().unwrap();
        let second = rx.recv().unwrap();
        assert_eq!(first.sequence, 1);
        assert_eq!(first.event.tx_id().as_str(), "a");
        assert_eq!(second.sequence, 2);
    }

    #[test]
    fn dropped_subscribers_are_removed() {
        let feed = EventFeed::new();
        let rx1 = feed.subscribe();
        let rx2 = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        drop(rx1);
        feed.emit(started("a"));
        assert_eq!(feed.subscriber_count(), 1);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn poll_from_cursor() {
        let feed = EventFeed::new();
        for id in ["a", "b", "c", "d"] {
            feed.emit(started(id));
        }

        let events = feed.poll(1, 2);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 2);
        assert_eq!(events[1].sequence, 3);
        assert_eq!(feed.latest_sequence(), 4);
    }

    #[test]
    fn history_is_bounded() {
        let feed = EventFeed::with_max_history(3);
        for id in ["a", "b", "c", "d", "e"] {
            feed.emit(started(id));
        }

        assert_eq!(feed.history_len(), 3);
        assert_eq!(feed.poll(0, 10)[0].sequence, 3);
        assert_eq!(feed.latest_sequence(), 5);
    }
}
