//! Concurrent load against a shared resource manager.

use crate::fixtures::user;
use resman_core::{ResourceManager, TxId, Vote};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

/// Configuration for a contention run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of client threads.
    pub threads: usize,
    /// Transactions each thread runs.
    pub transactions_per_thread: usize,
    /// Size of the shared variable pool.
    pub variables: usize,
    /// Variables each transaction writes.
    pub writes_per_transaction: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 4,
            transactions_per_thread: 50,
            variables: 8,
            writes_per_transaction: 2,
        }
    }
}

/// Result of a contention run.
#[derive(Debug, Clone)]
pub struct StressResult {
    /// Transactions that committed.
    pub committed: usize,
    /// Transactions that lost a conflict and aborted.
    pub aborted: usize,
    /// Wall time of the run.
    pub duration: Duration,
}

impl StressResult {
    /// Total transactions run.
    pub fn total(&self) -> usize {
        self.committed + self.aborted
    }
}

/// Runs many short transactions from several threads over a small shared
/// pool of variables.
///
/// Thread `t` acts as `user{t}`. Each transaction gets a random id, writes it
/// into the variables it touches, then prepares and commits if every write
/// won its lock.
///
/// # Panics
///
/// Panics if any operation returns an error.
pub fn run_contention(rm: &Arc<ResourceManager>, config: &StressConfig) -> StressResult {
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let rm = Arc::clone(rm);
            let config = config.clone();
            thread::spawn(move || {
                let owner = user(t);
                let (mut committed, mut aborted) = (0, 0);
                for n in 0..config.transactions_per_thread {
                    let tx_id = TxId::random();
                    let tx_id = tx_id.as_str();
                    let mut won = true;
                    for w in 0..config.writes_per_transaction {
                        let var = format!("v{}", (t + n + w) % config.variables);
                        if !rm.set_value(&owner, tx_id, &var, tx_id).unwrap() {
                            won = false;
                            break;
                        }
                    }
                    if won {
                        assert_eq!(rm.prepare(&owner, tx_id).unwrap(), Vote::Yes);
                        rm.commit(&owner, tx_id).unwrap();
                        committed += 1;
                    } else {
                        aborted += 1;
                    }
                }
                (committed, aborted)
            })
        })
        .collect();

    let (mut committed, mut aborted) = (0, 0);
    for handle in handles {
        let (c, a) = handle.join().expect("Stress thread panicked");
        committed += c;
        aborted += a;
    }

    let result = StressResult {
        committed,
        aborted,
        duration: start.elapsed(),
    };
    info!(
        committed = result.committed,
        aborted = result.aborted,
        duration = ?result.duration,
        "contention run finished"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::init_tracing;
    use crate::invariants::check_all;
    use resman_core::TxState;

    #[test]
    fn contention_keeps_invariants() {
        init_tracing();
        let rm = Arc::new(ResourceManager::in_memory());
        let config = StressConfig::default();
        let result = run_contention(&rm, &config);

        assert_eq!(
            result.total(),
            config.threads * config.transactions_per_thread
        );
        assert!(result.committed > 0);
        // Every transaction got its own id.
        assert_eq!(rm.transactions().unwrap().len(), result.total());
        assert_eq!(check_all(&rm).unwrap(), Ok(()));
        assert!(rm.variables().unwrap().iter().all(|v| v.is_unlocked()));

        let stats = rm.stats();
        assert_eq!(stats.transactions_committed as usize, result.committed);
        assert_eq!(stats.self_aborts as usize, result.aborted);
    }

    #[test]
    fn committed_values_come_from_committed_transactions() {
        let rm = Arc::new(ResourceManager::in_memory());
        run_contention(
            &rm,
            &StressConfig {
                threads: 3,
                transactions_per_thread: 20,
                variables: 4,
                writes_per_transaction: 2,
            },
        );

        for var in rm.variables().unwrap() {
            if let Some(writer) = var.value() {
                let details = rm.transaction(writer).unwrap().unwrap();
                assert_eq!(details.state(), TxState::Committed, "{}", var.name());
            }
        }
    }
}
