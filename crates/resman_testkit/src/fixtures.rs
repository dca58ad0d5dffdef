//! Test fixtures and resource manager helpers.
//!
//! Provides ready-made resource managers over in-memory and file ledgers,
//! driven by a manual clock.

use resman_core::{ClientIdentity, Config, ManualClock, ResourceManager, Timestamp};
use resman_ledger::{FileLedger, InMemoryLedger, Ledger};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};
use std::time::Duration;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Instant every rig's clock starts at.
pub const RIG_EPOCH: Timestamp = Timestamp::from_millis(1_700_000_000_000);

/// A resource manager with a manual clock and automatic cleanup.
pub struct TestRig {
    /// The resource manager.
    pub rm: ResourceManager,
    /// The clock driving transaction timeouts.
    pub clock: Arc<ManualClock>,
    config: Config,
    ledger_path: Option<PathBuf>,
    /// Keeps the temporary directory alive.
    _temp_dir: Option<TempDir>,
}

impl TestRig {
    /// Creates a rig over an in-memory ledger with default configuration.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates a rig over an in-memory ledger.
    pub fn memory_with(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(RIG_EPOCH));
        Self {
            rm: build(Arc::new(InMemoryLedger::new()), &config, &clock),
            clock,
            config,
            ledger_path: None,
            _temp_dir: None,
        }
    }

    /// Creates a rig over a file ledger in a temporary directory.
    pub fn file() -> Self {
        Self::file_with(Config::default())
    }

    /// Creates a rig over a file ledger in a temporary directory.
    pub fn file_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("ledger").join("world-state.log");
        let ledger = FileLedger::open_with_create_dirs(&path).expect("Failed to open ledger");
        let clock = Arc::new(ManualClock::new(RIG_EPOCH));

        Self {
            rm: build(Arc::new(ledger), &config, &clock),
            clock,
            config,
            ledger_path: Some(path),
            _temp_dir: Some(temp_dir),
        }
    }

    /// Shuts the resource manager down and opens a new one over the same
    /// ledger file. The clock keeps its time.
    ///
    /// # Panics
    ///
    /// Panics if the rig is not file-backed.
    #[must_use]
    pub fn reopen(self) -> Self {
        let Self {
            rm,
            clock,
            config,
            ledger_path,
            _temp_dir,
        } = self;
        let path = ledger_path.expect("Only file rigs can be reopened");

        // Releases the file lock.
        drop(rm);
        let ledger = FileLedger::open(&path).expect("Failed to reopen ledger");

        Self {
            rm: build(Arc::new(ledger), &config, &clock),
            clock,
            config,
            ledger_path: Some(path),
            _temp_dir,
        }
    }

    /// Returns the ledger file path if file-backed.
    pub fn ledger_path(&self) -> Option<&Path> {
        self.ledger_path.as_deref()
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

impl std::ops::Deref for TestRig {
    type Target = ResourceManager;

    fn deref(&self) -> &Self::Target {
        &self.rm
    }
}

fn build(ledger: Arc<dyn Ledger>, config: &Config, clock: &Arc<ManualClock>) -> ResourceManager {
    let clock: Arc<ManualClock> = Arc::clone(clock);
    ResourceManager::with_config(ledger, config.clone()).with_clock(clock)
}

/// Runs a test with an in-memory rig.
///
/// # Example
///
/// ```rust
/// use resman_testkit::{user, with_rig};
///
/// with_rig(|rig| {
///     assert!(rig.set_value(&user(1), "tx1", "x", "v").unwrap());
/// });
/// ```
pub fn with_rig<F, R>(f: F) -> R
where
    F: FnOnce(&TestRig) -> R,
{
    let rig = TestRig::memory();
    f(&rig)
}

/// Runs a test with a file-backed rig.
pub fn with_file_rig<F, R>(f: F) -> R
where
    F: FnOnce(&TestRig) -> R,
{
    let rig = TestRig::file();
    f(&rig)
}

/// Returns the identity `user{n}`.
pub fn user(n: usize) -> ClientIdentity {
    ClientIdentity::new(format!("user{n}"))
}

/// Installs a `tracing` subscriber for test output, once per process.
///
/// The filter comes from `RUST_LOG` and defaults to `warn`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
