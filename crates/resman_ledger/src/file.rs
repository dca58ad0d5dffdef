//! File-backed ledger for persistent state.

use crate::batch::WriteBatch;
use crate::error::{LedgerError, LedgerResult};
use crate::frame::{self, Decoded};
use crate::ledger::{apply_to_map, scan_map, Ledger};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
struct LogFile {
    file: File,
    size: u64,
}

/// A ledger persisted as an append-only log file.
///
/// Every [`WriteBatch`] is appended as one checksummed frame. The current
/// state is kept in memory and rebuilt by replaying the log on open.
///
/// # Durability
///
/// - With `sync_on_write` (the default) each batch is `fsync`ed before
///   `apply` returns
/// - A frame cut short by a crash is discarded on the next open
/// - A checksum mismatch or a damaged frame length inside the log is
///   reported as corruption and the file is left untouched
///
/// # Thread Safety
///
/// This ledger is thread-safe and can be shared across threads. The log file
/// is exclusively locked, so only one process can open it at a time.
///
/// # Example
///
/// ```no_run
/// use resman_ledger::{FileLedger, Ledger};
/// use std::path::Path;
///
/// let ledger = FileLedger::open(Path::new("world-state.log")).unwrap();
/// ledger.put("k", b"v").unwrap();
/// ```
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    log: Mutex<LogFile>,
    state: RwLock<BTreeMap<String, Vec<u8>>>,
    sync_on_write: bool,
}

impl FileLedger {
    /// Opens or creates a ledger log at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be opened or created
    /// - Another process holds the file (`Locked`)
    /// - The log contains a corrupted frame (`Corrupted`)
    pub fn open(path: &Path) -> LedgerResult<Self> {
        Self::open_with_sync(path, true)
    }

    /// Opens a ledger log, choosing whether each batch is `fsync`ed.
    ///
    /// # Errors
    ///
    /// Same as [`FileLedger::open`].
    pub fn open_with_sync(path: &Path, sync_on_write: bool) -> LedgerResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LedgerError::Locked);
        }

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        let (state, valid_len) = replay(&bytes)?;
        let mut size = bytes.len() as u64;
        if valid_len < size {
            warn!(
                path = %path.display(),
                discarded = size - valid_len,
                "discarding torn frame at end of ledger log"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
            size = valid_len;
        }

        debug!(path = %path.display(), keys = state.len(), size, "opened ledger log");

        Ok(Self {
            path: path.to_path_buf(),
            log: Mutex::new(LogFile { file, size }),
            state: RwLock::new(state),
            sync_on_write,
        })
    }

    /// Opens or creates a ledger log, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the log cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the size of the log in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.log.lock().size
    }
}

fn replay(bytes: &[u8]) -> LedgerResult<(BTreeMap<String, Vec<u8>>, u64)> {
    let mut state = BTreeMap::new();
    let mut offset = 0usize;

    while offset < bytes.len() {
        match frame::decode(&bytes[offset..], offset as u64)? {
            Decoded::Frame { batch, len } => {
                apply_to_map(&mut state, batch);
                offset += len;
            }
            Decoded::Torn => break,
        }
    }

    Ok((state, offset as u64))
}

impl Ledger for FileLedger {
    fn get(&self, key: &str) -> LedgerResult<Option<Vec<u8>>> {
        Ok(self.state.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &str) -> LedgerResult<Vec<(String, Vec<u8>)>> {
        Ok(scan_map(&self.state.read(), prefix))
    }

    fn apply(&self, batch: WriteBatch) -> LedgerResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let encoded = frame::encode(&batch)?;
        let mut log = self.log.lock();
        let start = log.size;

        let written = (|| -> std::io::Result<()> {
            log.file.seek(SeekFrom::Start(start))?;
            log.file.write_all(&encoded)?;
            log.file.flush()?;
            if self.sync_on_write {
                log.file.sync_data()?;
            }
            Ok(())
        })();

        if let Err(e) = written {
            // Drop whatever part of the frame reached the file.
            let _ = log.file.set_len(start);
            return Err(e.into());
        }

        log.size = start + encoded.len() as u64;
        // Still holding the log lock: the index sees batches in log order.
        apply_to_map(&mut self.state.write(), batch);
        Ok(())
    }
}
