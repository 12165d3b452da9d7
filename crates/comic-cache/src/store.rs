//! SQLite-backed metadata store.
//!
//! The store is a small key-value database with one table per partition.
//! Writes go through a single connection behind a mutex and take the SQLite
//! write lock up front, so writers are serialized. Reads use a pool of
//! separate connections; in WAL mode they run concurrently with each other
//! and with the writer, and each sees a consistent snapshot.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info, warn};

use crate::codec::{decode_key, decode_record, encode_key, encode_record};
use crate::{CacheError, ComicRecord};

/// Idle reader connections kept around for reuse.
const MAX_IDLE_READERS: usize = 4;

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A logical partition of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition(&'static str);

impl Partition {
    /// Comic metadata keyed by encoded comic number.
    pub const COMICS: Partition = Partition("comics");
    /// Reserved for future use; created so older readers see the same schema.
    pub const RESERVED: Partition = Partition("reserved");

    pub fn name(&self) -> &'static str {
        self.0
    }
}

/// Count and highest number of the comics present in a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub cached: usize,
    pub latest: i64,
}

impl Stat {
    /// Fold one more present comic into the count.
    pub fn record(&mut self, number: i64) {
        self.cached += 1;
        self.latest = self.latest.max(number);
    }
}

/// A read or write transaction.
pub struct Txn<'c> {
    tx: Transaction<'c>,
    writable: bool,
}

impl Txn<'_> {
    /// Look up a value.
    pub fn get(&self, partition: Partition, key: &[u8]) -> Result<Option<Vec<u8>>, CacheError> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", partition.name());
        let mut stmt = self.tx.prepare_cached(&sql)?;
        let value = stmt.query_row(params![key], |row| row.get(0)).optional()?;
        Ok(value)
    }

    /// Insert or replace a value. Fails in a read transaction.
    pub fn put(&self, partition: Partition, key: &[u8], value: &[u8]) -> Result<(), CacheError> {
        if !self.writable {
            return Err(CacheError::ReadOnly);
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
            partition.name()
        );
        self.tx.prepare_cached(&sql)?.execute(params![key, value])?;
        Ok(())
    }

    /// Visit every entry of a partition in unspecified order.
    pub fn for_each(
        &self,
        partition: Partition,
        mut visit: impl FnMut(&[u8], &[u8]) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        let sql = format!("SELECT key, value FROM {}", partition.name());
        let mut stmt = self.tx.prepare_cached(&sql)?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let key: Vec<u8> = row.get(0)?;
            let value: Vec<u8> = row.get(1)?;
            visit(&key, &value)?;
        }

        Ok(())
    }
}

/// Persistent, transactional comic metadata store.
pub struct MetadataStore {
    path: PathBuf,
    writer: Mutex<Option<Connection>>,
    readers: Mutex<Vec<Connection>>,
    closed: AtomicBool,
}

impl MetadataStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // WAL lets readers proceed while a write is in flight
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS comics (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reserved (
                key BLOB PRIMARY KEY,
                value BLOB NOT NULL
            );
            ",
        )?;

        info!(path = %path.display(), "metadata store opened");

        Ok(Self {
            path,
            writer: Mutex::new(Some(conn)),
            readers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Run `f` inside a read transaction.
    pub fn view<T>(
        &self,
        f: impl FnOnce(&Txn<'_>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut conn = self.checkout_reader()?;
        let result = Self::run_view(&mut conn, f);
        self.checkin_reader(conn);
        result
    }

    fn run_view<T>(
        conn: &mut Connection,
        f: impl FnOnce(&Txn<'_>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
        let txn = Txn {
            tx,
            writable: false,
        };
        let value = f(&txn)?;
        txn.tx.finish()?;
        Ok(value)
    }

    /// Run `f` inside the write transaction.
    ///
    /// Commits if `f` returns `Ok`, rolls back otherwise. Only one update runs
    /// at a time.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&Txn<'_>) -> Result<T, CacheError>,
    ) -> Result<T, CacheError> {
        let mut guard = self.writer.lock();
        let conn = guard.as_mut().ok_or(CacheError::Closed)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let txn = Txn { tx, writable: true };
        let value = f(&txn)?;
        txn.tx.commit()?;
        Ok(value)
    }

    /// Close the store. Calling this more than once is harmless.
    pub fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.readers.lock().clear();

        if let Some(conn) = self.writer.lock().take() {
            conn.close().map_err(|(_, e)| e)?;
        }

        debug!(path = %self.path.display(), "metadata store closed");
        Ok(())
    }

    fn checkout_reader(&self) -> Result<Connection, CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }

        if let Some(conn) = self.readers.lock().pop() {
            return Ok(conn);
        }

        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn checkin_reader(&self, conn: Connection) {
        if self.is_closed() {
            return;
        }
        let mut readers = self.readers.lock();
        if readers.len() < MAX_IDLE_READERS {
            readers.push(conn);
        }
    }

    // =========================================================================
    // Comics
    // =========================================================================

    /// Store a comic, replacing any previous entry for its number.
    pub fn put_comic(&self, comic: &ComicRecord) -> Result<(), CacheError> {
        let key = encode_key(comic.number);
        let value = encode_record(comic)?;
        self.update(|txn| txn.put(Partition::COMICS, &key, &value))
    }

    /// Get a comic by number. `Ok(None)` is a cache miss.
    pub fn get_comic(&self, number: i64) -> Result<Option<ComicRecord>, CacheError> {
        let key = encode_key(number);
        let Some(bytes) = self.view(|txn| txn.get(Partition::COMICS, &key))? else {
            return Ok(None);
        };

        decode_record(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Corrupt { number, source })
    }

    /// Whether metadata for `number` is stored.
    pub fn contains_comic(&self, number: i64) -> Result<bool, CacheError> {
        let key = encode_key(number);
        Ok(self.view(|txn| txn.get(Partition::COMICS, &key))?.is_some())
    }

    /// Visit every stored comic as `(number, encoded record)`.
    ///
    /// Entries whose key cannot be decoded are skipped.
    pub fn for_each_comic(
        &self,
        mut visit: impl FnMut(i64, &[u8]) -> Result<(), CacheError>,
    ) -> Result<(), CacheError> {
        self.view(|txn| {
            txn.for_each(Partition::COMICS, |key, value| match decode_key(key) {
                Ok(number) => visit(number, value),
                Err(e) => {
                    warn!(error = %e, "skipping comic with undecodable key");
                    Ok(())
                }
            })
        })
    }

    /// The highest-numbered stored comic that decodes.
    ///
    /// Keys don't sort numerically, so this scans the whole partition.
    /// Corrupt entries are skipped so one bad record can't hide the rest.
    pub fn newest_comic(&self) -> Result<Option<ComicRecord>, CacheError> {
        let mut newest: Option<(i64, ComicRecord)> = None;

        self.for_each_comic(|number, value| {
            if newest.as_ref().is_some_and(|(max, _)| number <= *max) {
                return Ok(());
            }
            match decode_record(value) {
                Ok(comic) => newest = Some((number, comic)),
                Err(e) => warn!(number, error = %e, "skipping corrupt comic in newest scan"),
            }
            Ok(())
        })?;

        Ok(newest.map(|(_, comic)| comic))
    }

    /// Count stored comics and find the highest number.
    pub fn stat(&self) -> Result<Stat, CacheError> {
        let mut stat = Stat::default();
        self.for_each_comic(|number, _| {
            stat.record(number);
            Ok(())
        })?;
        Ok(stat)
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "failed to close metadata store");
        }
    }
}
