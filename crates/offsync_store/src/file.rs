//! File-backed store using an append-only mutation log.

use crate::error::{StoreError, StoreResult};
use crate::query::Query;
use crate::row::Row;
use crate::schema::TableSchema;
use crate::store::Store;
use crate::table::Tables;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Magic bytes opening every log frame.
pub const FRAME_MAGIC: [u8; 4] = *b"OSLG";

/// magic (4) + payload length (4)
const HEADER_SIZE: usize = 8;

/// Truncated SHA-256 of the payload.
const CHECKSUM_SIZE: usize = 4;

/// Options for opening a [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreOptions {
    /// Whether to `fsync` the log after every mutation (safer but slower).
    pub sync_on_write: bool,
    /// Whether to create missing parent directories.
    pub create_dirs: bool,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            sync_on_write: true,
            create_dirs: true,
        }
    }
}

impl FileStoreOptions {
    /// Creates options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to sync after every mutation.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }

    /// Sets whether to create missing parent directories.
    #[must_use]
    pub const fn create_dirs(mut self, value: bool) -> Self {
        self.create_dirs = value;
        self
    }
}

/// One logged mutation.
#[derive(Debug, Serialize, Deserialize)]
enum LogRecord {
    Define(TableSchema),
    Upsert { table: String, row: Row },
    Delete { table: String, ids: Vec<String> },
}

struct Inner {
    file: File,
    size: u64,
    tables: Tables,
}

/// A store persisted as an append-only log of mutations.
///
/// Every mutation is framed as
/// `magic | u32 LE length | CBOR record | 4-byte SHA-256 prefix` and written
/// before the in-memory table image changes. Opening the file replays the
/// log.
///
/// # Recovery
///
/// - A truncated trailing frame (crash mid-write) is cut off
/// - Bad magic or a checksum mismatch is reported as corruption
///
/// # Example
///
/// ```no_run
/// use offsync_store::{FileStore, Query, Row, Store, TableSchema};
/// use std::path::Path;
///
/// let store = FileStore::open(Path::new("queue.log")).unwrap();
/// store.define_table(TableSchema::new("notes")).unwrap();
/// store.upsert("notes", Row::new().with("id", "n1")).unwrap();
/// store.compact().unwrap();
/// ```
pub struct FileStore {
    path: PathBuf,
    options: FileStoreOptions,
    inner: RwLock<Inner>,
}

impl FileStore {
    /// Opens or creates a store at the given path with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the log is corrupted.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, FileStoreOptions::default())
    }

    /// Opens or creates a store with explicit options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the log is corrupted.
    pub fn open_with(path: &Path, options: FileStoreOptions) -> StoreResult<Self> {
        if options.create_dirs {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let replay = replay(&bytes)?;
        if replay.valid_len < bytes.len() {
            warn!(
                path = %path.display(),
                dropped = bytes.len() - replay.valid_len,
                "truncating torn tail of store log"
            );
            file.set_len(replay.valid_len as u64)?;
            file.sync_all()?;
        }
        info!(path = %path.display(), records = replay.records, "replayed store log");

        Ok(Self {
            path: path.to_path_buf(),
            options,
            inner: RwLock::new(Inner {
                file,
                size: replay.valid_len as u64,
                tables: replay.tables,
            }),
        })
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current log size in bytes.
    #[must_use]
    pub fn log_size(&self) -> u64 {
        self.inner.read().size
    }

    /// Rewrites the log as a snapshot of the current tables.
    ///
    /// The snapshot is written to a sibling file, synced, and renamed over
    /// the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written or renamed.
    pub fn compact(&self) -> StoreResult<()> {
        let mut inner = self.inner.write();

        let mut data = Vec::new();
        for (schema, rows) in inner.tables.contents() {
            data.extend(encode_frame(&LogRecord::Define(schema.clone()))?);
            for row in rows {
                data.extend(encode_frame(&LogRecord::Upsert {
                    table: schema.name().to_string(),
                    row: row.clone(),
                })?);
            }
        }

        let tmp = self.path.with_extension("compact");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(&data)?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let before = inner.size;
        inner.file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        inner.size = data.len() as u64;
        info!(before, after = inner.size, "compacted store log");
        Ok(())
    }

    fn append(&self, inner: &mut Inner, record: &LogRecord) -> StoreResult<()> {
        let frame = encode_frame(record)?;

        let written = inner
            .file
            .seek(SeekFrom::Start(inner.size))
            .and_then(|_| inner.file.write_all(&frame))
            .and_then(|()| {
                if self.options.sync_on_write {
                    inner.file.sync_data()
                } else {
                    Ok(())
                }
            });

        if let Err(e) = written {
            // Drop any partial frame so the next append starts clean.
            if let Err(trim) = inner.file.set_len(inner.size) {
                warn!(error = %trim, "failed to trim partial frame");
            }
            return Err(e.into());
        }

        inner.size += frame.len() as u64;
        Ok(())
    }
}

impl Store for FileStore {
    fn define_table(&self, schema: TableSchema) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if inner.tables.schema(schema.name()) == Some(&schema) {
            return Ok(());
        }
        self.append(&mut inner, &LogRecord::Define(schema.clone()))?;
        inner.tables.define(schema);
        Ok(())
    }

    fn upsert(&self, table: &str, row: Row) -> StoreResult<()> {
        let mut inner = self.inner.write();
        inner.tables.check_upsert(table, &row)?;
        self.append(
            &mut inner,
            &LogRecord::Upsert {
                table: table.to_string(),
                row: row.clone(),
            },
        )?;
        inner.tables.upsert(table, row)
    }

    fn delete(&self, table: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if !inner.tables.contains(table, id)? {
            return Ok(());
        }
        self.append(
            &mut inner,
            &LogRecord::Delete {
                table: table.to_string(),
                ids: vec![id.to_string()],
            },
        )?;
        inner.tables.delete(table, id).map(|_| ())
    }

    fn delete_matching(&self, table: &str, query: &Query) -> StoreResult<usize> {
        let mut inner = self.inner.write();
        inner.tables.check_table(table)?;
        let ids = inner.tables.matching_ids(table, query)?;
        if ids.is_empty() {
            return Ok(0);
        }
        self.append(
            &mut inner,
            &LogRecord::Delete {
                table: table.to_string(),
                ids: ids.clone(),
            },
        )?;
        for id in &ids {
            inner.tables.delete(table, id)?;
        }
        Ok(ids.len())
    }

    fn read(&self, table: &str, query: &Query) -> StoreResult<Vec<Row>> {
        self.inner.read().tables.read(table, query)
    }
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&digest[..CHECKSUM_SIZE]);
    out
}

fn encode_frame(record: &LogRecord) -> StoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(record, &mut payload).map_err(|e| StoreError::codec(e.to_string()))?;

    let len = u32::try_from(payload.len())
        .map_err(|_| StoreError::codec("log record payload too large"))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CHECKSUM_SIZE);
    frame.extend_from_slice(&FRAME_MAGIC);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&checksum(&payload));
    Ok(frame)
}

struct Replay {
    tables: Tables,
    valid_len: usize,
    records: usize,
}

fn replay(bytes: &[u8]) -> StoreResult<Replay> {
    let mut tables = Tables::default();
    let mut pos = 0usize;
    let mut records = 0usize;

    while pos < bytes.len() {
        let rest = &bytes[pos..];
        if rest.len() < HEADER_SIZE {
            break;
        }
        if rest[..4] != FRAME_MAGIC {
            return Err(StoreError::corrupted(format!(
                "bad frame magic at offset {pos}"
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&rest[4..HEADER_SIZE]);
        let len = u32::from_le_bytes(len_bytes) as usize;

        let end = HEADER_SIZE + len + CHECKSUM_SIZE;
        if rest.len() < end {
            break;
        }

        let payload = &rest[HEADER_SIZE..HEADER_SIZE + len];
        if rest[HEADER_SIZE + len..end] != checksum(payload) {
            return Err(StoreError::corrupted(format!(
                "checksum mismatch at offset {pos}"
            )));
        }

        let record: LogRecord = ciborium::from_reader(payload)
            .map_err(|e| StoreError::corrupted(format!("undecodable record at offset {pos}: {e}")))?;
        apply(&mut tables, record)
            .map_err(|e| StoreError::corrupted(format!("unreplayable record at offset {pos}: {e}")))?;

        records += 1;
        pos += end;
    }

    Ok(Replay {
        tables,
        valid_len: pos,
        records,
    })
}

fn apply(tables: &mut Tables, record: LogRecord) -> StoreResult<()> {
    match record {
        LogRecord::Define(schema) => {
            tables.define(schema);
        }
        LogRecord::Upsert { table, row } => tables.upsert(&table, row)?,
        LogRecord::Delete { table, ids } => {
            for id in &ids {
                tables.delete(&table, id)?;
            }
        }
    }
    Ok(())
}
