//! Flowerpot archive engine.
//!
//! A flowerpot is a tar archive (usually gzip-compressed) whose entries are
//! JSON-lines files. The entry name decides which *logical table* it belongs
//! to: everything before the first `/` or `.`, so `test_a_1.json` and
//! `test_a_2.json` hold rows of tables whose names start with `test_a`.
//!
//! Records are read one entry at a time; the archive never has to be
//! resident in memory as a whole.

use std::collections::BTreeSet;
use std::io::{BufRead, BufReader, Read};

use flate2::read::GzDecoder;
use tracing::debug;

use crate::error::{ConnectorError, Result};
use crate::record::{decode_ndjson, Record};
use crate::stream::{blocking_stream, forward_until_error, RecordStream};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Streams records out of an open archive.
pub struct ArchiveEngine<R: Read> {
    archive: tar::Archive<R>,
}

impl<R: Read> ArchiveEngine<R> {
    /// Wrap an uncompressed tar stream positioned at its start.
    pub fn new(reader: R) -> Self {
        Self {
            archive: tar::Archive::new(reader),
        }
    }

    /// Every record of every entry, in archive order.
    pub fn items(&mut self) -> Result<ArchiveRecords<'_, R>> {
        self.query(None)
    }

    /// Records of the entries whose name starts with `table`, or of all
    /// entries when `table` is `None`. Matching is a case-sensitive prefix
    /// test; an archive with no matching entry yields nothing.
    ///
    /// A tar stream can only be walked once, so each engine serves one query.
    pub fn query(&mut self, table: Option<&str>) -> Result<ArchiveRecords<'_, R>> {
        Ok(ArchiveRecords {
            entries: self.archive.entries()?,
            table: table.map(str::to_string),
            pending: Vec::new().into_iter(),
            done: false,
        })
    }

    /// Distinct logical table names, in sorted order.
    pub fn tables(&mut self) -> Result<BTreeSet<String>> {
        let mut tables = BTreeSet::new();
        for entry in self.archive.entries()? {
            let entry = entry?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry_name(&entry)?;
            tables.insert(logical_table(&name).to_string());
        }
        Ok(tables)
    }
}

impl ArchiveEngine<Box<dyn Read + Send>> {
    /// Open an archive, detecting gzip compression from the leading bytes.
    pub fn open<R: Read + Send + 'static>(reader: R) -> Result<Self> {
        let mut buffered = BufReader::new(reader);
        let compressed = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);
        let inner: Box<dyn Read + Send> = if compressed {
            Box::new(GzDecoder::new(buffered))
        } else {
            Box::new(buffered)
        };
        Ok(Self::new(inner))
    }
}

/// Lazy record iterator over archive entries. Stops after the first error.
pub struct ArchiveRecords<'a, R: 'a + Read> {
    entries: tar::Entries<'a, R>,
    table: Option<String>,
    pending: std::vec::IntoIter<Record>,
    done: bool,
}

impl<'a, R: 'a + Read> ArchiveRecords<'a, R> {
    fn next_entry(&mut self) -> Option<Result<Vec<Record>>> {
        loop {
            let mut entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = match entry_name(&entry) {
                Ok(name) => name,
                Err(e) => return Some(Err(e)),
            };
            if let Some(table) = &self.table {
                if !name.starts_with(table.as_str()) {
                    continue;
                }
            }

            let mut contents = Vec::new();
            if let Err(e) = entry.read_to_end(&mut contents) {
                return Some(Err(e.into()));
            }
            debug!("Decoding archive entry '{}' ({} bytes)", name, contents.len());
            return Some(decode_ndjson(&contents, &name));
        }
    }
}

impl<'a, R: 'a + Read> Iterator for ArchiveRecords<'a, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.next() {
                return Some(Ok(record));
            }
            if self.done {
                return None;
            }
            match self.next_entry() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Ok(records)) => self.pending = records.into_iter(),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

fn entry_name<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String> {
    let path = entry.path()?;
    let name = path.to_string_lossy();
    Ok(name.strip_prefix("./").unwrap_or(&*name).to_string())
}

/// Logical table of an entry: its name up to the first `/` or `.`.
pub fn logical_table(entry_name: &str) -> &str {
    let name = entry_name.strip_prefix("./").unwrap_or(entry_name);
    match name.find(['/', '.']) {
        Some(end) => &name[..end],
        None => name,
    }
}

/// Stream records from the archive produced by `open`.
///
/// `open` runs on the blocking pool together with decompression and
/// decoding; records arrive in archive order.
pub fn stream_archive<R, F>(open: F, table: Option<String>, buffer: usize) -> RecordStream
where
    R: Read + Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    blocking_stream(buffer, move |tx| {
        let reader = match open() {
            Ok(reader) => reader,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        let mut engine = match ArchiveEngine::open(reader) {
            Ok(engine) => engine,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        match engine.query(table.as_deref()) {
            Ok(records) => forward_until_error(&tx, records),
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
            }
        }
    })
}

/// Read the logical table names of the archive produced by `open`.
pub async fn archive_tables<R, F>(open: F) -> Result<BTreeSet<String>>
where
    R: Read + Send + 'static,
    F: FnOnce() -> Result<R> + Send + 'static,
{
    tokio::task::spawn_blocking(move || ArchiveEngine::open(open()?)?.tables()).await?
}

pub(crate) fn not_found(path: &str) -> ConnectorError {
    ConnectorError::Connection(format!("flowerpot not found: {}", path))
}
