//! Append-only mutation journal.
//!
//! Every committed store mutation is appended here before it becomes
//! visible. Opening the journal replays it; a torn tail left by a crash is
//! truncated. Compaction rewrites the journal as one `Put` per live document.

use crate::error::{Result, StoreError};
use crate::types::DocumentId;
use memmap2::Mmap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Magic bytes for journal file.
const JOURNAL_MAGIC: &[u8; 4] = b"JNL\0";

/// Current journal format version.
const JOURNAL_VERSION: u8 = 1;

const HEADER_SIZE: usize = 5;

/// A mutation recorded in the journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum JournalOp {
    /// Insert a document (fields are JSON-encoded).
    Put {
        collection: String,
        id: DocumentId,
        sequence: u64,
        fields: Vec<u8>,
    },
    /// Remove a document.
    Delete { collection: String, id: DocumentId },
    /// Add `by` to an integer field.
    Increment {
        collection: String,
        id: DocumentId,
        field: String,
        by: i64,
    },
}

/// A single journal entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalEntry {
    pub seq: u64,
    pub op: JournalOp,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
}

/// Journal manager.
pub struct Journal {
    path: PathBuf,
    next_seq: Mutex<u64>,
    writer: Mutex<BufWriter<File>>,
    /// File length after the last complete entry.
    committed_len: AtomicU64,
    /// fsync after every append.
    sync_every_write: bool,
}

impl Journal {
    /// Open or create a journal, returning the entries to replay.
    pub fn open(path: impl AsRef<Path>, sync_every_write: bool) -> Result<(Self, Vec<JournalEntry>)> {
        let path = path.as_ref().to_path_buf();

        let entries = if path.exists() {
            Self::replay(&path)?
        } else {
            Self::write_header(&path)?;
            Vec::new()
        };

        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);
        let file = OpenOptions::new().append(true).open(&path)?;
        let committed_len = file.metadata()?.len();

        debug!(path = %path.display(), entries = entries.len(), "journal opened");

        Ok((
            Self {
                path,
                next_seq: Mutex::new(next_seq),
                writer: Mutex::new(BufWriter::new(file)),
                committed_len: AtomicU64::new(committed_len),
                sync_every_write,
            },
            entries,
        ))
    }

    /// Append an operation (returns its sequence number).
    pub fn append(&self, op: JournalOp) -> Result<u64> {
        let mut next_seq = self.next_seq.lock();
        let seq = *next_seq;

        let entry = JournalEntry {
            seq,
            op,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };

        let mut writer = self.writer.lock();
        let committed = self.committed_len.load(Ordering::SeqCst);
        match self.commit(&mut writer, &entry) {
            Ok(written) => {
                self.committed_len.store(committed + written, Ordering::SeqCst);
                *next_seq += 1;
                Ok(seq)
            }
            Err(e) => {
                if let Err(rollback) = self.roll_back(&mut writer, committed) {
                    warn!(path = %self.path.display(), error = %rollback, "journal rollback failed");
                }
                Err(e)
            }
        }
    }

    fn commit(&self, writer: &mut BufWriter<File>, entry: &JournalEntry) -> Result<u64> {
        let written = Self::write_entry(writer, entry)?;
        writer.flush()?;
        if self.sync_every_write {
            writer.get_ref().sync_all()?;
        }
        Ok(written)
    }

    /// Cut a failed append off the file and continue on a fresh handle.
    fn roll_back(&self, writer: &mut BufWriter<File>, committed: u64) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        // The stale writer's buffer is discarded, never flushed.
        let (_, _unwritten) = std::mem::replace(writer, BufWriter::new(file)).into_parts();
        writer.get_ref().set_len(committed)?;
        warn!(path = %self.path.display(), len = committed, "failed journal append rolled back");
        Ok(())
    }

    /// Force sync all pending writes to disk.
    pub fn sync(&self) -> Result<()> {
        let mut writer = self.writer.lock();
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Number of entries written so far.
    pub fn len(&self) -> u64 {
        *self.next_seq.lock() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the journal with `ops`, atomically.
    pub fn rewrite(&self, ops: impl IntoIterator<Item = JournalOp>) -> Result<()> {
        let mut next_seq = self.next_seq.lock();
        let mut writer = self.writer.lock();
        writer.flush()?;

        let tmp_path = self.path.with_extension("log.tmp");
        let mut seq = 0;
        {
            let file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut tmp = BufWriter::new(file);
            tmp.write_all(JOURNAL_MAGIC)?;
            tmp.write_all(&[JOURNAL_VERSION])?;

            let timestamp = chrono::Utc::now().timestamp_millis();
            for op in ops {
                seq += 1;
                Self::write_entry(&mut tmp, &JournalEntry { seq, op, timestamp })?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.committed_len.store(file.metadata()?.len(), Ordering::SeqCst);
        *writer = BufWriter::new(file);
        *next_seq = seq + 1;

        debug!(path = %self.path.display(), entries = seq, "journal rewritten");
        Ok(())
    }

    fn write_header(path: &Path) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(JOURNAL_MAGIC)?;
        file.write_all(&[JOURNAL_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    /// Read every intact entry. A torn or corrupt tail is cut off.
    fn replay(path: &Path) -> Result<Vec<JournalEntry>> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len() as usize;
        if file_len < HEADER_SIZE {
            return Err(StoreError::InvalidFormat("Journal header truncated".into()));
        }

        // SAFETY: the store holds an exclusive lock on its directory, so the
        // file is not modified while mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        if &mmap[0..4] != JOURNAL_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid journal magic".into()));
        }
        if mmap[4] != JOURNAL_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported journal version: {}",
                mmap[4]
            )));
        }

        let mut entries = Vec::new();
        let mut offset = HEADER_SIZE;
        loop {
            match Self::read_entry(&mmap[offset..]) {
                Ok(Some((entry, consumed))) => {
                    entries.push(entry);
                    offset += consumed;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(offset, error = %e, "journal entry unreadable, truncating");
                    break;
                }
            }
        }
        drop(mmap);

        if offset < file_len {
            warn!(
                path = %path.display(),
                valid = offset,
                total = file_len,
                "truncating torn journal tail"
            );
            file.set_len(offset as u64)?;
            file.sync_all()?;
        }

        Ok(entries)
    }

    /// Frame and write one entry, returning the bytes written.
    fn write_entry(writer: &mut impl Write, entry: &JournalEntry) -> Result<u64> {
        let encoded = rmp_serde::to_vec(entry)?;

        writer.write_all(&(encoded.len() as u32).to_le_bytes())?;
        writer.write_all(&encoded)?;

        let checksum = crc32fast::hash(&encoded);
        writer.write_all(&checksum.to_le_bytes())?;

        Ok((4 + encoded.len() + 4) as u64)
    }

    /// Point the writer at a handle that cannot be written.
    #[cfg(test)]
    pub(crate) fn reopen_read_only(&self) -> Result<()> {
        let file = OpenOptions::new().read(true).open(&self.path)?;
        *self.writer.lock() = BufWriter::new(file);
        Ok(())
    }

    /// Decode one entry from the front of `bytes`.
    /// Returns `None` at a clean end of input.
    fn read_entry(bytes: &[u8]) -> Result<Option<(JournalEntry, usize)>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        if bytes.len() < 4 {
            return Err(StoreError::Corruption("truncated entry length".into()));
        }

        let len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let end = 4 + len + 4;
        if bytes.len() < end {
            return Err(StoreError::Corruption("truncated entry".into()));
        }

        let encoded = &bytes[4..4 + len];
        let stored = u32::from_le_bytes([
            bytes[4 + len],
            bytes[5 + len],
            bytes[6 + len],
            bytes[7 + len],
        ]);
        let computed = crc32fast::hash(encoded);
        if stored != computed {
            return Err(StoreError::ChecksumMismatch {
                expected: stored,
                got: computed,
            });
        }

        let entry: JournalEntry = rmp_serde::from_slice(encoded)?;
        Ok(Some((entry, end)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Seek;
    use tempfile::TempDir;

    fn put(id: &str, sequence: u64) -> JournalOp {
        JournalOp::Put {
            collection: "snippets".into(),
            id: DocumentId::new(id),
            sequence,
            fields: br#"{"title":"x"}"#.to_vec(),
        }
    }

    #[test]
    fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");

        {
            let (journal, entries) = Journal::open(&path, true).unwrap();
            assert!(entries.is_empty());
            assert_eq!(journal.append(put("a", 1)).unwrap(), 1);
            assert_eq!(journal.append(put("b", 2)).unwrap(), 2);
            journal
                .append(JournalOp::Delete {
                    collection: "snippets".into(),
                    id: DocumentId::new("a"),
                })
                .unwrap();
        }

        let (journal, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].op, put("b", 2));
        assert_eq!(journal.len(), 3);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");

        {
            let (journal, _) = Journal::open(&path, true).unwrap();
            journal.append(put("a", 1)).unwrap();
            journal.append(put("b", 2)).unwrap();
        }

        // Chop the last few bytes off the second entry
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        let (journal, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(journal.len(), 1);

        // Appending after truncation yields a clean journal
        journal.append(put("c", 3)).unwrap();
        drop(journal);
        let (_, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_checksum_mismatch_stops_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");

        {
            let (journal, _) = Journal::open(&path, true).unwrap();
            journal.append(put("a", 1)).unwrap();
        }

        // Flip a payload byte
        let mut file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        file.seek(std::io::SeekFrom::Start((HEADER_SIZE + 6) as u64)).unwrap();
        file.write_all(&[0xFF]).unwrap();
        drop(file);

        let (_, entries) = Journal::open(&path, true).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn test_rewrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");

        let (journal, _) = Journal::open(&path, false).unwrap();
        for i in 0..5 {
            journal.append(put(&format!("d{i}"), i)).unwrap();
        }
        journal.rewrite(vec![put("d4", 4)]).unwrap();
        assert_eq!(journal.len(), 1);
        journal.append(put("d5", 5)).unwrap();
        drop(journal);

        let (_, entries) = Journal::open(&path, false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[1].seq, 2);
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");

        let (journal, _) = Journal::open(&path, true).unwrap();
        journal.append(put("a", 1)).unwrap();
        let committed = fs::metadata(&path).unwrap().len();

        // Leftover bytes of an interrupted write, then a handle that fails
        journal.reopen_read_only().unwrap();
        OpenOptions::new()
            .append(true)
            .open(&path)
            .unwrap()
            .write_all(&[0x40, 0, 0, 0, 0x93])
            .unwrap();

        assert!(journal.append(put("b", 2)).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(journal.len(), 1);

        // The journal keeps working on a fresh handle
        assert_eq!(journal.append(put("c", 3)).unwrap(), 2);
        drop(journal);

        let (_, entries) = Journal::open(&path, true).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].op, put("c", 3));
    }

    #[test]
    fn test_invalid_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("journal.log");
        fs::write(&path, b"NOPE\x01").unwrap();

        assert!(matches!(
            Journal::open(&path, true),
            Err(StoreError::InvalidFormat(_))
        ));
    }
}
