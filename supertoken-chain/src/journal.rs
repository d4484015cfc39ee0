use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use supertoken_core::{BlockNumber, ChainError, Timestamp, Transaction};

/// A mined transaction as recorded in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The transaction as submitted
    pub transaction: Transaction,

    /// The block it was mined in
    pub block_number: BlockNumber,

    /// Timestamp of that block
    pub timestamp: Timestamp,

    /// Whether the call succeeded
    pub success: bool,

    /// Wall-clock time the entry was written, in milliseconds
    pub recorded_at: i64,
}

impl JournalEntry {
    pub fn new(
        transaction: Transaction,
        block_number: BlockNumber,
        timestamp: Timestamp,
        success: bool,
    ) -> Self {
        Self {
            transaction,
            block_number,
            timestamp,
            success,
            recorded_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Append-only record of executed transactions
pub trait TransactionJournal {
    /// Append an entry
    ///
    /// # Parameters
    /// * `entry` - The mined transaction to record
    ///
    /// # Returns
    /// Ok(()) once the entry is flushed, Err otherwise
    fn record(&mut self, entry: &JournalEntry) -> Result<(), ChainError>;

    /// Iterate over all entries in the order they were recorded
    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, ChainError>> + '_>;
}

// On-disk framing: the encoded entry followed by its SHA-256 digest
#[derive(Serialize, Deserialize)]
struct Framed {
    entry: Vec<u8>,
    digest: [u8; 32],
}

/// File-backed journal of length-prefixed bincode records
pub struct FileJournal {
    path: PathBuf,
    file: BufWriter<File>,
}

impl FileJournal {
    /// Open a journal, creating the file if it does not exist
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| ChainError::Journal(format!("Failed to open {}: {}", path.display(), e)))?;

        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for FileJournal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileJournal").field("path", &self.path).finish()
    }
}

impl TransactionJournal for FileJournal {
    fn record(&mut self, entry: &JournalEntry) -> Result<(), ChainError> {
        let encoded = bincode::serialize(entry)?;
        let framed = Framed {
            digest: Sha256::digest(&encoded).into(),
            entry: encoded,
        };
        let serialized = bincode::serialize(&framed)?;

        // Write the entry length and data
        let entry_len = serialized.len() as u64;
        self.file.write_all(&entry_len.to_le_bytes())?;
        self.file.write_all(&serialized)?;
        self.file.flush()?;

        Ok(())
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, ChainError>> + '_> {
        let opened = File::open(&self.path).and_then(|file| {
            let remaining = file.metadata()?.len();
            Ok((file, remaining))
        });
        match opened {
            Ok((file, remaining)) => Box::new(JournalIterator {
                reader: BufReader::new(file),
                remaining,
                failed: false,
            }),
            Err(e) => Box::new(std::iter::once(Err(ChainError::from(e)))),
        }
    }
}

const LEN_PREFIX: u64 = 8;

struct JournalIterator {
    reader: BufReader<File>,
    /// Bytes of the file not yet consumed
    remaining: u64,
    /// Iteration stops after the first error
    failed: bool,
}

impl JournalIterator {
    /// Fill `buf` as far as the file allows, returning the bytes read
    fn read_up_to(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn next_entry(&mut self) -> Option<Result<JournalEntry, ChainError>> {
        let mut len_buf = [0u8; LEN_PREFIX as usize];
        match self.read_up_to(&mut len_buf) {
            Ok(0) => return None,
            Ok(n) if n < len_buf.len() => {
                return Some(Err(ChainError::Journal(format!(
                    "Truncated entry length: {} of {} bytes",
                    n, LEN_PREFIX
                ))))
            }
            Ok(_) => {}
            Err(e) => return Some(Err(ChainError::from(e))),
        }
        self.remaining = self.remaining.saturating_sub(LEN_PREFIX);

        let entry_len = u64::from_le_bytes(len_buf);
        if entry_len > self.remaining {
            return Some(Err(ChainError::Journal(format!(
                "Truncated entry: length {} exceeds the {} bytes left",
                entry_len, self.remaining
            ))));
        }
        self.remaining -= entry_len;

        let mut data = vec![0u8; entry_len as usize];
        if let Err(e) = self.reader.read_exact(&mut data) {
            return Some(Err(ChainError::Journal(format!("Truncated entry: {}", e))));
        }

        Some(decode(&data))
    }
}

impl Iterator for JournalIterator {
    type Item = Result<JournalEntry, ChainError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_entry();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

fn decode(data: &[u8]) -> Result<JournalEntry, ChainError> {
    let framed: Framed = bincode::deserialize(data)?;
    let digest: [u8; 32] = Sha256::digest(&framed.entry).into();
    if digest != framed.digest {
        return Err(ChainError::Journal("Entry checksum mismatch".to_string()));
    }
    Ok(bincode::deserialize(&framed.entry)?)
}

/// Journal kept in memory; used by tests and throwaway chains
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Vec<JournalEntry>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransactionJournal for MemoryJournal {
    fn record(&mut self, entry: &JournalEntry) -> Result<(), ChainError> {
        self.entries.push(entry.clone());
        Ok(())
    }

    fn iterate_entries(&self) -> Box<dyn Iterator<Item = Result<JournalEntry, ChainError>> + '_> {
        Box::new(self.entries.iter().cloned().map(Ok))
    }
}
