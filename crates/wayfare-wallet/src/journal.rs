use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wayfare_types::{IdempotencyKey, Money, UserId, WalletTransaction};

use crate::error::{WalletError, WalletResult};

/// Flush/sync strategy for the journal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every record.
    EveryWrite,
    /// Flush to the OS and let it schedule the write-back.
    #[default]
    OsDefault,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalEvent {
    /// The wallet came into existence with this balance.
    Opened {
        #[serde(with = "rust_decimal::serde::str")]
        starting_balance: Money,
    },
    /// An entry was appended to the wallet's log.
    Entry {
        transaction: WalletTransaction,
        idempotency_key: Option<IdempotencyKey>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalRecord {
    pub seq: u64,
    pub user_id: UserId,
    pub event: JournalEvent,
}

/// What compaction did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactionStats {
    pub records: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

/// `[len u32 LE][crc32 u32 LE]`
const HEADER_SIZE: usize = 8;

struct JournalWriter {
    writer: BufWriter<File>,
    offset: u64,
    next_seq: u64,
}

/// Append-only wallet journal.
///
/// Each record is bincode-encoded and framed with its length and a CRC32
/// of the payload:
///
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: bincode JournalRecord]
/// ```
///
/// Records whose CRC does not match are skipped on recovery. A torn record
/// at the tail is cut off when the journal is opened so later appends stay
/// readable.
pub struct WalletJournal {
    path: PathBuf,
    writer: Mutex<JournalWriter>,
    sync_mode: SyncMode,
}

impl WalletJournal {
    /// Open (or create) the journal at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> WalletResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        OpenOptions::new().create(true).append(true).open(path)?;

        let scan = scan(path)?;
        let file_len = fs::metadata(path)?.len();
        if scan.valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len = scan.valid_len,
                file_len,
                "truncating torn journal tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(scan.valid_len)?;
            file.sync_all()?;
        }

        let file = OpenOptions::new().append(true).open(path)?;
        let next_seq = scan.records.last().map(|r| r.seq + 1).unwrap_or(1);
        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(JournalWriter {
                writer: BufWriter::new(file),
                offset: scan.valid_len,
                next_seq,
            }),
            sync_mode,
        })
    }

    /// Append one record and make it durable per the sync mode. Returns the
    /// sequence number assigned to it.
    pub fn append(&self, user_id: &UserId, event: JournalEvent) -> WalletResult<u64> {
        let mut w = self.lock_writer()?;
        let record = JournalRecord {
            seq: w.next_seq,
            user_id: user_id.clone(),
            event,
        };
        let frame = encode_frame(&record)?;
        if let Err(err) = write_frame(&mut w.writer, &frame, self.sync_mode) {
            warn!(seq = record.seq, error = %err, "journal append failed; rewinding");
            self.rewind(&mut w)?;
            return Err(err.into());
        }
        w.offset += frame.len() as u64;
        w.next_seq += 1;

        debug!(seq = record.seq, user_id = %user_id, len = frame.len(), "journal append");
        Ok(record.seq)
    }

    /// Every intact record, in append order.
    pub fn recover(&self) -> WalletResult<Vec<JournalRecord>> {
        let _w = self.lock_writer()?;
        let scan = scan(&self.path)?;
        debug!(recovered = scan.records.len(), "journal recovery complete");
        Ok(scan.records)
    }

    /// Rewrite the journal with only its intact records, renumbered from 1.
    ///
    /// The new file is written beside the old one, synced, and renamed over
    /// it, so a crash mid-compaction leaves the previous journal in place.
    pub fn compact(&self) -> WalletResult<CompactionStats> {
        let mut w = self.lock_writer()?;
        w.writer.flush()?;
        let bytes_before = w.offset;
        let records = scan(&self.path)?.records;

        let tmp = self.path.with_extension("compacting");
        let mut bytes_after = 0u64;
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for (index, mut record) in records.iter().cloned().enumerate() {
                record.seq = index as u64 + 1;
                let frame = encode_frame(&record)?;
                out.write_all(&frame)?;
                bytes_after += frame.len() as u64;
            }
            out.flush()?;
            out.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        w.writer = BufWriter::new(file);
        w.offset = bytes_after;
        w.next_seq = records.len() as u64 + 1;

        info!(
            records = records.len(),
            bytes_before, bytes_after, "journal compacted"
        );
        Ok(CompactionStats {
            records: records.len(),
            bytes_before,
            bytes_after,
        })
    }

    /// Drop whatever a failed append left behind, buffered or on disk, so
    /// the file ends at the last complete frame again.
    fn rewind(&self, w: &mut JournalWriter) -> WalletResult<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let failed = std::mem::replace(&mut w.writer, BufWriter::new(file));
        // Discards the buffered bytes without writing them.
        let _ = failed.into_parts();
        let file = w.writer.get_ref();
        file.set_len(w.offset)?;
        file.sync_all()?;
        Ok(())
    }

    /// Bytes written so far.
    pub fn offset(&self) -> u64 {
        self.writer.lock().map(|w| w.offset).unwrap_or(0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_writer(&self) -> WalletResult<std::sync::MutexGuard<'_, JournalWriter>> {
        self.writer
            .lock()
            .map_err(|e| WalletError::Internal(format!("journal lock poisoned: {e}")))
    }
}

fn write_frame(
    writer: &mut BufWriter<File>,
    frame: &[u8],
    sync_mode: SyncMode,
) -> std::io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()?;
    if sync_mode == SyncMode::EveryWrite {
        writer.get_ref().sync_data()?;
    }
    Ok(())
}

fn encode_frame(record: &JournalRecord) -> WalletResult<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| WalletError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| WalletError::Journal(format!("record of {} bytes", payload.len())))?;
    let crc = crc32fast::hash(&payload);

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&length.to_le_bytes());
    frame.extend_from_slice(&crc.to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

struct Scan {
    records: Vec<JournalRecord>,
    /// End of the last complete frame.
    valid_len: u64,
}

fn scan(path: &Path) -> WalletResult<Scan> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;

    let mut records = Vec::new();
    let mut offset = 0usize;
    while offset + HEADER_SIZE <= bytes.len() {
        let header = &bytes[offset..offset + HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let end = offset + HEADER_SIZE + length;
        if length == 0 || end > bytes.len() {
            warn!(offset, length, file_len = bytes.len(), "torn journal record; stopping recovery");
            break;
        }

        let payload = &bytes[offset + HEADER_SIZE..end];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            warn!(
                offset,
                expected = expected_crc,
                actual = actual_crc,
                "CRC mismatch; skipping journal record"
            );
        } else {
            match bincode::deserialize::<JournalRecord>(payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!(offset, error = %e, "undecodable journal record; skipping"),
            }
        }
        offset = end;
    }

    Ok(Scan {
        records,
        valid_len: offset as u64,
    })
}
