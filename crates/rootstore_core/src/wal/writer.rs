//! Commit log writer and reader.

use crate::error::{CoreError, CoreResult};
use crate::wal::record::{compute_crc32, WalRecord, WalRecordType, WAL_MAGIC, WAL_VERSION};
use parking_lot::Mutex;
use rootstore_storage::{StorageBackend, StorageError};
use std::sync::Arc;

/// magic (4) + version (2) + type (1) + length (4)
const HEADER_SIZE: usize = 11;

const CRC_SIZE: usize = 4;

/// Attempts to read a log that shrank between `size` and `read_at`.
const READ_ATTEMPTS: usize = 3;

/// Result of scanning the log from some offset.
#[derive(Debug, Default)]
pub struct WalScan {
    /// Complete records with their offsets.
    pub records: Vec<(u64, WalRecord)>,
    /// Offset just past the last complete record.
    pub end: u64,
    /// True if incomplete bytes follow `end`.
    pub torn: bool,
}

/// Appends to and scans the commit log.
pub struct WalManager {
    backend: Arc<Mutex<Box<dyn StorageBackend>>>,
}

impl WalManager {
    /// Creates a log over `backend`.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    /// Frames one record: header, payload and CRC.
    pub fn encode(record: &WalRecord) -> CoreResult<Vec<u8>> {
        let payload = record.encode_payload()?;
        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);

        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(record.record_type().as_byte());
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_operation("log record payload too large"))?;
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        // CRC over everything before it
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Appends one record and returns its offset.
    pub fn append(&self, record: &WalRecord) -> CoreResult<u64> {
        self.append_batch(std::slice::from_ref(record))
    }

    /// Appends records as one contiguous write and returns the first offset.
    pub fn append_batch(&self, records: &[WalRecord]) -> CoreResult<u64> {
        let mut data = Vec::new();
        for record in records {
            data.extend(Self::encode(record)?);
        }
        Ok(self.backend.lock().append(&data)?)
    }

    /// Hands appended data to the operating system.
    pub fn flush(&self) -> CoreResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }

    /// Makes appended data durable.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Returns the current log size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Cuts the log back to `offset`.
    pub fn truncate(&self, offset: u64) -> CoreResult<()> {
        self.backend.lock().truncate(offset)?;
        Ok(())
    }

    /// Reads every complete record from `from` to the end of the log.
    ///
    /// # Errors
    ///
    /// Fails on corruption: bad magic, unknown type, future version or CRC
    /// mismatch. An incomplete final record is not an error.
    pub fn scan(&self, from: u64) -> CoreResult<WalScan> {
        let data = self.read_tail(from)?;
        let mut scan = WalScan {
            records: Vec::new(),
            end: from,
            torn: false,
        };
        let mut pos = 0usize;

        while pos < data.len() {
            let offset = from + pos as u64;
            let rest = &data[pos..];
            if rest.len() < HEADER_SIZE {
                scan.torn = true;
                break;
            }

            if rest[0..4] != WAL_MAGIC {
                return Err(CoreError::wal_corruption(format!(
                    "invalid magic at offset {offset}"
                )));
            }
            let version = u16::from_le_bytes([rest[4], rest[5]]);
            if version > WAL_VERSION {
                return Err(CoreError::wal_corruption(format!(
                    "unsupported version {version} at offset {offset}"
                )));
            }
            let record_type = WalRecordType::from_byte(rest[6]).ok_or_else(|| {
                CoreError::wal_corruption(format!(
                    "unknown record type {} at offset {offset}",
                    rest[6]
                ))
            })?;
            let len = u32::from_le_bytes([rest[7], rest[8], rest[9], rest[10]]) as usize;

            let total = HEADER_SIZE + len + CRC_SIZE;
            if rest.len() < total {
                scan.torn = true;
                break;
            }

            let body_end = HEADER_SIZE + len;
            let expected = u32::from_le_bytes([
                rest[body_end],
                rest[body_end + 1],
                rest[body_end + 2],
                rest[body_end + 3],
            ]);
            let actual = compute_crc32(&rest[..body_end]);
            if expected != actual {
                return Err(CoreError::ChecksumMismatch { expected, actual });
            }

            let record = WalRecord::decode_payload(record_type, &rest[HEADER_SIZE..body_end])?;
            scan.records.push((offset, record));
            pos += total;
            scan.end = from + pos as u64;
        }

        Ok(scan)
    }

    fn read_tail(&self, from: u64) -> CoreResult<Vec<u8>> {
        let backend = self.backend.lock();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let size = backend.size()?;
            if from > size {
                return Err(CoreError::wal_corruption(format!(
                    "log shorter than replay position: {size} < {from}"
                )));
            }
            let len = usize::try_from(size - from)
                .map_err(|_| CoreError::wal_corruption("log too large to scan"))?;
            match backend.read_at(from, len) {
                // A writer cleaned a torn tail between size() and read_at().
                Err(StorageError::ReadPastEnd { .. }) if attempt < READ_ATTEMPTS => {}
                other => return Ok(other?),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ObjectId, SequenceNumber, SessionId, StoreKey, TransactionId};
    use rootstore_storage::InMemoryBackend;

    fn corrupted(backend: &InMemoryBackend, edit: impl FnOnce(&mut Vec<u8>)) -> WalManager {
        let mut bytes = backend.data();
        edit(&mut bytes);
        WalManager::new(Box::new(InMemoryBackend::with_data(bytes)))
    }

    fn wal() -> (WalManager, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        (WalManager::new(Box::new(backend.share())), backend)
    }

    fn transaction(txid: u64) -> Vec<WalRecord> {
        let txid = TransactionId::new(txid);
        vec![
            WalRecord::Begin {
                txid,
                session: SessionId::generate(),
            },
            WalRecord::Put {
                txid,
                key: StoreKey::Object(ObjectId::new(1)),
                payload: vec![1, 2, 3],
            },
            WalRecord::Commit {
                txid,
                sequence: SequenceNumber::new(txid.as_u64()),
            },
        ]
    }

    #[test]
    fn append_and_scan() {
        let (wal, _) = wal();
        let records = transaction(1);
        let offset = wal.append_batch(&records).unwrap();
        assert_eq!(offset, 0);

        let scan = wal.scan(0).unwrap();
        assert!(!scan.torn);
        assert_eq!(scan.end, wal.size().unwrap());
        let read: Vec<_> = scan.records.into_iter().map(|(_, r)| r).collect();
        assert_eq!(read, records);
    }

    #[test]
    fn scan_from_middle() {
        let (wal, _) = wal();
        wal.append_batch(&transaction(1)).unwrap();
        let second = wal.size().unwrap();
        wal.append_batch(&transaction(2)).unwrap();

        let scan = wal.scan(second).unwrap();
        assert_eq!(scan.records.len(), 3);
        assert_eq!(scan.records[0].0, second);
        assert_eq!(scan.records[0].1.txid(), TransactionId::new(2));
    }

    #[test]
    fn torn_tail_ends_scan() {
        let (wal, backend) = wal();
        wal.append_batch(&transaction(1)).unwrap();
        let clean_end = wal.size().unwrap();

        let partial = WalManager::encode(&transaction(2)[0]).unwrap();
        let mut writer = backend.share();
        writer.append(&partial[..partial.len() - 2]).unwrap();

        let scan = wal.scan(0).unwrap();
        assert!(scan.torn);
        assert_eq!(scan.end, clean_end);
        assert_eq!(scan.records.len(), 3);

        wal.truncate(scan.end).unwrap();
        assert!(!wal.scan(0).unwrap().torn);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let (wal, backend) = wal();
        wal.append_batch(&transaction(1)).unwrap();
        let wal = corrupted(&backend, |bytes| bytes[HEADER_SIZE + 2] ^= 0xFF);

        assert!(matches!(
            wal.scan(0),
            Err(CoreError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let (wal, backend) = wal();
        wal.append_batch(&transaction(1)).unwrap();
        let wal = corrupted(&backend, |bytes| bytes[0] = b'X');

        assert!(matches!(wal.scan(0), Err(CoreError::WalCorruption { .. })));
    }
}
