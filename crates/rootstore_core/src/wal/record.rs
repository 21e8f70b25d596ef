//! Commit log record types and serialization.

use crate::error::{CoreError, CoreResult};
use crate::types::{ObjectId, SequenceNumber, SessionId, StoreKey, Symbol, TransactionId};

/// Magic bytes identifying a log record.
pub const WAL_MAGIC: [u8; 4] = *b"RSTL";

/// Current log format version.
pub const WAL_VERSION: u16 = 1;

/// Type of log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// Begin a transaction.
    Begin = 1,
    /// Store a new state for a key.
    Put = 2,
    /// Delete a key.
    Delete = 3,
    /// Commit a transaction.
    Commit = 4,
    /// Abort a transaction.
    Abort = 5,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Begin),
            2 => Some(Self::Put),
            3 => Some(Self::Delete),
            4 => Some(Self::Commit),
            5 => Some(Self::Abort),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One record of the commit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// Begin a transaction.
    Begin {
        /// Transaction ID.
        txid: TransactionId,
        /// Session that wrote the transaction.
        session: SessionId,
    },

    /// Store a new state for a key.
    Put {
        /// Transaction ID.
        txid: TransactionId,
        /// Key written.
        key: StoreKey,
        /// Canonical CBOR payload.
        payload: Vec<u8>,
    },

    /// Delete a key.
    Delete {
        /// Transaction ID.
        txid: TransactionId,
        /// Key deleted.
        key: StoreKey,
    },

    /// Commit a transaction.
    Commit {
        /// Transaction ID.
        txid: TransactionId,
        /// Sequence number assigned to this commit.
        sequence: SequenceNumber,
    },

    /// Abort a transaction.
    Abort {
        /// Transaction ID.
        txid: TransactionId,
    },
}

const KEY_ROOT: u8 = 1;
const KEY_OBJECT: u8 = 2;
const KEY_CLASS: u8 = 3;
const KEY_CONSTANT: u8 = 4;

impl WalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> WalRecordType {
        match self {
            Self::Begin { .. } => WalRecordType::Begin,
            Self::Put { .. } => WalRecordType::Put,
            Self::Delete { .. } => WalRecordType::Delete,
            Self::Commit { .. } => WalRecordType::Commit,
            Self::Abort { .. } => WalRecordType::Abort,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn txid(&self) -> TransactionId {
        match self {
            Self::Begin { txid, .. }
            | Self::Put { txid, .. }
            | Self::Delete { txid, .. }
            | Self::Commit { txid, .. }
            | Self::Abort { txid } => *txid,
        }
    }

    /// Maximum size for a `Put` payload.
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    /// Serializes the record payload (without envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if a payload or key exceeds the 4-byte length field.
    pub fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut buf = Vec::new();

        match self {
            Self::Begin { txid, session } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(session.as_bytes());
            }

            Self::Put { txid, key, payload } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                encode_key(&mut buf, key)?;
                write_len(&mut buf, payload.len())?;
                buf.extend_from_slice(payload);
            }

            Self::Delete { txid, key } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                encode_key(&mut buf, key)?;
            }

            Self::Commit { txid, sequence } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
                buf.extend_from_slice(&sequence.as_u64().to_le_bytes());
            }

            Self::Abort { txid } => {
                buf.extend_from_slice(&txid.as_u64().to_le_bytes());
            }
        }

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> CoreResult<Self> {
        let mut reader = PayloadReader {
            data: payload,
            pos: 0,
        };
        let txid = TransactionId::new(reader.u64()?);

        let record = match record_type {
            WalRecordType::Begin => Self::Begin {
                txid,
                session: SessionId::from_bytes(reader.array()?),
            },
            WalRecordType::Put => {
                let key = reader.key()?;
                let len = reader.u32()? as usize;
                let payload = reader.bytes(len)?.to_vec();
                Self::Put { txid, key, payload }
            }
            WalRecordType::Delete => Self::Delete {
                txid,
                key: reader.key()?,
            },
            WalRecordType::Commit => Self::Commit {
                txid,
                sequence: SequenceNumber::new(reader.u64()?),
            },
            WalRecordType::Abort => Self::Abort { txid },
        };

        if reader.pos != payload.len() {
            return Err(CoreError::wal_corruption(format!(
                "trailing bytes in {record_type:?} record: expected {} bytes, got {}",
                reader.pos,
                payload.len()
            )));
        }
        Ok(record)
    }
}

fn write_len(buf: &mut Vec<u8>, len: usize) -> CoreResult<()> {
    let len = u32::try_from(len).map_err(|_| {
        CoreError::invalid_argument(format!(
            "payload too large: {len} bytes exceeds maximum of {} bytes",
            WalRecord::MAX_PAYLOAD_SIZE
        ))
    })?;
    buf.extend_from_slice(&len.to_le_bytes());
    Ok(())
}

fn encode_key(buf: &mut Vec<u8>, key: &StoreKey) -> CoreResult<()> {
    match key {
        StoreKey::Root(symbol) => {
            buf.push(KEY_ROOT);
            write_len(buf, symbol.as_str().len())?;
            buf.extend_from_slice(symbol.as_str().as_bytes());
        }
        StoreKey::Object(oid) => {
            buf.push(KEY_OBJECT);
            buf.extend_from_slice(&oid.as_u64().to_le_bytes());
        }
        StoreKey::Class(name) | StoreKey::Constant(name) => {
            let tag = if matches!(key, StoreKey::Class(_)) {
                KEY_CLASS
            } else {
                KEY_CONSTANT
            };
            buf.push(tag);
            write_len(buf, name.len())?;
            buf.extend_from_slice(name.as_bytes());
        }
    }
    Ok(())
}

struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn bytes(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| CoreError::wal_corruption("unexpected end of payload"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> CoreResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn text(&mut self) -> CoreResult<String> {
        let len = self.u32()? as usize;
        let bytes = self.bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CoreError::wal_corruption("key is not valid UTF-8"))
    }

    fn key(&mut self) -> CoreResult<StoreKey> {
        let [tag] = self.array::<1>()?;
        match tag {
            KEY_ROOT => Ok(StoreKey::Root(Symbol::new(self.text()?))),
            KEY_OBJECT => Ok(StoreKey::Object(ObjectId::new(self.u64()?))),
            KEY_CLASS => Ok(StoreKey::Class(self.text()?)),
            KEY_CONSTANT => Ok(StoreKey::Constant(self.text()?)),
            other => Err(CoreError::wal_corruption(format!("unknown key kind {other}"))),
        }
    }
}

/// Computes CRC32 checksum for data.
pub fn compute_crc32(data: &[u8]) -> u32 {
    // IEEE polynomial
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}
