//! Store manifest.
//!
//! The manifest records the format version and a random store id. It is
//! written once when the store is created and validated on every open.

use crate::error::{CoreError, CoreResult};
use rootstore_codec::{from_cbor, to_canonical_cbor, Value};
use uuid::Uuid;

/// Magic bytes that start a manifest file.
pub const MANIFEST_MAGIC: [u8; 4] = *b"RSMF";

/// Store metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Format version (major, minor).
    pub format_version: (u16, u16),
    /// Random identifier of the store.
    pub store_id: Uuid,
}

impl Manifest {
    /// Creates a manifest for a new store.
    #[must_use]
    pub fn new(format_version: (u16, u16)) -> Self {
        Self {
            format_version,
            store_id: Uuid::new_v4(),
        }
    }

    /// Fails unless a store with this manifest can be opened by a build that
    /// writes `supported`.
    pub fn check_compatible(&self, supported: (u16, u16)) -> CoreResult<()> {
        if self.format_version.0 != supported.0 {
            return Err(CoreError::invalid_format(format!(
                "store format {}.{} is not supported (expected major version {})",
                self.format_version.0, self.format_version.1, supported.0
            )));
        }
        Ok(())
    }

    /// Encodes the manifest to bytes.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let value = Value::map(vec![
            (
                Value::from("format"),
                Value::Array(vec![
                    Value::Integer(i64::from(self.format_version.0)),
                    Value::Integer(i64::from(self.format_version.1)),
                ]),
            ),
            (
                Value::from("store_id"),
                Value::Bytes(self.store_id.as_bytes().to_vec()),
            ),
        ]);

        let mut buf = MANIFEST_MAGIC.to_vec();
        buf.extend(to_canonical_cbor(&value)?);
        Ok(buf)
    }

    /// Decodes a manifest from bytes.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let body = data
            .strip_prefix(&MANIFEST_MAGIC)
            .ok_or_else(|| CoreError::invalid_format("invalid manifest magic"))?;
        let value = from_cbor(body)?;

        let format = value
            .get("format")
            .and_then(Value::as_array)
            .ok_or_else(|| CoreError::invalid_format("manifest missing format version"))?;
        let [major, minor] = format else {
            return Err(CoreError::invalid_format("malformed format version"));
        };

        let store_id = value
            .get("store_id")
            .and_then(Value::as_bytes)
            .and_then(|bytes| Uuid::from_slice(bytes).ok())
            .ok_or_else(|| CoreError::invalid_format("manifest missing store id"))?;

        Ok(Self {
            format_version: (version_part(major)?, version_part(minor)?),
            store_id,
        })
    }
}

fn version_part(value: &Value) -> CoreResult<u16> {
    value
        .as_integer()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| CoreError::invalid_format("format version out of range"))
}
