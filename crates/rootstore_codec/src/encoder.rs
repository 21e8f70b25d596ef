//! Canonical CBOR encoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Encode a value to canonical CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DuplicateKey`] if a map holds the same key twice.
pub fn to_canonical_cbor(value: &Value) -> CodecResult<Vec<u8>> {
    let mut encoder = CanonicalEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

/// A canonical CBOR encoder writing into an owned buffer.
#[derive(Debug, Default)]
pub struct CanonicalEncoder {
    buffer: Vec<u8>,
}

impl CanonicalEncoder {
    /// Create a new encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode a value, appending to the buffer.
    pub fn encode(&mut self, value: &Value) -> CodecResult<()> {
        match value {
            // CBOR simple values: false 0xf4, true 0xf5, null 0xf6
            Value::Null => self.buffer.push(0xf6),
            Value::Bool(b) => self.buffer.push(if *b { 0xf5 } else { 0xf4 }),
            Value::Integer(n) => self.encode_integer(*n),
            Value::Bytes(bytes) => {
                self.encode_head(2, bytes.len() as u64);
                self.buffer.extend_from_slice(bytes);
            }
            Value::Text(text) => {
                self.encode_head(3, text.len() as u64);
                self.buffer.extend_from_slice(text.as_bytes());
            }
            Value::Array(items) => {
                self.encode_head(4, items.len() as u64);
                for item in items {
                    self.encode(item)?;
                }
            }
            Value::Map(pairs) => self.encode_map(pairs)?,
            Value::Tag(tag, inner) => {
                self.encode_head(6, *tag);
                self.encode(inner)?;
            }
        }
        Ok(())
    }

    /// Consume this encoder and return the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    #[allow(clippy::cast_sign_loss)]
    fn encode_integer(&mut self, n: i64) {
        if n >= 0 {
            self.encode_head(0, n as u64);
        } else {
            // -1 encodes as argument 0, -2 as 1, ...
            self.encode_head(1, (-(n + 1)) as u64);
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn encode_head(&mut self, major_type: u8, argument: u64) {
        let mt = major_type << 5;

        if argument < 24 {
            self.buffer.push(mt | argument as u8);
        } else if argument <= u64::from(u8::MAX) {
            self.buffer.push(mt | 24);
            self.buffer.push(argument as u8);
        } else if argument <= u64::from(u16::MAX) {
            self.buffer.push(mt | 25);
            self.buffer
                .extend_from_slice(&(argument as u16).to_be_bytes());
        } else if argument <= u64::from(u32::MAX) {
            self.buffer.push(mt | 26);
            self.buffer
                .extend_from_slice(&(argument as u32).to_be_bytes());
        } else {
            self.buffer.push(mt | 27);
            self.buffer.extend_from_slice(&argument.to_be_bytes());
        }
    }

    fn encode_map(&mut self, pairs: &[(Value, Value)]) -> CodecResult<()> {
        let mut entries = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            entries.push((to_canonical_cbor(key)?, value));
        }

        entries.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(&b.0)));
        if entries.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(CodecError::DuplicateKey);
        }

        self.encode_head(5, entries.len() as u64);
        for (key, value) in entries {
            self.buffer.extend_from_slice(&key);
            self.encode(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: &Value) -> Vec<u8> {
        to_canonical_cbor(value).unwrap()
    }

    #[test]
    fn simple_values() {
        assert_eq!(encode(&Value::Null), vec![0xf6]);
        assert_eq!(encode(&Value::Bool(false)), vec![0xf4]);
        assert_eq!(encode(&Value::Bool(true)), vec![0xf5]);
    }

    #[test]
    fn integers_use_shortest_form() {
        assert_eq!(encode(&Value::Integer(23)), vec![0x17]);
        assert_eq!(encode(&Value::Integer(24)), vec![0x18, 24]);
        assert_eq!(encode(&Value::Integer(256)), vec![0x19, 0x01, 0x00]);
        assert_eq!(
            encode(&Value::Integer(65536)),
            vec![0x1a, 0x00, 0x01, 0x00, 0x00]
        );
        assert_eq!(encode(&Value::Integer(-1)), vec![0x20]);
        assert_eq!(encode(&Value::Integer(-25)), vec![0x38, 24]);
    }

    #[test]
    fn text_and_bytes() {
        assert_eq!(encode(&Value::from("a")), vec![0x61, b'a']);
        assert_eq!(encode(&Value::Bytes(vec![1, 2])), vec![0x42, 1, 2]);
    }

    #[test]
    fn tags_wrap_their_content() {
        // tag 29 (shared reference) around integer 5
        assert_eq!(encode(&Value::tag(29, Value::Integer(5))), vec![0xd8, 29, 0x05]);
        // tag 6 fits in the initial byte
        assert_eq!(encode(&Value::tag(6, Value::Null)), vec![0xc6, 0xf6]);
    }

    #[test]
    fn map_order_is_independent_of_insertion() {
        let forward = Value::Map(vec![
            (Value::from("z"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        let backward = Value::Map(vec![
            (Value::from("a"), Value::Integer(2)),
            (Value::from("z"), Value::Integer(1)),
        ]);

        assert_eq!(encode(&forward), encode(&backward));
        assert_eq!(encode(&forward), vec![0xa2, 0x61, b'a', 0x02, 0x61, b'z', 0x01]);
    }

    #[test]
    fn duplicate_keys_rejected() {
        let map = Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (Value::from("a"), Value::Integer(2)),
        ]);
        assert_eq!(to_canonical_cbor(&map), Err(CodecError::DuplicateKey));
    }

    #[test]
    fn matches_ciborium_for_tagged_values() {
        let value = Value::Array(vec![
            Value::tag(39, Value::from("hat")),
            Value::Integer(-100),
            Value::from("A New Hat"),
        ]);

        let reference = ciborium::Value::Array(vec![
            ciborium::Value::Tag(39, Box::new(ciborium::Value::Text("hat".into()))),
            ciborium::Value::Integer((-100).into()),
            ciborium::Value::Text("A New Hat".into()),
        ]);
        let mut expected = Vec::new();
        ciborium::ser::into_writer(&reference, &mut expected).unwrap();

        assert_eq!(encode(&value), expected);
    }
}
