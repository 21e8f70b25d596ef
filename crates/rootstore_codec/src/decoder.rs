//! Canonical CBOR decoder.

use std::cmp::Ordering;

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decode a single value from CBOR bytes.
///
/// The input must hold exactly one item.
///
/// # Errors
///
/// Returns an error if the bytes are not valid canonical CBOR, contain
/// forbidden constructs (floats, indefinite lengths), or have trailing bytes.
pub fn from_cbor(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = CanonicalDecoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A canonical CBOR decoder.
///
/// Validates shortest-form heads and sorted, unique map keys.
pub struct CanonicalDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

/// Maximum element count for arrays and maps.
const MAX_CONTAINER_ELEMENTS: u64 = 16 * 1024 * 1024;

/// Maximum byte/text string length.
const MAX_BYTES_LENGTH: u64 = 256 * 1024 * 1024;

/// Maximum nesting depth of containers and tags.
const MAX_DEPTH: usize = 512;

impl<'a> CanonicalDecoder<'a> {
    /// Create a new decoder for the given bytes.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> CodecResult<Value> {
        self.decode_at(0)
    }

    /// Check if all bytes have been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    pub fn remaining(&self) -> &[u8] {
        &self.data[self.pos..]
    }

    fn decode_at(&mut self, depth: usize) -> CodecResult<Value> {
        if depth > MAX_DEPTH {
            return Err(CodecError::invalid_structure("nesting too deep"));
        }

        let initial_byte = self.read_byte()?;
        let major_type = initial_byte >> 5;
        let additional_info = initial_byte & 0x1f;

        match major_type {
            0 => {
                let n = self.decode_unsigned(additional_info)?;
                i64::try_from(n)
                    .map(Value::Integer)
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            1 => {
                let n = self.decode_unsigned(additional_info)?;
                // -(n + 1)
                i64::try_from(n)
                    .map(|n| Value::Integer(-n - 1))
                    .map_err(|_| CodecError::IntegerOverflow)
            }
            2 => {
                let bytes = self.decode_string_bytes(additional_info)?;
                Ok(Value::Bytes(bytes.to_vec()))
            }
            3 => {
                let bytes = self.decode_string_bytes(additional_info)?;
                let text = std::str::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)?;
                Ok(Value::Text(text.to_string()))
            }
            4 => self.decode_array(additional_info, depth),
            5 => self.decode_map(additional_info, depth),
            6 => {
                let tag = self.decode_unsigned(additional_info)?;
                let inner = self.decode_at(depth + 1)?;
                Ok(Value::Tag(tag, Box::new(inner)))
            }
            _ => self.decode_simple(additional_info),
        }
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        let byte = *self.data.get(self.pos).ok_or(CodecError::UnexpectedEof)?;
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::UnexpectedEof)?;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or(CodecError::UnexpectedEof)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> CodecResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    fn decode_unsigned(&mut self, additional_info: u8) -> CodecResult<u64> {
        let (value, minimum) = match additional_info {
            0..=23 => return Ok(u64::from(additional_info)),
            24 => (u64::from(self.read_byte()?), 24),
            25 => (u64::from(u16::from_be_bytes(self.read_array()?)), 0x100),
            26 => (u64::from(u32::from_be_bytes(self.read_array()?)), 0x1_0000),
            27 => (u64::from_be_bytes(self.read_array()?), 0x1_0000_0000),
            31 => return Err(CodecError::IndefiniteLengthForbidden),
            _ => return Err(CodecError::invalid_structure("reserved additional info")),
        };

        if value < minimum {
            return Err(CodecError::invalid_structure(
                "non-canonical: value could be encoded in fewer bytes",
            ));
        }
        Ok(value)
    }

    fn decode_length(&mut self, additional_info: u8, max_allowed: u64) -> CodecResult<usize> {
        let claimed = self.decode_unsigned(additional_info)?;
        if claimed > max_allowed {
            return Err(CodecError::SizeLimitExceeded {
                claimed,
                max_allowed,
            });
        }
        usize::try_from(claimed).map_err(|_| CodecError::SizeLimitExceeded {
            claimed,
            max_allowed,
        })
    }

    fn decode_string_bytes(&mut self, additional_info: u8) -> CodecResult<&'a [u8]> {
        let len = self.decode_length(additional_info, MAX_BYTES_LENGTH)?;
        self.read_bytes(len)
    }

    fn decode_array(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        // Every element takes at least one byte.
        let mut items = Vec::with_capacity(len.min(self.remaining().len()));
        for _ in 0..len {
            items.push(self.decode_at(depth + 1)?);
        }
        Ok(Value::Array(items))
    }

    fn decode_map(&mut self, additional_info: u8, depth: usize) -> CodecResult<Value> {
        let len = self.decode_length(additional_info, MAX_CONTAINER_ELEMENTS)?;
        let mut pairs = Vec::with_capacity(len.min(self.remaining().len() / 2));
        let data = self.data;
        let mut prev_key: Option<&'a [u8]> = None;

        for _ in 0..len {
            let key_start = self.pos;
            let key = self.decode_at(depth + 1)?;
            let key_bytes = &data[key_start..self.pos];

            if let Some(prev) = prev_key {
                match compare_cbor_bytes(prev, key_bytes) {
                    Ordering::Less => {}
                    Ordering::Equal => return Err(CodecError::DuplicateKey),
                    Ordering::Greater => {
                        return Err(CodecError::invalid_structure(
                            "non-canonical: map keys not in sorted order",
                        ))
                    }
                }
            }
            prev_key = Some(key_bytes);

            let value = self.decode_at(depth + 1)?;
            pairs.push((key, value));
        }

        Ok(Value::Map(pairs))
    }

    fn decode_simple(&mut self, additional_info: u8) -> CodecResult<Value> {
        match additional_info {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            25..=27 => Err(CodecError::FloatForbidden),
            31 => Err(CodecError::invalid_structure("break without indefinite")),
            other => Err(CodecError::invalid_structure(format!(
                "unsupported simple value {other}"
            ))),
        }
    }
}

/// Length-first, then bytewise.
fn compare_cbor_bytes(a: &[u8], b: &[u8]) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::to_canonical_cbor;
    use proptest::prelude::*;

    #[test]
    fn decode_scalars() {
        assert_eq!(from_cbor(&[0xf6]).unwrap(), Value::Null);
        assert_eq!(from_cbor(&[0xf5]).unwrap(), Value::Bool(true));
        assert_eq!(from_cbor(&[0x17]).unwrap(), Value::Integer(23));
        assert_eq!(from_cbor(&[0x19, 0x01, 0x00]).unwrap(), Value::Integer(256));
        assert_eq!(from_cbor(&[0x38, 99]).unwrap(), Value::Integer(-100));
        assert_eq!(from_cbor(&[0x61, b'a']).unwrap(), Value::from("a"));
    }

    #[test]
    fn decode_keeps_tags() {
        let bytes = [0xd8, 39, 0x63, b'h', b'a', b't'];
        assert_eq!(
            from_cbor(&bytes).unwrap(),
            Value::tag(39, Value::from("hat"))
        );
    }

    #[test]
    fn reject_non_shortest_integer() {
        assert!(matches!(
            from_cbor(&[0x18, 0x05]),
            Err(CodecError::InvalidStructure { .. })
        ));
        assert!(matches!(
            from_cbor(&[0x19, 0x00, 0xff]),
            Err(CodecError::InvalidStructure { .. })
        ));
    }

    #[test]
    fn reject_float_and_indefinite() {
        assert_eq!(
            from_cbor(&[0xf9, 0x00, 0x00]),
            Err(CodecError::FloatForbidden)
        );
        assert_eq!(
            from_cbor(&[0x9f, 0x01, 0xff]),
            Err(CodecError::IndefiniteLengthForbidden)
        );
    }

    #[test]
    fn reject_unsorted_and_duplicate_keys() {
        // {"b": 1, "a": 2}
        assert!(matches!(
            from_cbor(&[0xa2, 0x61, b'b', 0x01, 0x61, b'a', 0x02]),
            Err(CodecError::InvalidStructure { .. })
        ));
        // {"a": 1, "a": 2}
        assert_eq!(
            from_cbor(&[0xa2, 0x61, b'a', 0x01, 0x61, b'a', 0x02]),
            Err(CodecError::DuplicateKey)
        );
    }

    #[test]
    fn reject_trailing_bytes() {
        assert_eq!(
            from_cbor(&[0x01, 0x02, 0x03]),
            Err(CodecError::TrailingBytes { count: 2 })
        );
    }

    #[test]
    fn reject_truncated_input() {
        assert_eq!(from_cbor(&[0x63, b'h']), Err(CodecError::UnexpectedEof));
        assert_eq!(from_cbor(&[]), Err(CodecError::UnexpectedEof));
    }

    #[test]
    fn reject_oversized_length() {
        let bytes = [0x9b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            from_cbor(&bytes),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn reject_integer_out_of_range() {
        let bytes = [0x1b, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff];
        assert_eq!(from_cbor(&bytes), Err(CodecError::IntegerOverflow));
    }

    #[test]
    fn decodes_ciborium_output() {
        let reference = ciborium::Value::Tag(
            29,
            Box::new(ciborium::Value::Array(vec![
                ciborium::Value::Text("Employee".into()),
                ciborium::Value::Integer(42.into()),
            ])),
        );
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&reference, &mut bytes).unwrap();

        assert_eq!(
            from_cbor(&bytes).unwrap(),
            Value::tag(
                29,
                Value::Array(vec![Value::from("Employee"), Value::Integer(42)])
            )
        );
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Integer),
            "[a-z]{0,12}".prop_map(Value::Text),
            proptest::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z]{1,6}", inner.clone(), 0..6).prop_map(
                    |m| Value::map(m.into_iter().map(|(k, v)| (Value::Text(k), v)).collect())
                ),
                (0u64..64, inner).prop_map(|(t, v)| Value::tag(t, v)),
            ]
        })
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(value in arb_value()) {
            let bytes = to_canonical_cbor(&value).unwrap();
            prop_assert_eq!(from_cbor(&bytes).unwrap(), value);
        }
    }
}
