//! # rootstore codec
//!
//! Canonical CBOR encoding/decoding for everything rootstore writes to disk:
//! persisted values, object records, class entries and the manifest.
//!
//! Canonical means identical values always produce identical bytes:
//!
//! - Map keys are sorted by their encoded form (length-first, then bytewise)
//!   and must be unique
//! - Integers and lengths use the shortest encoding
//! - No floats, no indefinite-length items
//! - Strings are UTF-8
//!
//! Tags (major type 6) are preserved so higher layers can mark symbols and
//! object references.
//!
//! ```
//! use rootstore_codec::{to_canonical_cbor, from_cbor, Value};
//!
//! let value = Value::tag(39, Value::from("hat"));
//! let bytes = to_canonical_cbor(&value).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{to_canonical_cbor, CanonicalEncoder};
pub use error::{CodecError, CodecResult};
pub use value::Value;
