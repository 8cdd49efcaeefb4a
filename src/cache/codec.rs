//! Entry codec.
//!
//! One codec serializes every key and value passing through a facade; there
//! are no per-entry strategies. Keys are written as raw UTF-8 so they stay
//! readable in store tooling, values as JSON.

use bytes::Bytes;
use thiserror::Error;

use super::keys::CacheKey;

/// Longest encoded key [`JsonCodec`] accepts.
pub const MAX_KEY_BYTES: usize = 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("key length {len} exceeds the {limit}-byte limit")]
    KeyTooLong { len: usize, limit: usize },
    #[error("value encoding failed: {0}")]
    Encode(serde_json::Error),
    #[error("value decoding failed: {0}")]
    Decode(serde_json::Error),
}

/// Serializes keys and values for the backing store.
///
/// Implementations must be deterministic: the same key always encodes to the
/// same bytes, or entries written earlier become unreachable.
pub trait Codec: Send + Sync {
    /// Encodes a store key. An error here means the entry cannot be
    /// addressed at all; callers skip it and log.
    fn encode_key(&self, key: &CacheKey) -> Result<Bytes, CodecError>;

    /// Encodes a value for storage.
    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError>;

    /// Decodes stored bytes back into a value. A stored JSON `null` decodes
    /// to `Value::Null`, which callers treat as "present but empty".
    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError>;
}

/// Default codec: UTF-8 keys (bounded length), JSON values.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_key(&self, key: &CacheKey) -> Result<Bytes, CodecError> {
        let raw = key.as_str();
        if raw.len() > MAX_KEY_BYTES {
            return Err(CodecError::KeyTooLong {
                len: raw.len(),
                limit: MAX_KEY_BYTES,
            });
        }
        Ok(Bytes::copy_from_slice(raw.as_bytes()))
    }

    fn encode(&self, value: &serde_json::Value) -> Result<Bytes, CodecError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(CodecError::Encode)
    }

    fn decode(&self, bytes: &[u8]) -> Result<serde_json::Value, CodecError> {
        serde_json::from_slice(bytes).map_err(CodecError::Decode)
    }
}
