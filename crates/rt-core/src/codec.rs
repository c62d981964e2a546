//! Store-safe encoding of opaque retention values.
//!
//! Two layers: the value is serialized to MessagePack (field names kept, so a
//! reordered struct still decodes), then the bytes are wrapped in standard
//! base64 so the blob can live in a string field.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Anything the host daemon can hand over as per-entity retention state.
///
/// MessagePack has a single nil, so `Option<Option<T>>` does not round-trip:
/// `Some(None)` comes back as `None`. Use an enum when that distinction
/// matters.
pub trait RetentionValue: Serialize + DeserializeOwned + Send + 'static {}

impl<T> RetentionValue for T where T: Serialize + DeserializeOwned + Send + 'static {}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("serialize: {0}")]
    Serialize(String),
    #[error("transport encoding: {0}")]
    Transport(String),
    #[error("deserialize: {0}")]
    Deserialize(String),
}

/// Encode a value into a text-safe blob.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let bytes = rmp_serde::to_vec_named(value).map_err(|e| CodecError::Serialize(e.to_string()))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

/// Decode a blob produced by [`encode`].
///
/// Truncated or otherwise corrupt input is reported as an error, never a panic.
pub fn decode<T: DeserializeOwned>(blob: &str) -> Result<T, CodecError> {
    let bytes = BASE64_STANDARD
        .decode(blob.trim())
        .map_err(|e| CodecError::Transport(e.to_string()))?;
    rmp_serde::from_slice(&bytes).map_err(|e| CodecError::Deserialize(e.to_string()))
}
