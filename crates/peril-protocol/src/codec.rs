//! Codecs for turning typed payloads into tagged byte sequences and back.
//!
//! A "codec" (coder/decoder) converts between Rust types and raw bytes.
//! Peril speaks two of them:
//!
//! - [`JsonCodec`]: self-describing structured text. Field order does not
//!   matter and unknown fields are ignored, which makes it forgiving for the
//!   high-frequency game events (pause, moves, wars).
//! - [`BincodeCodec`]: positional binary. Smaller, but both sides must
//!   agree on the exact field layout. Used for the append-only game log.
//!
//! Every encoded message carries a content-type marker. [`Encoding`] maps
//! markers to codecs, and [`decode`] refuses to even try when the marker is
//! missing or unknown.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// The methods are generic over the payload type, so one codec value serves
/// every message type: `encode<T: Serialize>` and
/// `decode<T: DeserializeOwned>`. `DeserializeOwned` means the decoded value
/// owns its data and the delivery buffer can be dropped right after.
pub trait Codec: Send + Sync + 'static {
    /// The content-type marker attached to messages this codec produced.
    const CONTENT_TYPE: &'static str;

    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use peril_protocol::{Codec, JsonCodec};
///
/// let bytes = JsonCodec.encode(&vec![1, 2, 3]).unwrap();
/// let back: Vec<i32> = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    const CONTENT_TYPE: &'static str = "application/json";

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(|e| ProtocolError::Encode {
            content_type: Self::CONTENT_TYPE,
            source: Box::new(e),
        })
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(|e| ProtocolError::Decode {
            content_type: Self::CONTENT_TYPE,
            source: Box::new(e),
        })
    }
}

// ---------------------------------------------------------------------------
// BincodeCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses bincode's positional binary layout.
///
/// Fields are written in declaration order with no names, so the reader
/// must use the identical struct definition.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    const CONTENT_TYPE: &'static str = "application/x-bincode";

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        bincode::serialize(value).map_err(|e| ProtocolError::Encode {
            content_type: Self::CONTENT_TYPE,
            source: e,
        })
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        bincode::deserialize(data).map_err(|e| ProtocolError::Decode {
            content_type: Self::CONTENT_TYPE,
            source: e,
        })
    }
}

// ---------------------------------------------------------------------------
// Encoding: marker-driven dispatch
// ---------------------------------------------------------------------------

/// The encodings a Peril process understands, keyed by content-type marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Structured text, see [`JsonCodec`].
    Json,
    /// Positional binary, see [`BincodeCodec`].
    Bincode,
}

impl Encoding {
    /// The content-type marker for this encoding.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Json => JsonCodec::CONTENT_TYPE,
            Self::Bincode => BincodeCodec::CONTENT_TYPE,
        }
    }

    /// Looks up the encoding for a marker. Unknown markers yield `None`.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            JsonCodec::CONTENT_TYPE => Some(Self::Json),
            BincodeCodec::CONTENT_TYPE => Some(Self::Bincode),
            _ => None,
        }
    }

    /// Encodes `value` and tags the bytes with this encoding's marker.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<EncodedMessage, ProtocolError> {
        let body = match self {
            Self::Json => JsonCodec.encode(value)?,
            Self::Bincode => BincodeCodec.encode(value)?,
        };
        Ok(EncodedMessage {
            body,
            content_type: self.content_type(),
        })
    }

    fn decode<T: DeserializeOwned>(self, body: &[u8]) -> Result<T, ProtocolError> {
        match self {
            Self::Json => JsonCodec.decode(body),
            Self::Bincode => BincodeCodec.decode(body),
        }
    }
}

/// Bytes produced by [`Encoding::encode`], paired with their marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub body: Vec<u8>,
    pub content_type: &'static str,
}

/// Decodes `body` using the codec named by `content_type`.
///
/// # Errors
/// - [`ProtocolError::UnsupportedContentType`] when the marker is absent or
///   unknown; the body is never looked at.
/// - [`ProtocolError::Decode`] when the codec rejects the bytes.
pub fn decode<T: DeserializeOwned>(
    body: &[u8],
    content_type: Option<&str>,
) -> Result<T, ProtocolError> {
    let encoding = content_type
        .and_then(Encoding::from_content_type)
        .ok_or_else(|| {
            ProtocolError::UnsupportedContentType(content_type.map(str::to_owned))
        })?;
    encoding.decode(body)
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            name: "washington".into(),
            count: 3,
            tags: vec!["infantry".into(), "cavalry".into()],
        }
    }

    #[test]
    fn test_both_encodings_round_trip() {
        for encoding in [Encoding::Json, Encoding::Bincode] {
            let encoded = encoding.encode(&sample()).unwrap();
            assert_eq!(encoded.content_type, encoding.content_type());
            let back: Sample =
                decode(&encoded.body, Some(encoded.content_type)).unwrap();
            assert_eq!(back, sample());
        }
    }

    #[test]
    fn test_json_tolerates_field_reordering_and_extra_fields() {
        let body = br#"{"tags":[],"extra":true,"count":9,"name":"x"}"#;
        let back: Sample = decode(body, Some("application/json")).unwrap();
        assert_eq!(back.count, 9);
        assert_eq!(back.name, "x");
    }

    #[test]
    fn test_bincode_is_more_compact_than_json() {
        let json = Encoding::Json.encode(&sample()).unwrap();
        let bin = Encoding::Bincode.encode(&sample()).unwrap();
        assert!(bin.body.len() < json.body.len());
    }

    #[test]
    fn test_bincode_rejects_truncated_payload() {
        let bin = Encoding::Bincode.encode(&sample()).unwrap();
        let truncated = &bin.body[..bin.body.len() - 4];
        let result: Result<Sample, _> =
            decode(truncated, Some(BincodeCodec::CONTENT_TYPE));
        assert!(matches!(result, Err(ProtocolError::Decode { .. })));
    }

    #[test]
    fn test_missing_marker_is_unsupported() {
        let json = Encoding::Json.encode(&sample()).unwrap();
        let result: Result<Sample, _> = decode(&json.body, None);
        match result {
            Err(ProtocolError::UnsupportedContentType(None)) => {}
            other => panic!("expected unsupported content type, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_marker_is_unsupported_even_for_valid_bytes() {
        let json = Encoding::Json.encode(&sample()).unwrap();
        let result: Result<Sample, _> = decode(&json.body, Some("text/plain"));
        let err = result.unwrap_err();
        assert!(err.is_undecodable());
        assert!(err.to_string().contains("text/plain"));
    }

    #[test]
    fn test_garbage_json_is_a_decode_error() {
        let result: Result<Sample, _> =
            decode(b"not json at all", Some(JsonCodec::CONTENT_TYPE));
        assert!(matches!(result, Err(ProtocolError::Decode { .. })));
    }

    #[test]
    fn test_marker_lookup() {
        assert_eq!(
            Encoding::from_content_type("application/json"),
            Some(Encoding::Json)
        );
        assert_eq!(
            Encoding::from_content_type("application/x-bincode"),
            Some(Encoding::Bincode)
        );
        assert_eq!(Encoding::from_content_type("application/gob"), None);
    }
}
