//! Error types for the protocol layer.
//!
//! Each crate in Peril defines its own error enum. A `ProtocolError` always
//! means the bytes themselves were the problem (could not be produced,
//! could not be parsed, or carried a marker nobody understands), never the
//! network or the broker.

/// The boxed source error produced by whichever serializer was in use.
pub type CodecSource = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    ///
    /// `content_type` names the encoding that was attempted so a log line
    /// tells you which codec choked.
    #[error("encode failed ({content_type}): {source}")]
    Encode {
        content_type: &'static str,
        #[source]
        source: CodecSource,
    },

    /// Deserialization failed (turning bytes back into a Rust value).
    ///
    /// Common causes: malformed bytes, missing required fields, or a
    /// positional binary payload written by a different schema.
    #[error("decode failed ({content_type}): {source}")]
    Decode {
        content_type: &'static str,
        #[source]
        source: CodecSource,
    },

    /// The content-type marker was missing or names an encoding this
    /// process does not speak. Decoding is never attempted in that case.
    #[error("unsupported content type: {}", .0.as_deref().unwrap_or("<none>"))]
    UnsupportedContentType(Option<String>),

    /// The message parsed but violates protocol rules, e.g. a frame that
    /// arrives before the version handshake.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl ProtocolError {
    /// Returns `true` for failures on the consuming side: malformed bytes or
    /// an unrecognized marker. These are the errors a subscription absorbs.
    pub fn is_undecodable(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::UnsupportedContentType(_))
    }
}
