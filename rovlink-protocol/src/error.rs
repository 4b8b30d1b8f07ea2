//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or payload handling.
///
/// Every variant is fatal for the connection it occurs on. The recoverable
/// conditions (not enough bytes buffered, socket would block) are not errors
/// and never surface here.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("missing required header field: {0}")]
    MissingField(&'static str),

    #[error("invalid value for header field {field}: {value:?}")]
    InvalidFieldValue { field: &'static str, value: String },

    #[error("header is not valid UTF-8")]
    InvalidUtf8,

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: u64, max: u64 },

    #[error("unsupported content type: {0:?}")]
    UnsupportedContentType(String),

    #[error("truncated camera batch: need {needed} more bytes")]
    TruncatedBatch { needed: usize },

    #[error("camera batch too long: {count} frames (max {max})")]
    BatchTooLong { count: usize, max: usize },

    #[error("unknown pixel format tag: {0}")]
    UnknownPixelFormat(u8),

    #[error("pixel buffer length {actual} does not match {width}x{height} {format}")]
    PixelLengthMismatch {
        width: u32,
        height: u32,
        format: &'static str,
        actual: usize,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::MissingField("content-length");
        assert!(err.to_string().contains("content-length"));

        let err = ProtocolError::InvalidFieldValue {
            field: "byteorder",
            value: "middle".to_string(),
        };
        assert!(err.to_string().contains("middle"));

        let err = ProtocolError::BodyTooLarge {
            size: 100,
            max: 50,
        };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::UnsupportedContentType("audio".to_string());
        assert!(err.to_string().contains("audio"));

        let err = ProtocolError::TruncatedBatch { needed: 12 };
        assert!(err.to_string().contains("12"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }
}
