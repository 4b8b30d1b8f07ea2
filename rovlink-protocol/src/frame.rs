//! Length-prefixed frame format.
//!
//! Frame layout (2-byte prefix + JSON header + body):
//!
//! ```text
//! +------------+----------------------------+---------------------+
//! | header_len | header (JSON, UTF-8)       | body                |
//! | 2 bytes BE | header_len bytes           | content-length bytes|
//! +------------+----------------------------+---------------------+
//! ```
//!
//! The header is a JSON object with four mandatory fields:
//! `byteorder`, `content-type`, `content-encoding`, `content-length`.
//! A body is never inspected until `content-length` bytes are buffered.

use crate::error::ProtocolError;
use crate::MAX_BODY_SIZE;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Size of the big-endian header length prefix in bytes.
pub const HEADER_LEN_PREFIX_SIZE: usize = 2;

/// Native byte order of the producing host, recorded in every header.
///
/// The field is advisory: all multi-byte integers in the envelope and the
/// camera batch schema are big-endian regardless of this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Returns the byte order of the host this code runs on.
    pub fn native() -> Self {
        #[cfg(target_endian = "little")]
        {
            ByteOrder::Little
        }
        #[cfg(target_endian = "big")]
        {
            ByteOrder::Big
        }
    }
}

/// Kind of content carried in a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    Telemetry,
    CameraBatch,
}

impl ContentType {
    /// Wire spelling of this content type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Telemetry => "telemetry",
            ContentType::CameraBatch => "camera-batch",
        }
    }

    /// The encoding each content type is transmitted with.
    pub fn encoding(&self) -> ContentEncoding {
        match self {
            ContentType::Telemetry => ContentEncoding::Utf8,
            ContentType::CameraBatch => ContentEncoding::Binary,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoding of a frame body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentEncoding {
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "binary")]
    Binary,
}

/// Parsed frame header.
///
/// Produced fresh for every frame and immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    #[serde(rename = "byteorder")]
    pub byte_order: ByteOrder,
    #[serde(rename = "content-type")]
    pub content_type: ContentType,
    #[serde(rename = "content-encoding")]
    pub content_encoding: ContentEncoding,
    #[serde(rename = "content-length")]
    pub content_length: u64,
}

/// Header as it arrives off the wire, before the mandatory field check.
#[derive(Deserialize)]
struct RawHeader {
    byteorder: Option<String>,
    #[serde(rename = "content-type")]
    content_type: Option<String>,
    #[serde(rename = "content-encoding")]
    content_encoding: Option<String>,
    #[serde(rename = "content-length")]
    content_length: Option<u64>,
}

impl FrameHeader {
    /// Creates a header for a body of the given type and length, recording
    /// the host's native byte order.
    pub fn new(content_type: ContentType, content_length: u64) -> Self {
        Self {
            byte_order: ByteOrder::native(),
            content_type,
            content_encoding: content_type.encoding(),
            content_length,
        }
    }

    /// Parses a header from its serialized JSON bytes.
    ///
    /// All four fields are mandatory; a missing field, an unrecognized
    /// field value, malformed JSON, or non-UTF-8 input is a fatal error.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let raw: RawHeader = serde_json::from_str(text)?;

        let byteorder = raw
            .byteorder
            .ok_or(ProtocolError::MissingField("byteorder"))?;
        let content_type = raw
            .content_type
            .ok_or(ProtocolError::MissingField("content-type"))?;
        let content_encoding = raw
            .content_encoding
            .ok_or(ProtocolError::MissingField("content-encoding"))?;
        let content_length = raw
            .content_length
            .ok_or(ProtocolError::MissingField("content-length"))?;

        let byte_order = match byteorder.as_str() {
            "little" => ByteOrder::Little,
            "big" => ByteOrder::Big,
            _ => {
                return Err(ProtocolError::InvalidFieldValue {
                    field: "byteorder",
                    value: byteorder,
                })
            }
        };

        let content_type = match content_type.as_str() {
            "telemetry" => ContentType::Telemetry,
            "camera-batch" => ContentType::CameraBatch,
            _ => return Err(ProtocolError::UnsupportedContentType(content_type)),
        };

        let content_encoding = match content_encoding.as_str() {
            "utf-8" => ContentEncoding::Utf8,
            "binary" => ContentEncoding::Binary,
            _ => {
                return Err(ProtocolError::InvalidFieldValue {
                    field: "content-encoding",
                    value: content_encoding,
                })
            }
        };

        Ok(Self {
            byte_order,
            content_type,
            content_encoding,
            content_length,
        })
    }
}

/// Encodes a frame: 2-byte big-endian header length, serialized header, body.
pub fn encode_frame(header: &FrameHeader, body: &[u8]) -> Result<BytesMut, ProtocolError> {
    if body.len() as u64 > MAX_BODY_SIZE {
        return Err(ProtocolError::BodyTooLarge {
            size: body.len() as u64,
            max: MAX_BODY_SIZE,
        });
    }

    let header_json = serde_json::to_vec(header)?;
    let mut buf =
        BytesMut::with_capacity(HEADER_LEN_PREFIX_SIZE + header_json.len() + body.len());
    buf.put_u16(header_json.len() as u16);
    buf.put_slice(&header_json);
    buf.put_slice(body);
    Ok(buf)
}

/// Receive-side position within a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the 2-byte header length prefix.
    AwaitingHeaderLength,
    /// Prefix consumed, waiting for the full header block.
    AwaitingHeader,
    /// Header parsed, waiting for `content-length` body bytes.
    AwaitingBody,
    /// A payload has been delivered and a response is queued for sending.
    ReadyToRespond,
}

/// Incremental frame decoder.
///
/// Owns the receive buffer and the staged parse state of the in-flight
/// frame. Each stage consumes bytes only once they are fully buffered, so
/// partial input is never destructive: [`next_frame`](Self::next_frame)
/// returns `Ok(None)` and the same call succeeds later once more bytes
/// have been appended.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
    header_len: Option<usize>,
    header: Option<FrameHeader>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            header_len: None,
            header: None,
        }
    }

    /// Appends raw bytes received from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Attempts to decode the next complete frame.
    ///
    /// Returns `Ok(Some((header, body)))` once all bytes of a frame have
    /// arrived, `Ok(None)` if more data is needed, or `Err` on a malformed
    /// or oversized header. Errors are fatal for the connection.
    pub fn next_frame(&mut self) -> Result<Option<(FrameHeader, Bytes)>, ProtocolError> {
        if self.header_len.is_none() {
            if self.buf.len() < HEADER_LEN_PREFIX_SIZE {
                return Ok(None);
            }
            let prefix = [self.buf[0], self.buf[1]];
            self.buf.advance(HEADER_LEN_PREFIX_SIZE);
            self.header_len = Some(u16::from_be_bytes(prefix) as usize);
        }

        if self.header.is_none() {
            let header_len = match self.header_len {
                Some(n) => n,
                None => return Ok(None),
            };
            if self.buf.len() < header_len {
                return Ok(None);
            }
            let header_bytes = self.buf.split_to(header_len);
            let header = FrameHeader::parse(&header_bytes)?;
            if header.content_length > MAX_BODY_SIZE {
                return Err(ProtocolError::BodyTooLarge {
                    size: header.content_length,
                    max: MAX_BODY_SIZE,
                });
            }
            self.header = Some(header);
        }

        let header = match self.header.take() {
            Some(h) if self.buf.len() >= h.content_length as usize => h,
            pending => {
                self.header = pending;
                return Ok(None);
            }
        };

        let body = self.buf.split_to(header.content_length as usize).freeze();
        self.header_len = None;
        Ok(Some((header, body)))
    }

    /// Current receive phase, derived from the staged parse state.
    pub fn phase(&self) -> Phase {
        if self.header.is_some() {
            Phase::AwaitingBody
        } else if self.header_len.is_some() {
            Phase::AwaitingHeader
        } else {
            Phase::AwaitingHeaderLength
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Discards all buffered bytes and staged parse state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.header_len = None;
        self.header = None;
    }
}
