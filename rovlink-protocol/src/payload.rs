//! Content dispatch.
//!
//! The set of payload kinds is closed: a frame body is either a telemetry
//! record or a camera batch, selected by the header's declared
//! `content-type`. Decode never sniffs the body.

use crate::error::ProtocolError;
use crate::frame::{encode_frame, ContentType, FrameHeader};
use crate::telemetry::TelemetryRecord;
use crate::video::FrameBatch;
use bytes::{Bytes, BytesMut};

/// A decoded frame body, tagged by its declared content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Telemetry(TelemetryRecord),
    CameraBatch(FrameBatch),
}

impl Payload {
    /// Decodes a complete body according to the header's content type.
    pub fn decode(header: &FrameHeader, body: Bytes) -> Result<Self, ProtocolError> {
        match header.content_type {
            ContentType::Telemetry => {
                Ok(Payload::Telemetry(TelemetryRecord::from_bytes(&body)?))
            }
            ContentType::CameraBatch => Ok(Payload::CameraBatch(FrameBatch::decode(body)?)),
        }
    }

    /// The content type this payload is framed as.
    pub fn content_type(&self) -> ContentType {
        match self {
            Payload::Telemetry(_) => ContentType::Telemetry,
            Payload::CameraBatch(_) => ContentType::CameraBatch,
        }
    }

    /// Encodes the payload into a complete wire frame (prefix, header, body).
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let body: Bytes = match self {
            Payload::Telemetry(record) => Bytes::from(record.to_bytes()?),
            Payload::CameraBatch(batch) => batch.encode()?.freeze(),
        };
        let header = FrameHeader::new(self.content_type(), body.len() as u64);
        encode_frame(&header, &body)
    }
}

impl From<TelemetryRecord> for Payload {
    fn from(record: TelemetryRecord) -> Self {
        Payload::Telemetry(record)
    }
}

impl From<FrameBatch> for Payload {
    fn from(batch: FrameBatch) -> Self {
        Payload::CameraBatch(batch)
    }
}
