//! # rovlink-protocol
//!
//! Wire protocol implementation for rovlink.
//!
//! This crate provides:
//! - Length-prefixed framing with a JSON header block
//! - Telemetry record serialization (thruster commands, sensor snapshots)
//! - Camera frame batch encoding with a fixed binary schema
//! - Content type dispatch and protocol constants

pub mod error;
pub mod frame;
pub mod payload;
pub mod telemetry;
pub mod video;

pub use error::ProtocolError;
pub use frame::{
    encode_frame, ByteOrder, ContentEncoding, ContentType, FrameDecoder, FrameHeader, Phase,
    HEADER_LEN_PREFIX_SIZE,
};
pub use payload::Payload;
pub use telemetry::{SensorFrame, TelemetryRecord, ThrusterCommand};
pub use video::{FrameBatch, PixelFormat, RawImage};

/// Default port for the telemetry stream.
pub const DEFAULT_TELEMETRY_PORT: u16 = 7430;

/// Default port for the video stream.
pub const DEFAULT_VIDEO_PORT: u16 = 7431;

/// Maximum frame body size (16 MiB).
pub const MAX_BODY_SIZE: u64 = 16 * 1024 * 1024;

/// Default target width camera frames are resized to before transmission.
pub const DEFAULT_TARGET_WIDTH: u32 = 350;
