//! # rovlink-relay
//!
//! Relay runtime for rovlink.
//!
//! This crate provides:
//! - The vehicle role: listens on the telemetry and video ports and answers
//!   console requests from shared state
//! - The console role: dials the vehicle, keeps both streams alive, and
//!   rebuilds them when the vehicle goes away
//! - The per-connection state machine over non-blocking socket steps
//! - Capture and render worker threads behind trait seams
//! - Configuration loading with environment overrides

pub mod camera;
pub mod config;
pub mod connection;
pub mod console;
pub mod error;
pub mod state;
pub mod vehicle;

pub use camera::{
    CameraId, CameraSource, CaptureWorker, FrameSink, RenderWorker, SyntheticCamera, TraceSink,
};
pub use config::{CaptureConfig, Config, ConfigError, NetworkConfig, VideoConfig};
pub use connection::Connection;
pub use console::{ConsoleRelay, StreamKind};
pub use error::RelayError;
pub use state::{RelayStats, SharedState, StatsSnapshot};
pub use vehicle::VehicleRelay;
