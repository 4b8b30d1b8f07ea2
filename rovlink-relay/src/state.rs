//! Shared relay state.
//!
//! Both relay roles and their worker threads communicate through
//! [`SharedState`]: the console REPL writes the thruster command the
//! telemetry stream polls with, the vehicle's capture worker publishes the
//! batch the video stream answers with, and incoming data lands here for
//! whoever reads it next. Locks are held only long enough to snapshot or
//! overwrite a value, never across I/O.

use dashmap::DashMap;
use parking_lot::Mutex;
use rovlink_protocol::{FrameBatch, SensorFrame, ThrusterCommand};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Relay statistics.
#[derive(Debug, Default)]
pub struct RelayStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub frames_in_total: AtomicU64,
    pub frames_out_total: AtomicU64,
    pub errors_total: AtomicU64,
}

impl RelayStats {
    /// Takes a point-in-time copy for display.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            frames_in_total: self.frames_in_total.load(Ordering::Relaxed),
            frames_out_total: self.frames_out_total.load(Ordering::Relaxed),
            errors_total: self.errors_total.load(Ordering::Relaxed),
        }
    }
}

/// Plain-value copy of [`RelayStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub frames_in_total: u64,
    pub frames_out_total: u64,
    pub errors_total: u64,
}

/// State shared between connections, workers, and the REPL.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Latest thruster command. Console-side writers set it, the vehicle
    /// applies whatever arrives over telemetry.
    command: Mutex<ThrusterCommand>,
    /// Latest sensor readings, updated by whichever side produced or
    /// received them last.
    sensors: Mutex<SensorFrame>,
    /// Latest locally captured camera batch, already scaled for the wire.
    capture: Mutex<FrameBatch>,
    /// Latest camera batch received per connection.
    received: DashMap<Uuid, FrameBatch>,
    /// Bumped on every stored received batch so renderers can detect change.
    frame_seq: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current thruster command.
    pub fn command(&self) -> ThrusterCommand {
        *self.command.lock()
    }

    /// Replaces the thruster command.
    pub fn set_command(&self, command: ThrusterCommand) {
        *self.command.lock() = command;
    }

    /// Applies a closure to the thruster command in place.
    ///
    /// Used by the REPL so `thrust` and `vertical` edit one field without
    /// clobbering concurrent edits of the others.
    pub fn update_command(&self, f: impl FnOnce(&mut ThrusterCommand)) {
        let mut command = self.command.lock();
        f(&mut command);
    }

    /// Returns the latest sensor readings.
    pub fn sensors(&self) -> SensorFrame {
        *self.sensors.lock()
    }

    /// Replaces the sensor readings.
    pub fn set_sensors(&self, sensors: SensorFrame) {
        *self.sensors.lock() = sensors;
    }

    /// Returns a copy of the latest captured batch. Cheap, pixel buffers
    /// are reference counted.
    pub fn capture_batch(&self) -> FrameBatch {
        self.capture.lock().clone()
    }

    /// Publishes the latest captured batch.
    pub fn set_capture_batch(&self, batch: FrameBatch) {
        *self.capture.lock() = batch;
    }

    /// Stores the latest batch received on a connection.
    pub fn store_received(&self, conn: Uuid, batch: FrameBatch) {
        self.received.insert(conn, batch);
        self.frame_seq.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns copies of the latest batch from every live connection.
    pub fn received_batches(&self) -> Vec<FrameBatch> {
        self.received.iter().map(|e| e.value().clone()).collect()
    }

    /// Drops everything remembered for a closed connection.
    pub fn forget_connection(&self, conn: Uuid) {
        self.received.remove(&conn);
    }

    /// Current value of the received-frame sequence counter.
    pub fn frame_seq(&self) -> u64 {
        self.frame_seq.load(Ordering::Relaxed)
    }
}
