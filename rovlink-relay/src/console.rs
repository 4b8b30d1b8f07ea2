//! The console relay role.
//!
//! The console is the operator end of the link. It dials the vehicle's
//! telemetry and video ports, opens each exchange with an initial frame (the
//! current command snapshot, or an empty batch as the video poll), and then
//! alternates request/response forever: every telemetry reply refreshes the
//! shared sensor snapshot and is answered with the latest command, every
//! camera batch is recorded for the render worker and answered with the next
//! poll frame.
//!
//! A supervisor owns the stream tasks in a [`JoinSet`]. When the set drains
//! empty the vehicle is gone, so both streams are rebuilt before the next
//! wait. A failed dial waits one poll interval before the next attempt.

use crate::config::Config;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::state::{RelayStats, SharedState};
use rovlink_protocol::{FrameBatch, Payload, SensorFrame};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

/// Which logical stream a connection carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Telemetry,
    Video,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Telemetry => "telemetry",
            StreamKind::Video => "video",
        }
    }
}

/// TCP client for the console role.
pub struct ConsoleRelay {
    config: Config,
    state: Arc<SharedState>,
    stats: Arc<RelayStats>,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl ConsoleRelay {
    pub fn new(config: Config, state: Arc<SharedState>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            state,
            stats: Arc::new(RelayStats::default()),
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        }
    }

    /// Returns a handle to the relay statistics.
    pub fn stats(&self) -> Arc<RelayStats> {
        Arc::clone(&self.stats)
    }

    /// Signals the relay to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the relay is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Maintains both streams until shut down.
    pub async fn run(&self) -> Result<(), RelayError> {
        self.running.store(true, Ordering::SeqCst);
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut shutdown_rx = self.shutdown.subscribe();
        let poll_interval = self.config.network.poll_interval();

        loop {
            if tasks.is_empty() {
                match self.open_streams().await {
                    Ok(connections) => {
                        for (kind, conn) in connections {
                            tasks.spawn(Self::drive_connection(
                                kind,
                                conn,
                                self.state.clone(),
                                self.stats.clone(),
                                poll_interval,
                                self.shutdown.subscribe(),
                            ));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Connect failed: {}; retrying in {:?}",
                            e,
                            poll_interval
                        );
                        tokio::select! {
                            _ = tokio::time::sleep(poll_interval) => {}
                            _ = shutdown_rx.recv() => break,
                        }
                        continue;
                    }
                }
            }

            tokio::select! {
                finished = tasks.join_next() => {
                    if let Some(Err(e)) = finished {
                        tracing::warn!("Stream task failed: {}", e);
                    }
                    // Next iteration rebuilds as soon as the set is empty.
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        tasks.shutdown().await;
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Dials both streams; all or nothing.
    async fn open_streams(&self) -> Result<Vec<(StreamKind, Connection)>, RelayError> {
        let timeout = self.config.network.connect_timeout();
        let telemetry = Connection::connect(self.config.network.telemetry_addr, timeout).await?;
        let video = Connection::connect(self.config.network.video_addr, timeout).await?;
        tracing::info!(
            "Connected to vehicle: {} (telemetry), {} (video)",
            telemetry.peer(),
            video.peer()
        );
        Ok(vec![
            (StreamKind::Telemetry, telemetry),
            (StreamKind::Video, video),
        ])
    }

    /// Drives one stream until it dies or the relay stops.
    async fn drive_connection(
        kind: StreamKind,
        mut conn: Connection,
        state: Arc<SharedState>,
        stats: Arc<RelayStats>,
        poll_interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let peer = conn.peer();
        stats.connections_total.fetch_add(1, Ordering::Relaxed);
        stats.connections_active.fetch_add(1, Ordering::Relaxed);

        // The console speaks first on both streams.
        match Self::initial_payload(kind, &state) {
            Ok(first) => {
                if let Err(e) = conn.queue_payload(&first) {
                    tracing::warn!("[{}] {} stream setup failed: {}", peer, kind.as_str(), e);
                    stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                    return;
                }
                stats.frames_out_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!("[{}] {} stream setup failed: {}", peer, kind.as_str(), e);
                stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                return;
            }
        }

        loop {
            tokio::select! {
                result = tokio::time::timeout(poll_interval, conn.step()) => {
                    match result {
                        // Idle tick; the bounded wait keeps the task responsive.
                        Err(_) => {}
                        Ok(Ok(None)) => {}
                        Ok(Ok(Some(payload))) => {
                            stats.frames_in_total.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = Self::absorb(payload, &mut conn, &state) {
                                tracing::warn!(
                                    "[{}] {} stream error: {}",
                                    peer,
                                    kind.as_str(),
                                    e
                                );
                                stats.errors_total.fetch_add(1, Ordering::Relaxed);
                                break;
                            }
                            stats.frames_out_total.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Err(e)) if e.is_peer_closed() => {
                            tracing::info!(
                                "[{}] {} stream closed by vehicle",
                                peer,
                                kind.as_str()
                            );
                            break;
                        }
                        Ok(Err(e)) => {
                            tracing::warn!("[{}] {} stream error: {}", peer, kind.as_str(), e);
                            stats.errors_total.fetch_add(1, Ordering::Relaxed);
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        state.forget_connection(conn.id());
        stats.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// The first frame sent on a fresh stream.
    fn initial_payload(kind: StreamKind, state: &SharedState) -> Result<Payload, RelayError> {
        match kind {
            StreamKind::Telemetry => Ok(Payload::Telemetry(state.command().to_record()?)),
            StreamKind::Video => Ok(Payload::CameraBatch(FrameBatch::new())),
        }
    }

    /// Applies one response and queues the next request.
    fn absorb(
        payload: Payload,
        conn: &mut Connection,
        state: &SharedState,
    ) -> Result<(), RelayError> {
        match payload {
            Payload::Telemetry(record) => {
                state.set_sensors(SensorFrame::from_record(&record)?);
                conn.queue_payload(&Payload::Telemetry(state.command().to_record()?))
            }
            Payload::CameraBatch(batch) => {
                state.store_received(conn.id(), batch);
                conn.queue_payload(&Payload::CameraBatch(FrameBatch::new()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::VehicleRelay;
    use rovlink_protocol::{PixelFormat, RawImage, ThrusterCommand};
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::TcpListener;

    async fn wait_for(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = tokio::time::Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn console_config(telemetry: SocketAddr, video: SocketAddr) -> Config {
        let mut config = Config::default();
        config.network.telemetry_addr = telemetry;
        config.network.video_addr = video;
        config.network.poll_interval_ms = 50;
        config.network.connect_timeout_secs = 1;
        config
    }

    #[tokio::test]
    async fn test_relays_state_both_directions() {
        let vehicle_state = Arc::new(SharedState::new());
        vehicle_state.set_sensors(SensorFrame {
            imu: [9.0, 8.0, 7.0],
        });
        let image = RawImage::new(2, 1, PixelFormat::Gray8, vec![5, 6].into()).unwrap();
        let mut batch = FrameBatch::new();
        batch.push(image);
        vehicle_state.set_capture_batch(batch);

        let mut vehicle_config = Config::default();
        vehicle_config.network.telemetry_addr = "127.0.0.1:0".parse().unwrap();
        vehicle_config.network.video_addr = "127.0.0.1:0".parse().unwrap();
        let vehicle = Arc::new(
            VehicleRelay::bind(vehicle_config, vehicle_state.clone())
                .await
                .unwrap(),
        );
        let telemetry = vehicle.telemetry_addr().unwrap();
        let video = vehicle.video_addr().unwrap();
        let runner = vehicle.clone();
        tokio::spawn(async move { runner.run().await });

        let console_state = Arc::new(SharedState::new());
        let mut command = ThrusterCommand::stopped();
        command.enabled = true;
        command.vertical = [0.5, 0.5];
        console_state.set_command(command);

        let console = Arc::new(ConsoleRelay::new(
            console_config(telemetry, video),
            console_state.clone(),
        ));
        let console_runner = console.clone();
        tokio::spawn(async move { console_runner.run().await });

        // Command flows console -> vehicle, sensors and batches flow back.
        assert!(
            wait_for(Duration::from_secs(5), || {
                vehicle_state.command().enabled
                    && console_state.sensors().imu == [9.0, 8.0, 7.0]
                    && !console_state.received_batches().is_empty()
            })
            .await
        );
        assert_eq!(vehicle_state.command().vertical, [0.5, 0.5]);

        console.shutdown();
        assert!(wait_for(Duration::from_secs(2), || !console.is_running()).await);
        vehicle.shutdown();
    }

    #[tokio::test]
    async fn test_rebuilds_streams_when_vehicle_drops_them() {
        let telemetry_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let video_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let telemetry = telemetry_listener.local_addr().unwrap();
        let video = video_listener.local_addr().unwrap();

        let accepts = Arc::new(AtomicUsize::new(0));
        let counter = accepts.clone();
        tokio::spawn(async move {
            loop {
                if let Ok((stream, _)) = telemetry_listener.accept().await {
                    counter.fetch_add(1, Ordering::Relaxed);
                    drop(stream);
                }
            }
        });
        tokio::spawn(async move {
            loop {
                if let Ok((stream, _)) = video_listener.accept().await {
                    drop(stream);
                }
            }
        });

        let state = Arc::new(SharedState::new());
        let console = Arc::new(ConsoleRelay::new(console_config(telemetry, video), state));
        let runner = console.clone();
        tokio::spawn(async move { runner.run().await });

        // Every accept is immediately dropped, so reaching three means the
        // console rebuilt its streams at least twice.
        assert!(
            wait_for(Duration::from_secs(10), || {
                accepts.load(Ordering::Relaxed) >= 3
            })
            .await
        );

        console.shutdown();
        assert!(wait_for(Duration::from_secs(2), || !console.is_running()).await);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_dial_backoff() {
        // Grab a port with no listener behind it.
        let claimed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead_telemetry = claimed.local_addr().unwrap();
        let dead_video = {
            let claimed = TcpListener::bind("127.0.0.1:0").await.unwrap();
            claimed.local_addr().unwrap()
        };
        drop(claimed);

        let state = Arc::new(SharedState::new());
        let console = Arc::new(ConsoleRelay::new(
            console_config(dead_telemetry, dead_video),
            state,
        ));
        let stats = console.stats();
        let runner = console.clone();
        tokio::spawn(async move { runner.run().await });

        assert!(wait_for(Duration::from_secs(2), || console.is_running()).await);
        tokio::time::sleep(Duration::from_millis(150)).await;

        console.shutdown();
        assert!(wait_for(Duration::from_secs(2), || !console.is_running()).await);
        assert_eq!(stats.connections_total.load(Ordering::Relaxed), 0);
    }
}
