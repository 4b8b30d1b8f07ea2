//! The vehicle relay role.
//!
//! The vehicle is the peripheral end of the link: it owns the cameras and
//! thrusters, listens on the telemetry and video ports, and answers every
//! console request from [`SharedState`]. Incoming telemetry overwrites the
//! shared thruster command and is answered with the latest sensor snapshot;
//! incoming video polls are answered with the latest captured batch. The
//! reply is always keyed by the request's declared content type.

use crate::config::Config;
use crate::connection::Connection;
use crate::error::RelayError;
use crate::state::{RelayStats, SharedState};
use rovlink_protocol::{Payload, ThrusterCommand};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// TCP server for the vehicle role.
pub struct VehicleRelay {
    config: Config,
    state: Arc<SharedState>,
    stats: Arc<RelayStats>,
    telemetry_listener: TcpListener,
    video_listener: TcpListener,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl VehicleRelay {
    /// Binds both listening sockets.
    pub async fn bind(config: Config, state: Arc<SharedState>) -> Result<Self, RelayError> {
        let telemetry_listener = TcpListener::bind(config.network.telemetry_addr).await?;
        let video_listener = TcpListener::bind(config.network.video_addr).await?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            state,
            stats: Arc::new(RelayStats::default()),
            telemetry_listener,
            video_listener,
            shutdown: shutdown_tx,
            running: AtomicBool::new(false),
        })
    }

    /// Actual telemetry listening address (relevant when bound to port 0).
    pub fn telemetry_addr(&self) -> io::Result<SocketAddr> {
        self.telemetry_listener.local_addr()
    }

    /// Actual video listening address.
    pub fn video_addr(&self) -> io::Result<SocketAddr> {
        self.video_listener.local_addr()
    }

    /// Returns relay statistics.
    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Signals the relay to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Returns whether the relay is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Accepts console connections until shut down.
    pub async fn run(&self) -> Result<(), RelayError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "Vehicle listening on {} (telemetry) and {} (video)",
            self.telemetry_listener.local_addr()?,
            self.video_listener.local_addr()?
        );

        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                result = self.telemetry_listener.accept() => {
                    self.handle_accept(result);
                }
                result = self.video_listener.accept() => {
                    self.handle_accept(result);
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Vehicle relay shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn handle_accept(&self, result: io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, addr)) => {
                if self.stats.connections_active.load(Ordering::Relaxed)
                    >= self.config.network.max_connections as u64
                {
                    tracing::warn!("Connection limit reached, rejecting {}", addr);
                    return;
                }
                stream.set_nodelay(true).ok();

                self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                let state = self.state.clone();
                let stats = self.stats.clone();
                let mut conn_shutdown = self.shutdown.subscribe();

                tokio::spawn(async move {
                    tracing::info!("Console connected: {}", addr);
                    let mut conn = Connection::new(stream, addr);

                    let result =
                        Self::drive_connection(&mut conn, &state, &stats, &mut conn_shutdown)
                            .await;
                    match result {
                        Ok(()) => {}
                        Err(e) if e.is_peer_closed() => {
                            tracing::debug!("[{}] closed by peer", addr);
                        }
                        Err(e) => {
                            tracing::warn!("[{}] connection error: {}", addr, e);
                            stats.errors_total.fetch_add(1, Ordering::Relaxed);
                        }
                    }

                    state.forget_connection(conn.id());
                    stats.connections_active.fetch_sub(1, Ordering::Relaxed);
                    tracing::info!("Console disconnected: {}", addr);
                });
            }
            Err(e) => {
                tracing::error!("Accept error: {}", e);
            }
        }
    }

    /// Serves one connection until it errors, closes, or the relay stops.
    async fn drive_connection(
        conn: &mut Connection,
        state: &SharedState,
        stats: &RelayStats,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<(), RelayError> {
        loop {
            tokio::select! {
                result = conn.step() => {
                    if let Some(request) = result? {
                        stats.frames_in_total.fetch_add(1, Ordering::Relaxed);
                        let response = Self::respond(&request, state)?;
                        conn.queue_payload(&response)?;
                        stats.frames_out_total.fetch_add(1, Ordering::Relaxed);
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("[{}] shutdown signal", conn.peer());
                    return Ok(());
                }
            }
        }
    }

    /// Builds the response for one request, keyed by its content type.
    fn respond(request: &Payload, state: &SharedState) -> Result<Payload, RelayError> {
        match request {
            Payload::Telemetry(record) => {
                let command = ThrusterCommand::from_record(record)?;
                state.set_command(command);
                Ok(Payload::Telemetry(state.sensors().to_record()?))
            }
            Payload::CameraBatch(_) => Ok(Payload::CameraBatch(state.capture_batch())),
        }
    }
}
