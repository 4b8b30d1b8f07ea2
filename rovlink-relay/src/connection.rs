//! A single relay connection.
//!
//! [`Connection`] wraps a [`TcpStream`] with the staged frame decoder and a
//! pending-write buffer, and exposes the relay's event model: the caller
//! awaits readiness and the connection performs exactly one bounded read or
//! write step per wakeup. Frames already buffered are delivered before the
//! socket is touched again, so a burst of pipelined frames cannot stall the
//! stream.

use crate::error::RelayError;
use bytes::{Buf, BytesMut};
use rovlink_protocol::{FrameDecoder, Payload, Phase};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::TcpStream;
use uuid::Uuid;

/// Read buffer size for a single step.
const READ_CHUNK_SIZE: usize = 8192;

/// A framed, half-duplex relay connection.
///
/// The protocol is strict request/response: while a response is queued the
/// connection only asks for write readiness, and while the buffer is empty
/// it only asks for read readiness.
#[derive(Debug)]
pub struct Connection {
    id: Uuid,
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
    send_buf: BytesMut,
}

impl Connection {
    /// Wraps an already established stream (the accept path).
    pub fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream,
            peer,
            decoder: FrameDecoder::new(),
            send_buf: BytesMut::new(),
        }
    }

    /// Dials a peer with a timeout (the console path).
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self, RelayError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "connect timed out"))??;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, addr))
    }

    /// Stable identity for this connection.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current protocol phase.
    pub fn phase(&self) -> Phase {
        if self.send_buf.is_empty() {
            self.decoder.phase()
        } else {
            Phase::ReadyToRespond
        }
    }

    /// Readiness this connection currently wants.
    pub fn interest(&self) -> Interest {
        if self.send_buf.is_empty() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        }
    }

    /// Whether queued response bytes are still waiting to drain.
    pub fn has_pending_write(&self) -> bool {
        !self.send_buf.is_empty()
    }

    /// Encodes a payload and queues it for sending.
    pub fn queue_payload(&mut self, payload: &Payload) -> Result<(), RelayError> {
        let frame = payload.encode()?;
        self.send_buf.extend_from_slice(&frame);
        Ok(())
    }

    /// Performs one bounded step of the connection state machine.
    ///
    /// Returns `Ok(Some(payload))` when a complete frame was delivered,
    /// `Ok(None)` when the step made partial progress. Errors are fatal for
    /// this connection.
    pub async fn step(&mut self) -> Result<Option<Payload>, RelayError> {
        // Deliver anything already decoded before touching the socket.
        if self.send_buf.is_empty() {
            if let Some(payload) = self.poll_payload()? {
                return Ok(Some(payload));
            }
        }

        let ready = self.stream.ready(self.interest()).await?;

        if ready.is_writable() && !self.send_buf.is_empty() {
            self.flush()?;
            return Ok(None);
        }

        if ready.is_readable() {
            self.fill()?;
            return self.poll_payload();
        }

        Ok(None)
    }

    /// One non-blocking read into the decoder.
    fn fill(&mut self) -> Result<(), RelayError> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        match self.stream.try_read(&mut chunk) {
            Ok(0) => Err(RelayError::PeerClosed),
            Ok(n) => {
                tracing::trace!("[{}] received {} bytes", self.peer, n);
                self.decoder.extend(&chunk[..n]);
                Ok(())
            }
            // Readiness was stale, not an error. Try again next wakeup.
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(RelayError::Io(e)),
        }
    }

    /// One non-blocking write from the pending buffer.
    fn flush(&mut self) -> Result<(), RelayError> {
        match self.stream.try_write(&self.send_buf) {
            Ok(n) => {
                tracing::trace!("[{}] sent {} bytes", self.peer, n);
                self.send_buf.advance(n);
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(RelayError::Io(e)),
        }
    }

    /// Decodes one payload out of the staging buffer, if a frame completed.
    fn poll_payload(&mut self) -> Result<Option<Payload>, RelayError> {
        match self.decoder.next_frame()? {
            Some((header, body)) => {
                tracing::debug!(
                    "[{}] {} frame received ({} bytes)",
                    self.peer,
                    header.content_type,
                    body.len()
                );
                Ok(Some(Payload::decode(&header, body)?))
            }
            None => Ok(None),
        }
    }
}
