//! Camera capture and display workers.
//!
//! Frame producers and consumers sit behind the [`CameraSource`] and
//! [`FrameSink`] traits so the relay itself never touches device APIs. The
//! built-in [`SyntheticCamera`] generates a moving test pattern, which keeps
//! the vehicle role runnable on any machine.
//!
//! Both workers are plain OS threads. Capture sweeps every device on a fixed
//! interval and publishes one scaled batch to [`SharedState`]; render polls
//! the received-frame counter and pushes new frames into the sink. Neither
//! holds a lock across a sweep.

use crate::state::SharedState;
use rovlink_protocol::{FrameBatch, PixelFormat, RawImage};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Identifier for a capture device.
pub type CameraId = u32;

/// A source of raw camera frames.
pub trait CameraSource: Send + 'static {
    /// Devices currently available for capture.
    fn available_devices(&self) -> Vec<CameraId>;

    /// Captures one frame from a device. `None` means the device produced
    /// nothing this sweep; the sweep continues with the next device.
    fn capture_frame(&mut self, device: CameraId) -> Option<RawImage>;
}

/// A consumer of received camera frames.
pub trait FrameSink: Send + 'static {
    fn render_frame(&mut self, image: &RawImage);
}

/// Test-pattern camera used when no real capture hardware is wired in.
///
/// Every frame is a BGR gradient that drifts with an internal tick, so
/// consecutive frames differ and motion is visible end to end.
#[derive(Debug)]
pub struct SyntheticCamera {
    devices: u32,
    width: u32,
    height: u32,
    tick: u64,
}

impl SyntheticCamera {
    pub fn new(devices: u32, width: u32, height: u32) -> Self {
        Self {
            devices,
            width,
            height,
            tick: 0,
        }
    }
}

impl CameraSource for SyntheticCamera {
    fn available_devices(&self) -> Vec<CameraId> {
        (0..self.devices).collect()
    }

    fn capture_frame(&mut self, device: CameraId) -> Option<RawImage> {
        self.tick = self.tick.wrapping_add(1);
        let shift = self.tick as u32;

        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push((x.wrapping_add(shift) & 0xff) as u8);
                pixels.push((y.wrapping_add(shift) & 0xff) as u8);
                pixels.push((device.wrapping_mul(64) & 0xff) as u8);
            }
        }

        RawImage::new(self.width, self.height, PixelFormat::Bgr8, pixels.into()).ok()
    }
}

/// Sink that logs frame geometry instead of displaying it.
#[derive(Debug, Default)]
pub struct TraceSink;

impl FrameSink for TraceSink {
    fn render_frame(&mut self, image: &RawImage) {
        tracing::debug!(
            "render {}x{} {}",
            image.width,
            image.height,
            image.format.name()
        );
    }
}

/// Capture thread handle.
pub struct CaptureWorker {
    handle: JoinHandle<()>,
}

impl CaptureWorker {
    /// Spawns the capture thread.
    ///
    /// Each sweep captures one frame per available device, scales it down to
    /// `target_width`, and publishes the batch. An empty device list still
    /// publishes the empty batch, matching what goes on the wire.
    pub fn spawn(
        mut source: impl CameraSource,
        state: Arc<SharedState>,
        interval: Duration,
        target_width: u32,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new().name("capture".into()).spawn(move || {
            tracing::info!(
                "capture thread started ({} devices)",
                source.available_devices().len()
            );
            while running.load(Ordering::Relaxed) {
                let mut batch = FrameBatch::new();
                for device in source.available_devices() {
                    if let Some(frame) = source.capture_frame(device) {
                        batch.push(frame.resize_to_width(target_width));
                    }
                }
                state.set_capture_batch(batch);
                thread::sleep(interval);
            }
            tracing::info!("capture thread stopped");
        })?;

        Ok(Self { handle })
    }

    /// Waits for the thread to finish. Callers clear the running flag first.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

/// Render thread handle.
pub struct RenderWorker {
    handle: JoinHandle<()>,
}

impl RenderWorker {
    /// Spawns the render thread.
    ///
    /// The thread sleeps on `interval` and only walks the received batches
    /// when the frame sequence counter moved since the last pass.
    pub fn spawn(
        mut sink: impl FrameSink,
        state: Arc<SharedState>,
        interval: Duration,
        running: Arc<AtomicBool>,
    ) -> io::Result<Self> {
        let handle = thread::Builder::new().name("render".into()).spawn(move || {
            tracing::info!("render thread started");
            let mut last_seq = state.frame_seq();
            while running.load(Ordering::Relaxed) {
                let seq = state.frame_seq();
                if seq != last_seq {
                    last_seq = seq;
                    for batch in state.received_batches() {
                        for frame in &batch.frames {
                            sink.render_frame(frame);
                        }
                    }
                }
                thread::sleep(interval);
            }
            tracing::info!("render thread stopped");
        })?;

        Ok(Self { handle })
    }

    /// Waits for the thread to finish. Callers clear the running flag first.
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;
    use uuid::Uuid;

    struct CountingSink(Arc<AtomicUsize>);

    impl FrameSink for CountingSink {
        fn render_frame(&mut self, _image: &RawImage) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_synthetic_camera_dimensions() {
        let mut camera = SyntheticCamera::new(2, 8, 6);
        assert_eq!(camera.available_devices(), vec![0, 1]);

        let frame = camera.capture_frame(0).unwrap();
        assert_eq!(frame.width, 8);
        assert_eq!(frame.height, 6);
        assert_eq!(frame.format, PixelFormat::Bgr8);
        assert_eq!(frame.pixels.len(), 8 * 6 * 3);
    }

    #[test]
    fn test_synthetic_camera_frames_drift() {
        let mut camera = SyntheticCamera::new(1, 8, 6);
        let first = camera.capture_frame(0).unwrap();
        let second = camera.capture_frame(0).unwrap();
        assert_ne!(first.pixels, second.pixels);
    }

    #[test]
    fn test_capture_worker_publishes_scaled_batches() {
        let state = Arc::new(SharedState::new());
        let running = Arc::new(AtomicBool::new(true));

        let worker = CaptureWorker::spawn(
            SyntheticCamera::new(1, 8, 6),
            state.clone(),
            Duration::from_millis(1),
            4,
            running.clone(),
        )
        .unwrap();

        assert!(wait_until(Duration::from_secs(2), || {
            !state.capture_batch().is_empty()
        }));

        let batch = state.capture_batch();
        assert_eq!(batch.frames[0].width, 4);
        assert_eq!(batch.frames[0].height, 3);

        running.store(false, Ordering::Relaxed);
        worker.join().unwrap();
    }

    #[test]
    fn test_render_worker_consumes_new_batches() {
        let state = Arc::new(SharedState::new());
        let running = Arc::new(AtomicBool::new(true));
        let rendered = Arc::new(AtomicUsize::new(0));

        let worker = RenderWorker::spawn(
            CountingSink(rendered.clone()),
            state.clone(),
            Duration::from_millis(1),
            running.clone(),
        )
        .unwrap();

        let mut camera = SyntheticCamera::new(1, 8, 6);
        let mut batch = FrameBatch::new();
        batch.push(camera.capture_frame(0).unwrap());
        state.store_received(Uuid::new_v4(), batch);

        assert!(wait_until(Duration::from_secs(2), || {
            rendered.load(Ordering::Relaxed) > 0
        }));

        running.store(false, Ordering::Relaxed);
        worker.join().unwrap();
    }
}
