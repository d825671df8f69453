//! CameraReader (C7): runs a capture pipeline on a background thread and
//! publishes the latest JPEG through a mutex-guarded single-cell slot
//! (§4.7, §9 "latest-wins handoff").
//!
//! The capture pipeline graph itself (device open, encoder stage) is a
//! vendor-specific external collaborator and out of scope; it is
//! represented here by a narrow `CaptureSource` trait so the reader's
//! thread-lifecycle and latest-slot behavior stay testable without a real
//! camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::now_ns;
use crate::config::SensorParams;
use crate::error::PublisherResult;
use crate::frame::{FrameBuilder, ImagePayload, Payload, JPEG_SOI};
use crate::reader::{Reader, Registry};

/// One pulled sample from the capture pipeline: raw JPEG bytes.
pub struct RawSample(pub Vec<u8>);

/// Narrow boundary standing in for the out-of-scope capture pipeline.
pub trait CaptureSource: Send {
    /// Blocks for at most one frame period and returns the next sample, or
    /// `None` if the pipeline produced nothing this period.
    fn pull(&mut self) -> Option<RawSample>;
}

/// Synthetic source used when no real capture backend is wired in: emits a
/// minimal valid JPEG (SOI/EOI only, no real image data) at the configured
/// frame period. Exercises the reader's thread and slot machinery end to
/// end without a camera.
pub struct SyntheticJpegSource {
    period: Duration,
    width: u32,
    height: u32,
}

impl SyntheticJpegSource {
    pub fn new(fps: f32, width: u32, height: u32) -> Self {
        let fps = if fps > 0.0 { fps } else { 1.0 };
        Self {
            period: Duration::from_secs_f32(1.0 / fps),
            width,
            height,
        }
    }
}

impl CaptureSource for SyntheticJpegSource {
    fn pull(&mut self) -> Option<RawSample> {
        thread::sleep(self.period);
        let mut data = JPEG_SOI.to_vec();
        data.extend_from_slice(&self.width.to_le_bytes());
        data.extend_from_slice(&self.height.to_le_bytes());
        data.extend_from_slice(&[0xFF, 0xD9]); // EOI
        Some(RawSample(data))
    }
}

struct SharedState {
    latest: Mutex<Option<Vec<u8>>>,
    stop: AtomicBool,
}

pub struct CameraReader {
    sensor_name: String,
    topic: String,
    width: u32,
    height: u32,
    fps: f32,
    shared: Arc<SharedState>,
    capture_thread: Option<JoinHandle<()>>,
}

impl CameraReader {
    pub fn new(sensor_name: &str, params: &SensorParams) -> PublisherResult<Self> {
        let width = params.get_u64(sensor_name, "width")? as u32;
        let height = params.get_u64(sensor_name, "height")? as u32;
        let fps = params
            .get_f64_opt("fps")
            .unwrap_or(10.0) as f32;
        // enc_pipeline/port describe the out-of-scope vendor pipeline
        // string; validated for presence but not interpreted further here.
        let _enc_pipeline = params.get_str(sensor_name, "enc_pipeline")?;
        let _port = params.get_str(sensor_name, "port")?;

        let shared = Arc::new(SharedState {
            latest: Mutex::new(None),
            stop: AtomicBool::new(false),
        });

        let source: Box<dyn CaptureSource> = Box::new(SyntheticJpegSource::new(fps, width, height));
        let capture_thread = Some(Self::spawn_capture_thread(shared.clone(), source));

        Ok(Self {
            sensor_name: sensor_name.to_string(),
            topic: params.topic.clone(),
            width,
            height,
            fps,
            shared,
            capture_thread,
        })
    }

    fn spawn_capture_thread(
        shared: Arc<SharedState>,
        mut source: Box<dyn CaptureSource>,
    ) -> JoinHandle<()> {
        thread::spawn(move || {
            while !shared.stop.load(Ordering::Relaxed) {
                if let Some(RawSample(bytes)) = source.pull() {
                    // Lock held only long enough to swap the slot (§4.7).
                    let mut slot = shared.latest.lock();
                    *slot = Some(bytes);
                }
            }
        })
    }
}

impl Reader for CameraReader {
    fn read(&mut self) -> Option<FrameBuilder> {
        let data = {
            let mut slot = self.shared.latest.lock();
            slot.take()
        }?;

        debug_assert!(data.len() >= 2 && data[0..2] == JPEG_SOI, "camera output must begin with the JPEG SOI marker");

        Some(FrameBuilder {
            sensor_name: self.sensor_name.clone(),
            topic: self.topic.clone(),
            timestamp_ns: now_ns(),
            payload: Payload::Image(ImagePayload {
                data,
                width: self.width,
                height: self.height,
                encoding: "jpeg",
                fps: self.fps,
            }),
        })
    }
}

impl Drop for CameraReader {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.capture_thread.take() {
            let _ = handle.join();
        }
    }
}

pub fn register(registry: &Registry) {
    registry.register("Image", |name, params| {
        CameraReader::new(name, params).map(|r| Box::new(r) as Box<dyn Reader>)
    });
}
