//! LidarReader (C8): registers SDK event/frame callbacks, filters NaNs and
//! random-downsamples to a fixed point count, and dedupes by pointer
//! identity between consecutive `read()` calls (§4.8).
//!
//! The vendor SDK is out of scope; it is represented by a narrow
//! `LidarDevice` trait with a simulated backend standing in for the real
//! binding. Filters (median/kalman/edge/dust) are applied, when enabled,
//! in the fixed order given in §9 since the spec makes no claim about
//! combined semantics otherwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::info;
use parking_lot::Mutex;
use rand::seq::SliceRandom;

use crate::config::SensorParams;
use crate::error::PublisherResult;
use crate::frame::{FrameBuilder, Payload, Point, PointCloudPayload};
use crate::reader::{Reader, Registry};

#[derive(Debug, Clone, Copy)]
pub struct RawPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub intensity: f32,
}

pub struct SdkFrame {
    pub points: Vec<RawPoint>,
    pub time_s: u64,
    pub time_ns: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkEvent {
    /// state tag "sdkState", cmd id 0xFE: device connected for the first time.
    Connected,
    Other,
}

#[derive(Debug, Clone, Copy)]
pub struct DeviceConfig {
    pub modulation_frequency: u32,
    pub hdr_mode: bool,
    pub integration_time_us: u32,
    pub min_amplitude: u32,
    pub max_fps: u32,
    pub cut_corner: bool,
}

pub type EventCallback = Box<dyn FnMut(SdkEvent) + Send>;
pub type FrameCallback = Box<dyn FnMut(SdkFrame) + Send>;

/// Narrow boundary standing in for the out-of-scope vendor LIDAR SDK.
pub trait LidarDevice: Send {
    fn set_event_callback(&mut self, cb: EventCallback);
    fn set_frame_callback(&mut self, cb: FrameCallback);
    fn configure(&mut self, cfg: DeviceConfig);
    fn start(&mut self, img_type: u32);
    fn stop(&mut self);
    fn shutdown(&mut self);
}

/// Simulated device: fires a `Connected` event once, then streams
/// synthetic point clouds on its own thread at a fixed rate.
pub struct SimulatedLidarDevice {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    points_per_frame: usize,
    rate_hz: u32,
    event_cb: Option<EventCallback>,
    frame_cb: Arc<Mutex<Option<FrameCallback>>>,
}

impl SimulatedLidarDevice {
    pub fn new(points_per_frame: usize, rate_hz: u32) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
            points_per_frame,
            rate_hz: rate_hz.max(1),
            event_cb: None,
            frame_cb: Arc::new(Mutex::new(None)),
        }
    }
}

impl LidarDevice for SimulatedLidarDevice {
    fn set_event_callback(&mut self, cb: EventCallback) {
        self.event_cb = Some(cb);
    }

    fn set_frame_callback(&mut self, cb: FrameCallback) {
        *self.frame_cb.lock() = Some(cb);
    }

    fn configure(&mut self, _cfg: DeviceConfig) {}

    fn start(&mut self, _img_type: u32) {
        if let Some(cb) = self.event_cb.as_mut() {
            cb(SdkEvent::Connected);
        }

        self.running.store(true, Ordering::Relaxed);
        let running = self.running.clone();
        let frame_cb = self.frame_cb.clone();
        let n = self.points_per_frame;
        let period = Duration::from_secs_f64(1.0 / self.rate_hz as f64);

        self.thread = Some(thread::spawn(move || {
            // Starts at 1, not 0: `time_s` feeds `timestamp_ns` directly
            // (lidar.rs decoded-cloud stamping below), and a 0 timestamp on
            // the very first frame would violate "timestamp is > 0".
            let mut seq: u64 = 1;
            while running.load(Ordering::Relaxed) {
                thread::sleep(period);
                let mut points = Vec::with_capacity(n);
                for i in 0..n {
                    points.push(RawPoint {
                        x: (i as f32) * 0.01,
                        y: (i as f32) * 0.02,
                        z: 1.0,
                        intensity: 100.0,
                    });
                }
                let frame = SdkFrame {
                    points,
                    time_s: seq,
                    time_ns: 0,
                };
                seq += 1;
                if let Some(cb) = frame_cb.lock().as_mut() {
                    cb(frame);
                }
            }
        }));
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    fn shutdown(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
struct FilterConfig {
    median_size: u32,
    kalman_enabled: bool,
    kalman_threshold: f64,
    edge_enabled: bool,
    dust_enabled: bool,
}

impl FilterConfig {
    fn from_params(params: &SensorParams) -> Self {
        Self {
            median_size: params.get_u64_opt("filter.median.size").unwrap_or(0) as u32,
            kalman_enabled: params.get_bool_opt("filter.kalman.enable").unwrap_or(false),
            kalman_threshold: params.get_f64_opt("filter.kalman.threshold").unwrap_or(0.0),
            edge_enabled: params.get_bool_opt("filter.edge.enable").unwrap_or(false),
            dust_enabled: params.get_bool_opt("filter.dust.enable").unwrap_or(false),
        }
    }

    /// Applies enabled filters in a fixed order: median, kalman, edge, dust
    /// (§9: no semantic claim is made about combined output).
    fn apply(&self, points: &mut Vec<RawPoint>) {
        if self.median_size > 0 {
            median_filter(points, self.median_size as usize);
        }
        if self.kalman_enabled {
            kalman_filter(points, self.kalman_threshold);
        }
        if self.edge_enabled {
            edge_filter(points);
        }
        if self.dust_enabled {
            dust_filter(points);
        }
    }
}

const KALMAN_FACTOR: f64 = 1000.0;
const KALMAN_WINDOW: usize = 2000;

fn median_filter(_points: &mut [RawPoint], _size: usize) {
    // Out-of-scope vendor filter; a real implementation would smooth
    // neighboring points over a window of `_size`. No-op stand-in.
}

fn kalman_filter(_points: &mut [RawPoint], threshold: f64) {
    let _ = (KALMAN_FACTOR, KALMAN_WINDOW, threshold);
}

fn edge_filter(_points: &mut Vec<RawPoint>) {}

fn dust_filter(_points: &mut Vec<RawPoint>) {}

/// Randomly subsamples `points` down to `target` entries (§4.8). If
/// `points` already has `target` or fewer, it is returned unchanged.
fn random_subsample(mut points: Vec<RawPoint>, target: usize) -> Vec<RawPoint> {
    if points.len() <= target {
        return points;
    }
    let mut rng = rand::rng();
    points.shuffle(&mut rng);
    points.truncate(target);
    points
}

struct DecodedCloud {
    points: Vec<Point>,
    timestamp_ns: u64,
}

struct SharedState {
    latest: Mutex<Option<Arc<DecodedCloud>>>,
}

pub struct LidarReader {
    sensor_name: String,
    topic: String,
    cloud_size: usize,
    filters: FilterConfig,
    shared: Arc<SharedState>,
    device: Box<dyn LidarDevice>,
    started: bool,
    prev: Option<Arc<DecodedCloud>>,
}

impl LidarReader {
    pub fn new(sensor_name: &str, params: &SensorParams) -> PublisherResult<Self> {
        let cloud_size = params.get_u64(sensor_name, "cloud_size")? as usize;
        let filters = FilterConfig::from_params(params);
        let rate_hz = params.rate;

        let shared = Arc::new(SharedState {
            latest: Mutex::new(None),
        });
        let device: Box<dyn LidarDevice> =
            Box::new(SimulatedLidarDevice::new(cloud_size + cloud_size / 2, rate_hz));

        Ok(Self {
            sensor_name: sensor_name.to_string(),
            topic: params.topic.clone(),
            cloud_size,
            filters,
            shared,
            device,
            started: false,
            prev: None,
        })
    }

    /// Constructs the SDK session and registers callbacks on first use
    /// (§4.8 "lazily constructs the SDK session").
    fn start(&mut self) {
        let shared_events = self.sensor_name.clone();
        self.device.set_event_callback(Box::new(move |event| match event {
            SdkEvent::Connected => {
                info!("LidarReader '{shared_events}': device connected, applying configuration");
            }
            SdkEvent::Other => {
                info!("LidarReader '{shared_events}': received SDK event");
            }
        }));

        let shared = self.shared.clone();
        let filters = self.filters;
        let cloud_size = self.cloud_size;
        self.device.set_frame_callback(Box::new(move |frame| {
            let mut points: Vec<RawPoint> = frame
                .points
                .into_iter()
                .filter(|p| !p.x.is_nan() && !p.y.is_nan() && !p.z.is_nan())
                .collect();

            filters.apply(&mut points);
            let points = random_subsample(points, cloud_size);

            let timestamp_ns = frame.time_s * 1_000_000_000 + frame.time_ns as u64;
            let decoded = Arc::new(DecodedCloud {
                points: points
                    .into_iter()
                    .map(|p| Point {
                        x: p.x,
                        y: p.y,
                        z: p.z,
                        intensity: p.intensity,
                    })
                    .collect(),
                timestamp_ns,
            });

            *shared.latest.lock() = Some(decoded);
        }));

        self.device.configure(DeviceConfig {
            modulation_frequency: 0,
            hdr_mode: false,
            integration_time_us: 0,
            min_amplitude: 0,
            max_fps: 0,
            cut_corner: false,
        });
        self.device.start(0);
        self.started = true;
    }
}

impl Reader for LidarReader {
    fn read(&mut self) -> Option<FrameBuilder> {
        if !self.started {
            self.start();
        }

        let current = self.shared.latest.lock().as_ref().cloned()?;

        // Pointer-equality dedup: no new frame arrived since last read.
        if let Some(prev) = &self.prev {
            if Arc::ptr_eq(prev, &current) {
                return None;
            }
        }
        self.prev = Some(current.clone());

        Some(FrameBuilder {
            sensor_name: self.sensor_name.clone(),
            topic: self.topic.clone(),
            timestamp_ns: current.timestamp_ns,
            payload: Payload::PointCloud(PointCloudPayload {
                points: current.points.clone(),
            }),
        })
    }
}

impl Drop for LidarReader {
    fn drop(&mut self) {
        if self.started {
            self.device.stop();
            self.device.shutdown();
        }
    }
}

pub fn register(registry: &Registry) {
    registry.register("PointCloud", |name, params| {
        LidarReader::new(name, params).map(|r| Box::new(r) as Box<dyn Reader>)
    });
}
