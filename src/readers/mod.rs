pub mod camera;
pub mod imu;
pub mod lidar;
pub mod status;

/// Process-wide counter (§3): incremented by the publisher's consumer on
/// every successful enqueue, read-and-zeroed by `StatusReader` on each
/// status sample (§9 open question, resolved to "on enqueue").
pub static TOTAL_READ_BYTES: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
