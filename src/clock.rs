//! Wall-clock timestamp helper shared by every reader except LIDAR, which
//! stamps frames from the device-reported time instead (§3 invariant).

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
