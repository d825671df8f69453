//! Rate controller (C9): paces a producer loop to a target frequency with
//! overrun catch-up (§4.9).

use std::time::{Duration, Instant};

pub struct Rate {
    interval: Duration,
    start: Instant,
}

impl Rate {
    pub fn new(hz: u32) -> Self {
        let hz = hz.max(1);
        Self {
            interval: Duration::from_secs_f64(1.0 / hz as f64),
            start: Instant::now(),
        }
    }

    /// Exactly the algorithm in §4.9: normal case sleeps the remainder of
    /// the current period; falling behind by more than one period
    /// resynchronizes to "now" rather than letting sleep debt accumulate.
    pub fn sleep(&mut self) {
        let mut expected_end = self.start + self.interval;
        let actual_end = Instant::now();

        if actual_end < self.start {
            // Clock went backwards relative to the nominal start.
            expected_end = actual_end + self.interval;
        }

        self.start = expected_end;

        if actual_end > expected_end {
            if actual_end > expected_end + self.interval {
                // Fell behind by more than one period: resync instead of
                // queuing unbounded sleep debt.
                self.start = actual_end;
            }
            // Otherwise: behind by less than one period, don't sleep.
        } else {
            let remaining = expected_end - actual_end;
            spin_sleep::sleep(remaining);
        }
    }
}
