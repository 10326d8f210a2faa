//! Millisecond clocks used for trigger timestamps.

use std::cell::Cell;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait StoryClock {
    fn now_millis(&self) -> i64;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl StoryClock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// Clock that only moves when told to. Drivers advance it by the tick delta.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<i64>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            now: Cell::new(start_millis),
        }
    }

    pub fn advance(&self, delta_millis: i64) {
        self.now.set(self.now.get() + delta_millis);
    }

    pub fn set(&self, now_millis: i64) {
        self.now.set(now_millis);
    }
}

impl StoryClock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.get()
    }
}
