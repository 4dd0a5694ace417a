// Licensed under the Apache-2.0 license

use portable_atomic::{AtomicBool, AtomicU32, Ordering};

/// State shared between the tick interrupt and the main loop.
///
/// The tick handler is the only writer of both fields while the timer runs.
/// The main loop reads the counter; the heartbeat is only consumed by the
/// LED output.
#[derive(Debug, Default)]
pub struct Ticker {
    ticks: AtomicU32,
    heartbeat: AtomicBool,
}

impl Ticker {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
            heartbeat: AtomicBool::new(false),
        }
    }

    /// Tick handler body.
    pub fn on_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.heartbeat.fetch_xor(true, Ordering::Relaxed);
    }

    pub fn ticks(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn heartbeat(&self) -> bool {
        self.heartbeat.load(Ordering::Relaxed)
    }

    /// Only valid while the tick source is stopped.
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
        self.heartbeat.store(false, Ordering::Relaxed);
    }
}
