/*++

Licensed under the Apache-2.0 license.

File Name:

    timer.rs

Abstract:

    File contains the periodic tick timer emulation.

--*/

use romtime::{TickTimer, Ticker};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerClock {
    /// A host thread raises the tick interrupt in real time.
    #[default]
    Wall,
    /// Every read of the tick count advances time by one tick. Makes
    /// countdowns deterministic and instant.
    Polled,
}

pub struct EmuTimer {
    clock: TimerClock,
    ticker: Arc<Ticker>,
    irq_enabled: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl EmuTimer {
    /// Ticks are only delivered while `irq_enabled` is set.
    pub fn new(clock: TimerClock, ticker: Arc<Ticker>, irq_enabled: Arc<AtomicBool>) -> Self {
        Self {
            clock,
            ticker,
            irq_enabled,
            running: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    fn raise(ticker: &Ticker, irq_enabled: &AtomicBool) {
        if irq_enabled.load(Ordering::Relaxed) {
            ticker.on_tick();
        }
    }
}

impl TickTimer for EmuTimer {
    fn start(&mut self, ticks_per_second: u32) {
        self.stop();
        self.ticker.reset();
        self.running.store(true, Ordering::Relaxed);

        if self.clock == TimerClock::Wall {
            let period = Duration::from_secs(1) / ticks_per_second.max(1);
            let ticker = self.ticker.clone();
            let irq_enabled = self.irq_enabled.clone();
            let running = self.running.clone();
            self.thread = Some(std::thread::spawn(move || {
                while running.load(Ordering::Relaxed) {
                    std::thread::sleep(period);
                    if running.load(Ordering::Relaxed) {
                        Self::raise(&ticker, &irq_enabled);
                    }
                }
            }));
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("tick thread panicked");
            }
        }
    }

    fn ticks(&self) -> u32 {
        if self.clock == TimerClock::Polled && self.is_running() {
            Self::raise(&self.ticker, &self.irq_enabled);
        }
        self.ticker.ticks()
    }
}

impl Drop for EmuTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
