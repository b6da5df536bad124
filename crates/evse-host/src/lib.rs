//! Host-side implementations of the EVSE HAL: clocks, a simulated
//! vehicle and plant, and a file-backed config store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use evse_hal::{MonotonicClock, Watchdog};
use log::error;

pub mod plant;
pub mod store;

pub use plant::{SimulatedPlant, Vehicle};
pub use store::{FileSystemStore, MemoryStore};

/// Wall-clock milliseconds since construction.
#[derive(Clone, Copy)]
pub struct HostClock(Instant);

impl HostClock {
    pub fn new() -> Self {
        Self(Instant::now())
    }
}

impl Default for HostClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for HostClock {
    fn now_ms(&self) -> u32 {
        // Wraps like the hardware counter
        self.0.elapsed().as_millis() as u32
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicU32>);

impl ManualClock {
    pub fn new(start_ms: u32) -> Self {
        Self(Arc::new(AtomicU32::new(start_ms)))
    }

    pub fn advance(&self, ms: u32) {
        // fetch_add wraps on overflow
        self.0.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u32) {
        self.0.store(ms, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now_ms(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Halts by panicking. Lets tests observe the fail-stop.
pub struct PanicWatchdog;

impl Watchdog for PanicWatchdog {
    fn halt(&self) -> ! {
        panic!("watchdog halt");
    }
}

/// Halts the process the way a missed hardware watchdog would.
pub struct AbortWatchdog;

impl Watchdog for AbortWatchdog {
    fn halt(&self) -> ! {
        error!("Watchdog: halting");
        std::process::abort();
    }
}
