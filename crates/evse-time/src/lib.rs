#![no_std]
#![forbid(unsafe_code)]

mod debounce;
pub use debounce::Debounce;

/// Milliseconds from `since` to `now` across counter wraparound.
#[inline]
pub fn elapsed_ms(now: u32, since: u32) -> u32 {
    now.wrapping_sub(since)
}

#[inline]
pub fn is_elapsed(now: u32, since: u32, period_ms: u32) -> bool {
    elapsed_ms(now, since) >= period_ms
}

/// A timer that is either stopped or counting from a start timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stopwatch {
    started_at: Option<u32>,
}

impl Stopwatch {
    pub const fn stopped() -> Self {
        Self { started_at: None }
    }

    pub const fn started(now: u32) -> Self {
        Self { started_at: Some(now) }
    }

    /// (Re)starts from `now`.
    pub fn start(&mut self, now: u32) {
        self.started_at = Some(now);
    }

    pub fn start_if_stopped(&mut self, now: u32) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Zero while stopped.
    pub fn elapsed(&self, now: u32) -> u32 {
        match self.started_at {
            Some(t) => elapsed_ms(now, t),
            None => 0,
        }
    }

    /// Never true while stopped.
    pub fn has_elapsed(&self, now: u32, period_ms: u32) -> bool {
        match self.started_at {
            Some(t) => is_elapsed(now, t, period_ms),
            None => false,
        }
    }
}
