use crate::elapsed_ms;

/// Reports a condition only after it has held continuously for a minimum
/// duration. Any interruption restarts the measurement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Debounce {
    active_since: Option<u32>,
}

impl Debounce {
    pub const fn new() -> Self {
        Self { active_since: None }
    }

    pub fn update(&mut self, condition_active: bool, hold_ms: u32, now: u32) -> bool {
        if !condition_active {
            self.active_since = None;
            return false;
        }

        let since = *self.active_since.get_or_insert(now);
        elapsed_ms(now, since) >= hold_ms
    }

    pub fn reset(&mut self) {
        self.active_since = None;
    }
}
