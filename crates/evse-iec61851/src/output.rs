#![forbid(unsafe_code)]

use alloc::boxed::Box;
use evse_core::Resistance;
use evse_hal::{LockGate, OutputStage};
use evse_time::Stopwatch;
use log::{debug, warn};

/// Upper bound of the charging band; above it the vehicle stopped drawing.
const CHARGING_BAND_HIGH_OHMS: u32 = 1_790;
const CHARGING_BAND_LOW_OHMS: u32 = 300;
/// Fresh in-band samples required before closing.
const CLOSE_SAMPLES: u8 = 2;
/// Longest wait for the vehicle to stop drawing before opening anyway.
pub const OPEN_UNDER_LOAD_TIMEOUT_MS: u32 = 3_000;

/// What the state machine wants applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRequest {
    pub duty: u16,
    pub close: bool,
}

/// Front-end and diode information the gate decides on.
#[derive(Debug, Clone, Copy)]
pub struct GateView {
    pub cp: Resistance,
    pub counter: u32,
    pub diode_check_pending: bool,
}

/// What actually changed on the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GateActions {
    pub duty_changed: Option<u16>,
    pub toggled: bool,
}

/// Applies pilot and contactor requests with the safety gating in between.
pub struct OutputGate {
    duty: Option<u16>,
    last_counter: u32,
    close_samples: u8,
    open_wait: Stopwatch,
    last_switch: u32,
    switched_under_load: bool,
}

impl OutputGate {
    pub fn new(now: u32) -> Self {
        Self {
            duty: None,
            last_counter: 0,
            close_samples: 0,
            open_wait: Stopwatch::stopped(),
            last_switch: now,
            switched_under_load: false,
        }
    }

    pub fn apply(
        &mut self,
        output: &mut dyn OutputStage,
        lock: &mut Option<Box<dyn LockGate>>,
        request: OutputRequest,
        view: GateView,
        now: u32,
    ) -> GateActions {
        let mut actions = GateActions::default();

        // 1. PILOT
        if self.duty != Some(request.duty) {
            output.set_cp_duty_cycle(request.duty);
            self.duty = Some(request.duty);
            actions.duty_changed = Some(request.duty);
        }

        // 2. CONTACTOR
        let fresh = view.counter != self.last_counter;
        self.last_counter = view.counter;
        let closed = output.contactor_closed();

        if request.close {
            self.open_wait.stop();
            if closed {
                return actions;
            }
            if view.diode_check_pending {
                self.close_samples = 0;
                return actions;
            }
            if fresh {
                if view.cp.is_within(CHARGING_BAND_LOW_OHMS, CHARGING_BAND_HIGH_OHMS) {
                    self.close_samples = self.close_samples.saturating_add(1);
                } else {
                    self.close_samples = 0;
                }
            }
            if self.close_samples < CLOSE_SAMPLES {
                return actions;
            }
            if let Some(lock) = lock.as_mut() {
                if !lock.is_locked() {
                    lock.request_lock(true);
                    return actions;
                }
            }
            self.switch(output, true, now);
            actions.toggled = true;
            return actions;
        }

        self.close_samples = 0;
        if closed {
            if view.cp.is_open_or_above(CHARGING_BAND_HIGH_OHMS) {
                self.open_wait.stop();
                self.switch(output, false, now);
                actions.toggled = true;
            } else {
                self.open_wait.start_if_stopped(now);
                if self.open_wait.has_elapsed(now, OPEN_UNDER_LOAD_TIMEOUT_MS) {
                    warn!("Contactor: vehicle still drawing after {} ms, opening", OPEN_UNDER_LOAD_TIMEOUT_MS);
                    self.switched_under_load = true;
                    self.open_wait.stop();
                    self.switch(output, false, now);
                    actions.toggled = true;
                }
                return actions;
            }
        }

        if let Some(lock) = lock.as_mut() {
            if lock.is_locked() {
                lock.request_lock(false);
            }
        }
        actions
    }

    /// Opens without any gating. Returns whether the contactor moved.
    pub fn force_open(&mut self, output: &mut dyn OutputStage, now: u32) -> bool {
        self.open_wait.stop();
        self.close_samples = 0;
        if !output.contactor_closed() {
            return false;
        }
        self.switch(output, false, now);
        true
    }

    fn switch(&mut self, output: &mut dyn OutputStage, closed: bool, now: u32) {
        debug!("Contactor: {}", if closed { "close" } else { "open" });
        output.set_contactor(closed);
        self.close_samples = 0;
        self.last_switch = now;
    }

    pub fn duty(&self) -> Option<u16> {
        self.duty
    }

    pub fn last_switch(&self) -> u32 {
        self.last_switch
    }

    pub fn switched_under_load(&self) -> bool {
        self.switched_under_load
    }

    pub fn clear_switched_under_load(&mut self) {
        self.switched_under_load = false;
    }
}
