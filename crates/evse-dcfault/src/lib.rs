#![no_std]
#![forbid(unsafe_code)]

mod state;

pub use state::{classify, FaultState, SensorLines, SensorVariant};

use evse_core::{AuthToken, EvseError, EvseResult, Resistance, DC_FAULT_RESET_TOKEN};
use evse_hal::{DigitalInputs, Input, OutputStage};
use evse_time::{elapsed_ms, is_elapsed, Debounce, Stopwatch};
use log::{error, info, warn};

/// Sensor outputs must hold this long to count.
pub const DEBOUNCE_MS: u32 = 50;
/// Self-test at least once a day.
pub const SELF_TEST_INTERVAL_MS: u32 = 24 * 60 * 60 * 1000;
/// Quiet time after a contactor switch before a self-test may start.
pub const SWITCH_QUIET_MS: u32 = 1_000;
/// Above this the pilot sees no vehicle.
const NO_VEHICLE_OHMS: u32 = 10_000;

// Self-test timing per step
const TEST_PULSE_MS: u32 = 250;
const X6_TIMEOUT_MS: u32 = 740;
const X30_TIMEOUT_MS: u32 = 660;
const VARIANT_PROBE_MS: u32 = 400;
const RELEASE_MS: u32 = 1_200;
const STEP_DONE: u8 = 5;

/// What the monitor needs to know about the rest of the station.
#[derive(Debug, Clone, Copy)]
pub struct DcFaultView {
    pub contactor_closed: bool,
    pub cp: Resistance,
    /// Timestamp of the last contactor toggle.
    pub last_switch: u32,
}

impl DcFaultView {
    /// Contactor open, nobody plugged in, no recent switching.
    pub fn allows_self_test(&self, now: u32) -> bool {
        !self.contactor_closed
            && self.cp.is_open_or_above(NO_VEHICLE_OHMS)
            && is_elapsed(now, self.last_switch, SWITCH_QUIET_MS)
    }
}

/// Returned once when the monitor enters a non-normal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultTrip {
    pub state: FaultState,
}

#[derive(Debug, Clone, Copy)]
struct Calibration {
    step: u8,
    since: u32,
}

pub struct DcFaultMonitor {
    state: FaultState,
    variant: SensorVariant,
    raw: SensorLines,
    lines: SensorLines,
    x6: Debounce,
    x30: Debounce,
    err: Debounce,
    calibration: Option<Calibration>,
    self_test_requested: bool,
    last_self_test: Stopwatch,
}

impl DcFaultMonitor {
    /// A self-test is requested right away and runs once allowed.
    pub fn new() -> Self {
        Self {
            state: FaultState::Normal,
            variant: SensorVariant::X904,
            raw: SensorLines::default(),
            lines: SensorLines::default(),
            x6: Debounce::new(),
            x30: Debounce::new(),
            err: Debounce::new(),
            calibration: None,
            self_test_requested: true,
            last_self_test: Stopwatch::stopped(),
        }
    }

    pub fn tick(
        &mut self,
        inputs: &dyn DigitalInputs,
        output: &mut dyn OutputStage,
        view: &DcFaultView,
        now: u32,
    ) -> Option<FaultTrip> {
        // 1. SAMPLE & DEBOUNCE
        self.raw = SensorLines {
            x6: inputs.read(Input::DcX6),
            x30: inputs.read(Input::DcX30),
            error: inputs.read(Input::DcError),
        };
        self.lines = SensorLines {
            x6: self.x6.update(self.raw.x6, DEBOUNCE_MS, now),
            x30: self.x30.update(self.raw.x30, DEBOUNCE_MS, now),
            error: self.err.update(self.raw.error, DEBOUNCE_MS, now),
        };

        // 2. SELF-TEST IN PROGRESS
        // The sensor outputs are driven by the test, so no classification.
        if let Some(cal) = self.calibration {
            return self.step_calibration(cal, output, now);
        }

        // 3. LATCHED
        if !self.state.is_normal() {
            return None;
        }

        // 4. CLASSIFY
        let state = classify(self.variant, self.lines);
        if !state.is_normal() {
            self.state = state;
            error!("DC fault: {:?} (lines {:?}, sensor {:?})", state, self.lines, self.variant);
            return Some(FaultTrip { state });
        }

        // 5. SCHEDULE SELF-TEST
        if self.last_self_test.has_elapsed(now, SELF_TEST_INTERVAL_MS) {
            self.self_test_requested = true;
        }
        if self.self_test_requested && view.allows_self_test(now) {
            self.begin_self_test(output, now);
        }
        None
    }

    fn begin_self_test(&mut self, output: &mut dyn OutputStage, now: u32) {
        info!("DC fault: self-test started");
        self.self_test_requested = false;
        output.set_fault_test_line(true);
        self.calibration = Some(Calibration { step: 0, since: now });
    }

    fn advance(&mut self, step: u8, now: u32) {
        self.calibration = Some(Calibration { step, since: now });
    }

    fn step_calibration(
        &mut self,
        cal: Calibration,
        output: &mut dyn OutputStage,
        now: u32,
    ) -> Option<FaultTrip> {
        let elapsed = elapsed_ms(now, cal.since);
        match cal.step {
            // Test current on
            0 => {
                if elapsed >= TEST_PULSE_MS {
                    output.set_fault_test_line(false);
                    self.advance(1, now);
                }
            }
            // Sensor must report the 6 mA threshold
            1 => {
                if self.lines.x6 {
                    self.advance(2, now);
                } else if elapsed >= X6_TIMEOUT_MS {
                    return self.fail(1, output);
                }
            }
            // ... then the X30 (20 mA AC) output
            2 => {
                if self.lines.x30 {
                    self.advance(3, now);
                } else if elapsed >= X30_TIMEOUT_MS {
                    return self.fail(2, output);
                }
            }
            // Only the X804 raises its error line during the test
            3 => {
                if elapsed >= VARIANT_PROBE_MS {
                    self.variant = if self.lines.error {
                        SensorVariant::X804
                    } else {
                        SensorVariant::X904
                    };
                    self.advance(4, now);
                }
            }
            4 => {
                if elapsed >= RELEASE_MS {
                    if self.lines.x6 || self.lines.x30 {
                        return self.fail(4, output);
                    }
                    self.advance(STEP_DONE, now);
                }
            }
            _ => {
                self.calibration = None;
                self.state = FaultState::Normal;
                self.last_self_test.start(now);
                info!("DC fault: self-test passed, sensor {:?}", self.variant);
            }
        }
        None
    }

    fn fail(&mut self, step: u8, output: &mut dyn OutputStage) -> Option<FaultTrip> {
        output.set_fault_test_line(false);
        self.calibration = None;
        let state = FaultState::CalibrationError { step };
        self.state = state;
        error!("DC fault: self-test failed at step {} (lines {:?})", step, self.lines);
        Some(FaultTrip { state })
    }

    /// Explicit self-test request. Only accepted while the station is idle.
    pub fn request_self_test(&mut self, view: &DcFaultView, now: u32) -> EvseResult<()> {
        if !self.state.is_normal() {
            return Err(EvseError::InvalidState);
        }
        if self.calibration.is_some() {
            return Ok(());
        }
        if !view.allows_self_test(now) {
            warn!("DC fault: self-test refused, station not idle");
            return Err(EvseError::PreconditionFailed);
        }
        self.self_test_requested = true;
        Ok(())
    }

    /// Queue a self-test for the next idle period.
    pub fn schedule_self_test(&mut self) {
        self.self_test_requested = true;
    }

    /// Clears a latched fault and re-tests the sensor immediately. Without a
    /// latched fault there is nothing to clear and the contactor may be
    /// closed, so no test is started.
    pub fn reset(
        &mut self,
        token: &AuthToken,
        output: &mut dyn OutputStage,
        now: u32,
    ) -> EvseResult<()> {
        if !token.matches(DC_FAULT_RESET_TOKEN) {
            warn!("DC fault: reset with invalid token");
            return Err(EvseError::AuthFail);
        }
        if self.state.is_normal() {
            info!("DC fault: reset without latched fault, ignored");
            return Ok(());
        }
        info!("DC fault: reset from {:?}", self.state);
        self.state = FaultState::Normal;
        self.begin_self_test(output, now);
        Ok(())
    }

    pub fn state(&self) -> FaultState {
        self.state
    }

    pub fn variant(&self) -> SensorVariant {
        self.variant
    }

    /// Debounced levels.
    pub fn lines(&self) -> SensorLines {
        self.lines
    }

    pub fn raw_lines(&self) -> SensorLines {
        self.raw
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibration.is_some()
    }

    pub fn calibration_step(&self) -> Option<u8> {
        self.calibration.map(|c| c.step)
    }

    pub fn self_test_pending(&self) -> bool {
        self.self_test_requested
    }

    /// `None` until the first self-test passed.
    pub fn time_since_self_test(&self, now: u32) -> Option<u32> {
        self.last_self_test
            .is_running()
            .then(|| self.last_self_test.elapsed(now))
    }
}

impl Default for DcFaultMonitor {
    fn default() -> Self {
        Self::new()
    }
}
