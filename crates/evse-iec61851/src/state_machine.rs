#![forbid(unsafe_code)]

use crate::duty::duty_cycle_for_ma;
use evse_core::{ChargeState, Indicator, JumperConfig, MilliAmps, Resistance, DUTY_CYCLE_OFF};
use evse_time::{is_elapsed, Stopwatch};
use log::{info, warn};

/// No charging for this long after an error state.
pub const ERROR_COOLDOWN_MS: u32 = 30_000;
/// No charging for this long after the vehicle left C.
pub const RESTART_DELAY_MS: u32 = 5_000;

// Diode check
const DIODE_ERROR_HOLD: u16 = 100;
const DIODE_OK_TICKS: u16 = 100;
const DIODE_FRESH_WINDOWS: u8 = 3;
const DIODE_NEGATIVE_LIMIT_MV: i32 = -10_000;
const DIODE_MAX_SPREAD_MV: i32 = 2_000;

/// CP resistance thresholds towards A, B, C and D.
const CP_THRESHOLDS: [u32; 4] = [10_000, 1_790, 300, 150];

/// 10 % hysteresis between neighbouring states (IEC 61851-1 A.4.11),
/// indexed by the current state.
const CP_THRESHOLDS_HYSTERESIS: [[u32; 4]; 5] = [
    // from A
    [9_000, 1_790, 300, 150],
    // from B
    [11_000, 1_611, 300, 150],
    // from C
    [10_000, 1_969, 270, 150],
    // from D
    [10_000, 1_790, 330, 135],
    // from EF
    [10_000, 1_790, 300, 165],
];

/// Pilot readings from the front-end for one evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PilotView {
    pub cp: Resistance,
    pub cp1_negative_mv: i32,
    pub cp2_negative_mv: i32,
    /// Completed negative-half windows per CP channel.
    pub cp1_negative_updates: u16,
    pub cp2_negative_updates: u16,
    pub ignore_pending: bool,
    /// No CP resistance derived yet.
    pub settling: bool,
    /// Pilot contact attached and settled.
    pub connected: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct Conditions {
    pub dc_fault: bool,
    pub contactor_error: u8,
    pub jumper: JumperConfig,
    pub allowed_ma: MilliAmps,
    pub pilot: PilotView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ChargeState,
    pub to: ChargeState,
}

impl Transition {
    /// The vehicle went away.
    pub fn is_disconnect(&self) -> bool {
        self.from != ChargeState::A && self.to == ChargeState::A
    }
}

/// Detects a missing or shorted vehicle diode from the negative pilot half.
#[derive(Debug, Clone, Copy)]
struct DiodeCheck {
    error_counter: u16,
    pending: bool,
    ok_counter: u16,
    last_update: [Option<u16>; 2],
    fresh: [u8; 2],
}

impl DiodeCheck {
    fn armed(pending: bool) -> Self {
        Self {
            error_counter: 0,
            pending,
            ok_counter: 0,
            last_update: [None; 2],
            fresh: [0; 2],
        }
    }

    /// With an intact diode the negative half sits near -12 V on both paths.
    fn mismatch(pilot: &PilotView) -> bool {
        let (cp1, cp2) = (pilot.cp1_negative_mv, pilot.cp2_negative_mv);
        cp1 != 0
            && cp2 != 0
            && (cp1 > DIODE_NEGATIVE_LIMIT_MV || (cp1 - cp2).abs() > DIODE_MAX_SPREAD_MV)
    }

    /// Clears the pending check after enough clean negative windows.
    fn track_ok(&mut self, pilot: &PilotView) {
        if self.pending && self.ok_counter > DIODE_OK_TICKS {
            *self = DiodeCheck::armed(false);
            return;
        }

        let updates = [pilot.cp1_negative_updates, pilot.cp2_negative_updates];
        if self.fresh.iter().any(|&n| n < DIODE_FRESH_WINDOWS) {
            for (n, &update) in updates.iter().enumerate() {
                if self.last_update[n] != Some(update) {
                    self.last_update[n] = Some(update);
                    self.fresh[n] = self.fresh[n].saturating_add(1);
                }
            }
        } else {
            self.ok_counter = self.ok_counter.saturating_add(1);
        }
    }
}

pub struct Iec61851 {
    state: ChargeState,
    indicator: Indicator,
    hysteresis: bool,
    diode: DiodeCheck,
    last_state_change: u32,
    /// Start of the post-error cool-down.
    last_error: Option<u32>,
    last_c_end: Option<u32>,
    charging: Stopwatch,
    /// Last refused target, to log a refusal once.
    refused: Option<ChargeState>,
}

impl Iec61851 {
    pub fn new(hysteresis: bool, now: u32) -> Self {
        Self {
            state: ChargeState::A,
            indicator: Indicator::Ok,
            hysteresis,
            diode: DiodeCheck::armed(true),
            last_state_change: now,
            last_error: None,
            last_c_end: None,
            charging: Stopwatch::stopped(),
            refused: None,
        }
    }

    pub fn evaluate(&mut self, cond: &Conditions, now: u32) -> Option<Transition> {
        let from = self.state;
        self.step(cond, now);
        (self.state != from).then_some(Transition { from, to: self.state })
    }

    fn step(&mut self, cond: &Conditions, now: u32) {
        let pilot = &cond.pilot;

        // 1. INTERLOCKS
        if cond.dc_fault {
            self.indicator = Indicator::DcFault;
            self.set_state(ChargeState::EF, now);
            return;
        }
        if cond.contactor_error != 0 {
            self.indicator = Indicator::Contactor;
            self.set_state(ChargeState::EF, now);
            return;
        }
        if !cond.jumper.is_configured() {
            self.indicator = Indicator::Configuration;
            self.set_state(ChargeState::EF, now);
            return;
        }

        // 2. DIODE CHECK
        let offering = matches!(self.state, ChargeState::B | ChargeState::C);
        if offering
            && pilot.connected
            && !pilot.settling
            && cond.allowed_ma > 0
            && DiodeCheck::mismatch(pilot)
        {
            if pilot.ignore_pending {
                return;
            }
            if self.state == ChargeState::B || self.diode.error_counter >= DIODE_ERROR_HOLD {
                // Fall back to B without the usual transition bookkeeping
                self.diode.error_counter = DIODE_ERROR_HOLD;
                self.indicator = Indicator::Pilot;
                if self.state != ChargeState::B {
                    warn!(
                        "IEC 61851: diode check failed (CP1 {} mV, CP2 {} mV), back to B",
                        pilot.cp1_negative_mv, pilot.cp2_negative_mv
                    );
                    self.state = ChargeState::B;
                    self.last_state_change = now;
                }
            } else {
                // Glitch filter while charging
                self.diode.error_counter += 1;
            }
            return;
        }

        // 3. RESISTANCE MAPPING
        if pilot.ignore_pending || pilot.settling {
            return;
        }
        if offering {
            self.diode.track_ok(pilot);
        }
        if self.diode.error_counter > 0 {
            self.diode.error_counter -= 1;
            if self.diode.error_counter > 0 {
                return;
            }
            self.indicator = Indicator::Ok;
        }
        if !pilot.connected {
            return;
        }

        let [to_a, to_b, to_c, to_d] = self.thresholds();
        let target = match pilot.cp {
            Resistance::Invalid => ChargeState::A,
            Resistance::Ohms(r) if r > to_a => ChargeState::A,
            Resistance::Ohms(r) if r > to_b => ChargeState::B,
            Resistance::Ohms(r) if r > to_c => {
                if cond.allowed_ma == 0 {
                    ChargeState::B
                } else {
                    ChargeState::C
                }
            }
            Resistance::Ohms(r) if r > to_d => {
                self.indicator = Indicator::Pilot;
                ChargeState::D
            }
            Resistance::Ohms(_) => {
                self.indicator = Indicator::Pilot;
                ChargeState::EF
            }
        };
        self.set_state(target, now);
    }

    fn thresholds(&self) -> [u32; 4] {
        if self.hysteresis {
            CP_THRESHOLDS_HYSTERESIS[self.state.code() as usize]
        } else {
            CP_THRESHOLDS
        }
    }

    fn set_state(&mut self, target: ChargeState, now: u32) {
        // Cool-down runs from the last time EF was asserted
        if target == ChargeState::EF {
            self.last_error = Some(now);
        }
        if target == self.state {
            return;
        }
        let from = self.state;

        if from == ChargeState::D && self.last_error.is_none() {
            self.last_error = Some(now);
        }
        if target == ChargeState::C {
            if let Some(since) = self.last_error {
                if !is_elapsed(now, since, ERROR_COOLDOWN_MS) {
                    self.refuse(target, "error cool-down");
                    return;
                }
                self.last_error = None;
            }
        }

        if from == ChargeState::C {
            self.last_c_end = Some(now);
        }
        if target == ChargeState::C {
            if let Some(since) = self.last_c_end {
                if !is_elapsed(now, since, RESTART_DELAY_MS) {
                    self.refuse(target, "restart delay");
                    return;
                }
                self.last_c_end = None;
            }
        }

        match target {
            ChargeState::A | ChargeState::B => self.indicator = Indicator::Ok,
            ChargeState::C => self.charging.start_if_stopped(now),
            _ => {}
        }
        if from != ChargeState::A && target == ChargeState::A {
            self.charging.stop();
        }
        // Contactor stays open until the next diode check passed
        if target.is_idle_like() {
            self.diode = DiodeCheck::armed(true);
        }

        info!("IEC 61851: {:?} -> {:?}", from, target);
        self.refused = None;
        self.state = target;
        self.last_state_change = now;
    }

    fn refuse(&mut self, target: ChargeState, reason: &str) {
        if self.refused != Some(target) {
            warn!("IEC 61851: {:?} -> {:?} refused ({})", self.state, target, reason);
            self.refused = Some(target);
        }
    }

    /// Emergency entry into EF, used by the DC fault path.
    pub fn force_error(&mut self, indicator: Indicator, now: u32) -> Option<Transition> {
        let from = self.state;
        self.indicator = indicator;
        self.set_state(ChargeState::EF, now);
        (self.state != from).then_some(Transition { from, to: self.state })
    }

    /// Pilot duty cycle and contactor request for the current state.
    pub fn output(&self, allowed_ma: MilliAmps) -> (u16, bool) {
        match self.state {
            ChargeState::A | ChargeState::D | ChargeState::EF => (DUTY_CYCLE_OFF, false),
            ChargeState::B => (duty_cycle_for_ma(u32::from(allowed_ma)), false),
            ChargeState::C => (duty_cycle_for_ma(u32::from(allowed_ma)), true),
        }
    }

    pub fn state(&self) -> ChargeState {
        self.state
    }

    pub fn indicator(&self) -> Indicator {
        self.indicator
    }

    pub fn diode_check_pending(&self) -> bool {
        self.diode.pending
    }

    /// A diode mismatch is being held.
    pub fn diode_error_active(&self) -> bool {
        self.diode.error_counter > 0
    }

    /// Time since charging started in this session, 0 when not charging yet.
    pub fn charging_time(&self, now: u32) -> u32 {
        self.charging.elapsed(now)
    }

    pub fn last_state_change(&self) -> u32 {
        self.last_state_change
    }
}
