//! Simulated station hardware and vehicle.
//!
//! One shared state sits behind a `spin::Mutex`; the ADC, input, output and
//! lock handles handed to the controller are thin views onto it, and the
//! `SimulatedPlant` itself is the test/scenario side that plugs vehicles in
//! and injects faults.

use std::sync::Arc;

use evse_core::{EvseError, DUTY_CYCLE_OFF};
use evse_hal::{AdcChannel, AdcScanner, DigitalInputs, Input, LockGate, MonotonicClock, OutputStage};
use rand::Rng;
use spin::Mutex;

const PILOT_HIGH_MV: i64 = 12_000;
const PILOT_LOW_MV: i64 = -12_000;
const DIODE_DROP_MV: i64 = 650;
const CP_DIVIDER_OHMS: i64 = 910;
/// A vehicle without a working diode pulls the negative half up.
const BROKEN_DIODE_NEGATIVE_MV: i64 = -9_000;
const PP_OPEN_MV: i64 = 3_333;
const ADC_MAX: i64 = 4_095;

// Self-test response of a healthy residual-current sensor after the test
// current is released
const SENSOR_X6_AFTER_MS: u32 = 100;
const SENSOR_X30_AFTER_MS: u32 = 200;
const SENSOR_RELEASE_AFTER_MS: u32 = 1_000;

/// Electrical model of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vehicle {
    /// CP resistance while connected but not requesting (state B).
    pub connected_ohms: u32,
    /// CP resistance while requesting charge (state C).
    pub charging_ohms: u32,
    /// Cable coding resistor; `None` for a cable without one.
    pub pp_ohms: Option<u32>,
    /// Closes S2 as soon as a PWM is offered.
    pub wants_charge: bool,
    pub diode_ok: bool,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self {
            connected_ohms: 2_740,
            charging_ohms: 882,
            // 32 A cable
            pp_ohms: Some(220),
            wants_charge: true,
            diode_ok: true,
        }
    }
}

struct PlantState {
    vehicle: Option<Vehicle>,
    duty: u16,
    contactor: bool,
    welded: bool,
    mains_live: bool,
    ac_phase: [bool; 2],
    full_scan: bool,
    adc_dead: bool,
    samples: [u32; AdcChannel::COUNT],
    noise: i64,
    cp_attached: bool,
    ext_inputs: [bool; 2],
    locked: bool,
    test_line: bool,
    test_released_at: Option<u32>,
    sensor_healthy: bool,
    sensor_x804: bool,
    /// Static sensor outputs (x6, x30, error) from an injected leak.
    leak: (bool, bool, bool),
}

impl PlantState {
    fn new() -> Self {
        Self {
            vehicle: None,
            duty: DUTY_CYCLE_OFF,
            contactor: false,
            welded: false,
            mains_live: true,
            ac_phase: [false; 2],
            full_scan: true,
            adc_dead: false,
            samples: [0; AdcChannel::COUNT],
            noise: 0,
            cp_attached: true,
            ext_inputs: [false; 2],
            locked: false,
            test_line: false,
            test_released_at: None,
            sensor_healthy: true,
            sensor_x804: false,
            leak: (false, false, false),
        }
    }

    /// Resistance the vehicle presents between CP and PE right now.
    fn cp_load(&self) -> Option<u32> {
        let v = self.vehicle?;
        let pwm_offered = self.duty < DUTY_CYCLE_OFF;
        Some(if v.wants_charge && pwm_offered {
            v.charging_ohms
        } else {
            v.connected_ohms
        })
    }

    fn pilot_mv(&self, ch: AdcChannel, positive_half: bool) -> i64 {
        if !positive_half {
            let broken = matches!(self.vehicle, Some(v) if !v.diode_ok);
            return if broken && ch == AdcChannel::Cp2 {
                BROKEN_DIODE_NEGATIVE_MV
            } else {
                PILOT_LOW_MV
            };
        }
        match (ch, self.cp_load()) {
            (AdcChannel::Cp2, Some(r)) => {
                let r = r as i64;
                (PILOT_HIGH_MV * r + DIODE_DROP_MV * CP_DIVIDER_OHMS) / (r + CP_DIVIDER_OHMS)
            }
            _ => PILOT_HIGH_MV,
        }
    }

    fn sample(&mut self, ch: AdcChannel) -> u16 {
        let n = self.samples[ch.index()];
        self.samples[ch.index()] = n.wrapping_add(1);

        let code = match ch {
            AdcChannel::Cp1 | AdcChannel::Cp2 => {
                // Spread the PWM high time evenly over every ten conversions
                let positive_half = (n % 10) * 100 < self.duty as u32;
                pilot_code(self.pilot_mv(ch, positive_half))
            }
            AdcChannel::Pp => {
                let mv = match self.vehicle.and_then(|v| v.pp_ohms) {
                    Some(r) => {
                        let r = r as i64;
                        10_000 * r / (2_000 + 3 * r)
                    }
                    None => PP_OPEN_MV,
                };
                mv * ADC_MAX / 3_300
            }
            AdcChannel::V12P => PILOT_HIGH_MV * ADC_MAX / (4 * 3_300),
            AdcChannel::V12M => pilot_code(PILOT_LOW_MV),
        };

        let jitter = if self.noise > 0 {
            rand::thread_rng().gen_range(-self.noise..=self.noise)
        } else {
            0
        };
        (code + jitter).clamp(0, ADC_MAX) as u16
    }

    fn ac_line(&mut self, n: usize, live: bool) -> bool {
        if !live {
            return false;
        }
        // Optocoupler follows the mains half-waves
        self.ac_phase[n] = !self.ac_phase[n];
        self.ac_phase[n]
    }

    fn sensor_response(&self, input: Input, now: u32) -> bool {
        if !self.sensor_healthy {
            return false;
        }
        let Some(released) = self.test_released_at else {
            return false;
        };
        let t = now.wrapping_sub(released);
        match input {
            Input::DcX6 => (SENSOR_X6_AFTER_MS..SENSOR_RELEASE_AFTER_MS).contains(&t),
            Input::DcX30 => (SENSOR_X30_AFTER_MS..SENSOR_RELEASE_AFTER_MS).contains(&t),
            Input::DcError => {
                self.sensor_x804 && (SENSOR_X30_AFTER_MS..SENSOR_RELEASE_AFTER_MS).contains(&t)
            }
            _ => false,
        }
    }
}

/// Inverse of the pilot channel transform.
fn pilot_code(mv: i64) -> i64 {
    (mv * 75 + 990_000) * ADC_MAX / 1_980_000
}

/// Scenario side of the simulation.
#[derive(Clone)]
pub struct SimulatedPlant {
    state: Arc<Mutex<PlantState>>,
    clock: Arc<dyn MonotonicClock>,
}

impl SimulatedPlant {
    pub fn new(clock: Arc<dyn MonotonicClock>) -> Self {
        Self { state: Arc::new(Mutex::new(PlantState::new())), clock }
    }

    pub fn adc(&self) -> Box<dyn AdcScanner> {
        Box::new(PlantAdc(self.state.clone()))
    }

    pub fn inputs(&self) -> Box<dyn DigitalInputs> {
        Box::new(PlantInputs { state: self.state.clone(), clock: self.clock.clone() })
    }

    pub fn output(&self) -> Box<dyn OutputStage> {
        Box::new(PlantOutput { state: self.state.clone(), clock: self.clock.clone() })
    }

    pub fn lock(&self) -> Box<dyn LockGate> {
        Box::new(PlantLock(self.state.clone()))
    }

    pub fn plug_in(&self, vehicle: Vehicle) {
        self.state.lock().vehicle = Some(vehicle);
    }

    pub fn unplug(&self) {
        self.state.lock().vehicle = None;
    }

    pub fn vehicle(&self) -> Option<Vehicle> {
        self.state.lock().vehicle
    }

    /// Vehicle opens or closes S2.
    pub fn set_wants_charge(&self, wants: bool) {
        if let Some(v) = self.state.lock().vehicle.as_mut() {
            v.wants_charge = wants;
        }
    }

    pub fn set_diode_ok(&self, ok: bool) {
        if let Some(v) = self.state.lock().vehicle.as_mut() {
            v.diode_ok = ok;
        }
    }

    /// Residual current seen by the sensor, as its (x6, x30, error) outputs.
    pub fn inject_leak(&self, x6: bool, x30: bool, error: bool) {
        self.state.lock().leak = (x6, x30, error);
    }

    pub fn clear_leak(&self) {
        self.inject_leak(false, false, false);
    }

    pub fn set_sensor_healthy(&self, healthy: bool) {
        self.state.lock().sensor_healthy = healthy;
    }

    pub fn set_sensor_x804(&self, x804: bool) {
        self.state.lock().sensor_x804 = x804;
    }

    pub fn set_welded(&self, welded: bool) {
        self.state.lock().welded = welded;
    }

    pub fn set_mains(&self, live: bool) {
        self.state.lock().mains_live = live;
    }

    /// The converter stops producing results.
    pub fn stall_adc(&self) {
        self.state.lock().adc_dead = true;
    }

    /// Peak ADC noise in codes.
    pub fn set_noise(&self, codes: u16) {
        self.state.lock().noise = codes as i64;
    }

    pub fn set_cp_attached(&self, attached: bool) {
        self.state.lock().cp_attached = attached;
    }

    pub fn set_ext_input(&self, n: usize, level: bool) {
        if let Some(l) = self.state.lock().ext_inputs.get_mut(n) {
            *l = level;
        }
    }

    pub fn duty(&self) -> u16 {
        self.state.lock().duty
    }

    pub fn contactor(&self) -> bool {
        self.state.lock().contactor
    }

    pub fn locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn test_line_active(&self) -> bool {
        self.state.lock().test_line
    }

    pub fn full_scan(&self) -> bool {
        self.state.lock().full_scan
    }
}

struct PlantAdc(Arc<Mutex<PlantState>>);

impl AdcScanner for PlantAdc {
    fn poll(&mut self, channel: AdcChannel) -> nb::Result<u16, EvseError> {
        let mut s = self.0.lock();
        if s.adc_dead || (!s.full_scan && !channel.is_pilot()) {
            return Err(nb::Error::WouldBlock);
        }
        Ok(s.sample(channel))
    }

    fn set_full_scan(&mut self, enabled: bool) {
        self.0.lock().full_scan = enabled;
    }
}

struct PlantInputs {
    state: Arc<Mutex<PlantState>>,
    clock: Arc<dyn MonotonicClock>,
}

impl DigitalInputs for PlantInputs {
    fn read(&self, input: Input) -> bool {
        let now = self.clock.now_ms();
        let mut s = self.state.lock();
        match input {
            Input::Ac1 => {
                let live = s.mains_live;
                s.ac_line(0, live)
            }
            Input::Ac2 => {
                let live = s.mains_live && (s.contactor || s.welded);
                s.ac_line(1, live)
            }
            Input::DcX6 => s.leak.0 || s.sensor_response(input, now),
            Input::DcX30 => s.leak.1 || s.sensor_response(input, now),
            Input::DcError => s.leak.2 || s.sensor_response(input, now),
            Input::CpConnected => s.cp_attached,
            Input::ExtInput0 => s.ext_inputs[0],
            Input::ExtInput1 => s.ext_inputs[1],
        }
    }
}

struct PlantOutput {
    state: Arc<Mutex<PlantState>>,
    clock: Arc<dyn MonotonicClock>,
}

impl OutputStage for PlantOutput {
    fn set_cp_duty_cycle(&mut self, duty: u16) {
        self.state.lock().duty = duty;
    }

    fn set_contactor(&mut self, closed: bool) {
        self.state.lock().contactor = closed;
    }

    fn contactor_closed(&self) -> bool {
        self.state.lock().contactor
    }

    fn set_fault_test_line(&mut self, active: bool) {
        let now = self.clock.now_ms();
        let mut s = self.state.lock();
        if s.test_line && !active {
            s.test_released_at = Some(now);
        }
        s.test_line = active;
    }
}

/// Lock motor that engages instantly.
struct PlantLock(Arc<Mutex<PlantState>>);

impl LockGate for PlantLock {
    fn is_locked(&self) -> bool {
        self.0.lock().locked
    }

    fn request_lock(&mut self, locked: bool) {
        self.0.lock().locked = locked;
    }
}
