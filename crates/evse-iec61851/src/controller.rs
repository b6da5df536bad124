#![forbid(unsafe_code)]

use alloc::boxed::Box;
use log::{error, info, warn};

use evse_adc::FrontEnd;
use evse_contactor::ContactorCheck;
use evse_core::{
    AuthToken, ChargeState, EvseConfig, EvseResult, Indicator, InputConfig, MilliAmps, Slot,
    DUTY_CYCLE_OFF, SLOT_COUNT,
};
use evse_dcfault::{DcFaultMonitor, DcFaultView};
use evse_hal::{
    AdcChannel, AdcScanner, ConfigStore, DigitalInputs, Input, LockGate, MonotonicClock,
    OutputStage, Watchdog,
};
use evse_slots::{SlotInputs, SlotTable};
use evse_time::{elapsed_ms, is_elapsed};

use crate::output::{GateView, OutputGate, OutputRequest};
use crate::snapshot::{vehicle_state, ChannelReading, EvseSnapshot};
use crate::state_machine::{Conditions, Iec61851, PilotView, Transition};

/// Windows discarded after a duty-cycle change.
const IGNORE_AFTER_DUTY_CHANGE: u8 = 2;
/// Windows discarded after a contactor toggle.
const IGNORE_AFTER_SWITCH: u8 = 4;
/// Contactor-check windows skipped after a toggle.
const SUPPRESS_AFTER_SWITCH: u8 = 5;
/// A re-attached pilot contact must be stable this long.
pub const CP_CONNECT_SETTLE_MS: u32 = 500;

/// Hardware the controller owns.
pub struct EvseHal {
    pub adc: Box<dyn AdcScanner>,
    pub inputs: Box<dyn DigitalInputs>,
    pub output: Box<dyn OutputStage>,
    pub clock: Box<dyn MonotonicClock>,
    pub store: Box<dyn ConfigStore>,
    pub lock: Option<Box<dyn LockGate>>,
    pub watchdog: Box<dyn Watchdog>,
}

/// Owns every component and sequences them once per main-loop pass.
pub struct EvseController {
    hal: EvseHal,
    config: EvseConfig,

    front_end: FrontEnd,
    contactor: ContactorCheck,
    slots: SlotTable,
    dc_fault: DcFaultMonitor,
    iec: Iec61851,
    gate: OutputGate,

    boot: u32,
    settled: bool,
    cp_attached_since: Option<u32>,
}

impl EvseController {
    /// `slot_defaults` are the restored persisted defaults, or
    /// `evse_slots::factory_defaults()`.
    pub fn new(hal: EvseHal, config: EvseConfig, slot_defaults: [Slot; SLOT_COUNT]) -> Self {
        let now = hal.clock.now_ms();
        let contactor = ContactorCheck::new(&*hal.inputs, now);

        info!(
            "EVSE: jumper {:?} ({} mA), inputs {:?}, hysteresis {}",
            config.jumper,
            config.jumper.max_current_ma(config.software_current_ma),
            config.inputs,
            config.cp_hysteresis
        );

        Self {
            front_end: FrontEnd::new(now),
            contactor,
            slots: SlotTable::new(slot_defaults, config.inputs),
            dc_fault: DcFaultMonitor::new(),
            iec: Iec61851::new(config.cp_hysteresis, now),
            gate: OutputGate::new(now),
            boot: now,
            settled: false,
            cp_attached_since: None,
            hal,
            config,
        }
    }

    /// One control cycle. Returns the state transition it caused, if any.
    pub fn tick(&mut self) -> Option<Transition> {
        let now = self.hal.clock.now_ms();
        let mut transition = None;

        // 1. FRONT-END
        if let Err(e) = self.front_end.sample_tick(&mut *self.hal.adc, now) {
            error!("EVSE: front-end failed ({}), halting", e);
            self.hal.watchdog.halt();
        }
        let measurement = self.front_end.measurement();
        let contactor_closed = self.hal.output.contactor_closed();

        // 2. CONTACTOR CHECK
        self.contactor.tick(&*self.hal.inputs, contactor_closed, now);

        // 3. ARBITRATION
        let slot_inputs = SlotInputs {
            jumper: self.config.jumper,
            software_current_ma: self.config.software_current_ma,
            pp: measurement.pp,
            input_levels: [
                self.hal.inputs.read(Input::ExtInput0),
                self.hal.inputs.read(Input::ExtInput1),
            ],
        };
        self.slots.recompute(&slot_inputs);
        let allowed = self.slots.effective_current();

        // 4. DC FAULT
        let view = self.dc_fault_view(contactor_closed);
        if let Some(trip) =
            self.dc_fault
                .tick(&*self.hal.inputs, &mut *self.hal.output, &view, now)
        {
            error!("EVSE: DC fault {:?}, contactor forced open", trip.state);
            if self.gate.force_open(&mut *self.hal.output, now) {
                self.after_switch();
            }
            transition = self.iec.force_error(Indicator::DcFault, now);
        }

        // 5. STATE MACHINE
        // Held while booting and while the fault sensor is under test
        let attached = self.pilot_attached(now);
        if self.is_settled(now) && !self.dc_fault.is_calibrating() {
            let conditions = Conditions {
                dc_fault: !self.dc_fault.state().is_normal(),
                contactor_error: self.contactor.error(),
                jumper: self.config.jumper,
                allowed_ma: allowed,
                pilot: self.pilot_view(attached),
            };
            if let Some(t) = self.iec.evaluate(&conditions, now) {
                if t.is_disconnect() {
                    self.on_disconnect();
                }
                transition = Some(t);
            }
        }

        // 6. OUTPUT
        let (duty, close) = self.iec.output(allowed);
        let request = OutputRequest {
            duty,
            close: close && !self.dc_fault.is_calibrating(),
        };
        let gate_view = GateView {
            cp: measurement.cp,
            counter: measurement.counter,
            diode_check_pending: self.iec.diode_check_pending(),
        };
        let actions = self.gate.apply(
            &mut *self.hal.output,
            &mut self.hal.lock,
            request,
            gate_view,
            now,
        );
        if let Some(duty) = actions.duty_changed {
            self.front_end.ignore_all(IGNORE_AFTER_DUTY_CHANGE);
            self.front_end
                .enable_full_channel_set(&mut *self.hal.adc, duty == DUTY_CYCLE_OFF);
        }
        if actions.toggled {
            self.after_switch();
        }

        // 7. PERSIST
        if let Some(defaults) = self.slots.take_persist_request() {
            if let Err(e) = self.hal.store.persist_slot_defaults(&defaults) {
                warn!("EVSE: persisting slot defaults failed: {}", e);
            }
        }

        transition
    }

    fn is_settled(&mut self, now: u32) -> bool {
        if !self.settled && is_elapsed(now, self.boot, self.config.startup_settle_ms) {
            info!("EVSE: start-up settle done");
            self.settled = true;
        }
        self.settled
    }

    fn pilot_attached(&mut self, now: u32) -> bool {
        if !self.hal.inputs.read(Input::CpConnected) {
            self.cp_attached_since = None;
            return false;
        }
        let since = *self.cp_attached_since.get_or_insert(now);
        is_elapsed(now, since, CP_CONNECT_SETTLE_MS)
    }

    fn pilot_view(&self, connected: bool) -> PilotView {
        let cp1 = self.front_end.channel(AdcChannel::Cp1);
        let cp2 = self.front_end.channel(AdcChannel::Cp2);
        PilotView {
            cp: self.front_end.measurement().cp,
            cp1_negative_mv: cp1.negative_millivolts(),
            cp2_negative_mv: cp2.negative_millivolts(),
            cp1_negative_updates: cp1.negative_updates(),
            cp2_negative_updates: cp2.negative_updates(),
            ignore_pending: self.front_end.ignore_pending(),
            settling: self.front_end.is_settling(),
            connected,
        }
    }

    fn dc_fault_view(&self, contactor_closed: bool) -> DcFaultView {
        DcFaultView {
            contactor_closed,
            cp: self.front_end.measurement().cp,
            last_switch: self.gate.last_switch(),
        }
    }

    fn after_switch(&mut self) {
        self.front_end.ignore_all(IGNORE_AFTER_SWITCH);
        self.contactor.suppress(SUPPRESS_AFTER_SWITCH);
    }

    fn on_disconnect(&mut self) {
        info!("EVSE: vehicle disconnected");
        self.slots.handle_disconnect();
        self.dc_fault.schedule_self_test();
        self.gate.clear_switched_under_load();
    }

    // Commands

    pub fn set_slot(
        &mut self,
        index: usize,
        max_current_ma: MilliAmps,
        active: bool,
        clear_on_disconnect: bool,
    ) -> EvseResult<()> {
        self.slots.set(index, max_current_ma, active, clear_on_disconnect)
    }

    pub fn get_slot(&self, index: usize) -> EvseResult<Slot> {
        self.slots.get(index)
    }

    pub fn set_slot_default(
        &mut self,
        index: usize,
        max_current_ma: MilliAmps,
        active: bool,
        clear_on_disconnect: bool,
    ) -> EvseResult<()> {
        self.slots.set_default(index, max_current_ma, active, clear_on_disconnect)
    }

    pub fn get_slot_default(&self, index: usize) -> EvseResult<Slot> {
        self.slots.get_default(index)
    }

    /// Clears a latched DC fault. The sensor is re-tested right away.
    pub fn reset_dc_fault(&mut self, token: &AuthToken) -> EvseResult<()> {
        let now = self.hal.clock.now_ms();
        self.dc_fault.reset(token, &mut *self.hal.output, now)
    }

    /// Requests a sensor self-test. Refused unless the station is idle.
    pub fn request_self_test(&mut self) -> EvseResult<()> {
        let now = self.hal.clock.now_ms();
        let view = self.dc_fault_view(self.hal.output.contactor_closed());
        self.dc_fault.request_self_test(&view, now)
    }

    pub fn start_charging_by_button(&mut self) {
        info!("EVSE: charging released by button");
        self.slots.start_charging_by_button();
    }

    pub fn stop_charging_by_button(&mut self) {
        info!("EVSE: charging stopped by button");
        self.slots.stop_charging_by_button();
    }

    pub fn set_input_config(&mut self, input: usize, config: InputConfig) -> EvseResult<()> {
        self.slots.set_input_config(input, config)?;
        if let Some(cfg) = self.config.inputs.get_mut(input) {
            *cfg = config;
        }
        Ok(())
    }

    pub fn state(&self) -> ChargeState {
        self.iec.state()
    }

    pub fn config(&self) -> &EvseConfig {
        &self.config
    }

    pub fn snapshot(&self) -> EvseSnapshot {
        let now = self.hal.clock.now_ms();
        let measurement = self.front_end.measurement();
        let state = self.iec.state();

        EvseSnapshot {
            state,
            vehicle: vehicle_state(state, measurement.cp),
            indicator: self.iec.indicator(),

            cp_resistance: measurement.cp,
            pp_resistance: measurement.pp,
            resistance_counter: measurement.counter,
            channels: AdcChannel::ALL.map(|ch| {
                let c = self.front_end.channel(ch);
                ChannelReading {
                    channel: ch,
                    average: c.average(),
                    millivolts: c.millivolts(),
                    negative_average: c.negative_average(),
                    negative_millivolts: c.negative_millivolts(),
                }
            }),

            dc_fault: self.dc_fault.state(),
            dc_fault_lines: self.dc_fault.raw_lines(),
            dc_fault_variant: self.dc_fault.variant(),
            dc_fault_calibrating: self.dc_fault.is_calibrating(),

            contactor_liveness: self.contactor.liveness(),
            contactor_error: self.contactor.error(),
            contactor_commanded: self.hal.output.contactor_closed(),
            switched_under_load: self.gate.switched_under_load(),

            slots: *self.slots.slots(),
            allowed_current_ma: self.slots.effective_current(),
            duty_cycle: self.gate.duty().unwrap_or(DUTY_CYCLE_OFF),

            charging_time_ms: self.iec.charging_time(now),
            time_since_state_change_ms: elapsed_ms(now, self.iec.last_state_change()),
            uptime_ms: elapsed_ms(now, self.boot),
        }
    }
}
