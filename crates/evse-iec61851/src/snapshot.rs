#![forbid(unsafe_code)]

use evse_contactor::Liveness;
use evse_core::{ChargeState, Indicator, MilliAmps, Resistance, Slot, VehicleState, SLOT_COUNT};
use evse_dcfault::{FaultState, SensorLines, SensorVariant};
use evse_hal::AdcChannel;

/// Above this an A-state pilot sees no vehicle at all.
const NOT_CONNECTED_OHMS: u32 = 10_000;

/// Averages of one ADC input. The pilot channels also report the
/// negative half of the PWM period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReading {
    pub channel: AdcChannel,
    pub average: u16,
    pub millivolts: i32,
    pub negative_average: u16,
    pub negative_millivolts: i32,
}

/// Read-only picture of the controller after a tick.
#[derive(Debug, Clone)]
pub struct EvseSnapshot {
    pub state: ChargeState,
    pub vehicle: VehicleState,
    pub indicator: Indicator,

    pub cp_resistance: Resistance,
    pub pp_resistance: Resistance,
    pub resistance_counter: u32,
    pub channels: [ChannelReading; AdcChannel::COUNT],

    pub dc_fault: FaultState,
    pub dc_fault_lines: SensorLines,
    pub dc_fault_variant: SensorVariant,
    pub dc_fault_calibrating: bool,

    pub contactor_liveness: Liveness,
    pub contactor_error: u8,
    pub contactor_commanded: bool,
    pub switched_under_load: bool,

    pub slots: [Slot; SLOT_COUNT],
    pub allowed_current_ma: MilliAmps,
    pub duty_cycle: u16,

    pub charging_time_ms: u32,
    pub time_since_state_change_ms: u32,
    pub uptime_ms: u32,
}

/// Coarse view for the protocol layer. In A a present but idle vehicle
/// still counts as connected.
pub fn vehicle_state(state: ChargeState, cp: Resistance) -> VehicleState {
    match state {
        ChargeState::D | ChargeState::EF => VehicleState::Error,
        ChargeState::C => VehicleState::Charging,
        ChargeState::B => VehicleState::Connected,
        ChargeState::A => {
            if cp.is_open_or_above(NOT_CONNECTED_OHMS) {
                VehicleState::NotConnected
            } else {
                VehicleState::Connected
            }
        }
    }
}
