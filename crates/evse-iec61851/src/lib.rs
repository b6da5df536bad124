#![no_std]
#![forbid(unsafe_code)]

//! IEC 61851 control pilot state machine and the per-cycle controller
//! that ties the front-end, interlocks and current arbitration together.

extern crate alloc;

pub mod controller;
pub mod duty;
pub mod output;
pub mod snapshot;
pub mod state_machine;

pub use controller::{EvseController, EvseHal, CP_CONNECT_SETTLE_MS};
pub use duty::duty_cycle_for_ma;
pub use output::{GateActions, GateView, OutputGate, OutputRequest, OPEN_UNDER_LOAD_TIMEOUT_MS};
pub use snapshot::{vehicle_state, ChannelReading, EvseSnapshot};
pub use state_machine::{
    Conditions, Iec61851, PilotView, Transition, ERROR_COOLDOWN_MS, RESTART_DELAY_MS,
};
