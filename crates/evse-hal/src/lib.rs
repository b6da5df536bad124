#![no_std]
#![forbid(unsafe_code)]

use evse_core::{EvseError, EvseResult, Slot};

/// Analog inputs sampled by the front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdcChannel {
    /// Control pilot, unloaded path.
    Cp1 = 0,
    /// Control pilot through the 910 Ohm divider.
    Cp2 = 1,
    /// Proximity pilot.
    Pp = 2,
    /// +12 V supply monitor.
    V12P = 3,
    /// -12 V supply monitor.
    V12M = 4,
}

impl AdcChannel {
    pub const COUNT: usize = 5;
    pub const ALL: [AdcChannel; 5] = [
        AdcChannel::Cp1,
        AdcChannel::Cp2,
        AdcChannel::Pp,
        AdcChannel::V12P,
        AdcChannel::V12M,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_pilot(self) -> bool {
        matches!(self, AdcChannel::Cp1 | AdcChannel::Cp2)
    }
}

/// Digital lines read once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Line-voltage presence on the grid side of the contactor.
    Ac1,
    /// Line-voltage presence on the vehicle side of the contactor.
    Ac2,
    /// Residual-current sensor: 6 mA DC threshold.
    DcX6,
    /// Residual-current sensor X30 output: 20 mA AC threshold.
    DcX30,
    /// Residual-current sensor: error output.
    DcError,
    /// Pilot comparator says a vehicle is attached.
    CpConnected,
    ExtInput0,
    ExtInput1,
}

/// ADC conversion source.
/// INVARIANT: Must be Non-Blocking.
pub trait AdcScanner: Send + Sync {
    /// Returns the next raw 12-bit conversion of `channel`, or `WouldBlock`
    /// if nothing new is available.
    fn poll(&mut self, channel: AdcChannel) -> nb::Result<u16, EvseError>;

    /// `false` restricts the scan to CP1/CP2.
    fn set_full_scan(&mut self, enabled: bool);
}

pub trait DigitalInputs: Send + Sync {
    fn read(&self, input: Input) -> bool;
}

/// Actuators owned by the control core.
pub trait OutputStage: Send + Sync {
    /// Duty cycle in 1/10 %.
    fn set_cp_duty_cycle(&mut self, duty: u16);
    fn set_contactor(&mut self, closed: bool);
    fn contactor_closed(&self) -> bool;
    /// `true` injects the residual-current sensor test current.
    fn set_fault_test_line(&mut self, active: bool);
}

/// Free-running millisecond counter. Wraps after ~49 days.
pub trait MonotonicClock: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Receives "please persist" requests for the slot defaults.
pub trait ConfigStore: Send + Sync {
    fn persist_slot_defaults(&mut self, defaults: &[Slot]) -> EvseResult<()>;
}

/// Optional cable lock that must engage before the contactor closes.
pub trait LockGate: Send + Sync {
    fn is_locked(&self) -> bool;
    fn request_lock(&mut self, locked: bool);
}

/// Fail-stop. Implementations stop servicing the hardware watchdog so the
/// supervisor resets the device.
pub trait Watchdog: Send + Sync {
    fn halt(&self) -> !;
}
