#![no_std]
#![forbid(unsafe_code)]
#[cfg(feature = "std")]
extern crate std;

use zeroize::{Zeroize, ZeroizeOnDrop};

pub mod config;
pub use config::{EvseConfig, InputConfig, JumperConfig, PinLevel};

/// Token that authorizes clearing a latched DC fault.
pub const DC_FAULT_RESET_TOKEN: u32 = 0xDC42_FA23;

/// Pilot duty cycle (in 1/10 %) meaning "no charging offered".
pub const DUTY_CYCLE_OFF: u16 = 1000;

/// Slot current limits are stored in milliamps.
pub type MilliAmps = u16;

/// Number of entries in the charging-current table.
pub const SLOT_COUNT: usize = 20;

/// One independent current limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub max_current_ma: MilliAmps,
    pub active: bool,
    pub clear_on_disconnect: bool,
}

impl Slot {
    pub const fn new(max_current_ma: MilliAmps, active: bool, clear_on_disconnect: bool) -> Self {
        Self { max_current_ma, active, clear_on_disconnect }
    }

    pub const fn inactive() -> Self {
        Self::new(0, false, false)
    }
}

impl Default for Slot {
    fn default() -> Self {
        Self::inactive()
    }
}

/// IEC 61851 control pilot state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChargeState {
    /// Standby, no vehicle.
    A = 0,
    /// Vehicle connected, not charging.
    B = 1,
    /// Vehicle requests charging.
    C = 2,
    /// Charging with ventilation. Not supported, behaves like A.
    D = 3,
    /// Error / no power.
    EF = 4,
}

impl ChargeState {
    pub fn code(self) -> u8 {
        self as u8
    }

    /// States that never offer current and keep the contactor open.
    pub fn is_idle_like(self) -> bool {
        matches!(self, ChargeState::A | ChargeState::D | ChargeState::EF)
    }
}

/// A derived resistance to protective earth.
///
/// `Invalid` covers both an open circuit and a measurement that could not be
/// evaluated. It never takes part in numeric comparisons: callers match on
/// the variant and decide what an invalid reading means for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resistance {
    #[default]
    Invalid,
    Ohms(u32),
}

impl Resistance {
    pub fn ohms(self) -> Option<u32> {
        match self {
            Resistance::Ohms(r) => Some(r),
            Resistance::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Resistance::Ohms(_))
    }

    /// True for an open/invalid reading or a value strictly above `threshold`.
    pub fn is_open_or_above(self, threshold: u32) -> bool {
        match self {
            Resistance::Invalid => true,
            Resistance::Ohms(r) => r > threshold,
        }
    }

    /// True for a valid reading in `(low, high]`.
    pub fn is_within(self, low: u32, high: u32) -> bool {
        match self {
            Resistance::Invalid => false,
            Resistance::Ohms(r) => r > low && r <= high,
        }
    }
}

/// Coarse vehicle view exposed to the protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VehicleState {
    NotConnected = 0,
    Connected = 1,
    Charging = 2,
    Error = 3,
}

/// Error class shown by the indicator (blink count).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Indicator {
    #[default]
    Ok = 0,
    Configuration = 2,
    DcFault = 3,
    Contactor = 4,
    Pilot = 5,
}

impl Indicator {
    pub fn code(self) -> u8 {
        self as u8
    }
}

pub type EvseResult<T> = Result<T, EvseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvseError {
    InvalidSlot,
    SlotReadOnly,
    CurrentOutOfRange,
    AuthFail,
    PreconditionFailed,
    AdcStalled,
    HalError,
    InvalidState,
}

impl core::fmt::Display for EvseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EvseError {}

/// Credential carried by privileged commands. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct AuthToken(u32);

impl AuthToken {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn matches(&self, expected: u32) -> bool {
        self.0 == expected
    }
}
