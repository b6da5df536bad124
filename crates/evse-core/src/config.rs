use crate::MilliAmps;

/// Level of a tri-state configuration pin.
///
/// The pin is read once with the internal pull-up and once with the
/// pull-down enabled; a pin left open follows the pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    High,
    Low,
    Open,
    Undefined,
}

impl PinLevel {
    pub fn from_pulls(with_pull_up: bool, with_pull_down: bool) -> Self {
        match (with_pull_up, with_pull_down) {
            (true, true) => PinLevel::High,
            (false, false) => PinLevel::Low,
            (true, false) => PinLevel::Open,
            (false, true) => PinLevel::Undefined,
        }
    }
}

/// Current capacity of the supply cable, selected by the installer jumper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JumperConfig {
    A6 = 0,
    A10 = 1,
    A13 = 2,
    A16 = 3,
    A20 = 4,
    A25 = 5,
    A32 = 6,
    Software = 7,
    Unconfigured = 8,
}

impl JumperConfig {
    pub fn decode(pin0: PinLevel, pin1: PinLevel) -> Self {
        use PinLevel::*;
        match (pin0, pin1) {
            (Open, High) => JumperConfig::A6,
            (Low, High) => JumperConfig::A10,
            (High, Open) => JumperConfig::A13,
            (Open, Open) => JumperConfig::A16,
            (Low, Open) => JumperConfig::A20,
            (High, Low) => JumperConfig::A25,
            (Open, Low) => JumperConfig::A32,
            (Low, Low) => JumperConfig::Software,
            // High/High is reserved
            _ => JumperConfig::Unconfigured,
        }
    }

    pub fn is_configured(self) -> bool {
        self != JumperConfig::Unconfigured
    }

    /// Limit imposed by the supply cable. `software_ma` applies to the
    /// `Software` setting.
    pub fn max_current_ma(self, software_ma: MilliAmps) -> MilliAmps {
        match self {
            JumperConfig::A6 => 6_000,
            JumperConfig::A10 => 10_000,
            JumperConfig::A13 => 13_000,
            JumperConfig::A16 => 16_000,
            JumperConfig::A20 => 20_000,
            JumperConfig::A25 => 25_000,
            JumperConfig::A32 => 32_000,
            JumperConfig::Software => software_ma,
            JumperConfig::Unconfigured => 0,
        }
    }
}

/// Polarity of an external input that gates a charging slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputConfig {
    #[default]
    Ignored,
    ActiveLow,
    ActiveHigh,
}

impl InputConfig {
    pub fn is_asserted(self, level: bool) -> bool {
        match self {
            InputConfig::Ignored => false,
            InputConfig::ActiveLow => !level,
            InputConfig::ActiveHigh => level,
        }
    }
}

/// Static configuration handed to the controller at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvseConfig {
    pub jumper: JumperConfig,
    /// Used when the jumper selects `Software`.
    pub software_current_ma: MilliAmps,
    pub inputs: [InputConfig; 2],
    /// Apply the 10 % CP resistance hysteresis (IEC 61851-1 A.4.11).
    pub cp_hysteresis: bool,
    /// Delay after boot before the state machine is evaluated.
    pub startup_settle_ms: u32,
}

impl Default for EvseConfig {
    fn default() -> Self {
        Self {
            jumper: JumperConfig::Unconfigured,
            software_current_ma: 6_000,
            inputs: [InputConfig::Ignored; 2],
            cp_hysteresis: false,
            startup_settle_ms: 1_000,
        }
    }
}
