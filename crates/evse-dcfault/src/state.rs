#![forbid(unsafe_code)]

/// Residual-current sensor model, detected during calibration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SensorVariant {
    #[default]
    X904 = 0,
    X804 = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaultState {
    #[default]
    Normal,
    SixMaDc,
    TwentyMaAc,
    /// 6 mA DC and 20 mA AC at once (X804 only).
    Combined,
    System,
    Unknown,
    /// Self-test failed at `step`.
    CalibrationError { step: u8 },
}

impl FaultState {
    /// Status word exposed to the protocol layer.
    pub fn code(self) -> u8 {
        match self {
            FaultState::Normal => 0,
            FaultState::SixMaDc => 1,
            FaultState::System => 2,
            FaultState::Unknown => 3,
            FaultState::CalibrationError { .. } => 4,
            FaultState::TwentyMaAc => 5,
            FaultState::Combined => 6,
        }
    }

    pub fn is_normal(self) -> bool {
        self == FaultState::Normal
    }
}

/// Debounced (or raw) levels of the three sensor outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorLines {
    pub x6: bool,
    pub x30: bool,
    pub error: bool,
}

/// Maps the sensor outputs to a condition. The two sensor models encode a
/// 6 mA DC leak differently.
pub fn classify(variant: SensorVariant, lines: SensorLines) -> FaultState {
    let bits = (lines.x6, lines.x30, lines.error);
    match variant {
        SensorVariant::X904 => match bits {
            (false, false, false) => FaultState::Normal,
            (true, true, false) => FaultState::SixMaDc,
            (false, true, false) => FaultState::TwentyMaAc,
            (true, true, true) => FaultState::System,
            _ => FaultState::Unknown,
        },
        SensorVariant::X804 => match bits {
            (false, false, false) => FaultState::Normal,
            (true, false, false) => FaultState::SixMaDc,
            (false, true, false) => FaultState::TwentyMaAc,
            (true, true, false) => FaultState::Combined,
            (true, true, true) => FaultState::System,
            _ => FaultState::Unknown,
        },
    }
}
