#![forbid(unsafe_code)]

use evse_core::DUTY_CYCLE_OFF;

/// Lowest duty cycle the standard allows (8 %).
const DUTY_CYCLE_MIN: u32 = 80;

/// Pilot duty cycle in 1/10 % that advertises `ma`.
///
/// 0 mA maps to 100 % (no charging) rather than 0 % so the vehicle
/// resistance can still be measured. Takes `u32` so the 51 A - 80 A
/// segment is reachable even though slot limits are `MilliAmps`.
pub fn duty_cycle_for_ma(ma: u32) -> u16 {
    if ma == 0 {
        return DUTY_CYCLE_OFF;
    }

    let duty = if ma <= 51_000 {
        // 6 A - 51 A: I = duty% * 0.6
        ma / 60
    } else {
        // 51 A - 80 A: I = (duty% - 64) * 2.5
        ma / 250 + 640
    };
    duty.clamp(DUTY_CYCLE_MIN, DUTY_CYCLE_OFF as u32) as u16
}
