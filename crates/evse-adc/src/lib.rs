#![no_std]
#![forbid(unsafe_code)]

//! Turns raw pilot/proximity conversions into resistances to earth.

mod channel;

pub use channel::{PilotChannel, WINDOW};

use channel::code_to_mv;
use evse_core::{EvseError, EvseResult, Resistance};
use evse_hal::{AdcChannel, AdcScanner};
use evse_time::is_elapsed;
use log::{error, warn};

/// Forward drop of the pilot diode (educated guess).
const DIODE_DROP_MV: i64 = 650;
/// Series resistor between CP1 and CP2.
const CP_DIVIDER_OHMS: i64 = 910;
const CP_MAX_OHMS: i64 = 32_000;
const PP_MAX_OHMS: i64 = 10_000;
/// CP1 is converted in the background at all times. Silence this long
/// means the converter is dead.
pub const STALL_TIMEOUT_MS: u32 = 60_000;

/// Latest derived resistances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResistanceMeasurement {
    pub cp: Resistance,
    pub pp: Resistance,
    /// Incremented on every CP resistance update.
    pub counter: u32,
}

pub struct FrontEnd {
    channels: [PilotChannel; AdcChannel::COUNT],
    measurement: ResistanceMeasurement,
    full_scan: bool,
    last_cp1_conversion: u32,
    stalled: bool,
}

impl FrontEnd {
    pub fn new(now: u32) -> Self {
        Self {
            channels: AdcChannel::ALL.map(PilotChannel::new),
            measurement: ResistanceMeasurement::default(),
            full_scan: true,
            last_cp1_conversion: now,
            stalled: false,
        }
    }

    /// Collects at most one pending conversion per scanned channel and
    /// evaluates every completed window.
    pub fn sample_tick(&mut self, adc: &mut dyn AdcScanner, now: u32) -> EvseResult<()> {
        if self.stalled {
            return Err(EvseError::AdcStalled);
        }

        // 1. COLLECT
        for ch in AdcChannel::ALL {
            if !self.full_scan && !ch.is_pilot() {
                continue;
            }
            match adc.poll(ch) {
                Ok(code) => {
                    self.channels[ch.index()].accept(code);
                    if ch == AdcChannel::Cp1 {
                        self.last_cp1_conversion = now;
                    }
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(e)) => warn!("ADC {:?}: {}", ch, e),
            }
        }

        // 2. STALL CHECK
        if is_elapsed(now, self.last_cp1_conversion, STALL_TIMEOUT_MS) {
            self.stalled = true;
            error!("ADC: no CP1 conversion for {} ms", STALL_TIMEOUT_MS);
            return Err(EvseError::AdcStalled);
        }

        // 3. EVALUATE (CP1 before CP2, the CP resistance needs both)
        for ch in AdcChannel::ALL {
            self.evaluate(ch);
        }
        Ok(())
    }

    fn evaluate(&mut self, ch: AdcChannel) {
        let slot = &mut self.channels[ch.index()];

        if ch.is_pilot() {
            if let Some(code) = slot.negative.take_average() {
                slot.negative.mv = code_to_mv(ch, code);
            }
        }

        let Some(code) = slot.positive.take_average() else {
            return;
        };
        if slot.ignore > 0 {
            slot.ignore -= 1;
            return;
        }
        let mv = code_to_mv(ch, code);
        slot.positive.mv = mv;

        match ch {
            AdcChannel::Pp => {
                self.measurement.pp = pp_resistance(mv);
            }
            AdcChannel::Cp2 => {
                let cp1_mv = self.channels[AdcChannel::Cp1.index()].positive.mv;
                self.measurement.counter = self.measurement.counter.wrapping_add(1);
                self.measurement.cp = cp_resistance(cp1_mv, mv);
            }
            _ => {}
        }
    }

    /// Discard the next `n` windows of `ch`. Never lowers a pending count.
    pub fn ignore_next(&mut self, ch: AdcChannel, n: u8) {
        let slot = &mut self.channels[ch.index()];
        slot.ignore = slot.ignore.max(n);
    }

    pub fn ignore_all(&mut self, n: u8) {
        for ch in AdcChannel::ALL {
            self.ignore_next(ch, n);
        }
    }

    /// With `false` only CP1/CP2 are scanned.
    pub fn enable_full_channel_set(&mut self, adc: &mut dyn AdcScanner, enabled: bool) {
        self.full_scan = enabled;
        adc.set_full_scan(enabled);
    }

    pub fn measurement(&self) -> ResistanceMeasurement {
        self.measurement
    }

    pub fn channel(&self, ch: AdcChannel) -> &PilotChannel {
        &self.channels[ch.index()]
    }

    /// A CP window is still going to be discarded.
    pub fn ignore_pending(&self) -> bool {
        self.channel(AdcChannel::Cp1).ignore > 0 || self.channel(AdcChannel::Cp2).ignore > 0
    }

    /// No CP resistance has been derived yet.
    pub fn is_settling(&self) -> bool {
        self.measurement.counter == 0
    }

    pub fn is_full_scan(&self) -> bool {
        self.full_scan
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }
}

fn cp_resistance(cp1_mv: i32, cp2_mv: i32) -> Resistance {
    let (cp1, cp2) = (cp1_mv as i64, cp2_mv as i64);
    if cp1 <= cp2 || cp2 - DIODE_DROP_MV < 0 {
        return Resistance::Invalid;
    }
    let r = CP_DIVIDER_OHMS * (cp2 - DIODE_DROP_MV) / (cp1 - cp2);
    if r > CP_MAX_OHMS {
        Resistance::Invalid
    } else {
        Resistance::Ohms(r as u32)
    }
}

// Rpp = Vpp*1k*2k / (5V*2k - Vpp*(1k+2k))
fn pp_resistance(pp_mv: i32) -> Resistance {
    let mv = pp_mv as i64;
    let divisor = 10_000 - 3 * mv;
    if divisor <= 0 {
        return Resistance::Invalid;
    }
    let r = 2_000 * mv / divisor;
    if r > PP_MAX_OHMS || r < 0 {
        Resistance::Invalid
    } else {
        Resistance::Ohms(r as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cp_formula_rejects_inverted_and_low_readings() {
        assert_eq!(cp_resistance(5_000, 6_000), Resistance::Invalid);
        assert_eq!(cp_resistance(5_000, 600), Resistance::Invalid);
        // 910 * (6000 - 650) / (9000 - 6000) = 1622
        assert_eq!(cp_resistance(9_000, 6_000), Resistance::Ohms(1_622));
        // Nearly no drop over the divider: open
        assert_eq!(cp_resistance(12_000, 11_990), Resistance::Invalid);
    }

    #[test]
    fn pp_formula_limits() {
        assert_eq!(pp_resistance(3_334), Resistance::Invalid);
        // 2000 * 1000 / 7000 = 285
        assert_eq!(pp_resistance(1_000), Resistance::Ohms(285));
        assert_eq!(pp_resistance(0), Resistance::Ohms(0));
    }
}
