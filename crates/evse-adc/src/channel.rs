#![forbid(unsafe_code)]

use evse_hal::AdcChannel;

/// Conversions averaged into one update.
pub const WINDOW: u32 = 50;

/// Pilot codes below mid-scale belong to the negative PWM half.
pub(crate) const NEGATIVE_HALF_LIMIT: u16 = 2048;

/// Running sum of raw conversions plus the last averaged result.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Bucket {
    sum: u32,
    count: u32,
    pub(crate) average: u16,
    pub(crate) mv: i32,
    /// Wrapping count of completed windows.
    pub(crate) updates: u16,
}

impl Bucket {
    pub(crate) fn push(&mut self, code: u16) {
        self.sum += code as u32;
        self.count += 1;
    }

    /// Completes the window if enough samples were collected.
    pub(crate) fn take_average(&mut self) -> Option<u16> {
        if self.count < WINDOW {
            return None;
        }
        self.average = (self.sum / self.count) as u16;
        self.sum = 0;
        self.count = 0;
        self.updates = self.updates.wrapping_add(1);
        Some(self.average)
    }
}

/// Transform from averaged raw code to millivolts at the connector.
pub(crate) fn code_to_mv(channel: AdcChannel, code: u16) -> i32 {
    let code = code as i64;
    let mv = match channel {
        // +-12V pilot through the level shifter
        AdcChannel::Cp1 | AdcChannel::Cp2 | AdcChannel::V12M => {
            (code * 600 * 3300 / 4095 - 990_000) / 75
        }
        AdcChannel::Pp => code * 3300 / 4095,
        AdcChannel::V12P => code * 4 * 3300 / 4095,
    };
    mv as i32
}

/// One ADC input. The pilot channels keep separate buckets for the two
/// halves of the PWM period.
#[derive(Debug, Clone, Copy)]
pub struct PilotChannel {
    channel: AdcChannel,
    pub(crate) positive: Bucket,
    pub(crate) negative: Bucket,
    pub(crate) ignore: u8,
}

impl PilotChannel {
    pub(crate) fn new(channel: AdcChannel) -> Self {
        Self {
            channel,
            positive: Bucket::default(),
            negative: Bucket::default(),
            ignore: 0,
        }
    }

    pub(crate) fn accept(&mut self, code: u16) {
        if self.channel.is_pilot() && code < NEGATIVE_HALF_LIMIT {
            self.negative.push(code);
        } else {
            self.positive.push(code);
        }
    }

    pub fn channel(&self) -> AdcChannel {
        self.channel
    }

    /// Last averaged raw code (positive half for the pilot).
    pub fn average(&self) -> u16 {
        self.positive.average
    }

    pub fn millivolts(&self) -> i32 {
        self.positive.mv
    }

    pub fn negative_average(&self) -> u16 {
        self.negative.average
    }

    /// Zero until the first negative window completed.
    pub fn negative_millivolts(&self) -> i32 {
        self.negative.mv
    }

    pub fn negative_updates(&self) -> u16 {
        self.negative.updates
    }

    /// Windows still to be discarded.
    pub fn ignore_remaining(&self) -> u8 {
        self.ignore
    }
}
