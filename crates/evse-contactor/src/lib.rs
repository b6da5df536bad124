#![no_std]
#![forbid(unsafe_code)]

//! Weld/defect detection for the AC contactor.
//!
//! AC1 sits on the grid side, AC2 on the vehicle side. Both optocouplers
//! toggle at line frequency while their side is live.

use evse_hal::{DigitalInputs, Input};
use evse_time::is_elapsed;
use log::warn;

pub const CHECK_INTERVAL_MS: u32 = 250;

/// Which sides of the contactor saw line voltage in the last window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Liveness {
    #[default]
    NoneLive = 0,
    Ac1Live = 1,
    Ac2Live = 2,
    BothLive = 3,
}

impl Liveness {
    fn from_lines(ac1: bool, ac2: bool) -> Self {
        match (ac1, ac2) {
            (false, false) => Liveness::NoneLive,
            (true, false) => Liveness::Ac1Live,
            (false, true) => Liveness::Ac2Live,
            (true, true) => Liveness::BothLive,
        }
    }

    /// 0 means the observation matches the commanded position.
    pub fn error_code(self, contactor_closed: bool) -> u8 {
        if contactor_closed {
            match self {
                Liveness::NoneLive => 1,
                Liveness::Ac1Live => 2,
                Liveness::Ac2Live => 3,
                Liveness::BothLive => 0,
            }
        } else {
            match self {
                Liveness::NoneLive => 4,
                Liveness::Ac1Live => 0,
                Liveness::Ac2Live => 5,
                Liveness::BothLive => 6,
            }
        }
    }
}

pub struct ContactorCheck {
    ac1_edges: u32,
    ac2_edges: u32,
    ac1_last: bool,
    ac2_last: bool,
    last_check: u32,
    suppress: u8,
    liveness: Liveness,
    error: u8,
}

impl ContactorCheck {
    pub fn new(inputs: &dyn DigitalInputs, now: u32) -> Self {
        Self {
            ac1_edges: 0,
            ac2_edges: 0,
            ac1_last: inputs.read(Input::Ac1),
            ac2_last: inputs.read(Input::Ac2),
            last_check: now,
            suppress: 0,
            liveness: Liveness::NoneLive,
            error: 0,
        }
    }

    pub fn tick(&mut self, inputs: &dyn DigitalInputs, contactor_closed: bool, now: u32) {
        let ac1 = inputs.read(Input::Ac1);
        let ac2 = inputs.read(Input::Ac2);
        if ac1 != self.ac1_last {
            self.ac1_last = ac1;
            self.ac1_edges += 1;
        }
        if ac2 != self.ac2_last {
            self.ac2_last = ac2;
            self.ac2_edges += 1;
        }

        if !is_elapsed(now, self.last_check, CHECK_INTERVAL_MS) {
            return;
        }
        self.last_check = now;

        if self.suppress > 0 {
            self.suppress -= 1;
        } else {
            self.liveness = Liveness::from_lines(self.ac1_edges > 0, self.ac2_edges > 0);
            let error = self.liveness.error_code(contactor_closed);
            if error != 0 && error != self.error {
                warn!(
                    "Contactor check: {:?} while commanded {}, error {}",
                    self.liveness,
                    if contactor_closed { "closed" } else { "open" },
                    error
                );
            }
            self.error = error;
        }

        self.ac1_edges = 0;
        self.ac2_edges = 0;
    }

    /// Skip the next `windows` evaluations. Never lowers a pending count.
    pub fn suppress(&mut self, windows: u8) {
        self.suppress = self.suppress.max(windows);
    }

    pub fn error(&self) -> u8 {
        self.error
    }

    pub fn liveness(&self) -> Liveness {
        self.liveness
    }
}
