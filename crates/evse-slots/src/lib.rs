#![no_std]
#![forbid(unsafe_code)]

//! Charging-current arbitration. Every slot is an independent limit; the
//! current offered to the vehicle is the minimum over the active ones.

use evse_core::{
    EvseError, EvseResult, InputConfig, JumperConfig, MilliAmps, Resistance, Slot, SLOT_COUNT,
};
use log::{debug, warn};

pub const INCOMING_CABLE: usize = 0;
pub const OUTGOING_CABLE: usize = 1;
pub const INPUT0: usize = 2;
pub const INPUT1: usize = 3;
pub const BUTTON: usize = 4;

/// First index writable through the command surface.
pub const FIRST_SETTABLE: usize = INPUT0;

pub const MIN_SETTABLE_MA: MilliAmps = 6_000;
pub const MAX_SETTABLE_MA: MilliAmps = 32_000;
/// Button slot value that allows charging.
pub const BUTTON_RELEASED_MA: MilliAmps = 32_000;

// Proximity resistor coding (IEC 61851-1 B.2)
const PP_13A_OHMS: u32 = 1_000;
const PP_20A_OHMS: u32 = 330;
const PP_32A_OHMS: u32 = 150;

/// Read-only inputs for one recomputation.
#[derive(Debug, Clone, Copy)]
pub struct SlotInputs {
    pub jumper: JumperConfig,
    pub software_current_ma: MilliAmps,
    pub pp: Resistance,
    /// Raw levels of the two external inputs.
    pub input_levels: [bool; 2],
}

/// Current capacity of the vehicle cable from its proximity resistor.
pub fn pp_current_ma(pp: Resistance) -> MilliAmps {
    match pp {
        // No or unknown cable: assume the weakest coding
        Resistance::Invalid => 13_000,
        Resistance::Ohms(r) if r >= PP_13A_OHMS => 13_000,
        Resistance::Ohms(r) if r >= PP_20A_OHMS => 20_000,
        Resistance::Ohms(r) if r >= PP_32A_OHMS => 32_000,
        Resistance::Ohms(_) => 64_000,
    }
}

/// Table contents before any stored defaults are applied.
pub fn factory_defaults() -> [Slot; SLOT_COUNT] {
    let mut slots = [Slot::inactive(); SLOT_COUNT];
    slots[INCOMING_CABLE] = Slot::new(32_000, true, false);
    slots[OUTGOING_CABLE] = Slot::new(32_000, true, false);
    slots[BUTTON] = Slot::new(BUTTON_RELEASED_MA, true, false);
    slots
}

fn validate(index: usize, max_current_ma: MilliAmps) -> EvseResult<()> {
    if index >= SLOT_COUNT {
        return Err(EvseError::InvalidSlot);
    }
    if index < FIRST_SETTABLE {
        return Err(EvseError::SlotReadOnly);
    }
    if max_current_ma != 0 && !(MIN_SETTABLE_MA..=MAX_SETTABLE_MA).contains(&max_current_ma) {
        return Err(EvseError::CurrentOutOfRange);
    }
    Ok(())
}

pub struct SlotTable {
    slots: [Slot; SLOT_COUNT],
    defaults: [Slot; SLOT_COUNT],
    input_config: [InputConfig; 2],
    /// API side of the input slots; the live flag also needs the input.
    input_enabled: [bool; 2],
    input_asserted: [bool; 2],
    persist_pending: bool,
}

impl SlotTable {
    /// `defaults` are the restored persisted defaults (or `factory_defaults()`).
    /// Restored entries the command surface would refuse fall back to the
    /// factory value and are written back on the next persist.
    pub fn new(mut defaults: [Slot; SLOT_COUNT], input_config: [InputConfig; 2]) -> Self {
        let factory = factory_defaults();
        let mut persist_pending = false;
        for i in FIRST_SETTABLE..SLOT_COUNT {
            if validate(i, defaults[i].max_current_ma).is_err() {
                warn!(
                    "Slot {}: restored default {} mA out of range, using factory default",
                    i, defaults[i].max_current_ma
                );
                defaults[i] = factory[i];
                persist_pending = true;
            }
        }

        let mut slots = defaults;
        // Recomputed on the first tick
        slots[INCOMING_CABLE] = Slot::inactive();
        slots[OUTGOING_CABLE] = Slot::inactive();
        let input_enabled = [defaults[INPUT0].active, defaults[INPUT1].active];
        slots[INPUT0].active = false;
        slots[INPUT1].active = false;

        Self {
            slots,
            defaults,
            input_config,
            input_enabled,
            input_asserted: [false; 2],
            persist_pending,
        }
    }

    pub fn recompute(&mut self, view: &SlotInputs) {
        self.slots[INCOMING_CABLE] = Slot::new(
            view.jumper.max_current_ma(view.software_current_ma),
            true,
            false,
        );
        self.slots[OUTGOING_CABLE] = Slot::new(pp_current_ma(view.pp), true, false);

        for n in 0..2 {
            self.input_asserted[n] = self.input_config[n].is_asserted(view.input_levels[n]);
            self.refresh_input_slot(n);
        }
    }

    fn refresh_input_slot(&mut self, n: usize) {
        self.slots[INPUT0 + n].active = self.input_enabled[n] && self.input_asserted[n];
    }

    pub fn effective_current(&self) -> MilliAmps {
        self.slots
            .iter()
            .filter(|s| s.active)
            .map(|s| s.max_current_ma)
            .min()
            .unwrap_or(0)
    }

    pub fn set(
        &mut self,
        index: usize,
        max_current_ma: MilliAmps,
        active: bool,
        clear_on_disconnect: bool,
    ) -> EvseResult<()> {
        if let Err(e) = validate(index, max_current_ma) {
            warn!("Slot {}: set {} mA rejected ({})", index, max_current_ma, e);
            return Err(e);
        }

        self.slots[index].max_current_ma = max_current_ma;
        self.slots[index].clear_on_disconnect = clear_on_disconnect;
        match index {
            INPUT0 | INPUT1 => {
                let n = index - INPUT0;
                self.input_enabled[n] = active;
                self.refresh_input_slot(n);
            }
            _ => self.slots[index].active = active,
        }
        Ok(())
    }

    /// Live view; input slots report whether they currently participate.
    pub fn get(&self, index: usize) -> EvseResult<Slot> {
        self.slots.get(index).copied().ok_or(EvseError::InvalidSlot)
    }

    pub fn set_default(
        &mut self,
        index: usize,
        max_current_ma: MilliAmps,
        active: bool,
        clear_on_disconnect: bool,
    ) -> EvseResult<()> {
        validate(index, max_current_ma)?;

        let new = Slot::new(max_current_ma, active, clear_on_disconnect);
        if self.defaults[index] != new {
            self.defaults[index] = new;
            self.persist_pending = true;
        }
        Ok(())
    }

    pub fn get_default(&self, index: usize) -> EvseResult<Slot> {
        self.defaults.get(index).copied().ok_or(EvseError::InvalidSlot)
    }

    /// Vehicle left: drop per-session limits, release the button.
    pub fn handle_disconnect(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.clear_on_disconnect {
                debug!("Slot {}: cleared on disconnect", i);
                slot.max_current_ma = 0;
            }
        }
        self.slots[BUTTON].max_current_ma = BUTTON_RELEASED_MA;
    }

    pub fn stop_charging_by_button(&mut self) {
        self.slots[BUTTON].max_current_ma = 0;
    }

    pub fn start_charging_by_button(&mut self) {
        self.slots[BUTTON].max_current_ma = BUTTON_RELEASED_MA;
    }

    pub fn set_input_config(&mut self, input: usize, config: InputConfig) -> EvseResult<()> {
        let cfg = self.input_config.get_mut(input).ok_or(EvseError::InvalidSlot)?;
        *cfg = config;
        Ok(())
    }

    pub fn input_config(&self) -> [InputConfig; 2] {
        self.input_config
    }

    pub fn slots(&self) -> &[Slot; SLOT_COUNT] {
        &self.slots
    }

    pub fn defaults(&self) -> &[Slot; SLOT_COUNT] {
        &self.defaults
    }

    /// Hands out the defaults once after they changed.
    pub fn take_persist_request(&mut self) -> Option<[Slot; SLOT_COUNT]> {
        if self.persist_pending {
            self.persist_pending = false;
            Some(self.defaults)
        } else {
            None
        }
    }
}
