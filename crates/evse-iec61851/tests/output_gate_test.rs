use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use evse_core::Resistance;
use evse_hal::{LockGate, OutputStage};
use evse_iec61851::{GateView, OutputGate, OutputRequest, OPEN_UNDER_LOAD_TIMEOUT_MS};

#[derive(Default)]
struct Stage {
    duty: u16,
    closed: bool,
    switches: u32,
}

impl OutputStage for Stage {
    fn set_cp_duty_cycle(&mut self, duty: u16) {
        self.duty = duty;
    }
    fn set_contactor(&mut self, closed: bool) {
        self.closed = closed;
        self.switches += 1;
    }
    fn contactor_closed(&self) -> bool {
        self.closed
    }
    fn set_fault_test_line(&mut self, _active: bool) {}
}

/// Lock that engages only when the test says so.
struct SlowLock {
    requested: Arc<AtomicBool>,
    engaged: Arc<AtomicBool>,
}

impl LockGate for SlowLock {
    fn is_locked(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
    fn request_lock(&mut self, locked: bool) {
        self.requested.store(locked, Ordering::SeqCst);
    }
}

fn view(cp: Resistance, counter: u32) -> GateView {
    GateView { cp, counter, diode_check_pending: false }
}

const CHARGE: OutputRequest = OutputRequest { duty: 533, close: true };
const PAUSE: OutputRequest = OutputRequest { duty: 533, close: false };

#[test]
fn test_duty_change_reported_once() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let mut lock = None;

    let idle = OutputRequest { duty: 1000, close: false };
    let first = gate.apply(&mut stage, &mut lock, idle, view(Resistance::Invalid, 0), 1);
    assert_eq!(first.duty_changed, Some(1000));
    assert_eq!(stage.duty, 1000);

    let again = gate.apply(&mut stage, &mut lock, idle, view(Resistance::Invalid, 0), 2);
    assert_eq!(again.duty_changed, None);
}

#[test]
fn test_close_needs_two_fresh_samples_in_band() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let mut lock = None;
    let r = Resistance::Ohms(880);

    // Diode check still running
    let pending = GateView { diode_check_pending: true, ..view(r, 1) };
    gate.apply(&mut stage, &mut lock, CHARGE, pending, 1);
    assert!(!stage.closed);

    // Same sample seen twice counts once
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 2);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 3);
    assert!(!stage.closed);

    // Out-of-band sample starts over
    gate.apply(&mut stage, &mut lock, CHARGE, view(Resistance::Ohms(2_700), 3), 4);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 4), 5);
    assert!(!stage.closed);

    let actions = gate.apply(&mut stage, &mut lock, CHARGE, view(r, 5), 6);
    assert!(actions.toggled);
    assert!(stage.closed);
    assert_eq!(gate.last_switch(), 6);
}

#[test]
fn test_lock_must_engage_before_closing() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let requested = Arc::new(AtomicBool::new(false));
    let engaged = Arc::new(AtomicBool::new(false));
    let mut lock: Option<Box<dyn LockGate>> = Some(Box::new(SlowLock {
        requested: requested.clone(),
        engaged: engaged.clone(),
    }));
    let r = Resistance::Ohms(880);

    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 1), 1);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 2);
    assert!(requested.load(Ordering::SeqCst));
    assert!(!stage.closed);

    engaged.store(true, Ordering::SeqCst);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 3);
    assert!(stage.closed);

    // Released once the contactor is open again
    gate.apply(&mut stage, &mut lock, PAUSE, view(Resistance::Ohms(2_700), 3), 4);
    assert!(!stage.closed);
    assert!(!requested.load(Ordering::SeqCst));
}

#[test]
fn test_open_waits_for_vehicle_then_forces() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let mut lock = None;
    let r = Resistance::Ohms(880);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 1), 1);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 2);
    assert!(stage.closed);

    // Vehicle keeps drawing
    let start = 100;
    gate.apply(&mut stage, &mut lock, PAUSE, view(r, 3), start);
    gate.apply(&mut stage, &mut lock, PAUSE, view(r, 3), start + OPEN_UNDER_LOAD_TIMEOUT_MS - 1);
    assert!(stage.closed);
    assert!(!gate.switched_under_load());

    let actions = gate.apply(&mut stage, &mut lock, PAUSE, view(r, 3), start + OPEN_UNDER_LOAD_TIMEOUT_MS);
    assert!(actions.toggled);
    assert!(!stage.closed);
    assert!(gate.switched_under_load());

    gate.clear_switched_under_load();
    assert!(!gate.switched_under_load());
}

#[test]
fn test_open_is_immediate_once_vehicle_stopped() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let mut lock = None;
    let r = Resistance::Ohms(880);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 1), 1);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 2);

    gate.apply(&mut stage, &mut lock, PAUSE, view(Resistance::Invalid, 3), 3);
    assert!(!stage.closed);
    assert!(!gate.switched_under_load());
}

#[test]
fn test_force_open_bypasses_gating() {
    let mut gate = OutputGate::new(0);
    let mut stage = Stage::default();
    let mut lock = None;
    let r = Resistance::Ohms(880);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 1), 1);
    gate.apply(&mut stage, &mut lock, CHARGE, view(r, 2), 2);

    assert!(gate.force_open(&mut stage, 10));
    assert!(!stage.closed);
    assert_eq!(gate.last_switch(), 10);
    assert!(!gate.force_open(&mut stage, 11));
    assert_eq!(stage.switches, 2);
}
