use evse_core::{ChargeState, Indicator, JumperConfig, Resistance};
use evse_iec61851::{Conditions, Iec61851, PilotView, Transition, ERROR_COOLDOWN_MS};

fn pilot(cp: Resistance) -> PilotView {
    PilotView {
        cp,
        connected: true,
        ..PilotView::default()
    }
}

fn cond(cp: Resistance, allowed_ma: u16) -> Conditions {
    Conditions {
        dc_fault: false,
        contactor_error: 0,
        jumper: JumperConfig::A32,
        allowed_ma,
        pilot: pilot(cp),
    }
}

/// State a fresh machine settles in for one reading.
fn mapped(cp: Resistance, allowed_ma: u16) -> ChargeState {
    let mut sm = Iec61851::new(false, 0);
    sm.evaluate(&cond(cp, allowed_ma), 100);
    sm.state()
}

#[test]
fn test_resistance_to_state_mapping() {
    assert_eq!(mapped(Resistance::Invalid, 32_000), ChargeState::A);
    assert_eq!(mapped(Resistance::Ohms(12_000), 32_000), ChargeState::A);
    assert_eq!(mapped(Resistance::Ohms(2_700), 32_000), ChargeState::B);
    assert_eq!(mapped(Resistance::Ohms(880), 32_000), ChargeState::C);
    assert_eq!(mapped(Resistance::Ohms(200), 32_000), ChargeState::D);
    assert_eq!(mapped(Resistance::Ohms(100), 32_000), ChargeState::EF);

    // Vehicle asks, nothing to give
    assert_eq!(mapped(Resistance::Ohms(880), 0), ChargeState::B);

    // Band edges: thresholds are exclusive lower bounds
    assert_eq!(mapped(Resistance::Ohms(10_000), 32_000), ChargeState::B);
    assert_eq!(mapped(Resistance::Ohms(1_790), 32_000), ChargeState::C);
    assert_eq!(mapped(Resistance::Ohms(300), 32_000), ChargeState::D);
}

#[test]
fn test_per_state_output() {
    let mut sm = Iec61851::new(false, 0);
    assert_eq!(sm.output(32_000), (1000, false));

    sm.evaluate(&cond(Resistance::Ohms(2_700), 32_000), 10);
    assert_eq!(sm.output(32_000), (533, false));
    assert_eq!(sm.output(0), (1000, false));

    sm.evaluate(&cond(Resistance::Ohms(880), 32_000), 20);
    assert_eq!(sm.output(16_000), (266, true));

    sm.evaluate(&cond(Resistance::Ohms(200), 32_000), 30);
    assert_eq!(sm.state(), ChargeState::D);
    assert_eq!(sm.output(32_000), (1000, false));
    assert_eq!(sm.indicator(), Indicator::Pilot);
}

#[test]
fn test_interlocks_win_over_pilot() {
    let mut sm = Iec61851::new(false, 0);

    let mut c = cond(Resistance::Ohms(880), 32_000);
    c.contactor_error = 4;
    assert_eq!(
        sm.evaluate(&c, 10),
        Some(Transition { from: ChargeState::A, to: ChargeState::EF })
    );
    assert_eq!(sm.indicator(), Indicator::Contactor);

    let mut c = cond(Resistance::Ohms(880), 32_000);
    c.dc_fault = true;
    c.contactor_error = 4;
    sm.evaluate(&c, 20);
    assert_eq!(sm.indicator(), Indicator::DcFault);

    let mut c = cond(Resistance::Ohms(880), 32_000);
    c.jumper = JumperConfig::Unconfigured;
    assert_eq!(sm.evaluate(&c, 30), None);
    assert_eq!(sm.state(), ChargeState::EF);
    assert_eq!(sm.indicator(), Indicator::Configuration);
}

#[test]
fn test_no_charging_right_after_error() {
    let mut sm = Iec61851::new(false, 0);
    sm.evaluate(&cond(Resistance::Ohms(100), 32_000), 0);
    assert_eq!(sm.state(), ChargeState::EF);

    // The vehicle recovers at once but has to wait
    let charge = cond(Resistance::Ohms(880), 32_000);
    assert_eq!(sm.evaluate(&charge, 1_000), None);
    assert_eq!(sm.evaluate(&charge, ERROR_COOLDOWN_MS - 1_000), None);
    assert_eq!(sm.state(), ChargeState::EF);

    // Refused attempts must not extend the cool-down
    assert_eq!(
        sm.evaluate(&charge, ERROR_COOLDOWN_MS + 1),
        Some(Transition { from: ChargeState::EF, to: ChargeState::C })
    );
}

#[test]
fn test_restart_delay_after_leaving_c() {
    let mut sm = Iec61851::new(false, 0);
    let charge = cond(Resistance::Ohms(880), 32_000);
    let pause = cond(Resistance::Ohms(2_700), 32_000);

    sm.evaluate(&charge, 0);
    assert_eq!(sm.state(), ChargeState::C);
    sm.evaluate(&pause, 1_000);
    assert_eq!(sm.state(), ChargeState::B);

    sm.evaluate(&charge, 3_000);
    assert_eq!(sm.state(), ChargeState::B);
    sm.evaluate(&charge, 6_001);
    assert_eq!(sm.state(), ChargeState::C);
}

#[test]
fn test_charging_timer_survives_pause_not_disconnect() {
    let mut sm = Iec61851::new(false, 0);
    sm.evaluate(&cond(Resistance::Ohms(880), 32_000), 1_000);
    sm.evaluate(&cond(Resistance::Ohms(2_700), 32_000), 3_000);
    assert_eq!(sm.charging_time(4_000), 3_000);

    let t = sm.evaluate(&cond(Resistance::Invalid, 32_000), 5_000).unwrap();
    assert!(t.is_disconnect());
    assert_eq!(sm.charging_time(6_000), 0);
}

#[test]
fn test_hysteresis_table() {
    let near_a = cond(Resistance::Ohms(9_500), 32_000);

    let mut plain = Iec61851::new(false, 0);
    plain.evaluate(&near_a, 10);
    assert_eq!(plain.state(), ChargeState::B);

    let mut hyst = Iec61851::new(true, 0);
    hyst.evaluate(&near_a, 10);
    assert_eq!(hyst.state(), ChargeState::A);

    // Once in B it takes more than 11 kOhm to go back to A
    hyst.evaluate(&cond(Resistance::Ohms(2_700), 32_000), 20);
    hyst.evaluate(&cond(Resistance::Ohms(10_500), 32_000), 30);
    assert_eq!(hyst.state(), ChargeState::B);
    hyst.evaluate(&cond(Resistance::Ohms(11_500), 32_000), 40);
    assert_eq!(hyst.state(), ChargeState::A);
}

#[test]
fn test_settling_and_ignored_windows_hold_state() {
    let mut sm = Iec61851::new(false, 0);

    let mut c = cond(Resistance::Ohms(2_700), 32_000);
    c.pilot.settling = true;
    assert_eq!(sm.evaluate(&c, 10), None);

    let mut c = cond(Resistance::Ohms(2_700), 32_000);
    c.pilot.ignore_pending = true;
    assert_eq!(sm.evaluate(&c, 20), None);

    let mut c = cond(Resistance::Ohms(2_700), 32_000);
    c.pilot.connected = false;
    assert_eq!(sm.evaluate(&c, 30), None);
    assert_eq!(sm.state(), ChargeState::A);
}

fn with_negative(mut c: Conditions, cp1_mv: i32, cp2_mv: i32, updates: u16) -> Conditions {
    c.pilot.cp1_negative_mv = cp1_mv;
    c.pilot.cp2_negative_mv = cp2_mv;
    c.pilot.cp1_negative_updates = updates;
    c.pilot.cp2_negative_updates = updates;
    c
}

#[test]
fn test_diode_check_passes_after_clean_windows() {
    let mut sm = Iec61851::new(false, 0);
    assert!(sm.diode_check_pending());

    let mut now = 0;
    sm.evaluate(&cond(Resistance::Ohms(2_700), 32_000), now);
    assert_eq!(sm.state(), ChargeState::B);

    for n in 0..50u16 {
        now += 1;
        let c = with_negative(cond(Resistance::Ohms(2_700), 32_000), -12_000, -12_000, n / 10);
        sm.evaluate(&c, now);
    }
    assert!(sm.diode_check_pending());

    for _ in 0..200 {
        now += 1;
        let c = with_negative(cond(Resistance::Ohms(2_700), 32_000), -12_000, -12_000, 5);
        sm.evaluate(&c, now);
    }
    assert!(!sm.diode_check_pending());

    // Back to A re-arms it
    sm.evaluate(&cond(Resistance::Invalid, 32_000), now + 1);
    assert!(sm.diode_check_pending());
}

#[test]
fn test_diode_fault_in_c_falls_back_to_b() {
    let mut sm = Iec61851::new(false, 0);
    let mut now = 0;
    sm.evaluate(&cond(Resistance::Ohms(880), 32_000), now);
    assert_eq!(sm.state(), ChargeState::C);

    // Glitch filter: 100 bad cycles are tolerated
    let bad = with_negative(cond(Resistance::Ohms(880), 32_000), -12_000, -9_000, 1);
    for _ in 0..100 {
        now += 1;
        sm.evaluate(&bad, now);
    }
    assert_eq!(sm.state(), ChargeState::C);

    now += 1;
    assert_eq!(
        sm.evaluate(&bad, now),
        Some(Transition { from: ChargeState::C, to: ChargeState::B })
    );
    assert_eq!(sm.indicator(), Indicator::Pilot);
    assert!(sm.diode_error_active());
    assert_eq!(sm.output(32_000), (533, false));

    // Fault gone: hold B until the counter ran down
    let good = with_negative(cond(Resistance::Ohms(880), 32_000), -12_000, -12_000, 2);
    for _ in 0..99 {
        now += 1;
        sm.evaluate(&good, now);
    }
    assert_eq!(sm.state(), ChargeState::B);

    now += 1;
    sm.evaluate(&good, now);
    assert_eq!(sm.state(), ChargeState::C);
    assert_eq!(sm.indicator(), Indicator::Ok);
}

#[test]
fn test_diode_fault_in_b_blocks_immediately() {
    let mut sm = Iec61851::new(false, 0);
    sm.evaluate(&cond(Resistance::Ohms(2_700), 32_000), 0);

    // Positive half alone would say C
    let bad = with_negative(cond(Resistance::Ohms(880), 32_000), -5_000, -5_000, 1);
    sm.evaluate(&bad, 10);
    assert_eq!(sm.state(), ChargeState::B);
    assert_eq!(sm.indicator(), Indicator::Pilot);
}
