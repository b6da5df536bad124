use evse_core::{
    AuthToken, ChargeState, EvseConfig, InputConfig, JumperConfig, PinLevel, Resistance,
    DC_FAULT_RESET_TOKEN,
};

#[test]
fn test_resistance_sentinel_is_never_numeric() {
    let open = Resistance::Invalid;
    assert_eq!(open.ohms(), None);
    assert!(!open.is_valid());

    // Invalid reads as "open", but is never inside a band.
    assert!(open.is_open_or_above(10_000));
    assert!(!open.is_within(0, u32::MAX));

    let r = Resistance::Ohms(880);
    assert!(r.is_within(300, 1_790));
    assert!(!r.is_open_or_above(1_790));
    assert!(!Resistance::Ohms(1_790).is_open_or_above(1_790));
}

#[test]
fn test_jumper_decoding() {
    let decode = |pu0, pd0, pu1, pd1| {
        JumperConfig::decode(PinLevel::from_pulls(pu0, pd0), PinLevel::from_pulls(pu1, pd1))
    };

    // open/high
    assert_eq!(decode(true, false, true, true), JumperConfig::A6);
    // open/low
    assert_eq!(decode(true, false, false, false), JumperConfig::A32);
    // low/low
    assert_eq!(decode(false, false, false, false), JumperConfig::Software);
    // high/high is reserved
    assert_eq!(decode(true, true, true, true), JumperConfig::Unconfigured);
    // A pin that reads low with pull-up and high with pull-down is broken
    assert_eq!(decode(false, true, true, false), JumperConfig::Unconfigured);
}

#[test]
fn test_jumper_current() {
    assert_eq!(JumperConfig::A16.max_current_ma(6_000), 16_000);
    assert_eq!(JumperConfig::Software.max_current_ma(10_000), 10_000);
    assert_eq!(JumperConfig::Unconfigured.max_current_ma(10_000), 0);
    assert!(!JumperConfig::Unconfigured.is_configured());
}

#[test]
fn test_input_polarity() {
    assert!(!InputConfig::Ignored.is_asserted(true));
    assert!(!InputConfig::Ignored.is_asserted(false));
    assert!(InputConfig::ActiveLow.is_asserted(false));
    assert!(InputConfig::ActiveHigh.is_asserted(true));
}

#[test]
fn test_defaults_are_safe() {
    let cfg = EvseConfig::default();
    assert_eq!(cfg.jumper, JumperConfig::Unconfigured);
    assert!(!cfg.cp_hysteresis);
    assert!(ChargeState::D.is_idle_like());
    assert!(!ChargeState::B.is_idle_like());
}

#[test]
fn test_auth_token() {
    assert!(AuthToken::new(DC_FAULT_RESET_TOKEN).matches(DC_FAULT_RESET_TOKEN));
    assert!(!AuthToken::new(0x1234_5678).matches(DC_FAULT_RESET_TOKEN));
}
