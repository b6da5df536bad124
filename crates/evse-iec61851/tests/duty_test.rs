use evse_iec61851::duty_cycle_for_ma;

#[test]
fn test_duty_cycle_points() {
    // No current offered: 100 %, not 0 %
    assert_eq!(duty_cycle_for_ma(0), 1000);

    assert_eq!(duty_cycle_for_ma(6_000), 100);
    assert_eq!(duty_cycle_for_ma(16_000), 266);
    assert_eq!(duty_cycle_for_ma(32_000), 533);
    assert_eq!(duty_cycle_for_ma(51_000), 850);

    // Upper segment of the curve
    assert_eq!(duty_cycle_for_ma(63_000), 892);
    assert_eq!(duty_cycle_for_ma(64_000), 896);
    assert_eq!(duty_cycle_for_ma(80_000), 960);
}

#[test]
fn test_duty_cycle_clamps_to_standard_range() {
    assert_eq!(duty_cycle_for_ma(1), 80);
    assert_eq!(duty_cycle_for_ma(3_000), 80);
    assert_eq!(duty_cycle_for_ma(u32::from(u16::MAX)), 902);
    // Beyond 80 A the curve would pass 100 %
    assert_eq!(duty_cycle_for_ma(100_000), 1000);
}
