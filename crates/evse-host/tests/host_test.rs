use std::fs;
use std::sync::Arc;

use evse_core::{Slot, SLOT_COUNT};
use evse_hal::{AdcChannel, ConfigStore, Input, MonotonicClock};
use evse_host::{FileSystemStore, ManualClock, SimulatedPlant, Vehicle};

#[test]
fn test_store_survives_restart() {
    let test_dir = std::env::temp_dir().join(format!("evse_store_{}", std::process::id()));
    let _ = fs::remove_dir_all(&test_dir);

    // First boot: nothing stored yet
    {
        let store = FileSystemStore::new(&test_dir).unwrap();
        assert!(store.load().unwrap().is_none());
    }

    let mut defaults = [Slot::inactive(); SLOT_COUNT];
    defaults[7] = Slot::new(16_000, true, true);
    {
        let mut store = FileSystemStore::new(&test_dir).unwrap();
        store.persist_slot_defaults(&defaults).expect("persist failed");
        assert!(!test_dir.join("slot_defaults.tmp").exists());
    }

    // Reboot
    {
        let store = FileSystemStore::new(&test_dir).unwrap();
        let restored = store.load().unwrap().expect("defaults missing");
        assert_eq!(restored, defaults);
    }

    // Corrupt file is reported, not silently replaced
    fs::write(test_dir.join("slot_defaults.bin"), b"garbage").unwrap();
    let store = FileSystemStore::new(&test_dir).unwrap();
    assert!(store.load().is_err());

    let _ = fs::remove_dir_all(&test_dir);
}

#[test]
fn test_manual_clock_is_shared_and_wraps() {
    let clock = ManualClock::new(u32::MAX - 5);
    let view = clock.clone();
    clock.advance(10);
    assert_eq!(view.now_ms(), 4);
}

#[test]
fn test_plant_contactor_lines() {
    let clock = ManualClock::new(0);
    let plant = SimulatedPlant::new(Arc::new(clock.clone()));
    let inputs = plant.inputs();
    let mut output = plant.output();

    let toggles = |input: Input| (0..10).map(|_| inputs.read(input)).filter(|&l| l).count();

    // Grid side live, vehicle side dead while open
    assert_eq!(toggles(Input::Ac1), 5);
    assert_eq!(toggles(Input::Ac2), 0);

    output.set_contactor(true);
    assert_eq!(toggles(Input::Ac2), 5);

    output.set_contactor(false);
    plant.set_welded(true);
    assert_eq!(toggles(Input::Ac2), 5);
}

#[test]
fn test_plant_sensor_answers_test_pulse() {
    let clock = ManualClock::new(1_000);
    let plant = SimulatedPlant::new(Arc::new(clock.clone()));
    let inputs = plant.inputs();
    let mut output = plant.output();

    output.set_fault_test_line(true);
    clock.advance(250);
    output.set_fault_test_line(false);
    assert!(!plant.test_line_active());

    clock.advance(150);
    assert!(inputs.read(Input::DcX6));
    assert!(!inputs.read(Input::DcX30));

    clock.advance(100);
    assert!(inputs.read(Input::DcX30));
    assert!(!inputs.read(Input::DcError));

    clock.advance(1_000);
    assert!(!inputs.read(Input::DcX6));
    assert!(!inputs.read(Input::DcX30));
}

#[test]
fn test_plant_pilot_levels() {
    let clock = ManualClock::new(0);
    let plant = SimulatedPlant::new(Arc::new(clock));
    let mut adc = plant.adc();
    let mut output = plant.output();

    // Nobody attached: both paths at +12 V
    let idle = adc.poll(AdcChannel::Cp2).unwrap();
    assert_eq!(idle, adc.poll(AdcChannel::Cp1).unwrap());

    // B: the vehicle resistor loads CP2
    plant.plug_in(Vehicle::default());
    let connected = adc.poll(AdcChannel::Cp2).unwrap();
    assert!(connected < idle);

    // C: PWM offered, S2 closed, CP2 lower still; every tenth sample is
    // on the positive half at 10 % duty
    output.set_cp_duty_cycle(100);
    let codes: Vec<u16> = (0..10).map(|_| adc.poll(AdcChannel::Cp2).unwrap()).collect();
    let positive: Vec<u16> = codes.iter().copied().filter(|&c| c >= 2_048).collect();
    assert_eq!(positive.len(), 1);
    assert!(positive[0] < connected);

    plant.stall_adc();
    assert!(adc.poll(AdcChannel::Cp1).is_err());
}
