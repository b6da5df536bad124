use clap::{Parser, ValueEnum};
use colored::Colorize;
use evse_core::{AuthToken, ChargeState, EvseConfig, JumperConfig, DC_FAULT_RESET_TOKEN};
use evse_host::{AbortWatchdog, FileSystemStore, HostClock, SimulatedPlant, Vehicle};
use evse_iec61851::{EvseController, EvseHal, Transition};
use log::{info, warn};
use rand::Rng;
use std::path::PathBuf;
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};
use std::time::Duration;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Jumper { A6, A10, A13, A16, A20, A25, A32, Software, Unconfigured }

impl From<Jumper> for JumperConfig {
    fn from(j: Jumper) -> Self {
        match j {
            Jumper::A6 => JumperConfig::A6,
            Jumper::A10 => JumperConfig::A10,
            Jumper::A13 => JumperConfig::A13,
            Jumper::A16 => JumperConfig::A16,
            Jumper::A20 => JumperConfig::A20,
            Jumper::A25 => JumperConfig::A25,
            Jumper::A32 => JumperConfig::A32,
            Jumper::Software => JumperConfig::Software,
            Jumper::Unconfigured => JumperConfig::Unconfigured,
        }
    }
}

/// Scripted events played against the simulated plant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Plug in, charge, pause, unplug.
    Charge,
    /// Residual current during charging, then an authorised reset.
    DcFault,
    /// Contactor welds while charging.
    Weld,
    /// Vehicle without the pilot diode.
    Diode,
    /// ADC stops converting; the watchdog aborts the process.
    Stall,
}

#[derive(Parser)]
struct Cli {
    #[arg(long, value_enum, default_value = "a32")] jumper: Jumper,
    #[arg(long, value_enum, default_value = "charge")] scenario: Scenario,
    /// Seconds to run; 0 runs until Ctrl-C.
    #[arg(long, default_value_t = 60)] duration: u64,
    /// Directory holding the persisted slot defaults.
    #[arg(long, default_value = "./evse-state")] state_dir: PathBuf,
    /// Peak ADC noise in codes.
    #[arg(long, default_value_t = 0)] noise: u16,
    /// Main-loop period in milliseconds.
    #[arg(long, default_value_t = 1)] period_ms: u64,
    #[arg(long)] hysteresis: bool,
}

/// Plays one scenario step at `t` seconds after start. Returns a line for the console.
fn script(
    scenario: Scenario,
    t: u64,
    plug_at: u64,
    plant: &SimulatedPlant,
    evse: &mut EvseController,
) -> anyhow::Result<Option<String>> {
    let vehicle = Vehicle {
        diode_ok: scenario != Scenario::Diode,
        ..Vehicle::default()
    };

    // 1. COMMON PART: plug in
    if t == plug_at {
        plant.plug_in(vehicle);
        return Ok(Some("vehicle plugged in".into()));
    }

    // 2. SCENARIO PART
    let line = match (scenario, t.saturating_sub(plug_at)) {
        (Scenario::Charge, 15) => {
            plant.set_wants_charge(false);
            Some("vehicle paused")
        }
        (Scenario::Charge, 25) => {
            plant.set_wants_charge(true);
            Some("vehicle resumed")
        }
        (Scenario::DcFault, 10) => {
            plant.inject_leak(true, false, false);
            Some("6 mA DC leak")
        }
        (Scenario::DcFault, 12) => {
            plant.clear_leak();
            Some("leak cleared")
        }
        (Scenario::DcFault, 15) => {
            evse.reset_dc_fault(&AuthToken::new(DC_FAULT_RESET_TOKEN))?;
            Some("dc fault reset")
        }
        (Scenario::Weld, 10) => {
            plant.set_welded(true);
            plant.set_wants_charge(false);
            Some("contactor welded, vehicle stops")
        }
        (Scenario::Stall, 10) => {
            plant.stall_adc();
            Some("adc stalled")
        }
        (_, 40) => {
            plant.unplug();
            Some("vehicle unplugged")
        }
        _ => None,
    };
    Ok(line.map(String::from))
}

fn print_transition(t: Transition) {
    let to = format!("{:?}", t.to);
    let to = match t.to {
        ChargeState::C => to.green().bold(),
        ChargeState::B => to.cyan(),
        ChargeState::EF | ChargeState::D => to.red().bold(),
        ChargeState::A => to.normal(),
    };
    println!("{} {:?} -> {}", "[STATE]".bold(), t.from, to);
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    info!(">>> EVSE SIM: {:?} / {:?} <<<", cli.scenario, cli.jumper);

    let store = FileSystemStore::new(&cli.state_dir)?;
    let defaults = match store.load() {
        Ok(Some(d)) => d,
        Ok(None) => evse_slots::factory_defaults(),
        Err(e) => {
            warn!("Slot defaults unreadable ({}), using factory defaults", e);
            evse_slots::factory_defaults()
        }
    };

    let clock = HostClock::new();
    let plant = SimulatedPlant::new(Arc::new(clock));
    plant.set_noise(cli.noise);

    let hal = EvseHal {
        adc: plant.adc(),
        inputs: plant.inputs(),
        output: plant.output(),
        clock: Box::new(clock),
        store: Box::new(store),
        lock: None,
        watchdog: Box::new(AbortWatchdog),
    };
    let config = EvseConfig {
        jumper: cli.jumper.into(),
        cp_hysteresis: cli.hysteresis,
        ..EvseConfig::default()
    };
    let mut evse = EvseController::new(hal, config, defaults);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    // Vehicle shows up a little after the first sensor self-test
    let plug_at = rand::thread_rng().gen_range(5..8);
    let mut last_second = None;

    while running.load(Ordering::SeqCst) {
        if let Some(t) = evse.tick() {
            print_transition(t);
        }

        let snap = evse.snapshot();
        let t = u64::from(snap.uptime_ms / 1_000);
        if last_second != Some(t) {
            last_second = Some(t);
            if let Some(line) = script(cli.scenario, t, plug_at, &plant, &mut evse)? {
                println!("{} {}", "[SCRIPT]".yellow(), line);
            }
            info!(
                "t={}s state={:?} vehicle={:?} indicator={:?} cp={:?} allowed={}mA duty={} contactor={}",
                t,
                snap.state,
                snap.vehicle,
                snap.indicator,
                snap.cp_resistance,
                snap.allowed_current_ma,
                snap.duty_cycle,
                snap.contactor_commanded
            );
            if cli.duration != 0 && t >= cli.duration {
                break;
            }
        }

        std::thread::sleep(Duration::from_millis(cli.period_ms));
    }

    let snap = evse.snapshot();
    println!(
        "{} state {:?}, indicator {:?}, charged {} s",
        "[DONE]".bold(),
        snap.state,
        snap.indicator,
        snap.charging_time_ms / 1_000
    );
    Ok(())
}
