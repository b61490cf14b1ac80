//! # sdr-sweep - Receiver Characterisation Sweeps
//!
//! Command-line front end of the sweep engine. It loads the sweep settings,
//! picks the instruments, runs the sweep and exports the results.
//!
//! ## Flow
//! - **Settings**: JSON file (optional) plus command-line overrides
//! - **Instruments**: simulated receiver; simulated or SCPI signal generator
//! - **Sweep**: `SweepController` with progress reported through the log
//! - **Export**: CSV curves and a JSON report under `--output`

mod cli;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use sweep_core::export::export_report;
use sweep_core::scpi::{DEFAULT_TIMEOUT, ScpiSignalSource};
use sweep_core::simulator::{SimulatorSettings, simulated_bench};
use sweep_core::{BinStatus, SignalSource, SweepConfig, SweepController, SweepSettings};

use cli::Args;

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings = args.settings()?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let config = SweepConfig::from_settings(&settings).context("invalid sweep settings")?;
    run_sweep(&args, &settings, config)
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

/// Runs one sweep on the simulated receiver and exports the report.
///
/// # Arguments
/// * `args` - Parsed command line (output directory, simulator seed)
/// * `settings` - Effective settings, used for project naming and the generator address
/// * `config` - Validated sweep parameters
fn run_sweep(args: &Args, settings: &SweepSettings, config: SweepConfig) -> Result<()> {
    let simulator = SimulatorSettings {
        noise_floor_dbfs: args.sim_floor,
        ..SimulatorSettings::default()
    };
    let (receiver, simulated_source) = simulated_bench(simulator, args.seed);

    let source: Option<Box<dyn SignalSource>> = if !config.mode.is_snr() {
        None
    } else if let Some(address) = &settings.sig_gen_address {
        let scpi = ScpiSignalSource::connect(address, DEFAULT_TIMEOUT)
            .with_context(|| format!("connecting to signal generator at {}", address))?;
        Some(Box::new(scpi))
    } else {
        info!("[CLI] No signal generator address given, using the simulated generator");
        Some(Box::new(simulated_source))
    };

    let unit = config.display_unit;
    let skipped = Rc::new(RefCell::new(Vec::new()));
    let skipped_sink = Rc::clone(&skipped);

    let mut controller = SweepController::new(config, receiver, source)
        .context("could not set up sweep")?
        .on_progress(move |progress| {
            if let BinStatus::Skipped(reason) = progress.status {
                skipped_sink
                    .borrow_mut()
                    .push((progress.frequency_hz, reason));
            }
        });
    let report = controller.run().context("sweep failed")?;
    // Releases the receiver and switches the generator off before exporting.
    drop(controller);

    for (frequency_hz, reason) in skipped.borrow().iter() {
        warn!(
            "[CLI] Bin at {} {} has no data ({:?})",
            unit.from_hz(*frequency_hz),
            unit,
            reason
        );
    }

    let written = export_report(&args.output, &settings.project, &report, unit)
        .context("exporting results")?;
    println!(
        "{} sweep: {} of {} bins measured in {:.1} s",
        report.mode.name(),
        report.measured_bins(),
        report.bins.len(),
        report.elapsed_secs
    );
    for path in written {
        println!("  {}", path.display());
    }
    Ok(())
}
