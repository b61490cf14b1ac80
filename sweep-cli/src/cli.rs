//! Command-line arguments and how they override the settings file.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use sweep_core::{FrequencyUnit, SweepSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Dense noise-floor sweep
    Noise,
    /// Levels at multiples of a fundamental
    Harmonic,
    /// Floor and injected-tone SNR per step
    Snr,
}

/// Sweeps an SDR receiver across a frequency range and records its noise
/// floor, harmonic spurs or SNR.
#[derive(Debug, Parser)]
#[command(name = "sdr-sweep", version)]
pub struct Args {
    /// JSON settings file; omitted fields keep their defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Start frequency, in the settings unit
    #[arg(long)]
    pub start: Option<f64>,

    /// Stop frequency, in the settings unit
    #[arg(long)]
    pub stop: Option<f64>,

    /// Frequency unit (Hz, kHz, MHz, GHz)
    #[arg(long)]
    pub unit: Option<FrequencyUnit>,

    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Harmonic fundamental, in the settings unit
    #[arg(long)]
    pub fundamental: Option<f64>,

    /// SNR step size, in the settings unit
    #[arg(long)]
    pub snr_step: Option<f64>,

    /// Signal generator power in dBm
    #[arg(long, allow_negative_numbers = true)]
    pub power: Option<f64>,

    /// Manual receiver gain in dB
    #[arg(long)]
    pub gain: Option<f64>,

    /// Use automatic gain control instead of the manual gain
    #[arg(long)]
    pub agc: bool,

    /// Frames averaged per bin
    #[arg(long)]
    pub fft_avg: Option<usize>,

    /// Frames discarded after every retune
    #[arg(long)]
    pub dump_frames: Option<usize>,

    /// SCPI signal generator at host[:port]; the simulated one is used otherwise
    #[arg(long)]
    pub sig_gen: Option<String>,

    /// Directory receiving the CSV files and JSON report
    #[arg(short, long, default_value = "data")]
    pub output: PathBuf,

    /// Seed of the simulated receiver's noise
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Noise floor of the simulated receiver in dBFS per bin
    #[arg(long, allow_negative_numbers = true, default_value_t = -90.0)]
    pub sim_floor: f64,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the effective settings as JSON and exit
    #[arg(long)]
    pub print_config: bool,
}

impl Args {
    /// Loads the settings file (if any) and applies the command-line overrides.
    pub fn settings(&self) -> Result<SweepSettings> {
        let mut settings = match &self.config {
            Some(path) => {
                let data = fs::read_to_string(path)
                    .with_context(|| format!("reading settings file {}", path.display()))?;
                serde_json::from_str(&data)
                    .with_context(|| format!("parsing settings file {}", path.display()))?
            }
            None => SweepSettings::default(),
        };
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut SweepSettings) {
        if let Some(unit) = self.unit {
            settings.freq_unit = unit;
        }
        if let Some(start) = self.start {
            settings.freq_start = start;
        }
        if let Some(stop) = self.stop {
            settings.freq_stop = stop;
        }
        if let Some(mode) = self.mode {
            settings.harmonic_mode = mode == ModeArg::Harmonic;
            settings.snr_mode = mode == ModeArg::Snr;
        }
        if let Some(fundamental) = self.fundamental {
            settings.harmonic_freq = fundamental;
        }
        if let Some(step) = self.snr_step {
            settings.snr_step = step;
        }
        if let Some(power) = self.power {
            settings.sig_gen_power_dbm = power;
        }
        if let Some(gain) = self.gain {
            settings.gain_db = gain;
        }
        if self.agc {
            settings.agc = true;
        }
        if let Some(fft_avg) = self.fft_avg {
            settings.fft_avg = fft_avg;
        }
        if let Some(dump_frames) = self.dump_frames {
            settings.dump_frames = dump_frames;
        }
        if let Some(address) = &self.sig_gen {
            settings.sig_gen_address = Some(address.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mode_flag_replaces_both_mode_switches() {
        let args = Args::parse_from(["sdr-sweep", "--mode", "snr", "--power", "-90"]);
        let mut settings = SweepSettings {
            harmonic_mode: true,
            ..SweepSettings::default()
        };
        args.apply(&mut settings);

        assert!(settings.snr_mode);
        assert!(!settings.harmonic_mode);
        assert_eq!(settings.sig_gen_power_dbm, -90.0);
    }

    #[test]
    fn overrides_apply_on_top_of_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "freq_start": 100, "freq_stop": 200, "fft_avg": 10 }}"#).unwrap();
        let path = file.path().to_str().unwrap();

        let args = Args::parse_from([
            "sdr-sweep", "--config", path, "--stop", "300", "--unit", "khz",
        ]);
        let settings = args.settings().unwrap();

        assert_eq!(settings.freq_start, 100.0);
        assert_eq!(settings.freq_stop, 300.0);
        assert_eq!(settings.fft_avg, 10);
        assert_eq!(settings.freq_unit, FrequencyUnit::KHz);
    }

    #[test]
    fn missing_settings_file_is_reported() {
        let args = Args::parse_from(["sdr-sweep", "--config", "/nonexistent/sweep.json"]);
        let err = args.settings().unwrap_err();
        assert!(err.to_string().contains("reading settings file"));
    }
}
