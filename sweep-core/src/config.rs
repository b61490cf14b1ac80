//! # Sweep Configuration Module
//!
//! Holds the immutable parameters of a measurement sweep and the
//! file-friendly settings format they are loaded from.
//!
//! ## Features
//! - `SweepSettings`: serde parameter file, values in a chosen frequency unit
//! - `SweepConfig`: validated parameters in Hz, passed to planner and controller
//! - `SweepMode`: closed variant for NoiseFloor / Harmonic / SNR operation
//! - Result-shape helpers (trim margin, trimmed row length)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::device::{GainMode, SamplingMode};
use crate::error::ConfigError;

/// Values at or below this level (dB) are treated as degenerate and clamped.
pub const DEGENERATE_FLOOR_DB: f32 = -150.0;

/// Offset of the injected SNR tone from the tuning frequency, as a fraction
/// of the sample rate.
pub const TONE_OFFSET_FRACTION: f64 = 0.1;

/// Unit used for frequencies in the settings file and in progress output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrequencyUnit {
    #[serde(rename = "Hz", alias = "hz")]
    Hz,
    #[serde(rename = "kHz", alias = "KHz", alias = "khz")]
    KHz,
    #[default]
    #[serde(rename = "MHz", alias = "mhz")]
    MHz,
    #[serde(rename = "GHz", alias = "ghz")]
    GHz,
}

impl FrequencyUnit {
    /// Multiplier converting a value in this unit to Hz.
    pub fn factor(self) -> f64 {
        match self {
            FrequencyUnit::Hz => 1.0,
            FrequencyUnit::KHz => 1e3,
            FrequencyUnit::MHz => 1e6,
            FrequencyUnit::GHz => 1e9,
        }
    }

    pub fn to_hz(self, value: f64) -> f64 {
        value * self.factor()
    }

    pub fn from_hz(self, hz: f64) -> f64 {
        hz / self.factor()
    }
}

impl fmt::Display for FrequencyUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrequencyUnit::Hz => "Hz",
            FrequencyUnit::KHz => "kHz",
            FrequencyUnit::MHz => "MHz",
            FrequencyUnit::GHz => "GHz",
        };
        f.write_str(label)
    }
}

impl FromStr for FrequencyUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hz" => Ok(FrequencyUnit::Hz),
            "khz" => Ok(FrequencyUnit::KHz),
            "mhz" => Ok(FrequencyUnit::MHz),
            "ghz" => Ok(FrequencyUnit::GHz),
            _ => Err(ConfigError::UnknownUnit(s.to_string())),
        }
    }
}

/// What the sweep measures. Harmonic and SNR operation exclude each other.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SweepMode {
    /// Full sweep, one trimmed spectrum row per bin.
    #[default]
    NoiseFloor,
    /// Peak level at every multiple of a fundamental (e.g. the reference oscillator).
    Harmonic { fundamental_hz: f64 },
    /// Noise baseline, then peak with an injected tone, per step.
    Snr { step_hz: f64, power_dbm: f64 },
}

impl SweepMode {
    pub fn name(&self) -> &'static str {
        match self {
            SweepMode::NoiseFloor => "Noise Floor",
            SweepMode::Harmonic { .. } => "Harmonic",
            SweepMode::Snr { .. } => "SNR",
        }
    }

    pub fn is_snr(&self) -> bool {
        matches!(self, SweepMode::Snr { .. })
    }
}

/// Validated sweep parameters. All frequencies are in Hz.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepConfig {
    pub start_hz: f64,
    pub stop_hz: f64,
    pub sample_rate_hz: f64,
    /// Transform length. Frames shorter than this are zero-padded.
    pub fft_size: usize,
    /// Number of samples read per frame.
    pub frame_len: usize,
    /// Fraction of the sample rate kept per bin; adjacent bins overlap by the rest.
    pub overlap: f64,
    /// Frames averaged per bin.
    pub fft_avg: usize,
    /// Frames discarded after every retune.
    pub dump_frames: usize,
    pub gain_db: f64,
    pub gain_mode: GainMode,
    pub ppm_correction: i32,
    /// Below this tuning frequency the receiver switches to direct sampling.
    pub direct_sampling_threshold_hz: f64,
    pub direct_sampling_branch: SamplingMode,
    pub tone_settle: Duration,
    pub mode: SweepMode,
    /// Unit used when reporting progress.
    pub display_unit: FrequencyUnit,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_hz: 25e6,
            stop_hz: 1750e6,
            sample_rate_hz: 2.4e6,
            fft_size: 2048,
            frame_len: 2048,
            overlap: 0.5,
            fft_avg: 100,
            dump_frames: 100,
            gain_db: 50.0,
            gain_mode: GainMode::Manual,
            ppm_correction: 0,
            direct_sampling_threshold_hz: 25e6,
            direct_sampling_branch: SamplingMode::DirectQ,
            tone_settle: Duration::from_millis(200),
            mode: SweepMode::NoiseFloor,
            display_unit: FrequencyUnit::MHz,
        }
    }
}

impl SweepConfig {
    /// Builds a config from settings, converting units and validating the result.
    pub fn from_settings(settings: &SweepSettings) -> Result<Self, ConfigError> {
        let unit = settings.freq_unit;

        let mode = match (settings.harmonic_mode, settings.snr_mode) {
            (true, true) => return Err(ConfigError::ConflictingModes),
            (true, false) => SweepMode::Harmonic {
                fundamental_hz: unit.to_hz(settings.harmonic_freq),
            },
            (false, true) => SweepMode::Snr {
                step_hz: unit.to_hz(settings.snr_step),
                power_dbm: settings.sig_gen_power_dbm,
            },
            (false, false) => SweepMode::NoiseFloor,
        };

        let config = Self {
            start_hz: unit.to_hz(settings.freq_start),
            stop_hz: unit.to_hz(settings.freq_stop),
            sample_rate_hz: unit.to_hz(settings.sample_rate),
            fft_size: settings.fft_size.unwrap_or(settings.frame_len),
            frame_len: settings.frame_len,
            overlap: settings.overlap,
            fft_avg: settings.fft_avg,
            dump_frames: settings.dump_frames,
            gain_db: settings.gain_db,
            gain_mode: if settings.agc {
                GainMode::Auto
            } else {
                GainMode::Manual
            },
            ppm_correction: settings.ppm_correction,
            direct_sampling_threshold_hz: unit.to_hz(settings.freq_direct_sampling),
            direct_sampling_branch: settings.direct_sampling_branch,
            tone_settle: Duration::from_millis(settings.tone_settle_ms),
            mode,
            display_unit: unit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks every invariant the planner and controller rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("stop frequency", self.stop_hz)?;
        positive("sample rate", self.sample_rate_hz)?;
        if !self.start_hz.is_finite() || self.start_hz < 0.0 || self.start_hz >= self.stop_hz {
            return Err(ConfigError::InvalidRange {
                start_hz: self.start_hz,
                stop_hz: self.stop_hz,
            });
        }
        if !(self.overlap > 0.0 && self.overlap <= 1.0) {
            return Err(ConfigError::OverlapOutOfRange(self.overlap));
        }
        at_least("frame length", 2, self.frame_len)?;
        at_least("averaging count", 1, self.fft_avg)?;
        if self.fft_size < self.frame_len {
            return Err(ConfigError::FftSizeTooSmall {
                fft_size: self.fft_size,
                frame_len: self.frame_len,
            });
        }
        at_least("trimmed spectrum length", 1, self.trimmed_len())?;

        match self.mode {
            SweepMode::NoiseFloor => {}
            SweepMode::Harmonic { fundamental_hz } => {
                positive("harmonic fundamental", fundamental_hz)?;
                let span_hz = self.stop_hz - self.start_hz;
                if span_hz < 2.0 * fundamental_hz {
                    return Err(ConfigError::HarmonicSpanTooNarrow {
                        span_hz,
                        fundamental_hz,
                    });
                }
            }
            SweepMode::Snr { step_hz, .. } => positive("SNR step size", step_hz)?,
        }
        Ok(())
    }

    /// Spacing of the dense noise-floor bins.
    pub fn noise_floor_step_hz(&self) -> f64 {
        self.sample_rate_hz * self.overlap
    }

    /// Number of points in every spectrum produced by the estimator.
    pub fn spectrum_len(&self) -> usize {
        self.fft_size
    }

    /// Samples dropped from each end of a spectrum to remove filter rolloff.
    pub fn trim_margin(&self) -> usize {
        let len = self.spectrum_len() as f64;
        ((len - len * self.overlap) / 2.0) as usize
    }

    /// Length of the central region kept from every spectrum.
    pub fn trimmed_len(&self) -> usize {
        self.spectrum_len().saturating_sub(2 * self.trim_margin())
    }

    /// Acquisition cycles per bin: background only, or background plus tone.
    pub fn cycle_count(&self) -> usize {
        if self.mode.is_snr() { 2 } else { 1 }
    }

    /// Where the SNR tone is placed for a bin tuned to `tuning_hz`.
    pub fn tone_frequency_hz(&self, tuning_hz: f64) -> f64 {
        tuning_hz + self.sample_rate_hz * TONE_OFFSET_FRACTION
    }

    pub fn sampling_mode_for(&self, tuning_hz: f64) -> SamplingMode {
        if tuning_hz < self.direct_sampling_threshold_hz {
            self.direct_sampling_branch
        } else {
            SamplingMode::Quadrature
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { name, value })
    }
}

fn at_least(name: &'static str, min: usize, value: usize) -> Result<(), ConfigError> {
    if value >= min {
        Ok(())
    } else {
        Err(ConfigError::TooSmall { name, min, value })
    }
}

/// Descriptive fields used to name exported files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    pub version: String,
    pub dut: String,
    pub comment: String,
}

impl Default for ProjectInfo {
    fn default() -> Self {
        Self {
            id: "001".to_string(),
            name: "Receiver".to_string(),
            version: "v1".to_string(),
            dut: "DUT".to_string(),
            comment: "Full_Sweep".to_string(),
        }
    }
}

impl ProjectInfo {
    /// Common prefix of every exported file name.
    pub fn file_stem(&self) -> String {
        [&self.id, &self.name, &self.version, &self.dut, &self.comment]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.replace(['/', '\\'], "-"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// Parameter file contents. Frequencies are expressed in `freq_unit`.
///
/// Every field has a default, so a settings file only needs the values it
/// changes:
///
/// ```json
/// { "freq_start": 25, "freq_stop": 1750, "freq_unit": "MHz", "snr_mode": true }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub project: ProjectInfo,
    pub freq_start: f64,
    pub freq_stop: f64,
    /// Direct sampling is used below this frequency.
    pub freq_direct_sampling: f64,
    pub sample_rate: f64,
    pub freq_unit: FrequencyUnit,
    pub gain_db: f64,
    pub agc: bool,
    pub frame_len: usize,
    /// Defaults to `frame_len` when absent.
    pub fft_size: Option<usize>,
    pub ppm_correction: i32,
    pub direct_sampling_branch: SamplingMode,
    pub harmonic_mode: bool,
    pub harmonic_freq: f64,
    pub snr_mode: bool,
    pub snr_step: f64,
    pub sig_gen_power_dbm: f64,
    /// `host` or `host:port` of a SCPI signal generator.
    pub sig_gen_address: Option<String>,
    pub overlap: f64,
    pub dump_frames: usize,
    pub fft_avg: usize,
    pub tone_settle_ms: u64,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            project: ProjectInfo::default(),
            freq_start: 25.0,
            freq_stop: 1750.0,
            freq_direct_sampling: 25.0,
            sample_rate: 2.4,
            freq_unit: FrequencyUnit::MHz,
            gain_db: 50.0,
            agc: false,
            frame_len: 2048,
            fft_size: None,
            ppm_correction: 0,
            direct_sampling_branch: SamplingMode::DirectQ,
            harmonic_mode: false,
            harmonic_freq: 28.8,
            snr_mode: false,
            snr_step: 3.6,
            sig_gen_power_dbm: -100.0,
            sig_gen_address: None,
            overlap: 0.5,
            dump_frames: 100,
            fft_avg: 100,
            tone_settle_ms: 200,
        }
    }
}
