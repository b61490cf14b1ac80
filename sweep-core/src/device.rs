//! # Device Interfaces Module
//!
//! Narrow contracts for the two instruments a sweep drives: the receiver
//! under test and the external signal source used for SNR measurements.
//! The measurement engine only talks to these traits, so real drivers,
//! the simulated bench and scripted test doubles are interchangeable.
//!
//! ## Features
//! - Per-call `Result` types so skip-vs-abort policy stays visible
//! - Direct-sampling and gain-control modes as closed enums
//! - Default no-op `reset`/`close` hooks for drivers that need them

use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};

use crate::error::{AcquisitionError, DeviceConfigError, InstrumentError};

/// Receiver sampling path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    /// Normal tuner path through the quadrature front end.
    #[default]
    Quadrature,
    /// Direct sampling on the I ADC input.
    DirectI,
    /// Direct sampling on the Q ADC input.
    DirectQ,
}

/// Gain control of the receiver front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    Auto,
    #[default]
    Manual,
}

/// A tunable receiver that delivers blocks of complex baseband samples.
pub trait Receiver {
    /// Tunes the receiver to `freq_hz`.
    fn set_center_frequency(&mut self, freq_hz: f64) -> Result<(), DeviceConfigError>;

    fn set_sample_rate(&mut self, rate_hz: f64) -> Result<(), DeviceConfigError>;

    fn set_direct_sampling(&mut self, mode: SamplingMode) -> Result<(), DeviceConfigError>;

    fn set_gain_mode(&mut self, mode: GainMode) -> Result<(), DeviceConfigError>;

    /// Sets the manual tuner gain in dB.
    fn set_gain(&mut self, gain_db: f64) -> Result<(), DeviceConfigError>;

    fn set_frequency_correction(&mut self, ppm: i32) -> Result<(), DeviceConfigError>;

    /// Reads exactly `count` samples, blocking until they are available.
    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex<f32>>, AcquisitionError>;

    /// Re-establishes the device after a failed retune. The controller sets
    /// the sample rate again once this returns.
    fn reset(&mut self) -> Result<(), DeviceConfigError> {
        Ok(())
    }

    /// Releases the device. Called once when the sweep controller is dropped.
    fn close(&mut self) {}
}

/// An external signal generator that injects the SNR test tone.
pub trait SignalSource {
    /// Returns the instrument identification string.
    fn identify(&mut self) -> Result<String, InstrumentError>;

    fn set_power_level(&mut self, dbm: f64) -> Result<(), InstrumentError>;

    fn set_output_frequency(&mut self, freq_hz: f64) -> Result<(), InstrumentError>;

    fn set_output_enabled(&mut self, enabled: bool) -> Result<(), InstrumentError>;
}
