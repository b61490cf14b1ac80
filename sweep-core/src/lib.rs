// sweep-core/src/lib.rs

//! The measurement engine for SDR receiver characterisation.
//! This crate plans frequency sweeps, drives a receiver (and, for SNR
//! measurements, a signal generator) through them, and reduces the captured
//! spectra into noise-floor, harmonic and SNR curves. It is completely
//! headless; hardware is reached only through the traits in `device`.

pub mod averaging;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod fft;
pub mod measurement;
pub mod plan;
pub mod results;
pub mod scpi;
pub mod simulator;

pub use config::{FrequencyUnit, ProjectInfo, SweepConfig, SweepMode, SweepSettings};
pub use device::{GainMode, Receiver, SamplingMode, SignalSource};
pub use error::{AcquisitionError, ConfigError, DeviceConfigError, InstrumentError, SweepError};
pub use measurement::{SweepController, SweepProgress};
pub use plan::FrequencyPlan;
pub use results::{BinStatus, ReportedSeries, SkipReason, SweepReport};
