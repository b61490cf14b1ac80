//! # Error Types
//!
//! Every device and instrument operation returns an explicit result so the
//! sweep can decide per call whether to skip a frame, skip a bin, or abort.
//!
//! | Error               | Raised by                        | Policy            |
//! |---------------------|----------------------------------|-------------------|
//! | `ConfigError`       | settings validation              | fatal, up front   |
//! | `DeviceConfigError` | retune / receiver setters        | skip the bin      |
//! | `AcquisitionError`  | sample reads                     | skip the frame    |
//! | `InstrumentError`   | signal generator commands        | skip the SNR value|
//! | `SweepError`        | startup, missing collaborators   | fatal             |

use thiserror::Error;

/// Invalid sweep parameters, rejected before any hardware is touched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("harmonic mode and SNR mode cannot be enabled at the same time")]
    ConflictingModes,

    #[error("start frequency {start_hz} Hz must be below stop frequency {stop_hz} Hz")]
    InvalidRange { start_hz: f64, stop_hz: f64 },

    #[error("{name} must be a positive finite number (got {value})")]
    NotPositive { name: &'static str, value: f64 },

    #[error("overlap must be in (0, 1] (got {0})")]
    OverlapOutOfRange(f64),

    #[error("{name} must be at least {min} (got {value})")]
    TooSmall {
        name: &'static str,
        min: usize,
        value: usize,
    },

    #[error("fft size {fft_size} is smaller than the frame length {frame_len}")]
    FftSizeTooSmall { fft_size: usize, frame_len: usize },

    #[error(
        "harmonic mode needs a span of at least twice the fundamental \
         (span {span_hz} Hz, fundamental {fundamental_hz} Hz)"
    )]
    HarmonicSpanTooNarrow { span_hz: f64, fundamental_hz: f64 },

    #[error("unknown frequency unit '{0}' (expected Hz, kHz, MHz or GHz)")]
    UnknownUnit(String),
}

/// A receiver setter (tuning, sample rate, gain, ...) was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeviceConfigError {
    #[error("could not set center frequency to {freq_hz} Hz: {reason}")]
    Tune { freq_hz: f64, reason: String },

    #[error("could not set {parameter}: {reason}")]
    Parameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("receiver is closed")]
    Closed,
}

/// Reading a block of samples from the receiver failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionError {
    #[error("sample read failed: {0}")]
    Read(String),

    #[error("short read: expected {expected} samples, got {actual}")]
    ShortRead { expected: usize, actual: usize },
}

/// Communication with the external signal source failed.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("instrument I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("instrument did not answer within {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected instrument response: {0}")]
    Protocol(String),
}

/// Errors that stop a sweep before or instead of completing it.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sweep cannot start, receiver rejected the first planned frequency")]
    Startup(#[source] DeviceConfigError),

    #[error("signal source setup failed")]
    Instrument(#[from] InstrumentError),

    #[error("SNR mode requires a signal source")]
    MissingSignalSource,

    #[error("the sweep plan contains no frequencies")]
    EmptyPlan,
}
