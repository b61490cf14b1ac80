//! # Sweep Results Module
//!
//! Per-bin measurement storage and the post-sweep reduction into the series
//! that exporters consume.
//!
//! `SweepResult` is allocated zero-filled once the plan length is known and
//! filled bin by bin; a bin that was skipped keeps its zero fill and records
//! why in its `BinStatus`. `ResultReducer` turns the finished result into a
//! serializable `SweepReport`.

use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::{SweepConfig, SweepMode};
use crate::device::SignalSource;
use crate::plan::FrequencyPlan;

/// Why a bin has no (complete) measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The receiver rejected the tuning frequency.
    Retune,
    /// A sampling, correction or gain setter failed.
    Configure,
    /// The signal source could not place the tone.
    Instrument,
    /// Every frame read for the bin failed.
    NoData,
}

/// Outcome of one bin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinStatus {
    #[default]
    Pending,
    Measured,
    Skipped(SkipReason),
}

/// Stored values, shaped by the sweep mode.
#[derive(Debug, Clone, PartialEq)]
pub enum BinValues {
    /// Noise-floor mode: one trimmed spectrum row per bin.
    Rows {
        frequencies_hz: Vec<Vec<f64>>,
        levels_db: Vec<Vec<f32>>,
    },
    /// Harmonic and SNR modes: one reduced level per bin.
    Levels { levels_db: Vec<f32> },
}

/// Measurements of a sweep in progress, indexed by bin.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    mode: SweepMode,
    tuning_hz: Vec<f64>,
    values: BinValues,
    snr_db: Option<Vec<f32>>,
    status: Vec<BinStatus>,
}

impl SweepResult {
    /// Allocates zero-filled storage shaped for `plan` under `config`.
    pub fn allocate(config: &SweepConfig, plan: &FrequencyPlan) -> Self {
        let bins = plan.len();
        let values = match config.mode {
            SweepMode::NoiseFloor => {
                let row_len = config.trimmed_len();
                BinValues::Rows {
                    frequencies_hz: vec![vec![0.0; row_len]; bins],
                    levels_db: vec![vec![0.0; row_len]; bins],
                }
            }
            SweepMode::Harmonic { .. } | SweepMode::Snr { .. } => BinValues::Levels {
                levels_db: vec![0.0; bins],
            },
        };
        let snr_db = config.mode.is_snr().then(|| vec![0.0; bins]);

        Self {
            mode: config.mode,
            tuning_hz: plan.as_slice().to_vec(),
            values,
            snr_db,
            status: vec![BinStatus::Pending; bins],
        }
    }

    pub fn mode(&self) -> SweepMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.tuning_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tuning_hz.is_empty()
    }

    pub fn tuning_hz(&self) -> &[f64] {
        &self.tuning_hz
    }

    pub fn values(&self) -> &BinValues {
        &self.values
    }

    /// Stores a trimmed spectrum row. Ignored outside noise-floor mode.
    pub fn store_row(&mut self, bin: usize, frequencies: &[f64], levels: &[f32]) {
        if let BinValues::Rows {
            frequencies_hz,
            levels_db,
        } = &mut self.values
        {
            if let (Some(freq_row), Some(level_row)) =
                (frequencies_hz.get_mut(bin), levels_db.get_mut(bin))
            {
                *freq_row = frequencies.to_vec();
                *level_row = levels.to_vec();
            }
        }
    }

    /// Stores a reduced level. Ignored in noise-floor mode.
    pub fn store_level(&mut self, bin: usize, level_db: f32) {
        if let BinValues::Levels { levels_db } = &mut self.values {
            if let Some(slot) = levels_db.get_mut(bin) {
                *slot = level_db;
            }
        }
    }

    pub fn store_snr(&mut self, bin: usize, snr_db: f32) {
        if let Some(slot) = self.snr_db.as_mut().and_then(|snr| snr.get_mut(bin)) {
            *slot = snr_db;
        }
    }

    pub fn row(&self, bin: usize) -> Option<(&[f64], &[f32])> {
        match &self.values {
            BinValues::Rows {
                frequencies_hz,
                levels_db,
            } => Some((frequencies_hz.get(bin)?, levels_db.get(bin)?)),
            BinValues::Levels { .. } => None,
        }
    }

    pub fn level(&self, bin: usize) -> Option<f32> {
        match &self.values {
            BinValues::Levels { levels_db } => levels_db.get(bin).copied(),
            BinValues::Rows { .. } => None,
        }
    }

    pub fn snr(&self, bin: usize) -> Option<f32> {
        self.snr_db.as_ref()?.get(bin).copied()
    }

    pub fn set_status(&mut self, bin: usize, status: BinStatus) {
        if let Some(slot) = self.status.get_mut(bin) {
            *slot = status;
        }
    }

    pub fn status(&self, bin: usize) -> Option<BinStatus> {
        self.status.get(bin).copied()
    }

    pub fn statuses(&self) -> &[BinStatus] {
        &self.status
    }
}

/// One noise-floor bin in the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumRow {
    pub tuning_hz: f64,
    pub frequencies_hz: Vec<f64>,
    pub levels_db: Vec<f32>,
}

/// A frequency-vs-level curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub label: String,
    pub frequencies_hz: Vec<f64>,
    pub levels_db: Vec<f32>,
}

/// Level series reported for the sweep's mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportedSeries {
    Rows { label: String, rows: Vec<SpectrumRow> },
    Curve(Curve),
}

/// Finished sweep, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub mode: SweepMode,
    pub levels: ReportedSeries,
    /// Present in SNR mode only.
    pub snr: Option<Curve>,
    pub bins: Vec<BinStatus>,
    pub elapsed_secs: f64,
}

impl SweepReport {
    pub fn measured_bins(&self) -> usize {
        self.bins
            .iter()
            .filter(|status| **status == BinStatus::Measured)
            .count()
    }

    pub fn skipped_bins(&self) -> usize {
        self.bins
            .iter()
            .filter(|status| matches!(status, BinStatus::Skipped(_)))
            .count()
    }
}

/// Turns a completed `SweepResult` into the reported series.
pub struct ResultReducer;

impl ResultReducer {
    /// Finalizes the sweep.
    ///
    /// In SNR mode the signal source output is disabled once more before the
    /// report is built; a failure there is logged and does not affect the
    /// report. No smoothing is applied to the stored values.
    ///
    /// # Arguments
    /// * `result` - The fully processed sweep
    /// * `source` - Signal source used for SNR cycles, if any
    /// * `elapsed` - Wall-clock duration of the sweep
    pub fn finalize<S: SignalSource + ?Sized>(
        result: SweepResult,
        source: Option<&mut S>,
        elapsed: Duration,
    ) -> SweepReport {
        if result.mode.is_snr() {
            if let Some(source) = source {
                if let Err(e) = source.set_output_enabled(false) {
                    warn!("[SIGGEN] Could not disable output after sweep: {}", e);
                }
            }
        }

        let SweepResult {
            mode,
            tuning_hz,
            values,
            snr_db,
            status,
        } = result;

        let levels = match values {
            BinValues::Rows {
                frequencies_hz,
                levels_db,
            } => ReportedSeries::Rows {
                label: "Noise Floor (dBFS)".to_string(),
                rows: tuning_hz
                    .iter()
                    .zip(frequencies_hz.into_iter().zip(levels_db))
                    .map(|(&tuning_hz, (frequencies_hz, levels_db))| SpectrumRow {
                        tuning_hz,
                        frequencies_hz,
                        levels_db,
                    })
                    .collect(),
            },
            BinValues::Levels { levels_db } => {
                let label = match mode {
                    SweepMode::Snr { .. } => "SNR Mode Noise Floor (dBFS)",
                    _ => "Harmonics Level (dBFS)",
                };
                ReportedSeries::Curve(Curve {
                    label: label.to_string(),
                    frequencies_hz: tuning_hz.clone(),
                    levels_db,
                })
            }
        };

        let snr = snr_db.map(|levels_db| Curve {
            label: "SNR (dB)".to_string(),
            frequencies_hz: tuning_hz,
            levels_db,
        });

        SweepReport {
            mode,
            levels,
            snr,
            bins: status,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }
}
