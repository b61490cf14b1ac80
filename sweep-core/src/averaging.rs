//! # Frame Averaging Module
//!
//! Accumulates the spectrum estimates taken at one tuning frequency into a
//! single mean spectrum, and provides the reductions applied to it.
//!
//! Degenerate values (below `DEGENERATE_FLOOR_DB`) are replaced by the mean
//! of the frame they occur in before that frame joins the average. This keeps
//! a frame with a few empty bins from dragging the average far below the
//! measured floor.

use log::warn;

use crate::config::DEGENERATE_FLOOR_DB;
use crate::fft::SpectrumFrame;

/// Element-wise mean of the frames captured at one tuning frequency.
#[derive(Debug, Clone, PartialEq)]
pub struct AveragedSpectrum {
    pub frequencies_hz: Vec<f64>,
    pub power_db: Vec<f32>,
    /// Number of frames that contributed to the mean.
    pub frames: usize,
}

impl AveragedSpectrum {
    /// Central power values, `margin` points removed from each end.
    pub fn trimmed_power(&self, margin: usize) -> &[f32] {
        trim(&self.power_db, margin)
    }

    /// Frequency axis matching `trimmed_power`.
    pub fn trimmed_frequencies(&self, margin: usize) -> &[f64] {
        trim(&self.frequencies_hz, margin)
    }

    /// Highest level in the trimmed region.
    pub fn peak_db(&self, margin: usize) -> f32 {
        self.trimmed_power(margin)
            .iter()
            .copied()
            .fold(f32::NEG_INFINITY, f32::max)
    }

    /// Mean level of the trimmed region after clamping degenerate values.
    pub fn floor_db(&self, margin: usize) -> f32 {
        let mut region = self.trimmed_power(margin).to_vec();
        clamp_to_mean(&mut region);
        mean_db(&region)
    }
}

fn trim<T>(values: &[T], margin: usize) -> &[T] {
    if values.len() <= 2 * margin {
        return &[];
    }
    &values[margin..values.len() - margin]
}

/// Arithmetic mean of a dB slice, computed in f64. Empty slices give NaN.
pub fn mean_db(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    let sum: f64 = values.iter().map(|&v| v as f64).sum();
    (sum / values.len() as f64) as f32
}

/// Replaces every value below the degenerate floor with the slice's own mean.
///
/// The mean is taken before any replacement, so it includes the degenerate
/// values themselves.
pub fn clamp_to_mean(values: &mut [f32]) {
    let mean = mean_db(values);
    for value in values.iter_mut() {
        if *value < DEGENERATE_FLOOR_DB {
            *value = mean;
        }
    }
}

/// Running element-wise mean over spectrum frames of one length.
#[derive(Debug, Clone)]
pub struct FrameAverager {
    sums: Vec<f64>,
    frequencies_hz: Option<Vec<f64>>,
    frames: usize,
}

impl FrameAverager {
    pub fn new(spectrum_len: usize) -> Self {
        Self {
            sums: vec![0.0; spectrum_len],
            frequencies_hz: None,
            frames: 0,
        }
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Adds one frame to the average, clamping its degenerate values first.
    ///
    /// Frames of the wrong length are logged and ignored.
    pub fn accumulate(&mut self, frame: SpectrumFrame) {
        if frame.len() != self.sums.len() {
            warn!(
                "[AVERAGE] Ignoring frame of {} points (expected {})",
                frame.len(),
                self.sums.len()
            );
            return;
        }

        let SpectrumFrame {
            frequencies_hz,
            mut power_db,
        } = frame;
        clamp_to_mean(&mut power_db);

        for (sum, &db) in self.sums.iter_mut().zip(&power_db) {
            *sum += db as f64;
        }
        if self.frequencies_hz.is_none() {
            self.frequencies_hz = Some(frequencies_hz);
        }
        self.frames += 1;
    }

    /// Returns the mean spectrum, or `None` when no frame was accumulated.
    pub fn finish(self) -> Option<AveragedSpectrum> {
        let frequencies_hz = self.frequencies_hz?;
        let count = self.frames as f64;
        let power_db = self.sums.iter().map(|&sum| (sum / count) as f32).collect();
        Some(AveragedSpectrum {
            frequencies_hz,
            power_db,
            frames: self.frames,
        })
    }
}
