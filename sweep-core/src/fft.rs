//! # Fast Fourier Transform (FFT) Module
//!
//! Turns one block of complex receiver samples into a log-magnitude
//! spectrum centred on the tuning frequency.
//!
//! ## Features
//! - High-performance FFT using RustFFT, planned once per sweep
//! - DC offset removal before the transform
//! - Zero-frequency shift so the spectrum reads low-to-high around the tuner
//! - dB conversion relative to the frame length, safe for all-zero input

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::error::AcquisitionError;

/// Added to every magnitude before the logarithm so silent bins stay finite.
pub const MAGNITUDE_EPSILON: f32 = 1e-10;

/// One spectrum estimate: parallel frequency (Hz) and power (dB) axes.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub frequencies_hz: Vec<f64>,
    pub power_db: Vec<f32>,
}

impl SpectrumFrame {
    pub fn len(&self) -> usize {
        self.power_db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.power_db.is_empty()
    }
}

/// Removes the DC offset from a complex block by making its mean zero.
///
/// Receivers without a DC-blocking filter show a large spike at the tuning
/// frequency; subtracting the block mean removes it before the transform.
fn remove_dc_offset(block: &mut [Complex<f32>]) {
    let len = block.len();
    if len == 0 {
        return;
    }
    let sum = block.iter().fold(Complex::new(0.0f64, 0.0f64), |acc, s| {
        acc + Complex::new(s.re as f64, s.im as f64)
    });
    let mean = Complex::new((sum.re / len as f64) as f32, (sum.im / len as f64) as f32);
    for sample in block.iter_mut() {
        *sample -= mean;
    }
}

/// Generates `n` linearly spaced points in `[start, stop]`.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (n - 1) as f64;
            (0..n).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Converts sample blocks of a fixed length into `SpectrumFrame`s.
pub struct SpectrumEstimator {
    fft: Arc<dyn Fft<f32>>,
    frame_len: usize,
    fft_size: usize,
    sample_rate_hz: f64,
}

impl SpectrumEstimator {
    /// Plans a forward FFT of `fft_size` points for blocks of `frame_len` samples.
    ///
    /// `fft_size` values below `frame_len` are raised to `frame_len`.
    pub fn new(frame_len: usize, fft_size: usize, sample_rate_hz: f64) -> Self {
        let fft_size = fft_size.max(frame_len);
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        Self {
            fft,
            frame_len,
            fft_size,
            sample_rate_hz,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    pub fn spectrum_len(&self) -> usize {
        self.fft_size
    }

    /// Performs the full estimate on one block of samples.
    ///
    /// This function processes the block through the following steps:
    /// 1. DC offset removal (on a copy, the input is not modified)
    /// 2. Zero padding up to the FFT size
    /// 3. Forward FFT
    /// 4. Shift so zero frequency sits at index `len / 2`
    /// 5. `20 * log10((|X| + ε) / frame_len)`
    ///
    /// # Arguments
    /// * `samples` - Complex baseband block, exactly `frame_len` samples
    /// * `center_hz` - Tuning frequency the block was captured at
    ///
    /// # Returns
    /// * `Ok(frame)` - Spectrum with a frequency axis spanning `center ± fs/2`
    /// * `Err(AcquisitionError::ShortRead)` - Block length does not match
    pub fn estimate(
        &self,
        samples: &[Complex<f32>],
        center_hz: f64,
    ) -> Result<SpectrumFrame, AcquisitionError> {
        if samples.len() != self.frame_len {
            return Err(AcquisitionError::ShortRead {
                expected: self.frame_len,
                actual: samples.len(),
            });
        }

        let mut buffer = Vec::with_capacity(self.fft_size);
        buffer.extend_from_slice(samples);
        remove_dc_offset(&mut buffer);
        buffer.resize(self.fft_size, Complex::new(0.0, 0.0));

        self.fft.process(&mut buffer);

        // Rotating right by half the length is numpy's fftshift for even and odd sizes.
        buffer.rotate_right(self.fft_size / 2);

        let scale = self.frame_len as f32;
        let power_db = buffer
            .iter()
            .map(|bin| 20.0 * ((bin.norm() + MAGNITUDE_EPSILON) / scale).log10())
            .collect();

        let half_rate = self.sample_rate_hz / 2.0;
        let frequencies_hz = linspace(center_hz - half_rate, center_hz + half_rate, self.fft_size);

        Ok(SpectrumFrame {
            frequencies_hz,
            power_db,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn tone(len: usize, bin: usize, amplitude: f32) -> Vec<Complex<f32>> {
        (0..len)
            .map(|n| {
                let phase = 2.0 * PI * bin as f64 * n as f64 / len as f64;
                Complex::new(phase.cos() as f32, phase.sin() as f32) * amplitude
            })
            .collect()
    }

    #[test]
    fn zero_block_gives_epsilon_floor_everywhere() {
        let estimator = SpectrumEstimator::new(1024, 1024, 2.4e6);
        let frame = estimator
            .estimate(&vec![Complex::new(0.0, 0.0); 1024], 100e6)
            .unwrap();

        let expected = 20.0 * (MAGNITUDE_EPSILON / 1024.0).log10();
        assert_eq!(frame.len(), 1024);
        for &db in &frame.power_db {
            assert!(db.is_finite());
            assert_relative_eq!(db, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn frequency_axis_spans_half_rate_around_center() {
        let estimator = SpectrumEstimator::new(256, 256, 2.4e6);
        let frame = estimator.estimate(&tone(256, 3, 0.5), 100e6).unwrap();

        assert_relative_eq!(frame.frequencies_hz[0], 98.8e6, max_relative = 1e-12);
        assert_relative_eq!(frame.frequencies_hz[255], 101.2e6, max_relative = 1e-12);
        assert!(frame.frequencies_hz.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn positive_tone_lands_right_of_center_after_shift() {
        let len = 512;
        let estimator = SpectrumEstimator::new(len, len, 2.4e6);
        let frame = estimator.estimate(&tone(len, 10, 1.0), 0.0).unwrap();

        let peak = frame
            .power_db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, len / 2 + 10);
        // A full-scale complex tone on an exact bin has |X| = len, i.e. 0 dB.
        assert_relative_eq!(frame.power_db[peak], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn dc_offset_is_removed_without_touching_input() {
        let len = 128;
        let samples = vec![Complex::new(0.25, -0.5); len];
        let estimator = SpectrumEstimator::new(len, len, 1e6);
        let frame = estimator.estimate(&samples, 0.0).unwrap();

        let floor = 20.0 * (MAGNITUDE_EPSILON / len as f32).log10();
        assert!(frame.power_db[len / 2] < floor + 20.0);
        assert_eq!(samples[0], Complex::new(0.25, -0.5));
    }

    #[test]
    fn estimate_is_deterministic() {
        let estimator = SpectrumEstimator::new(256, 256, 1e6);
        let block = tone(256, 7, 0.3);
        assert_eq!(
            estimator.estimate(&block, 5e6).unwrap(),
            estimator.estimate(&block, 5e6).unwrap()
        );
    }

    #[test]
    fn zero_padding_keeps_frame_len_normalisation() {
        let estimator = SpectrumEstimator::new(256, 1024, 1e6);
        let frame = estimator.estimate(&tone(256, 8, 1.0), 0.0).unwrap();

        assert_eq!(frame.len(), 1024);
        assert_eq!(frame.frequencies_hz.len(), 1024);
        let peak = frame.power_db.iter().cloned().fold(f32::MIN, f32::max);
        assert_relative_eq!(peak, 0.0, epsilon = 1e-2);
    }

    #[test]
    fn wrong_block_length_is_a_short_read() {
        let estimator = SpectrumEstimator::new(256, 256, 1e6);
        assert_eq!(
            estimator.estimate(&tone(100, 1, 1.0), 0.0),
            Err(AcquisitionError::ShortRead {
                expected: 256,
                actual: 100
            })
        );
    }

    #[test]
    fn linspace_includes_both_ends() {
        assert_eq!(linspace(0.0, 1.0, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }
}
