//! # Sweep Planning Module
//!
//! Computes the ordered tuning frequencies visited by a sweep.
//!
//! ## Plans
//! - **Noise floor**: dense bins from start (inclusive) to stop (exclusive),
//!   spaced by `sample_rate * overlap` so neighbouring bins cover each
//!   other's rolloff region
//! - **Harmonic**: every integer multiple of the fundamental inside
//!   `[start, stop]`
//! - **SNR**: from the first to the last noise-floor bin in `step` increments
//!
//! Every element is computed from its index rather than by accumulation, so
//! long sweeps do not drift.

use std::ops::Index;

use serde::Serialize;

use crate::config::{SweepConfig, SweepMode};

/// Strictly increasing tuning frequencies in Hz.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyPlan {
    frequencies_hz: Vec<f64>,
}

impl FrequencyPlan {
    /// Builds the plan for the configured mode.
    ///
    /// The config is expected to have passed `SweepConfig::validate`; an
    /// invalid range yields an empty plan.
    pub fn from_config(config: &SweepConfig) -> Self {
        let dense = noise_floor_frequencies(
            config.start_hz,
            config.stop_hz,
            config.noise_floor_step_hz(),
        );

        let frequencies_hz = match config.mode {
            SweepMode::NoiseFloor => dense,
            SweepMode::Harmonic { fundamental_hz } => {
                harmonic_frequencies(config.start_hz, config.stop_hz, fundamental_hz)
            }
            SweepMode::Snr { step_hz, .. } => match (dense.first(), dense.last()) {
                (Some(&first), Some(&last)) => stepped_frequencies(first, last, step_hz),
                _ => Vec::new(),
            },
        };

        Self { frequencies_hz }
    }

    pub fn len(&self) -> usize {
        self.frequencies_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies_hz.is_empty()
    }

    pub fn first(&self) -> Option<f64> {
        self.frequencies_hz.first().copied()
    }

    pub fn last(&self) -> Option<f64> {
        self.frequencies_hz.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.frequencies_hz.iter().copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.frequencies_hz
    }
}

impl Index<usize> for FrequencyPlan {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.frequencies_hz[index]
    }
}

/// `arange(start, stop, step)`: half-open, every element below `stop`.
fn noise_floor_frequencies(start_hz: f64, stop_hz: f64, step_hz: f64) -> Vec<f64> {
    if !(step_hz > 0.0) || !(start_hz < stop_hz) {
        return Vec::new();
    }
    let count = ((stop_hz - start_hz) / step_hz).ceil() as usize;
    (0..count)
        .map(|i| start_hz + i as f64 * step_hz)
        .take_while(|&freq| freq < stop_hz)
        .collect()
}

/// Multiples `n * fundamental` with `start <= n * fundamental <= stop`, `n >= 1`.
fn harmonic_frequencies(start_hz: f64, stop_hz: f64, fundamental_hz: f64) -> Vec<f64> {
    if !(fundamental_hz > 0.0) {
        return Vec::new();
    }
    let first = ((start_hz / fundamental_hz).ceil() as u64).max(1);
    let last = (stop_hz / fundamental_hz).floor() as u64;
    (first..=last).map(|n| n as f64 * fundamental_hz).collect()
}

/// `first + i * step` for every element not beyond `last`.
fn stepped_frequencies(first_hz: f64, last_hz: f64, step_hz: f64) -> Vec<f64> {
    if !(step_hz > 0.0) {
        return Vec::new();
    }
    let count = ((last_hz - first_hz) / step_hz).floor() as usize + 1;
    (0..count).map(|i| first_hz + i as f64 * step_hz).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strictly_increasing(plan: &FrequencyPlan) -> bool {
        plan.as_slice().windows(2).all(|w| w[1] > w[0])
    }

    #[test]
    fn full_sweep_matches_arange() {
        let config = SweepConfig::default();
        let plan = FrequencyPlan::from_config(&config);

        let expected = ((1750.0 - 25.0) / (2.4 * 0.5) as f64).ceil() as usize;
        assert_eq!(plan.len(), expected);
        assert_eq!(plan.len(), 1438);
        assert_eq!(plan.first(), Some(25e6));
        assert!(plan.last().unwrap() < 1750e6);
        assert!(strictly_increasing(&plan));
    }

    #[test]
    fn exact_division_excludes_stop() {
        let config = SweepConfig {
            start_hz: 10e6,
            stop_hz: 22e6,
            sample_rate_hz: 2.4e6,
            ..SweepConfig::default()
        };
        let plan = FrequencyPlan::from_config(&config);
        assert_eq!(plan.len(), 10);
        assert!(plan.last().unwrap() < 22e6);
    }

    #[test]
    fn harmonic_comb_uses_exact_multiples() {
        let fundamental_hz = 28.8e6;
        let config = SweepConfig {
            mode: SweepMode::Harmonic { fundamental_hz },
            ..SweepConfig::default()
        };
        let plan = FrequencyPlan::from_config(&config);

        assert_eq!(plan.first(), Some(28.8e6));
        assert!(plan.last().unwrap() <= 1750e6);
        assert_eq!(plan.len(), 60);
        for (i, freq) in plan.iter().enumerate() {
            assert_eq!(freq, (i as u64 + 1) as f64 * fundamental_hz);
            assert!((25e6..=1750e6).contains(&freq));
        }
        assert!(strictly_increasing(&plan));
    }

    #[test]
    fn harmonic_comb_includes_multiple_on_stop() {
        let config = SweepConfig {
            start_hz: 10e6,
            stop_hz: 40e6,
            mode: SweepMode::Harmonic {
                fundamental_hz: 10e6,
            },
            ..SweepConfig::default()
        };
        let plan = FrequencyPlan::from_config(&config);
        assert_eq!(plan.as_slice(), &[10e6, 20e6, 30e6, 40e6]);
    }

    #[test]
    fn snr_steps_between_first_and_last_dense_bin() {
        let config = SweepConfig {
            mode: SweepMode::Snr {
                step_hz: 3.6e6,
                power_dbm: -100.0,
            },
            ..SweepConfig::default()
        };
        let dense = FrequencyPlan::from_config(&SweepConfig::default());
        let plan = FrequencyPlan::from_config(&config);

        assert_eq!(plan.first(), dense.first());
        assert!(plan.last().unwrap() <= dense.last().unwrap());
        assert!(dense.last().unwrap() - plan.last().unwrap() < 3.6e6);
        assert!(strictly_increasing(&plan));
    }

    #[test]
    fn single_dense_bin_still_gives_one_snr_step() {
        let config = SweepConfig {
            start_hz: 100e6,
            stop_hz: 101e6,
            mode: SweepMode::Snr {
                step_hz: 3.6e6,
                power_dbm: -100.0,
            },
            ..SweepConfig::default()
        };
        let plan = FrequencyPlan::from_config(&config);
        assert_eq!(plan.as_slice(), &[100e6]);
    }

    #[test]
    fn valid_configs_always_plan_something() {
        let spans = [(0.0, 1e3), (24e6, 24.5e6), (500e6, 2000e6), (1e3, 1e9)];
        for (start_hz, stop_hz) in spans {
            let config = SweepConfig {
                start_hz,
                stop_hz,
                ..SweepConfig::default()
            };
            config.validate().unwrap();
            let plan = FrequencyPlan::from_config(&config);
            assert!(!plan.is_empty());
            assert!(strictly_increasing(&plan));
        }
    }
}
