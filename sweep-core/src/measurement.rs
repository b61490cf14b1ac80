//! # Bin Measurement Module
//!
//! The sweep control loop. For every planned tuning frequency the controller
//! runs the same sequence against the receiver (and, in SNR mode, the signal
//! source):
//!
//! ```text
//! Retune -> Configure -> [ToneOn] -> Dump -> Acquire -> Reduce -> [ToneOff]
//! ```
//!
//! SNR mode runs Dump/Acquire/Reduce twice per bin: cycle 0 measures the
//! background floor, cycle 1 repeats the measurement with the tone enabled.
//!
//! ## Failure policy
//! - Retune or setter failure: the bin is skipped, the sweep continues
//! - Read failure: the frame is skipped, the bin averages what succeeded
//! - Signal source failure during a bin: that bin's SNR value stays unset
//! - Failure to reach the first planned frequency: the sweep does not start
//!
//! The controller owns both instruments for the whole sweep. Dropping it
//! disables a tone that may still be on and closes the receiver, whichever
//! way the sweep ended.

use std::thread;
use std::time::Instant;

use log::{debug, info, warn};

use crate::averaging::{AveragedSpectrum, FrameAverager};
use crate::config::{SweepConfig, SweepMode};
use crate::device::{Receiver, SignalSource};
use crate::error::{DeviceConfigError, InstrumentError, SweepError};
use crate::fft::SpectrumEstimator;
use crate::plan::FrequencyPlan;
use crate::results::{BinStatus, ResultReducer, SkipReason, SweepReport, SweepResult};

/// Reported to the progress callback after every bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepProgress {
    pub bin: usize,
    pub total: usize,
    pub frequency_hz: f64,
    pub status: BinStatus,
}

type ProgressCallback = Box<dyn FnMut(&SweepProgress)>;

/// Drives a receiver (and optional signal source) through a full sweep.
pub struct SweepController<R: Receiver> {
    config: SweepConfig,
    receiver: R,
    source: Option<Box<dyn SignalSource>>,
    estimator: SpectrumEstimator,
    progress: Option<ProgressCallback>,
    tone_may_be_on: bool,
}

impl<R: Receiver> SweepController<R> {
    /// Takes ownership of the instruments for the duration of the sweep.
    ///
    /// # Arguments
    /// * `config` - Sweep parameters, validated here
    /// * `receiver` - Receiver under test
    /// * `source` - Signal source; required in SNR mode, unused otherwise
    ///
    /// # Returns
    /// * `Ok(controller)` - Ready to `run`
    /// * `Err(SweepError)` - Invalid config or missing signal source. The
    ///   instruments are released before returning.
    pub fn new(
        config: SweepConfig,
        receiver: R,
        source: Option<Box<dyn SignalSource>>,
    ) -> Result<Self, SweepError> {
        let checked = config.validate().map_err(SweepError::from).and_then(|()| {
            if config.mode.is_snr() && source.is_none() {
                Err(SweepError::MissingSignalSource)
            } else {
                Ok(())
            }
        });
        if let Err(e) = checked {
            let mut receiver = receiver;
            receiver.close();
            return Err(e);
        }

        let estimator =
            SpectrumEstimator::new(config.frame_len, config.fft_size, config.sample_rate_hz);
        Ok(Self {
            config,
            receiver,
            source,
            estimator,
            progress: None,
            tone_may_be_on: false,
        })
    }

    /// Registers a callback invoked after every bin.
    pub fn on_progress(mut self, callback: impl FnMut(&SweepProgress) + 'static) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    /// Runs the complete sweep and returns the finalized report.
    ///
    /// Only startup failures are returned as errors; per-bin failures are
    /// recorded in the report's bin statuses.
    pub fn run(&mut self) -> Result<SweepReport, SweepError> {
        let started = Instant::now();
        let plan = FrequencyPlan::from_config(&self.config);
        self.start(&plan)?;

        let unit = self.config.display_unit;
        let total = plan.len();
        info!(
            "[SWEEP] {} sweep over {} bins, {} {} to {} {}",
            self.config.mode.name(),
            total,
            unit.from_hz(plan[0]),
            unit,
            unit.from_hz(plan[total - 1]),
            unit
        );

        let mut result = SweepResult::allocate(&self.config, &plan);
        for (bin, frequency_hz) in plan.iter().enumerate() {
            info!(
                "[SWEEP] Scanning @ {} {} ({}/{}, {}%, {:.1} s elapsed)",
                unit.from_hz(frequency_hz),
                unit,
                bin + 1,
                total,
                (bin + 1) * 100 / total,
                started.elapsed().as_secs_f64()
            );

            let status = self.measure_bin(bin, frequency_hz, &mut result);
            result.set_status(bin, status);

            if let Some(progress) = self.progress.as_mut() {
                progress(&SweepProgress {
                    bin,
                    total,
                    frequency_hz,
                    status,
                });
            }
        }

        let report = ResultReducer::finalize(result, self.source.as_deref_mut(), started.elapsed());
        if report.mode.is_snr() {
            self.tone_may_be_on = false;
        }

        info!(
            "[SWEEP] Done: {} bins measured, {} skipped in {:.1} s",
            report.measured_bins(),
            report.skipped_bins(),
            report.elapsed_secs
        );
        Ok(report)
    }

    /// Puts the receiver on the first planned frequency and readies the source.
    fn start(&mut self, plan: &FrequencyPlan) -> Result<(), SweepError> {
        let first_hz = plan.first().ok_or(SweepError::EmptyPlan)?;

        self.receiver
            .set_sample_rate(self.config.sample_rate_hz)
            .map_err(SweepError::Startup)?;
        self.receiver
            .set_center_frequency(first_hz)
            .map_err(SweepError::Startup)?;

        if let SweepMode::Snr { power_dbm, .. } = self.config.mode {
            let source = self
                .source
                .as_mut()
                .ok_or(SweepError::MissingSignalSource)?;
            let identity = source.identify()?;
            info!("[SIGGEN] Using signal generator: {}", identity.trim());
            source.set_power_level(power_dbm)?;
            source.set_output_enabled(false)?;
        }
        Ok(())
    }

    /// Measures one bin, storing its values into `result`.
    fn measure_bin(&mut self, bin: usize, frequency_hz: f64, result: &mut SweepResult) -> BinStatus {
        if let Err(e) = self.receiver.set_center_frequency(frequency_hz) {
            warn!("[SWEEP] {}. Trying next bin", e);
            self.reopen_receiver();
            return BinStatus::Skipped(SkipReason::Retune);
        }

        if let Err(e) = self.configure(frequency_hz) {
            warn!(
                "[SWEEP] Could not set one or more tuner parameters ({}). Trying next bin",
                e
            );
            return BinStatus::Skipped(SkipReason::Configure);
        }

        let margin = self.config.trim_margin();
        for cycle in 0..self.config.cycle_count() {
            let with_tone = cycle == 1;

            if with_tone {
                if let Err(e) = self.tone_on(frequency_hz) {
                    warn!("[SIGGEN] Could not enable tone for bin {}: {}", bin, e);
                    self.tone_off_logged();
                    return BinStatus::Skipped(SkipReason::Instrument);
                }
            }

            self.dump_frames();
            let averaged = self.acquire(frequency_hz);

            let Some(averaged) = averaged else {
                warn!(
                    "[SWEEP] No frames could be read at {} Hz (cycle {})",
                    frequency_hz, cycle
                );
                if with_tone {
                    self.tone_off_logged();
                }
                return BinStatus::Skipped(SkipReason::NoData);
            };

            self.reduce(bin, cycle, &averaged, margin, result);

            if with_tone {
                self.tone_off_logged();
            }
        }
        BinStatus::Measured
    }

    /// Reopens the receiver after a failed retune and restores its sample rate.
    fn reopen_receiver(&mut self) {
        let restored = self
            .receiver
            .reset()
            .and_then(|()| self.receiver.set_sample_rate(self.config.sample_rate_hz));
        if let Err(e) = restored {
            warn!("[SWEEP] Receiver reset failed: {}", e);
        }
    }

    /// Selects the sampling path, then applies correction and gain.
    ///
    /// The gain value is applied in both gain modes; the gain mode only
    /// switches the demodulator AGC.
    fn configure(&mut self, frequency_hz: f64) -> Result<(), DeviceConfigError> {
        let sampling = self.config.sampling_mode_for(frequency_hz);
        self.receiver.set_direct_sampling(sampling)?;
        if self.config.ppm_correction != 0 {
            self.receiver
                .set_frequency_correction(self.config.ppm_correction)?;
        }
        self.receiver.set_gain_mode(self.config.gain_mode)?;
        self.receiver.set_gain(self.config.gain_db)?;
        Ok(())
    }

    fn tone_on(&mut self, tuning_hz: f64) -> Result<(), InstrumentError> {
        let tone_hz = self.config.tone_frequency_hz(tuning_hz);
        let source = self
            .source
            .as_mut()
            .ok_or_else(|| InstrumentError::Protocol("no signal source attached".to_string()))?;

        source.set_output_frequency(tone_hz)?;
        self.tone_may_be_on = true;
        source.set_output_enabled(true)?;
        debug!("[SIGGEN] Tone on at {} Hz", tone_hz);

        if !self.config.tone_settle.is_zero() {
            thread::sleep(self.config.tone_settle);
        }
        Ok(())
    }

    fn tone_off_logged(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        match source.set_output_enabled(false) {
            Ok(()) => self.tone_may_be_on = false,
            Err(e) => warn!("[SIGGEN] Could not disable tone: {}", e),
        }
    }

    /// Discards frames buffered before the retune. Errors are irrelevant here.
    fn dump_frames(&mut self) {
        for _ in 0..self.config.dump_frames {
            if let Err(e) = self.receiver.read_samples(self.config.frame_len) {
                debug!("[SWEEP] Error dumping data from receiver: {}", e);
            }
        }
    }

    /// Reads and averages `fft_avg` frames; failed frames are left out.
    fn acquire(&mut self, frequency_hz: f64) -> Option<AveragedSpectrum> {
        let mut averager = FrameAverager::new(self.estimator.spectrum_len());
        let mut failures = 0;

        for _ in 0..self.config.fft_avg {
            let frame = self
                .receiver
                .read_samples(self.config.frame_len)
                .and_then(|samples| self.estimator.estimate(&samples, frequency_hz));
            match frame {
                Ok(frame) => averager.accumulate(frame),
                Err(e) => {
                    failures += 1;
                    debug!("[SWEEP] Skipping frame at {} Hz: {}", frequency_hz, e);
                }
            }
        }

        if failures > 0 {
            warn!(
                "[SWEEP] {} of {} frames failed at {} Hz",
                failures, self.config.fft_avg, frequency_hz
            );
        }
        averager.finish()
    }

    fn reduce(
        &self,
        bin: usize,
        cycle: usize,
        averaged: &AveragedSpectrum,
        margin: usize,
        result: &mut SweepResult,
    ) {
        match self.config.mode {
            SweepMode::NoiseFloor => result.store_row(
                bin,
                averaged.trimmed_frequencies(margin),
                averaged.trimmed_power(margin),
            ),
            SweepMode::Harmonic { .. } => result.store_level(bin, averaged.peak_db(margin)),
            SweepMode::Snr { .. } if cycle == 0 => {
                result.store_level(bin, averaged.floor_db(margin))
            }
            SweepMode::Snr { .. } => {
                let baseline = result.level(bin).unwrap_or(0.0);
                result.store_snr(bin, averaged.peak_db(margin) - baseline);
            }
        }
    }
}

impl<R: Receiver> Drop for SweepController<R> {
    fn drop(&mut self) {
        if self.tone_may_be_on {
            self.tone_off_logged();
        }
        self.receiver.close();
    }
}
