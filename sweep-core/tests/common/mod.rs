//! Scripted receiver and signal source sharing one inspectable bench state.
#![allow(dead_code)]

use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use std::time::Duration;

use rustfft::num_complex::Complex;
use sweep_core::error::{AcquisitionError, DeviceConfigError, InstrumentError};
use sweep_core::{GainMode, Receiver, SamplingMode, SignalSource, SweepConfig, SweepMode};

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Identify,
    Power(f64),
    Frequency(f64),
    Output(bool),
}

#[derive(Debug, Default)]
pub struct BenchState {
    pub tuned: Vec<f64>,
    pub center_hz: f64,
    pub resets: usize,
    pub sample_rate_sets: usize,
    pub reads: usize,
    pub closed: bool,
    pub tone_on: bool,
    pub events: Vec<SourceEvent>,
}

pub type Bench = Rc<RefCell<BenchState>>;

pub fn bench() -> Bench {
    Rc::new(RefCell::new(BenchState::default()))
}

/// Every frame is an impulse giving `floor_db` in all bins; while the tone
/// is on, a carrier at +fs/10 raises its bin to `tone_db`.
pub struct ScriptedReceiver {
    pub bench: Bench,
    pub floor_db: f64,
    pub tone_db: f64,
    pub fail_tune_at: Vec<f64>,
    pub fail_reads_at: Vec<f64>,
    pub fail_every_nth_read: Option<usize>,
    pub fail_setter_at: Vec<f64>,
}

impl ScriptedReceiver {
    pub fn new(bench: &Bench) -> Self {
        Self {
            bench: Rc::clone(bench),
            floor_db: -90.0,
            tone_db: -40.0,
            fail_tune_at: Vec::new(),
            fail_reads_at: Vec::new(),
            fail_every_nth_read: None,
            fail_setter_at: Vec::new(),
        }
    }
}

fn near(list: &[f64], freq_hz: f64) -> bool {
    list.iter().any(|&f| (f - freq_hz).abs() < 1.0)
}

impl Receiver for ScriptedReceiver {
    fn set_center_frequency(&mut self, freq_hz: f64) -> Result<(), DeviceConfigError> {
        let mut bench = self.bench.borrow_mut();
        bench.tuned.push(freq_hz);
        if near(&self.fail_tune_at, freq_hz) {
            return Err(DeviceConfigError::Tune {
                freq_hz,
                reason: "scripted failure".to_string(),
            });
        }
        bench.center_hz = freq_hz;
        Ok(())
    }

    fn set_sample_rate(&mut self, _rate_hz: f64) -> Result<(), DeviceConfigError> {
        self.bench.borrow_mut().sample_rate_sets += 1;
        Ok(())
    }

    fn set_direct_sampling(&mut self, _mode: SamplingMode) -> Result<(), DeviceConfigError> {
        Ok(())
    }

    fn set_gain_mode(&mut self, _mode: GainMode) -> Result<(), DeviceConfigError> {
        if near(&self.fail_setter_at, self.bench.borrow().center_hz) {
            return Err(DeviceConfigError::Parameter {
                parameter: "gain mode",
                reason: "scripted failure".to_string(),
            });
        }
        Ok(())
    }

    fn set_gain(&mut self, _gain_db: f64) -> Result<(), DeviceConfigError> {
        Ok(())
    }

    fn set_frequency_correction(&mut self, _ppm: i32) -> Result<(), DeviceConfigError> {
        Ok(())
    }

    fn read_samples(&mut self, count: usize) -> Result<Vec<Complex<f32>>, AcquisitionError> {
        let mut bench = self.bench.borrow_mut();
        bench.reads += 1;
        if near(&self.fail_reads_at, bench.center_hz) {
            return Err(AcquisitionError::Read("scripted failure".to_string()));
        }
        if let Some(n) = self.fail_every_nth_read {
            if bench.reads % n == 0 {
                return Err(AcquisitionError::Read("scripted failure".to_string()));
            }
        }

        let floor = 10f64.powf(self.floor_db / 20.0);
        let mut samples = vec![Complex::new(0.0f32, 0.0); count];
        samples[0].re = (floor * count as f64) as f32;
        if bench.tone_on {
            let amplitude = 10f64.powf(self.tone_db / 20.0) - floor;
            for (n, sample) in samples.iter_mut().enumerate() {
                let phase = 2.0 * PI * 0.1 * n as f64;
                sample.re += (amplitude * phase.cos()) as f32;
                sample.im += (amplitude * phase.sin()) as f32;
            }
        }
        Ok(samples)
    }

    fn reset(&mut self) -> Result<(), DeviceConfigError> {
        self.bench.borrow_mut().resets += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.bench.borrow_mut().closed = true;
    }
}

/// Signal source recording every command into the bench.
pub struct RecordingSource {
    pub bench: Bench,
    pub fail_frequency_calls: Vec<usize>,
    frequency_calls: usize,
}

impl RecordingSource {
    pub fn new(bench: &Bench) -> Self {
        Self {
            bench: Rc::clone(bench),
            fail_frequency_calls: Vec::new(),
            frequency_calls: 0,
        }
    }
}

impl SignalSource for RecordingSource {
    fn identify(&mut self) -> Result<String, InstrumentError> {
        self.bench.borrow_mut().events.push(SourceEvent::Identify);
        Ok("Scripted,SG-1,0,1.0".to_string())
    }

    fn set_power_level(&mut self, dbm: f64) -> Result<(), InstrumentError> {
        self.bench.borrow_mut().events.push(SourceEvent::Power(dbm));
        Ok(())
    }

    fn set_output_frequency(&mut self, freq_hz: f64) -> Result<(), InstrumentError> {
        let call = self.frequency_calls;
        self.frequency_calls += 1;
        if self.fail_frequency_calls.contains(&call) {
            return Err(InstrumentError::Timeout(Duration::from_secs(5)));
        }
        self.bench
            .borrow_mut()
            .events
            .push(SourceEvent::Frequency(freq_hz));
        Ok(())
    }

    fn set_output_enabled(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        let mut bench = self.bench.borrow_mut();
        bench.tone_on = enabled;
        bench.events.push(SourceEvent::Output(enabled));
        Ok(())
    }
}

/// Ten noise-floor bins, 100 MHz to 110.8 MHz, small frames.
pub fn ten_bin_config() -> SweepConfig {
    SweepConfig {
        start_hz: 100e6,
        stop_hz: 112e6,
        sample_rate_hz: 2.4e6,
        frame_len: 64,
        fft_size: 64,
        fft_avg: 4,
        dump_frames: 1,
        tone_settle: Duration::ZERO,
        ..SweepConfig::default()
    }
}

/// Four SNR bins; 80-point frames put the +fs/10 tone exactly on a bin.
pub fn snr_config() -> SweepConfig {
    SweepConfig {
        start_hz: 100e6,
        stop_hz: 104.8e6,
        sample_rate_hz: 2.4e6,
        frame_len: 80,
        fft_size: 80,
        fft_avg: 3,
        dump_frames: 1,
        tone_settle: Duration::ZERO,
        mode: SweepMode::Snr {
            step_hz: 1.2e6,
            power_dbm: -100.0,
        },
        ..SweepConfig::default()
    }
}
