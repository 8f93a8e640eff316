//! Audio amplitude metering for the lip-sync animation
//!
//! Provides RMS and peak level calculation over samples in transit to the
//! output device, published through a lock-free [`AmplitudeSensor`] that the
//! render loop samples once per frame.

use rodio::Source;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Samples per metering window (~23ms at 44.1kHz)
const METER_WINDOW: usize = 1024;

/// Real-time audio meter with peak decay
pub struct AudioMeter {
    peak: f32,
    decay_rate: f32,
}

impl Default for AudioMeter {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioMeter {
    /// Create a new audio meter
    ///
    /// Default decay rate gives ~300ms peak hold at 30Hz updates
    pub fn new() -> Self {
        Self {
            peak: 0.0,
            decay_rate: 0.95,
        }
    }

    /// Create a meter with custom decay rate
    ///
    /// `decay_rate` should be between 0.0 and 1.0; higher values = slower decay
    pub fn with_decay(decay_rate: f32) -> Self {
        Self {
            peak: 0.0,
            decay_rate: decay_rate.clamp(0.0, 0.999),
        }
    }

    /// Process one window of samples and return the normalised RMS level.
    pub fn process(&mut self, samples: &[f32]) -> f32 {
        if samples.is_empty() {
            self.peak *= self.decay_rate;
            return 0.0;
        }

        let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
        let rms = (sum_sq / samples.len() as f32).sqrt();

        let sample_peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        self.peak = if sample_peak > self.peak {
            sample_peak
        } else {
            self.peak * self.decay_rate
        };

        rms.min(1.0)
    }

    /// Current peak level with decay applied.
    pub fn peak(&self) -> f32 {
        self.peak.min(1.0)
    }

    /// Reset the meter
    pub fn reset(&mut self) {
        self.peak = 0.0;
    }
}

/// Shared loudness value written by the audio thread, read by the render loop.
///
/// `sample()` is 0.0 whenever no audio is active, so callers never need to
/// know whether playback is in progress.
#[derive(Debug, Clone, Default)]
pub struct AmplitudeSensor {
    inner: Arc<SensorInner>,
}

#[derive(Debug, Default)]
struct SensorInner {
    // f32 stored as raw bits; atomics keep both sides lock-free
    level_bits: AtomicU32,
    active: AtomicBool,
}

impl AmplitudeSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current loudness in [0, 1]; 0 when no audio is playing.
    pub fn sample(&self) -> f32 {
        if !self.inner.active.load(Ordering::Relaxed) {
            return 0.0;
        }
        f32::from_bits(self.inner.level_bits.load(Ordering::Relaxed)).clamp(0.0, 1.0)
    }

    /// Publish a new level from the metering side.
    pub fn publish(&self, level: f32) {
        self.inner
            .level_bits
            .store(level.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Mark playback active or inactive; inactive forces `sample()` to 0.
    pub fn set_active(&self, active: bool) {
        self.inner.active.store(active, Ordering::Relaxed);
        if !active {
            self.inner.level_bits.store(0, Ordering::Relaxed);
        }
    }
}

/// A rodio source wrapper that meters samples on their way to the sink.
///
/// Every [`METER_WINDOW`] samples the window's RMS is published to the
/// sensor. The wrapped source is otherwise passed through unchanged.
pub struct MeteredSource<S> {
    inner: S,
    meter: AudioMeter,
    sensor: AmplitudeSensor,
    window: Vec<f32>,
}

impl<S> MeteredSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(inner: S, sensor: AmplitudeSensor) -> Self {
        Self {
            inner,
            meter: AudioMeter::new(),
            sensor,
            window: Vec::with_capacity(METER_WINDOW),
        }
    }
}

impl<S> Iterator for MeteredSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        match self.inner.next() {
            Some(sample) => {
                self.window.push(sample);
                if self.window.len() >= METER_WINDOW {
                    let level = self.meter.process(&self.window);
                    self.sensor.publish(level);
                    self.window.clear();
                }
                Some(sample)
            }
            None => {
                // Flush the final partial window so the mouth closes cleanly.
                if !self.window.is_empty() {
                    let level = self.meter.process(&self.window);
                    self.sensor.publish(level);
                    self.window.clear();
                }
                None
            }
        }
    }
}

impl<S> Source for MeteredSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
