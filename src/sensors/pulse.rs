//! Pulse-train sensor: detects discrete pulses on a noisy analog line and
//! converts inter-pulse intervals to an events-per-minute rate.

use super::{ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use crate::capability::AnalogInput;
use crate::capability::gpio::ADC_FULL_SCALE;
use crate::error::Result;
use log::warn;
use std::collections::VecDeque;
use std::time::Instant;

/// Samples held in the sliding window used to derive crossing thresholds.
const WINDOW_SAMPLES: usize = 20;
/// Inter-pulse intervals retained for the rate average.
const INTERVAL_MEMORY: usize = 10;
/// Sane physiological interval bounds; anything outside is noise.
const MIN_INTERVAL_MS: u64 = 240;
const MAX_INTERVAL_MS: u64 = 2000;

/// Detects upward crossings of a dynamic threshold band centred on the
/// sliding-window mean. Until the window fills, no pulse detection runs and
/// the rate stays at zero.
pub struct PulseTrainSensor {
    descriptor: SensorDescriptor,
    pin: Box<dyn AnalogInput>,
    /// Half-width of the threshold band around the window mean, in counts.
    band: u16,
    window: VecDeque<u16>,
    intervals: VecDeque<u64>,
    above_threshold: bool,
    last_pulse_at: Option<Instant>,
    rate: u32,
}

impl PulseTrainSensor {
    pub fn new(name: impl Into<String>, pin: Box<dyn AnalogInput>, band: u16) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::PulseTrain),
            pin,
            band,
            window: VecDeque::with_capacity(WINDOW_SAMPLES),
            intervals: VecDeque::with_capacity(INTERVAL_MEMORY),
            above_threshold: false,
            last_pulse_at: None,
            rate: 0,
        }
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    fn window_mean(&self) -> f64 {
        let sum: u32 = self.window.iter().map(|&v| u32::from(v)).sum();
        f64::from(sum) / self.window.len() as f64
    }

    fn record_pulse(&mut self, now: Instant) {
        if let Some(last) = self.last_pulse_at {
            let interval_ms = now.duration_since(last).as_millis() as u64;
            if (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&interval_ms) {
                if self.intervals.len() == INTERVAL_MEMORY {
                    self.intervals.pop_front();
                }
                self.intervals.push_back(interval_ms);
                let mean_ms: u64 =
                    self.intervals.iter().sum::<u64>() / self.intervals.len() as u64;
                self.rate = (60_000 / mean_ms) as u32;
            }
        }
        self.last_pulse_at = Some(now);
    }
}

impl Sensor for PulseTrainSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let counts = self.pin.read()?;
        if counts > ADC_FULL_SCALE {
            warn!(
                "[{}] implausible ADC count {}, dropping tick",
                self.descriptor.name, counts
            );
            return Ok(None);
        }

        if self.window.len() == WINDOW_SAMPLES {
            self.window.pop_front();
        }
        self.window.push_back(counts);

        if self.window.len() == WINDOW_SAMPLES {
            let mean = self.window_mean();
            let upper = mean + f64::from(self.band);
            let lower = mean - f64::from(self.band);

            if f64::from(counts) > upper && !self.above_threshold {
                self.above_threshold = true;
                self.record_pulse(now);
            } else if f64::from(counts) < lower && self.above_threshold {
                self.above_threshold = false;
            }
        }

        let label = if self.rate > 0 { "midiendo" } else { "esperando" };
        Ok(Some(SensorReading::new(
            i64::from(counts),
            ReadingValue::Rate(self.rate),
            label,
            now,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::simulation::pins::SimulatedAnalogPin;
    use std::time::Duration;

    /// Drive the sensor with a synthetic waveform: `low` for `low_ticks`
    /// samples, then `high` for `high_ticks`, repeated. Returns the readings.
    fn drive(
        sensor: &mut PulseTrainSensor,
        handle: &crate::input::simulation::pins::AnalogHandle,
        pattern: &[(u16, usize)],
        tick: Duration,
        start: Instant,
    ) -> Instant {
        let mut now = start;
        for &(level, ticks) in pattern {
            handle.set(level);
            for _ in 0..ticks {
                sensor.sample(now).unwrap();
                now += tick;
            }
        }
        now
    }

    #[test]
    fn test_rate_from_periodic_waveform() {
        let (pin, handle) = SimulatedAnalogPin::new(2000);
        let mut sensor = PulseTrainSensor::new("pulso", Box::new(pin), 100);
        let tick = Duration::from_millis(50);
        let mut now = Instant::now();

        // Fill the window at baseline first so thresholds exist.
        now = drive(&mut sensor, &handle, &[(2000, WINDOW_SAMPLES)], tick, now);

        // One beat every 500ms: 2 ticks high, 8 ticks low. The 2600 spike
        // sits above mean+100; the 2000 baseline sits below mean-100 once
        // the rolling mean settles around 2120. The first inter-pulse
        // interval comes out long while the window is still settling, so
        // run enough beats for the interval memory to hold steady 500ms
        // intervals only.
        for _ in 0..16 {
            now = drive(&mut sensor, &handle, &[(2600, 2), (2000, 8)], tick, now);
        }

        // 500ms intervals: 60000 / 500 = 120 events per minute.
        assert_eq!(sensor.rate(), 120);
    }

    #[test]
    fn test_out_of_bound_intervals_discarded() {
        let (pin, handle) = SimulatedAnalogPin::new(2000);
        let mut sensor = PulseTrainSensor::new("pulso", Box::new(pin), 100);
        let tick = Duration::from_millis(50);
        let mut now = Instant::now();

        now = drive(&mut sensor, &handle, &[(2000, WINDOW_SAMPLES)], tick, now);

        // Two spikes only 100ms apart with a deep dip between them so the
        // band resets: the 100ms interval is below 240ms, pure noise.
        drive(
            &mut sensor,
            &handle,
            &[(2600, 1), (1500, 1), (2600, 1)],
            tick,
            now,
        );

        assert_eq!(sensor.rate(), 0);
    }

    #[test]
    fn test_no_detection_until_window_fills() {
        let (pin, handle) = SimulatedAnalogPin::new(2000);
        let mut sensor = PulseTrainSensor::new("pulso", Box::new(pin), 100);
        let tick = Duration::from_millis(50);

        // Spikes while the window is still filling must not register.
        drive(
            &mut sensor,
            &handle,
            &[(2600, 2), (2000, 5)],
            tick,
            Instant::now(),
        );
        assert_eq!(sensor.rate(), 0);
    }

    #[test]
    fn test_reading_labels_track_rate() {
        let (pin, _handle) = SimulatedAnalogPin::new(2000);
        let mut sensor = PulseTrainSensor::new("pulso", Box::new(pin), 100);
        let reading = sensor.sample(Instant::now()).unwrap().unwrap();
        assert_eq!(reading.label, "esperando");
        assert_eq!(reading.value, ReadingValue::Rate(0));
    }
}
