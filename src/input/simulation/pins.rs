//! Simulated GPIO pins.
//!
//! Each pin comes with a handle that scripts its behavior from tests or a
//! demo driver task, mirroring how the hardware pins would move.

use crate::capability::gpio::{ADC_FULL_SCALE, PWM_FULL_SCALE};
use crate::capability::{AnalogInput, DigitalInput, PwmOutput};
use crate::error::Result;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, Instant};

/// Script/state handle for a [`SimulatedDigitalPin`].
#[derive(Clone)]
pub struct DigitalHandle {
    level: Arc<AtomicBool>,
}

impl DigitalHandle {
    pub fn set(&self, level: bool) {
        self.level.store(level, Ordering::SeqCst);
    }

    pub fn toggle(&self) -> bool {
        !self.level.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn get(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }
}

/// A digital input whose level is set through its [`DigitalHandle`].
pub struct SimulatedDigitalPin {
    level: Arc<AtomicBool>,
}

impl SimulatedDigitalPin {
    pub fn new(initial: bool) -> (Self, DigitalHandle) {
        let level = Arc::new(AtomicBool::new(initial));
        (
            Self {
                level: level.clone(),
            },
            DigitalHandle { level },
        )
    }
}

impl DigitalInput for SimulatedDigitalPin {
    fn read(&mut self) -> Result<bool> {
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Script/state handle for a [`SimulatedAnalogPin`].
#[derive(Clone)]
pub struct AnalogHandle {
    level: Arc<AtomicU16>,
    script: Arc<Mutex<VecDeque<u16>>>,
}

impl AnalogHandle {
    /// Set the steady level returned once any queued reads are drained.
    pub fn set(&self, counts: u16) {
        self.level.store(counts, Ordering::SeqCst);
    }

    /// Queue exact values for the next reads, ahead of the steady level.
    pub fn enqueue(&self, counts: &[u16]) {
        self.script.lock().extend(counts.iter().copied());
    }
}

/// An analog input returning queued scripted values first, then a steady
/// settable level.
pub struct SimulatedAnalogPin {
    level: Arc<AtomicU16>,
    script: Arc<Mutex<VecDeque<u16>>>,
}

impl SimulatedAnalogPin {
    pub fn new(initial: u16) -> (Self, AnalogHandle) {
        let level = Arc::new(AtomicU16::new(initial));
        let script = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                level: level.clone(),
                script: script.clone(),
            },
            AnalogHandle { level, script },
        )
    }
}

impl AnalogInput for SimulatedAnalogPin {
    fn read(&mut self) -> Result<u16> {
        if let Some(scripted) = self.script.lock().pop_front() {
            return Ok(scripted);
        }
        Ok(self.level.load(Ordering::SeqCst))
    }
}

/// Free-running digital square wave, toggling every `half_period`. Stands
/// in for slow two-state hardware like a tilt switch being rocked.
pub struct SquareWavePin {
    half_period: Duration,
    epoch: Instant,
    invert: bool,
}

impl SquareWavePin {
    pub fn new(half_period: Duration) -> Self {
        Self {
            half_period,
            epoch: Instant::now(),
            invert: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

impl DigitalInput for SquareWavePin {
    fn read(&mut self) -> Result<bool> {
        let halves = self.epoch.elapsed().as_millis() / self.half_period.as_millis().max(1);
        Ok((halves % 2 == 1) ^ self.invert)
    }
}

/// Free-running analog waveform: a sine around `base` with optional random
/// noise, clamped to the ADC range. Used for gas-drift and pulse-train
/// demo profiles.
pub struct WaveAnalogPin {
    base: f64,
    amplitude: f64,
    period: Duration,
    noise: u16,
    epoch: Instant,
}

impl WaveAnalogPin {
    pub fn new(base: u16, amplitude: u16, period: Duration, noise: u16) -> Self {
        Self {
            base: f64::from(base),
            amplitude: f64::from(amplitude),
            period,
            noise,
            epoch: Instant::now(),
        }
    }
}

impl AnalogInput for WaveAnalogPin {
    fn read(&mut self) -> Result<u16> {
        let phase = self.epoch.elapsed().as_secs_f64() / self.period.as_secs_f64().max(1e-6);
        let wave = self.base + self.amplitude * (phase * std::f64::consts::TAU).sin();
        let jitter = if self.noise > 0 {
            rand::thread_rng().gen_range(-i32::from(self.noise)..=i32::from(self.noise))
        } else {
            0
        };
        let counts = (wave + f64::from(jitter)).clamp(0.0, f64::from(ADC_FULL_SCALE));
        Ok(counts as u16)
    }
}

/// PWM sink recording its duty; readable from tests and demo drivers.
pub struct SimulatedPwmChannel {
    duty: Arc<AtomicU16>,
}

impl SimulatedPwmChannel {
    pub fn new() -> Self {
        Self {
            duty: Arc::new(AtomicU16::new(0)),
        }
    }

    pub fn duty_handle(&self) -> Arc<AtomicU16> {
        self.duty.clone()
    }
}

impl Default for SimulatedPwmChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl PwmOutput for SimulatedPwmChannel {
    fn set_duty(&mut self, duty: u16) -> Result<()> {
        self.duty.store(duty.min(PWM_FULL_SCALE), Ordering::SeqCst);
        Ok(())
    }

    fn duty(&self) -> u16 {
        self.duty.load(Ordering::SeqCst)
    }
}

/// Drive a quadrature pair as a steady clockwise rotation, one detent per
/// `period`. Returns the task handle so the caller can abort it.
pub fn drive_quadrature(
    clk: DigitalHandle,
    dt: DigitalHandle,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let next_clk = !clk.get();
            // DT opposite CLK reads as clockwise in the decoder.
            dt.set(!next_clk);
            clk.set(next_clk);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digital_pin_follows_handle() {
        let (mut pin, handle) = SimulatedDigitalPin::new(false);
        assert!(!pin.read().unwrap());
        handle.set(true);
        assert!(pin.read().unwrap());
        handle.toggle();
        assert!(!pin.read().unwrap());
    }

    #[test]
    fn test_analog_pin_scripted_reads_first() {
        let (mut pin, handle) = SimulatedAnalogPin::new(100);
        handle.enqueue(&[1, 2, 3]);
        assert_eq!(pin.read().unwrap(), 1);
        assert_eq!(pin.read().unwrap(), 2);
        assert_eq!(pin.read().unwrap(), 3);
        assert_eq!(pin.read().unwrap(), 100);
        handle.set(200);
        assert_eq!(pin.read().unwrap(), 200);
    }

    #[test]
    fn test_wave_pin_stays_in_adc_range() {
        let mut pin = WaveAnalogPin::new(2000, 3000, Duration::from_millis(10), 50);
        for _ in 0..100 {
            let counts = pin.read().unwrap();
            assert!(counts <= ADC_FULL_SCALE);
        }
    }

    #[test]
    fn test_pwm_channel_clamps_duty() {
        let mut channel = SimulatedPwmChannel::new();
        channel.set_duty(2000).unwrap();
        assert_eq!(channel.duty(), PWM_FULL_SCALE);
        channel.set_duty(512).unwrap();
        assert_eq!(channel.duty(), 512);
    }
}
