//! Sensor strategies.
//!
//! Every sensor class implements the same [`Sensor`] contract: one call per
//! tick, returning a shaped reading or nothing when the raw value is not
//! plausible. Debounce, thresholds and heartbeats are not applied here;
//! that is the sampling engine's job.

pub mod analog;
pub mod digital;
pub mod encoder;
pub mod interrupt;
pub mod pulse;

pub use analog::{AnalogSensor, AnalogThresholdSensor};
pub use digital::DigitalSensor;
pub use encoder::RotaryEncoderSensor;
pub use interrupt::{ImpactSensor, InterruptLatch};
pub use pulse::PulseTrainSensor;

use crate::capability::InboundMessage;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use strum::Display;

/// Sensor classes the runtime knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum SensorClass {
    Digital,
    Analog,
    AnalogThreshold,
    PulseTrain,
    RotaryEncoder,
    RgbLed,
}

/// Electrical polarity of a digital line.
///
/// Several hardware revisions wire the same module active-low and others
/// active-high, so this is always explicit configuration, never inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    ActiveHigh,
    ActiveLow,
}

impl Polarity {
    /// Interpret an electrical level as the logical "active" state.
    pub fn interpret(self, level: bool) -> bool {
        match self {
            Polarity::ActiveHigh => level,
            Polarity::ActiveLow => !level,
        }
    }
}

/// Interpreted value carried by a reading.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    Bool(bool),
    /// Scaled physical unit (ppm, degrees Celsius, ...).
    Scalar(f64),
    /// Running counter (rotary encoder position).
    Count(i64),
    /// Events per minute (pulse train rate).
    Rate(u32),
    /// PWM duty triple of an RGB channel set.
    Color { r: u16, g: u16, b: u16 },
}

impl ReadingValue {
    /// Whether `next` differs from `self` by more than `threshold`.
    /// Non-numeric variants compare by equality; a variant mismatch always
    /// counts as changed.
    pub fn changed(&self, next: &ReadingValue, threshold: f64) -> bool {
        match (self, next) {
            (ReadingValue::Bool(a), ReadingValue::Bool(b)) => a != b,
            (ReadingValue::Scalar(a), ReadingValue::Scalar(b)) => (a - b).abs() > threshold,
            (ReadingValue::Rate(a), ReadingValue::Rate(b)) => {
                (f64::from(*a) - f64::from(*b)).abs() > threshold
            }
            (ReadingValue::Count(a), ReadingValue::Count(b)) => a != b,
            (
                ReadingValue::Color { r, g, b },
                ReadingValue::Color {
                    r: r2,
                    g: g2,
                    b: b2,
                },
            ) => (r, g, b) != (r2, g2, b2),
            _ => true,
        }
    }
}

/// One shaped sensor reading. Ephemeral: produced each tick, dropped after
/// comparison with the previous reported value.
#[derive(Debug, Clone)]
pub struct SensorReading {
    /// Unshaped value as read from the pin (level or ADC count).
    pub raw: i64,
    pub value: ReadingValue,
    /// State label carried into the wire payload ("inclinado", "cw", ...).
    pub label: String,
    /// Event-like reading: bypasses the changed-value comparison but is
    /// still subject to the debounce window.
    pub edge: bool,
    pub at: Instant,
}

impl SensorReading {
    pub fn new(raw: i64, value: ReadingValue, label: impl Into<String>, at: Instant) -> Self {
        Self {
            raw,
            value,
            label: label.into(),
            edge: false,
            at,
        }
    }

    pub fn edge(mut self) -> Self {
        self.edge = true;
        self
    }
}

/// Name and class of one configured sensor.
#[derive(Debug, Clone)]
pub struct SensorDescriptor {
    pub name: String,
    pub class: SensorClass,
}

impl SensorDescriptor {
    pub fn new(name: impl Into<String>, class: SensorClass) -> Self {
        Self {
            name: name.into(),
            class,
        }
    }
}

/// The polymorphic sensor capability the sampling engine is written against.
pub trait Sensor: Send {
    fn descriptor(&self) -> &SensorDescriptor;

    /// Take one sample. `Ok(None)` means no reportable observation this
    /// tick (idle encoder, implausible ADC value); it is not a fault.
    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>>;

    /// Handle a message from the agent's subscribed topic. Most sensors
    /// ignore inbound traffic; actuator-style devices react to it.
    fn handle_command(&mut self, _message: &InboundMessage) {}
}
