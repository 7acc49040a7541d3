//! Digital on/off sensors (tilt switches, buttons, magnetic reeds, ...).

use super::{Polarity, ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use crate::capability::DigitalInput;
use crate::error::Result;
use std::time::Instant;

/// A single digital line interpreted through an explicit polarity flag,
/// labelled with per-deployment state names.
pub struct DigitalSensor {
    descriptor: SensorDescriptor,
    pin: Box<dyn DigitalInput>,
    polarity: Polarity,
    active_label: String,
    inactive_label: String,
}

impl DigitalSensor {
    pub fn new(
        name: impl Into<String>,
        pin: Box<dyn DigitalInput>,
        polarity: Polarity,
        active_label: impl Into<String>,
        inactive_label: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::Digital),
            pin,
            polarity,
            active_label: active_label.into(),
            inactive_label: inactive_label.into(),
        }
    }
}

impl Sensor for DigitalSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let level = self.pin.read()?;
        let active = self.polarity.interpret(level);
        let label = if active {
            self.active_label.clone()
        } else {
            self.inactive_label.clone()
        };
        Ok(Some(SensorReading::new(
            i64::from(level),
            ReadingValue::Bool(active),
            label,
            now,
        )))
    }
}
