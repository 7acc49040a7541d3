//! Analog sensors (gas concentration, analog hall effect, microphone, ...).

use super::{Polarity, ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use crate::capability::gpio::ADC_FULL_SCALE;
use crate::capability::{AnalogInput, DigitalInput};
use crate::error::Result;
use log::warn;
use std::time::Instant;

/// Linear conversion from ADC counts to a physical unit.
#[derive(Debug, Clone, Copy)]
pub struct Calibration {
    pub gain: f64,
    pub offset: f64,
}

impl Calibration {
    /// Map the full 12-bit ADC range onto `0..=full_scale` units, the common
    /// gas-sensor scaling (4095 counts = 1000 ppm).
    pub fn full_scale(full_scale: f64) -> Self {
        Self {
            gain: full_scale / f64::from(ADC_FULL_SCALE),
            offset: 0.0,
        }
    }

    pub fn apply(&self, counts: f64) -> f64 {
        counts * self.gain + self.offset
    }
}

/// Averaged, calibrated analog line with an optional alarm label threshold.
pub struct AnalogSensor {
    descriptor: SensorDescriptor,
    pin: Box<dyn AnalogInput>,
    calibration: Calibration,
    /// Samples averaged per tick to tame noisy lines. Minimum 1.
    average_samples: u8,
    /// Derived-unit level above which the reading is labelled `alarm_label`.
    alarm_level: Option<f64>,
    alarm_label: String,
    normal_label: String,
}

impl AnalogSensor {
    pub fn new(
        name: impl Into<String>,
        pin: Box<dyn AnalogInput>,
        calibration: Calibration,
        average_samples: u8,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::Analog),
            pin,
            calibration,
            average_samples: average_samples.max(1),
            alarm_level: None,
            alarm_label: "alto".to_string(),
            normal_label: "normal".to_string(),
        }
    }

    pub fn with_alarm(
        mut self,
        level: f64,
        alarm_label: impl Into<String>,
        normal_label: impl Into<String>,
    ) -> Self {
        self.alarm_level = Some(level);
        self.alarm_label = alarm_label.into();
        self.normal_label = normal_label.into();
        self
    }

    /// Average `average_samples` raw reads, rejecting counts outside the
    /// ADC range as implausible.
    fn read_averaged(&mut self) -> Result<Option<f64>> {
        let mut sum = 0u32;
        for _ in 0..self.average_samples {
            let counts = self.pin.read()?;
            if counts > ADC_FULL_SCALE {
                warn!(
                    "[{}] implausible ADC count {}, dropping tick",
                    self.descriptor.name, counts
                );
                return Ok(None);
            }
            sum += u32::from(counts);
        }
        Ok(Some(f64::from(sum) / f64::from(self.average_samples)))
    }
}

impl Sensor for AnalogSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let Some(counts) = self.read_averaged()? else {
            return Ok(None);
        };
        let value = self.calibration.apply(counts);
        let label = match self.alarm_level {
            Some(level) if value > level => self.alarm_label.clone(),
            _ => self.normal_label.clone(),
        };
        Ok(Some(SensorReading::new(
            counts.round() as i64,
            ReadingValue::Scalar(value),
            label,
            now,
        )))
    }
}

/// Comparator-style module exposing a digital threshold output next to the
/// raw analog line (digital temperature modules and friends). The digital
/// output decides the reported state; the analog line rides along as the
/// raw value.
pub struct AnalogThresholdSensor {
    descriptor: SensorDescriptor,
    digital: Box<dyn DigitalInput>,
    analog: Box<dyn AnalogInput>,
    polarity: Polarity,
    over_label: String,
    under_label: String,
}

impl AnalogThresholdSensor {
    pub fn new(
        name: impl Into<String>,
        digital: Box<dyn DigitalInput>,
        analog: Box<dyn AnalogInput>,
        polarity: Polarity,
        over_label: impl Into<String>,
        under_label: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::AnalogThreshold),
            digital,
            analog,
            polarity,
            over_label: over_label.into(),
            under_label: under_label.into(),
        }
    }
}

impl Sensor for AnalogThresholdSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let over = self.polarity.interpret(self.digital.read()?);
        let counts = self.analog.read()?;
        if counts > ADC_FULL_SCALE {
            warn!(
                "[{}] implausible ADC count {}, dropping tick",
                self.descriptor.name, counts
            );
            return Ok(None);
        }
        let label = if over {
            self.over_label.clone()
        } else {
            self.under_label.clone()
        };
        Ok(Some(SensorReading::new(
            i64::from(counts),
            ReadingValue::Bool(over),
            label,
            now,
        )))
    }
}
