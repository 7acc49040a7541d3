//! RGB LED channel set driven over the broker.
//!
//! Accepts `{"color": <name>}` or `{"r","g","b"}` command records and
//! ignores records carrying a `dispositivo` field, which are this device's
//! own state echoes coming back from the shared topic.

use crate::capability::InboundMessage;
use crate::capability::PwmOutput;
use crate::capability::gpio::PWM_FULL_SCALE;
use crate::error::Result;
use crate::sensors::{ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use log::{info, warn};
use std::time::Instant;

/// Named colors recognized in command records, as PWM duty triples.
const COLORS: &[(&str, (u16, u16, u16))] = &[
    ("rojo", (1023, 0, 0)),
    ("verde", (0, 1023, 0)),
    ("azul", (0, 0, 1023)),
    ("amarillo", (1023, 1023, 0)),
    ("magenta", (1023, 0, 1023)),
    ("cian", (0, 1023, 1023)),
    ("blanco", (1023, 1023, 1023)),
    ("apagado", (0, 0, 0)),
];

pub fn color_by_name(name: &str) -> Option<(u16, u16, u16)> {
    COLORS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, duties)| *duties)
}

/// Nearest color name for a duty triple, `"personalizado"` when the mix
/// matches none of the known colors.
pub fn identify_color(r: u16, g: u16, b: u16) -> &'static str {
    let rn = f64::from(r) / f64::from(PWM_FULL_SCALE);
    let gn = f64::from(g) / f64::from(PWM_FULL_SCALE);
    let bn = f64::from(b) / f64::from(PWM_FULL_SCALE);

    if rn < 0.1 && gn < 0.1 && bn < 0.1 {
        return "apagado";
    }
    if rn > 0.9 && gn > 0.9 && bn > 0.9 {
        return "blanco";
    }

    if rn > 0.7 && gn < 0.3 && bn < 0.3 {
        return "rojo";
    }
    if rn < 0.3 && gn > 0.7 && bn < 0.3 {
        return "verde";
    }
    if rn < 0.3 && gn < 0.3 && bn > 0.7 {
        return "azul";
    }

    if rn > 0.7 && gn > 0.7 && bn < 0.3 {
        return "amarillo";
    }
    if rn > 0.7 && gn < 0.3 && bn > 0.7 {
        return "magenta";
    }
    if rn < 0.3 && gn > 0.7 && bn > 0.7 {
        return "cian";
    }

    "personalizado"
}

/// Three PWM channels plus the command parser. Doubles as a [`Sensor`]
/// whose readings are the current color state, so the standard agent loop
/// publishes state changes and the periodic state record.
pub struct RgbLedController {
    descriptor: SensorDescriptor,
    red: Box<dyn PwmOutput>,
    green: Box<dyn PwmOutput>,
    blue: Box<dyn PwmOutput>,
}

impl RgbLedController {
    pub fn new(
        name: impl Into<String>,
        red: Box<dyn PwmOutput>,
        green: Box<dyn PwmOutput>,
        blue: Box<dyn PwmOutput>,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::RgbLed),
            red,
            green,
            blue,
        }
    }

    pub fn duties(&self) -> (u16, u16, u16) {
        (self.red.duty(), self.green.duty(), self.blue.duty())
    }

    fn set_color(&mut self, r: u16, g: u16, b: u16) -> Result<()> {
        self.red.set_duty(r.min(PWM_FULL_SCALE))?;
        self.green.set_duty(g.min(PWM_FULL_SCALE))?;
        self.blue.set_duty(b.min(PWM_FULL_SCALE))?;
        let (r, g, b) = self.duties();
        info!(
            "[{}] color set to {} (r={}, g={}, b={})",
            self.descriptor.name,
            identify_color(r, g, b),
            r,
            g,
            b
        );
        Ok(())
    }

    /// Apply one command record. Returns `false` when the record was
    /// ignored (own echo, unknown color, unrecognized shape).
    pub fn apply_command(&mut self, payload: &[u8]) -> Result<bool> {
        let command: serde_json::Value = serde_json::from_slice(payload)?;

        // State echoes from this device loop back on the shared topic.
        if command.get("dispositivo").is_some() {
            return Ok(false);
        }

        if let Some(name) = command.get("color").and_then(|c| c.as_str()) {
            let name = name.to_lowercase();
            match color_by_name(&name) {
                Some((r, g, b)) => {
                    self.set_color(r, g, b)?;
                    return Ok(true);
                }
                None => {
                    warn!("[{}] unknown color: {}", self.descriptor.name, name);
                    return Ok(false);
                }
            }
        }

        let duty = |key: &str| {
            command
                .get(key)
                .and_then(|v| v.as_u64())
                .map(|v| v.min(u64::from(PWM_FULL_SCALE)) as u16)
        };
        if let (Some(r), Some(g), Some(b)) = (duty("r"), duty("g"), duty("b")) {
            self.set_color(r, g, b)?;
            return Ok(true);
        }

        warn!("[{}] unrecognized command record", self.descriptor.name);
        Ok(false)
    }
}

impl Sensor for RgbLedController {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let (r, g, b) = self.duties();
        Ok(Some(SensorReading::new(
            i64::from(r) << 20 | i64::from(g) << 10 | i64::from(b),
            ReadingValue::Color { r, g, b },
            identify_color(r, g, b),
            now,
        )))
    }

    fn handle_command(&mut self, message: &InboundMessage) {
        if let Err(e) = self.apply_command(&message.payload) {
            warn!(
                "[{}] failed to process command: {}",
                self.descriptor.name, e
            );
        }
    }
}
