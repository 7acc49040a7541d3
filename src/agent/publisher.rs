//! Wire payload construction and send bookkeeping.

use crate::error::Result;
use crate::sensors::{ReadingValue, SensorReading};
use serde::Serialize;
use strum::Display;

/// Why an event is being published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum PublishReason {
    InitialState,
    ValueChanged,
    Heartbeat,
}

/// Payload encoding for one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadFormat {
    /// Minimal decimal/boolean string, the historical format of the
    /// simplest sensors.
    Bare,
    /// JSON record with named fields and a monotonic sequence counter.
    Structured,
}

/// One outbound message. Constructed per send, never retained.
#[derive(Debug, Clone)]
pub struct PublishEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    pub reason: PublishReason,
}

#[derive(Serialize)]
struct StateRecord<'a> {
    sensor: &'a str,
    valor: serde_json::Value,
    estado: &'a str,
    contador: u64,
    timestamp: i64,
}

#[derive(Serialize)]
struct RgbStateRecord<'a> {
    dispositivo: &'a str,
    color: &'a str,
    r: u16,
    g: u16,
    b: u16,
    valor: &'a str,
    contador: u64,
    timestamp: i64,
}

/// Formats readings into [`PublishEvent`]s and tracks the sequence counter.
///
/// The counter only advances on [`Publisher::commit_sent`], so a failed
/// send re-issues the same record on the next tick.
pub struct Publisher {
    sensor_name: String,
    topic: String,
    format: PayloadFormat,
    sequence: u64,
}

impl Publisher {
    pub fn new(sensor_name: impl Into<String>, topic: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            sensor_name: sensor_name.into(),
            topic: topic.into(),
            format,
            sequence: 0,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages successfully sent so far.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn make_event(&self, reading: &SensorReading, reason: PublishReason) -> Result<PublishEvent> {
        let payload = match self.format {
            PayloadFormat::Bare => bare_payload(reading).into_bytes(),
            PayloadFormat::Structured => self.structured_payload(reading)?,
        };
        Ok(PublishEvent {
            topic: self.topic.clone(),
            payload,
            reason,
        })
    }

    /// Advance the counter after the broker accepted the event.
    pub fn commit_sent(&mut self) {
        self.sequence += 1;
    }

    fn structured_payload(&self, reading: &SensorReading) -> Result<Vec<u8>> {
        let timestamp = chrono::Utc::now().timestamp();
        let contador = self.sequence + 1;

        // RGB channel sets publish the device-state record their consumers
        // expect, including the echo marker field.
        if let ReadingValue::Color { r, g, b } = reading.value {
            let record = RgbStateRecord {
                dispositivo: &self.sensor_name,
                color: &reading.label,
                r,
                g,
                b,
                valor: &reading.label,
                contador,
                timestamp,
            };
            return Ok(serde_json::to_vec(&record)?);
        }

        let record = StateRecord {
            sensor: &self.sensor_name,
            valor: wire_value(&reading.value),
            estado: &reading.label,
            contador,
            timestamp,
        };
        Ok(serde_json::to_vec(&record)?)
    }
}

fn wire_value(value: &ReadingValue) -> serde_json::Value {
    match value {
        ReadingValue::Bool(active) => serde_json::json!(u8::from(*active)),
        ReadingValue::Scalar(v) => serde_json::json!((v * 100.0).round() / 100.0),
        ReadingValue::Count(n) => serde_json::json!(n),
        ReadingValue::Rate(r) => serde_json::json!(r),
        ReadingValue::Color { .. } => serde_json::Value::Null,
    }
}

fn bare_payload(reading: &SensorReading) -> String {
    match &reading.value {
        ReadingValue::Bool(active) => if *active { "1" } else { "0" }.to_string(),
        ReadingValue::Scalar(v) => format!("{:.2}", v),
        ReadingValue::Count(n) => n.to_string(),
        ReadingValue::Rate(r) => r.to_string(),
        ReadingValue::Color { .. } => reading.label.clone(),
    }
}
