//! Sampling policy and the reportability decision.
//!
//! The engine is deliberately pure: [`SamplingEngine::observe`] looks at a
//! reading and the clock and decides, and only [`SamplingEngine::commit`]
//! mutates the last-reported memory. The agent commits after the broker
//! accepted the event, so a failed send naturally retries the same event
//! on the next tick.

use super::publisher::PublishReason;
use crate::error::{AgentError, Result};
use crate::sensors::{ReadingValue, SensorReading};
use std::time::{Duration, Instant};

/// Per-sensor-class sampling configuration.
#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    /// Pause between loop iterations.
    pub tick_interval: Duration,
    /// Minimum stable interval before a changed digital/edge value is
    /// accepted.
    pub debounce: Duration,
    /// Minimum derived-unit delta for an analog change to be reportable.
    pub change_threshold: f64,
    /// Maximum silence before the current state is re-published. `None`
    /// disables heartbeats.
    pub heartbeat: Option<Duration>,
    /// One-time stabilization delay before the first sample.
    pub warm_up: Option<Duration>,
}

impl SamplingPolicy {
    pub fn digital() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            debounce: Duration::from_millis(300),
            change_threshold: 0.0,
            heartbeat: None,
            warm_up: None,
        }
    }

    /// Impact/shock profile: short debounce, periodic quiet-state resend.
    pub fn impact() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            debounce: Duration::from_millis(200),
            change_threshold: 0.0,
            heartbeat: Some(Duration::from_secs(5)),
            warm_up: None,
        }
    }

    pub fn analog() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            debounce: Duration::ZERO,
            change_threshold: 50.0,
            heartbeat: Some(Duration::from_secs(10)),
            warm_up: None,
        }
    }

    /// Gas sensors: fixed 2s cadence and a stabilization warm-up.
    pub fn gas() -> Self {
        Self {
            tick_interval: Duration::from_secs(2),
            debounce: Duration::ZERO,
            change_threshold: 50.0,
            heartbeat: Some(Duration::from_secs(2)),
            warm_up: Some(Duration::from_secs(10)),
        }
    }

    /// Pulse rate is published on the heartbeat cadence only.
    pub fn pulse() -> Self {
        Self {
            tick_interval: Duration::from_millis(50),
            debounce: Duration::ZERO,
            change_threshold: f64::INFINITY,
            heartbeat: Some(Duration::from_secs(1)),
            warm_up: None,
        }
    }

    /// Rotation steps must all get through; the switch line is debounced
    /// inside the sensor itself.
    pub fn encoder() -> Self {
        Self {
            tick_interval: Duration::from_millis(5),
            debounce: Duration::ZERO,
            change_threshold: 0.0,
            heartbeat: None,
            warm_up: None,
        }
    }

    /// RGB channel sets republish their state every couple of seconds.
    pub fn rgb() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            debounce: Duration::ZERO,
            change_threshold: 0.0,
            heartbeat: Some(Duration::from_secs(2)),
            warm_up: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(AgentError::InvalidConfig(
                "tick interval must be non-zero".to_string(),
            ));
        }
        if let Some(heartbeat) = self.heartbeat
            && heartbeat < self.debounce
        {
            return Err(AgentError::InvalidConfig(format!(
                "heartbeat interval {:?} shorter than debounce {:?}",
                heartbeat, self.debounce
            )));
        }
        Ok(())
    }
}

/// Outcome of one observation.
#[derive(Debug)]
pub enum Decision {
    Report {
        reason: PublishReason,
        reading: SensorReading,
    },
    Suppress,
}

/// Applies the reportability rules against the last-reported memory.
pub struct SamplingEngine {
    policy: SamplingPolicy,
    last_reported: Option<SensorReading>,
    /// When the last reported value *change* happened (heartbeats excluded);
    /// anchors the debounce window.
    last_change_at: Option<Instant>,
    /// When anything was last reported; anchors the heartbeat.
    last_report_at: Option<Instant>,
}

impl SamplingEngine {
    pub fn new(policy: SamplingPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            policy,
            last_reported: None,
            last_change_at: None,
            last_report_at: None,
        })
    }

    pub fn policy(&self) -> &SamplingPolicy {
        &self.policy
    }

    pub fn last_reported(&self) -> Option<&SensorReading> {
        self.last_reported.as_ref()
    }

    /// Decide whether this tick's reading (or its absence) warrants a
    /// publish. Pure with respect to engine memory.
    pub fn observe(&mut self, reading: Option<&SensorReading>, now: Instant) -> Decision {
        match (reading, &self.last_reported) {
            // The very first reading always establishes the initial state.
            (Some(current), None) => Decision::Report {
                reason: PublishReason::InitialState,
                reading: current.clone(),
            },

            (Some(current), Some(last)) => {
                if current.edge {
                    if self.in_debounce_window(now) {
                        Decision::Suppress
                    } else {
                        Decision::Report {
                            reason: PublishReason::ValueChanged,
                            reading: current.clone(),
                        }
                    }
                } else if last
                    .value
                    .changed(&current.value, self.policy.change_threshold)
                {
                    // Digital transitions inside the debounce window are
                    // dropped entirely; only the settled state after the
                    // window is reportable.
                    let debounced = matches!(current.value, ReadingValue::Bool(_));
                    if debounced && self.in_debounce_window(now) {
                        Decision::Suppress
                    } else {
                        Decision::Report {
                            reason: PublishReason::ValueChanged,
                            reading: current.clone(),
                        }
                    }
                } else if self.heartbeat_due(now) {
                    Decision::Report {
                        reason: PublishReason::Heartbeat,
                        reading: current.clone(),
                    }
                } else {
                    Decision::Suppress
                }
            }

            // No observation this tick; the heartbeat may still re-publish
            // the last reported state.
            (None, Some(last)) => {
                if self.heartbeat_due(now) {
                    Decision::Report {
                        reason: PublishReason::Heartbeat,
                        reading: last.clone(),
                    }
                } else {
                    Decision::Suppress
                }
            }

            (None, None) => Decision::Suppress,
        }
    }

    /// Record a successful send. Not called on failed sends, so the same
    /// event is re-derived next tick.
    pub fn commit(&mut self, reading: &SensorReading, reason: PublishReason, now: Instant) {
        self.last_reported = Some(reading.clone());
        self.last_report_at = Some(now);
        if reason != PublishReason::Heartbeat {
            self.last_change_at = Some(now);
        }
    }

    fn in_debounce_window(&self, now: Instant) -> bool {
        match self.last_change_at {
            Some(at) => now.duration_since(at) < self.policy.debounce,
            None => false,
        }
    }

    fn heartbeat_due(&self, now: Instant) -> bool {
        match (self.policy.heartbeat, self.last_report_at) {
            (Some(heartbeat), Some(at)) => now.duration_since(at) >= heartbeat,
            _ => false,
        }
    }
}
