//! Edge-triggered interrupt plumbing for shock/impact style sensors.
//!
//! The interrupt context must never talk to the broker. It records the hit
//! into a single atomic latch; the main loop drains the latch on its next
//! tick and publishes from there.

use super::{ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use crate::error::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

/// Single-word latch shared between the interrupt context and the main
/// loop. The flag and the timestamp are each one atomic word, so neither
/// side can observe a torn value.
#[derive(Default)]
pub struct InterruptLatch {
    hit: AtomicBool,
    at_millis: AtomicU64,
}

impl InterruptLatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a hit. Safe to call from any context; does no I/O and no
    /// allocation.
    pub fn trigger(&self, at_millis: u64) {
        self.at_millis.store(at_millis, Ordering::Relaxed);
        self.hit.store(true, Ordering::Release);
    }

    /// Consume a pending hit, if any, returning its timestamp.
    pub fn drain(&self) -> Option<u64> {
        if self.hit.swap(false, Ordering::Acquire) {
            Some(self.at_millis.load(Ordering::Relaxed))
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.hit.load(Ordering::Acquire)
    }
}

/// Impact sensor fed by an [`InterruptLatch`]. A drained hit becomes an
/// edge reading; quiet ticks report the inactive state so the heartbeat
/// policy can keep downstream consumers in sync.
pub struct ImpactSensor {
    descriptor: SensorDescriptor,
    latch: Arc<InterruptLatch>,
    active_label: String,
    inactive_label: String,
}

impl ImpactSensor {
    pub fn new(
        name: impl Into<String>,
        latch: Arc<InterruptLatch>,
        active_label: impl Into<String>,
        inactive_label: impl Into<String>,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::Digital),
            latch,
            active_label: active_label.into(),
            inactive_label: inactive_label.into(),
        }
    }
}

impl Sensor for ImpactSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        if self.latch.drain().is_some() {
            return Ok(Some(
                SensorReading::new(
                    1,
                    ReadingValue::Bool(true),
                    self.active_label.clone(),
                    now,
                )
                .edge(),
            ));
        }
        Ok(Some(SensorReading::new(
            0,
            ReadingValue::Bool(false),
            self.inactive_label.clone(),
            now,
        )))
    }
}
