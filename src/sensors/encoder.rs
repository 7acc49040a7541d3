//! Rotary encoder with integrated push switch.

use super::{Polarity, ReadingValue, Sensor, SensorClass, SensorDescriptor, SensorReading};
use crate::capability::DigitalInput;
use crate::error::Result;
use std::time::{Duration, Instant};

/// Quadrature decoder over CLK/DT plus a debounced switch line. Rotation
/// steps and presses are edge readings; idle ticks produce nothing.
pub struct RotaryEncoderSensor {
    descriptor: SensorDescriptor,
    clk: Box<dyn DigitalInput>,
    dt: Box<dyn DigitalInput>,
    switch: Box<dyn DigitalInput>,
    switch_polarity: Polarity,
    switch_debounce: Duration,
    count: i64,
    last_clk: Option<bool>,
    last_switch: Option<bool>,
    last_switch_change: Option<Instant>,
}

impl RotaryEncoderSensor {
    pub fn new(
        name: impl Into<String>,
        clk: Box<dyn DigitalInput>,
        dt: Box<dyn DigitalInput>,
        switch: Box<dyn DigitalInput>,
        switch_polarity: Polarity,
        switch_debounce: Duration,
    ) -> Self {
        Self {
            descriptor: SensorDescriptor::new(name, SensorClass::RotaryEncoder),
            clk,
            dt,
            switch,
            switch_polarity,
            switch_debounce,
            count: 0,
            last_clk: None,
            last_switch: None,
            last_switch_change: None,
        }
    }

    pub fn count(&self) -> i64 {
        self.count
    }

    fn switch_settled(&self, now: Instant) -> bool {
        match self.last_switch_change {
            Some(at) => now.duration_since(at) >= self.switch_debounce,
            None => true,
        }
    }
}

impl Sensor for RotaryEncoderSensor {
    fn descriptor(&self) -> &SensorDescriptor {
        &self.descriptor
    }

    fn sample(&mut self, now: Instant) -> Result<Option<SensorReading>> {
        let clk = self.clk.read()?;

        // A CLK transition is one detent step; DT phase gives direction.
        if let Some(last_clk) = self.last_clk
            && clk != last_clk
        {
            self.last_clk = Some(clk);
            let direction = if self.dt.read()? != clk {
                self.count += 1;
                "cw"
            } else {
                self.count -= 1;
                "ccw"
            };
            return Ok(Some(
                SensorReading::new(
                    self.count,
                    ReadingValue::Count(self.count),
                    direction,
                    now,
                )
                .edge(),
            ));
        }
        self.last_clk = Some(clk);

        let level = self.switch.read()?;
        let pressed = self.switch_polarity.interpret(level);
        let previous = self.last_switch.replace(pressed);
        if previous != Some(pressed) && previous.is_some() {
            if !self.switch_settled(now) {
                // Bounce: keep the previous debounce deadline running.
                self.last_switch = previous;
                return Ok(None);
            }
            self.last_switch_change = Some(now);
            if pressed {
                return Ok(Some(
                    SensorReading::new(
                        self.count,
                        ReadingValue::Count(self.count),
                        "press",
                        now,
                    )
                    .edge(),
                ));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::simulation::pins::SimulatedDigitalPin;

    fn encoder() -> (
        RotaryEncoderSensor,
        crate::input::simulation::pins::DigitalHandle,
        crate::input::simulation::pins::DigitalHandle,
        crate::input::simulation::pins::DigitalHandle,
    ) {
        let (clk, clk_h) = SimulatedDigitalPin::new(true);
        let (dt, dt_h) = SimulatedDigitalPin::new(true);
        let (sw, sw_h) = SimulatedDigitalPin::new(true);
        let sensor = RotaryEncoderSensor::new(
            "encoder",
            Box::new(clk),
            Box::new(dt),
            Box::new(sw),
            Polarity::ActiveLow,
            Duration::from_millis(50),
        );
        (sensor, clk_h, dt_h, sw_h)
    }

    #[test]
    fn test_clockwise_step() {
        let (mut sensor, clk, dt, _sw) = encoder();
        let mut now = Instant::now();

        assert!(sensor.sample(now).unwrap().is_none());

        // CLK falls while DT stays high: clockwise.
        clk.set(false);
        dt.set(true);
        now += Duration::from_millis(5);
        let reading = sensor.sample(now).unwrap().unwrap();
        assert!(reading.edge);
        assert_eq!(reading.value, ReadingValue::Count(1));
        assert_eq!(reading.label, "cw");
    }

    #[test]
    fn test_counter_clockwise_step() {
        let (mut sensor, clk, dt, _sw) = encoder();
        let mut now = Instant::now();
        assert!(sensor.sample(now).unwrap().is_none());

        // CLK falls with DT already low: counter-clockwise.
        clk.set(false);
        dt.set(false);
        now += Duration::from_millis(5);
        let reading = sensor.sample(now).unwrap().unwrap();
        assert_eq!(reading.value, ReadingValue::Count(-1));
        assert_eq!(reading.label, "ccw");
    }

    #[test]
    fn test_idle_ticks_produce_nothing() {
        let (mut sensor, _clk, _dt, _sw) = encoder();
        let mut now = Instant::now();
        for _ in 0..5 {
            assert!(sensor.sample(now).unwrap().is_none());
            now += Duration::from_millis(5);
        }
        assert_eq!(sensor.count(), 0);
    }

    #[test]
    fn test_switch_press_is_debounced() {
        let (mut sensor, _clk, _dt, sw) = encoder();
        let mut now = Instant::now();
        assert!(sensor.sample(now).unwrap().is_none());

        // Press (active low).
        sw.set(false);
        now += Duration::from_millis(5);
        let reading = sensor.sample(now).unwrap().unwrap();
        assert_eq!(reading.label, "press");

        // Bounce back and forth within the 50ms window: suppressed.
        sw.set(true);
        now += Duration::from_millis(10);
        assert!(sensor.sample(now).unwrap().is_none());
        sw.set(false);
        now += Duration::from_millis(10);
        assert!(sensor.sample(now).unwrap().is_none());

        // A release and press after the window registers again.
        sw.set(true);
        now += Duration::from_millis(60);
        assert!(sensor.sample(now).unwrap().is_none());
        sw.set(false);
        now += Duration::from_millis(60);
        let reading = sensor.sample(now).unwrap().unwrap();
        assert_eq!(reading.label, "press");
    }
}
