//! Actuator-style devices: agents that consume broker commands and expose
//! their own state back as readings.

pub mod rgb;

pub use rgb::RgbLedController;
