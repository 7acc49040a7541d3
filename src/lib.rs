//! Sensor Bridge library.
//!
//! A generic sensor-to-MQTT device agent: connectivity supervision,
//! debounced/sampled event emission, and graceful degradation under
//! network loss, written once against pluggable sensor and transport
//! capabilities.

pub mod actuator;
pub mod agent;
pub mod capability;
pub mod config;
pub mod error;
pub mod input;
pub mod sensors;
