//! Simulated capabilities for development and testing.

pub mod broker;
pub mod network;
pub mod pins;

pub use broker::{BrokerScriptHandle, SimulatedBroker};
pub use network::{NetworkScriptHandle, SimulatedNetwork};
pub use pins::{
    AnalogHandle, DigitalHandle, SimulatedAnalogPin, SimulatedDigitalPin, SimulatedPwmChannel,
    SquareWavePin, WaveAnalogPin,
};
