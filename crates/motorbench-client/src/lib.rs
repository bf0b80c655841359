//! Telemetry/command client for the motor test bench.
//!
//! Translates the fixed per-device topic schema into typed read/write
//! operations against an external key/value bus, and implements the
//! latch-and-clear convention for the one-shot `stop`/`reset` commands.
//! The transport itself is behind the [`KeyValueBus`] trait; [`sim::SimBus`]
//! is the in-process implementation used by tests and offline demos.

pub mod bus;
pub mod client;
pub mod sim;
pub mod topics;

pub use bus::{ConnectOptions, ConnectTarget, KeyValueBus, DEFAULT_PORT};
pub use client::DeviceTelemetryClient;
