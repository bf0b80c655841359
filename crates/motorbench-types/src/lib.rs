//! Shared vocabulary types for the motor test bench.
//!
//! Everything that crosses a crate boundary lives here: device identifiers,
//! the telemetry snapshot read from the bus, and the global [`BenchError`]
//! spanning connectivity, validation, and capacity failures.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Identifier of one physical motor controller on the CAN bus.
///
/// A `DeviceId` is a small positive integer; zero is reserved and rejected at
/// construction. Which ids are addressable on a given bench is decided by the
/// [`DeviceIdRange`] the allocator is configured with, not by this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(u8);

impl DeviceId {
    /// Wrap a raw id. Returns `None` for the reserved id `0`.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    /// The raw integer value, as it appears in bus topic paths.
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u8> for DeviceId {
    type Error = BenchError;

    fn try_from(raw: u8) -> Result<Self, BenchError> {
        Self::new(raw).ok_or_else(|| BenchError::InvalidInput("device id 0 is reserved".into()))
    }
}

/// Inclusive range of device ids a bench may hand out.
///
/// The default matches the CAN id window exposed by the bench UI: `[1, 64]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdRange {
    pub min: DeviceId,
    pub max: DeviceId,
}

impl DeviceIdRange {
    /// Build a range, rejecting an inverted pair.
    pub fn new(min: DeviceId, max: DeviceId) -> Result<Self, BenchError> {
        if min > max {
            return Err(BenchError::InvalidInput(format!(
                "inverted device id range [{min}, {max}]"
            )));
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.min <= id && id <= self.max
    }

    /// Iterate ids upward from `max(start, self.min)` to `self.max` inclusive.
    /// Empty when `start` already exceeds the range.
    pub fn iter_from(self, start: DeviceId) -> impl Iterator<Item = DeviceId> {
        let first = start.max(self.min).get();
        (first..=self.max.get()).filter_map(DeviceId::new)
    }
}

impl Default for DeviceIdRange {
    fn default() -> Self {
        Self {
            min: DeviceId(1),
            max: DeviceId(64),
        }
    }
}

/// Point-in-time read of all telemetry fields for one device.
///
/// Field names mirror the bus topic names. Every field defaults to `0.0`
/// until the first value arrives from the device-side peer; a snapshot is
/// never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorSnapshot {
    /// Supply voltage at the controller input, volts.
    pub bus_voltage: f64,
    /// Output (stator) current, amps.
    pub output_current: f64,
    /// Controller temperature, degrees Celsius.
    pub temperature: f64,
    /// Measured shaft velocity, rpm.
    pub velocity: f64,
    /// The duty-cycle the controller is currently applying, `[-1.0, 1.0]`.
    pub set_speed: f64,
    /// Shaft position, rotations.
    pub position: f64,
}

/// Global error type for the bench core.
///
/// None of these are fatal in normal operation: connectivity failures degrade
/// to stale data or dropped writes, validation failures are rejected at the
/// input boundary, and capacity failures are explicit rejections the UI uses
/// to disable its creation controls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BenchError {
    /// The bus is unreachable or not yet connected; the operation was dropped.
    #[error("bus unavailable: {0}")]
    Bus(String),

    /// Conflicting or malformed connection parameters.
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),

    /// Malformed caller input, rejected with no state change.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Every id in the configured range is claimed by an active session.
    #[error("no free device id in [{min}, {max}]")]
    NoFreeDeviceId { min: u8, max: u8 },

    /// The bench-wide cap on simultaneous sessions has been reached.
    #[error("session limit of {0} reached")]
    SessionLimit(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_rejects_zero() {
        assert!(DeviceId::new(0).is_none());
        assert!(DeviceId::try_from(0u8).is_err());
        assert_eq!(DeviceId::new(1).unwrap().get(), 1);
    }

    #[test]
    fn device_id_displays_as_decimal() {
        let id = DeviceId::new(42).unwrap();
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn default_range_is_one_to_sixty_four() {
        let range = DeviceIdRange::default();
        assert_eq!(range.min.get(), 1);
        assert_eq!(range.max.get(), 64);
        assert!(range.contains(DeviceId::new(64).unwrap()));
        assert!(!range.contains(DeviceId::new(65).unwrap()));
    }

    #[test]
    fn inverted_range_is_rejected() {
        let lo = DeviceId::new(2).unwrap();
        let hi = DeviceId::new(10).unwrap();
        assert!(DeviceIdRange::new(hi, lo).is_err());
        assert!(DeviceIdRange::new(lo, hi).is_ok());
    }

    #[test]
    fn iter_from_clamps_to_range_minimum() {
        let range = DeviceIdRange::default();
        let first = range.iter_from(DeviceId::new(1).unwrap()).next();
        assert_eq!(first, DeviceId::new(1));

        let ids: Vec<u8> = range
            .iter_from(DeviceId::new(62).unwrap())
            .map(DeviceId::get)
            .collect();
        assert_eq!(ids, vec![62, 63, 64]);
    }

    #[test]
    fn iter_from_past_maximum_is_empty() {
        let range = DeviceIdRange {
            min: DeviceId::new(1).unwrap(),
            max: DeviceId::new(4).unwrap(),
        };
        assert_eq!(range.iter_from(DeviceId::new(5).unwrap()).count(), 0);
    }

    #[test]
    fn snapshot_defaults_to_zero_fields() {
        let snap = MotorSnapshot::default();
        assert_eq!(snap.bus_voltage, 0.0);
        assert_eq!(snap.output_current, 0.0);
        assert_eq!(snap.temperature, 0.0);
        assert_eq!(snap.velocity, 0.0);
        assert_eq!(snap.set_speed, 0.0);
        assert_eq!(snap.position, 0.0);
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let snap = MotorSnapshot {
            bus_voltage: 12.3,
            output_current: 4.5,
            temperature: 31.0,
            velocity: 1800.0,
            set_speed: 0.5,
            position: 7.25,
        };
        let json = serde_json::to_string(&snap).unwrap();
        let back: MotorSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snap, back);
    }

    #[test]
    fn bench_error_display() {
        let err = BenchError::NoFreeDeviceId { min: 1, max: 64 };
        assert!(err.to_string().contains("[1, 64]"));

        let err = BenchError::SessionLimit(4);
        assert!(err.to_string().contains("4"));
    }
}
