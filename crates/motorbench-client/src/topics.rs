//! Per-device topic schema shared with the device-side peer.
//!
//! Telemetry lives under `MotorStats/<id>/…` and is written by the controller
//! firmware; commands live under `MotorController/<id>/…` and are written by
//! this client. The decimal device id is a path segment, so the schema is
//! purely a naming convention – changing anything here changes on-wire
//! behaviour observed by the peer.

use motorbench_types::DeviceId;

/// Root table of device-published telemetry.
pub const STATS_TABLE: &str = "MotorStats";

/// Root table of client-published commands.
pub const COMMAND_TABLE: &str = "MotorController";

/// Global boolean the device-side peer watches to halt every motor at once.
/// Lives directly under the command table, not under any device id.
pub const EMERGENCY_STOP: &str = "MotorController/emergencyStop";

/// Path of one telemetry field for `id`, e.g. `MotorStats/3/busVoltage`.
pub fn stat(id: DeviceId, field: &str) -> String {
    format!("{STATS_TABLE}/{id}/{field}")
}

/// Path of one command slot for `id`, e.g. `MotorController/3/stop`.
pub fn command(id: DeviceId, field: &str) -> String {
    format!("{COMMAND_TABLE}/{id}/{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u8) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn stat_paths_use_decimal_id_segment() {
        assert_eq!(stat(id(1), "busVoltage"), "MotorStats/1/busVoltage");
        assert_eq!(stat(id(64), "position"), "MotorStats/64/position");
    }

    #[test]
    fn command_paths_use_decimal_id_segment() {
        assert_eq!(command(id(7), "desiredSpeed"), "MotorController/7/desiredSpeed");
        assert_eq!(command(id(7), "stop"), "MotorController/7/stop");
    }

    #[test]
    fn emergency_stop_is_not_device_scoped() {
        assert_eq!(EMERGENCY_STOP, "MotorController/emergencyStop");
    }
}
