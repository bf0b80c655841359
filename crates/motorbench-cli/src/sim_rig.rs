//! Simulated device-side peer, so the whole stack runs without a robot.
//!
//! One task plays the controller firmware for a handful of device ids: it
//! watches the command topics the client publishes and feeds back plausible
//! kinematic telemetry on the stats topics. Commands are honoured the way
//! the real firmware does – `stop` and the global emergency stop zero the
//! output, `reset` rezeroes the encoder, `newPosition` re-seats it.

use std::sync::Arc;
use std::time::Duration;

use motorbench_client::bus::{BoolSubscription, FloatSubscription};
use motorbench_client::sim::SimBus;
use motorbench_client::{topics, KeyValueBus as _};
use motorbench_types::DeviceId;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Physics step of the rig.
const TICK: Duration = Duration::from_millis(50);

/// Free-running shaft speed at full duty-cycle, rpm.
const MAX_RPM: f64 = 6000.0;

/// Nominal battery voltage at rest.
const IDLE_VOLTAGE: f64 = 12.6;

struct SimMotor {
    id: DeviceId,
    desired_speed: Arc<dyn FloatSubscription>,
    new_position: Arc<dyn FloatSubscription>,
    stop: Arc<dyn BoolSubscription>,
    reset: Arc<dyn BoolSubscription>,
    position: f64,
    temperature: f64,
    last_seated_position: f64,
}

impl SimMotor {
    fn new(bus: &SimBus, id: DeviceId) -> Self {
        Self {
            id,
            desired_speed: bus.subscribe_float(&topics::command(id, "desiredSpeed"), 0.0),
            new_position: bus.subscribe_float(&topics::command(id, "newPosition"), 0.0),
            stop: bus.subscribe_bool(&topics::command(id, "stop"), false),
            reset: bus.subscribe_bool(&topics::command(id, "reset"), false),
            position: 0.0,
            temperature: 25.0,
            last_seated_position: 0.0,
        }
    }

    fn step(&mut self, bus: &SimBus, estop: bool, dt: f64) {
        let halted = estop || self.stop.get();
        let applied = if halted {
            0.0
        } else {
            self.desired_speed.get().clamp(-1.0, 1.0)
        };

        if self.reset.get() {
            self.position = 0.0;
        }
        let seat = self.new_position.get();
        if seat != self.last_seated_position {
            self.position = seat;
            self.last_seated_position = seat;
        }

        let velocity = applied * MAX_RPM;
        self.position += velocity / 60.0 * dt;

        // First-order drift toward a load-dependent steady temperature.
        let target_temp = 25.0 + applied.abs() * 30.0;
        self.temperature += (target_temp - self.temperature) * 0.05;

        bus.feed_float(&topics::stat(self.id, "busVoltage"), IDLE_VOLTAGE - applied.abs() * 0.8);
        bus.feed_float(&topics::stat(self.id, "outputCurrent"), applied.abs() * 40.0);
        bus.feed_float(&topics::stat(self.id, "temperature"), self.temperature);
        bus.feed_float(&topics::stat(self.id, "velocity"), velocity);
        bus.feed_float(&topics::stat(self.id, "setSpeed"), applied);
        bus.feed_float(&topics::stat(self.id, "position"), self.position);
    }
}

/// Spawn the rig for `ids`. Runs until the process exits.
pub fn spawn(bus: SimBus, ids: Vec<DeviceId>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let estop = bus.subscribe_bool(topics::EMERGENCY_STOP, false);
        let mut motors: Vec<SimMotor> = ids.iter().map(|&id| SimMotor::new(&bus, id)).collect();
        debug!(count = motors.len(), "sim rig running");

        let mut ticker = time::interval(TICK);
        let dt = TICK.as_secs_f64();
        loop {
            ticker.tick().await;
            let halted = estop.get();
            for motor in &mut motors {
                motor.step(&bus, halted, dt);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use motorbench_client::sim::SimValue;

    fn id(raw: u8) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    fn stat_f64(bus: &SimBus, topic: &str) -> f64 {
        match bus.value(topic) {
            Some(SimValue::Float(v)) => v,
            other => panic!("expected float at {topic}, got {other:?}"),
        }
    }

    #[test]
    fn motor_tracks_desired_speed() {
        let bus = SimBus::new();
        let mut motor = SimMotor::new(&bus, id(1));
        bus.feed_float("MotorController/1/desiredSpeed", 0.5);

        motor.step(&bus, false, 0.05);

        assert_eq!(stat_f64(&bus, "MotorStats/1/setSpeed"), 0.5);
        assert_eq!(stat_f64(&bus, "MotorStats/1/velocity"), 3000.0);
        assert!(stat_f64(&bus, "MotorStats/1/position") > 0.0);
        assert!(stat_f64(&bus, "MotorStats/1/outputCurrent") > 0.0);
    }

    #[test]
    fn stop_zeroes_the_output() {
        let bus = SimBus::new();
        let mut motor = SimMotor::new(&bus, id(1));
        bus.feed_float("MotorController/1/desiredSpeed", 0.8);
        bus.feed_bool("MotorController/1/stop", true);

        motor.step(&bus, false, 0.05);

        assert_eq!(stat_f64(&bus, "MotorStats/1/setSpeed"), 0.0);
        assert_eq!(stat_f64(&bus, "MotorStats/1/velocity"), 0.0);
    }

    #[test]
    fn emergency_stop_overrides_every_command() {
        let bus = SimBus::new();
        let mut motor = SimMotor::new(&bus, id(2));
        bus.feed_float("MotorController/2/desiredSpeed", 1.0);

        motor.step(&bus, true, 0.05);

        assert_eq!(stat_f64(&bus, "MotorStats/2/setSpeed"), 0.0);
    }

    #[test]
    fn reset_rezeroes_the_encoder() {
        let bus = SimBus::new();
        let mut motor = SimMotor::new(&bus, id(1));
        bus.feed_float("MotorController/1/desiredSpeed", 1.0);
        motor.step(&bus, false, 1.0);
        assert!(stat_f64(&bus, "MotorStats/1/position") > 50.0);

        bus.feed_float("MotorController/1/desiredSpeed", 0.0);
        bus.feed_bool("MotorController/1/reset", true);
        motor.step(&bus, false, 0.05);

        assert_eq!(stat_f64(&bus, "MotorStats/1/position"), 0.0);
    }

    #[test]
    fn new_position_reseats_the_encoder_once() {
        let bus = SimBus::new();
        let mut motor = SimMotor::new(&bus, id(1));
        bus.feed_float("MotorController/1/newPosition", 10.0);

        motor.step(&bus, false, 0.05);
        assert_eq!(stat_f64(&bus, "MotorStats/1/position"), 10.0);

        // Unchanged command value must not keep snapping the encoder back.
        bus.feed_float("MotorController/1/desiredSpeed", 1.0);
        motor.step(&bus, false, 0.05);
        assert!(stat_f64(&bus, "MotorStats/1/position") > 10.0);
    }
}
