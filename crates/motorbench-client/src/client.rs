//! [`DeviceTelemetryClient`] – typed read/write operations over the
//! per-device topic schema, plus the latch-and-clear convention for one-shot
//! boolean commands.
//!
//! # Latch-and-clear
//!
//! `stop` and `reset` are boolean *latches*: once set true they stay true on
//! the wire until the next opposing command clears them. `set_speed` clears
//! `stop` as a side effect before writing the new duty-cycle, and
//! `set_position` clears `reset` the same way. The client never auto-clears
//! a latch on a timer; that bookkeeping belongs to the session layer. This is
//! a two-party convention with the controller firmware, reproduced exactly –
//! reordering or eliding any of these writes changes on-wire behaviour.
//!
//! # Failure stance
//!
//! Every operation is best-effort. A command write against an unreachable bus
//! returns [`BenchError::Bus`] and is dropped; [`read_snapshot`] never fails,
//! degrading to the last cached (or zero-valued) snapshot instead. Nothing
//! here panics or blocks on the network.
//!
//! [`read_snapshot`]: DeviceTelemetryClient::read_snapshot

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use motorbench_types::{BenchError, DeviceId, MotorSnapshot};
use tracing::{debug, info};

use crate::bus::{
    BoolPublisher, BoolSubscription, ConnectOptions, FloatPublisher, FloatSubscription,
    KeyValueBus,
};
use crate::topics;

/// Cached get-latest handles for the six telemetry fields of one device.
struct StatsSubscriptions {
    bus_voltage: Arc<dyn FloatSubscription>,
    output_current: Arc<dyn FloatSubscription>,
    temperature: Arc<dyn FloatSubscription>,
    velocity: Arc<dyn FloatSubscription>,
    set_speed: Arc<dyn FloatSubscription>,
    position: Arc<dyn FloatSubscription>,
}

/// Cached publishers for the four command slots of one device.
struct CommandPublishers {
    desired_speed: Arc<dyn FloatPublisher>,
    new_position: Arc<dyn FloatPublisher>,
    stop: Arc<dyn BoolPublisher>,
    reset: Arc<dyn BoolPublisher>,
}

/// Client for the motor telemetry/command schema on the key/value bus.
///
/// Owns the per-device subscription and publisher caches. Handles are created
/// lazily on the first poll or command for a device and kept for the process
/// lifetime – an id whose session closed keeps its idle handles so reuse of
/// the same id later avoids the resubscription cost.
pub struct DeviceTelemetryClient {
    bus: Arc<dyn KeyValueBus>,
    stats: Mutex<HashMap<DeviceId, Arc<StatsSubscriptions>>>,
    commands: Mutex<HashMap<DeviceId, Arc<CommandPublishers>>>,
    emergency_stop: Mutex<Option<Arc<dyn BoolPublisher>>>,
}

impl DeviceTelemetryClient {
    pub fn new(bus: Arc<dyn KeyValueBus>) -> Self {
        Self {
            bus,
            stats: Mutex::new(HashMap::new()),
            commands: Mutex::new(HashMap::new()),
            emergency_stop: Mutex::new(None),
        }
    }

    // ── lifecycle ────────────────────────────────────────────────────────

    /// Establish the client role against the bus.
    ///
    /// Any existing client role is torn down first, so calling this again
    /// (e.g. to switch from simulation to a robot) never accumulates
    /// duplicate connections.
    ///
    /// # Errors
    ///
    /// [`BenchError::InvalidOptions`] when `server` and `team` are both set;
    /// [`BenchError::Bus`] when the transport rejects the connection.
    pub fn connect(&self, options: &ConnectOptions) -> Result<(), BenchError> {
        let target = options.target()?;
        if let Err(e) = self.bus.disconnect() {
            debug!(error = %e, "pre-connect teardown reported an error, continuing");
        }
        self.bus.connect(&target, options.port(), &options.client_name)?;
        info!(?target, port = options.port(), client_name = %options.client_name, "bus client connected");
        Ok(())
    }

    /// Tear down the client role. Reads keep working against cached values.
    pub fn disconnect(&self) -> Result<(), BenchError> {
        self.bus.disconnect()?;
        info!("bus client disconnected");
        Ok(())
    }

    /// Whether the underlying bus currently holds a live client role.
    pub fn is_connected(&self) -> bool {
        self.bus.is_connected()
    }

    // ── reads ────────────────────────────────────────────────────────────

    /// Latest known value of each telemetry field for `id`.
    ///
    /// Creates the six subscriptions on first call for this id. Never blocks
    /// and never fails: each field reads the most recently delivered value,
    /// defaulting to `0.0` until the first value arrives or while the bus is
    /// down.
    pub fn read_snapshot(&self, id: DeviceId) -> MotorSnapshot {
        let subs = self.stats_for(id);
        MotorSnapshot {
            bus_voltage: subs.bus_voltage.get(),
            output_current: subs.output_current.get(),
            temperature: subs.temperature.get(),
            velocity: subs.velocity.get(),
            set_speed: subs.set_speed.get(),
            position: subs.position.get(),
        }
    }

    // ── commands ─────────────────────────────────────────────────────────

    /// Command `id` to a duty-cycle in `[-1.0, 1.0]` (the caller clamps).
    ///
    /// Clears the `stop` latch first, then writes the speed – two ordered
    /// writes, so a pending stop is cancelled on the wire before the new
    /// duty-cycle lands.
    pub fn set_speed(&self, id: DeviceId, percent_output: f64) -> Result<(), BenchError> {
        let pubs = self.commands_for(id);
        pubs.stop.set(false)?;
        pubs.desired_speed.set(percent_output)
    }

    /// Command `id` to an absolute position in rotations.
    ///
    /// Clears the `reset` latch first, mirroring [`set_speed`].
    ///
    /// [`set_speed`]: DeviceTelemetryClient::set_speed
    pub fn set_position(&self, id: DeviceId, rotations: f64) -> Result<(), BenchError> {
        let pubs = self.commands_for(id);
        pubs.reset.set(false)?;
        pubs.new_position.set(rotations)
    }

    /// Latch the `stop` command true. Stays true until the next
    /// [`set_speed`] or [`clear_stop`] for this id.
    ///
    /// [`set_speed`]: DeviceTelemetryClient::set_speed
    /// [`clear_stop`]: DeviceTelemetryClient::clear_stop
    pub fn stop(&self, id: DeviceId) -> Result<(), BenchError> {
        self.commands_for(id).stop.set(true)
    }

    /// Latch the `reset` command true, symmetrically to [`stop`].
    ///
    /// [`stop`]: DeviceTelemetryClient::stop
    pub fn reset(&self, id: DeviceId) -> Result<(), BenchError> {
        self.commands_for(id).reset.set(true)
    }

    /// Explicitly clear the `stop` latch without driving a new speed.
    pub fn clear_stop(&self, id: DeviceId) -> Result<(), BenchError> {
        self.commands_for(id).stop.set(false)
    }

    /// Explicitly clear the `reset` latch without commanding a position.
    pub fn clear_reset(&self, id: DeviceId) -> Result<(), BenchError> {
        self.commands_for(id).reset.set(false)
    }

    /// Engage or release the global emergency stop the device-side peer
    /// watches. While engaged, the peer halts every motor regardless of
    /// per-device commands.
    pub fn set_emergency_stop(&self, engaged: bool) -> Result<(), BenchError> {
        let publisher = {
            let mut slot = lock(&self.emergency_stop);
            slot.get_or_insert_with(|| self.bus.publish_bool(topics::EMERGENCY_STOP))
                .clone()
        };
        publisher.set(engaged)
    }

    // ── lazy handle caches ───────────────────────────────────────────────

    fn stats_for(&self, id: DeviceId) -> Arc<StatsSubscriptions> {
        let mut cache = lock(&self.stats);
        cache
            .entry(id)
            .or_insert_with(|| {
                debug!(%id, "creating telemetry subscriptions");
                Arc::new(StatsSubscriptions {
                    bus_voltage: self.bus.subscribe_float(&topics::stat(id, "busVoltage"), 0.0),
                    output_current: self
                        .bus
                        .subscribe_float(&topics::stat(id, "outputCurrent"), 0.0),
                    temperature: self.bus.subscribe_float(&topics::stat(id, "temperature"), 0.0),
                    velocity: self.bus.subscribe_float(&topics::stat(id, "velocity"), 0.0),
                    set_speed: self.bus.subscribe_float(&topics::stat(id, "setSpeed"), 0.0),
                    position: self.bus.subscribe_float(&topics::stat(id, "position"), 0.0),
                })
            })
            .clone()
    }

    fn commands_for(&self, id: DeviceId) -> Arc<CommandPublishers> {
        let mut cache = lock(&self.commands);
        cache
            .entry(id)
            .or_insert_with(|| {
                debug!(%id, "creating command publishers");
                let pubs = CommandPublishers {
                    desired_speed: self.bus.publish_float(&topics::command(id, "desiredSpeed")),
                    new_position: self.bus.publish_float(&topics::command(id, "newPosition")),
                    stop: self.bus.publish_bool(&topics::command(id, "stop")),
                    reset: self.bus.publish_bool(&topics::command(id, "reset")),
                };
                // The peer expects a defined command state before the user
                // acts. Best-effort: a down bus just leaves the defaults to
                // the peer's own subscription defaults.
                if let Err(e) = pubs
                    .desired_speed
                    .set(0.0)
                    .and_then(|()| pubs.new_position.set(0.0))
                    .and_then(|()| pubs.stop.set(false))
                    .and_then(|()| pubs.reset.set(false))
                {
                    debug!(%id, error = %e, "command defaults not published");
                }
                Arc::new(pubs)
            })
            .clone()
    }
}

// A poisoned cache mutex only means another thread panicked mid-insert; the
// handles already in the map are still valid, so recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
