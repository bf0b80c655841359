//! One bench session: a device id, a poll task, and the latch bookkeeping
//! that turns UI intent into ordered bus writes.
//!
//! # State machine
//!
//! ```text
//! Created ──(spawn, unconditional)──▶ Polling ──(close)──▶ Closed
//! ```
//!
//! `Closed` is terminal; a session is never reused. Closing disarms the poll
//! task before anything else, so no tick fires after teardown begins. An
//! in-flight bus read is left to complete and its result discarded.
//!
//! # Latch bookkeeping
//!
//! The session – not the client – remembers that a `stop` or `reset` latch is
//! pending. Sending a new speed first issues the explicit clear write and
//! flips the local flag, *then* drives the speed, so the cleared-then-set
//! ordering is observable on the wire as two writes. The latch flags only
//! flip to `true` when the underlying write reported success; a dropped write
//! leaves local state consistent with the wire.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use motorbench_client::DeviceTelemetryClient;
use motorbench_types::{DeviceId, MotorSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Receiver of per-tick telemetry snapshots, implemented by the display
/// layer. Called once per poll tick from the session's poll task.
pub trait SnapshotSink: Send + Sync {
    fn on_snapshot(&self, device_id: DeviceId, snapshot: MotorSnapshot);
}

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Created,
    Polling,
    Closed,
}

/// Immutable identity a session was created with.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    /// Motor family label shown in the UI, e.g. `"Kraken"` or `"SparkMax"`.
    pub motor_type: String,
    /// Where the id scan starts; the assigned id may be higher.
    pub requested_device_id: DeviceId,
    /// Whether an absolute encoder is wired to the controller.
    pub encoder_attached: bool,
}

/// One live bench session, bound to exactly one device id for its lifetime.
pub struct MotorSession {
    device_id: DeviceId,
    motor_type: String,
    encoder_attached: bool,
    client: Arc<DeviceTelemetryClient>,
    stop_latched: AtomicBool,
    reset_latched: AtomicBool,
    state: Mutex<SessionState>,
    cancel: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl MotorSession {
    /// Create the session and immediately arm its poll task.
    pub(crate) fn spawn(
        device_id: DeviceId,
        request: &SessionRequest,
        client: Arc<DeviceTelemetryClient>,
        poll_period: Duration,
        sink: Arc<dyn SnapshotSink>,
    ) -> Arc<Self> {
        let (cancel, cancel_rx) = watch::channel(false);
        let session = Arc::new(Self {
            device_id,
            motor_type: request.motor_type.clone(),
            encoder_attached: request.encoder_attached,
            client: client.clone(),
            stop_latched: AtomicBool::new(false),
            reset_latched: AtomicBool::new(false),
            state: Mutex::new(SessionState::Created),
            cancel,
            poll_task: Mutex::new(None),
        });

        let task = spawn_poll_task(device_id, client, poll_period, sink, cancel_rx);
        *lock(&session.poll_task) = Some(task);
        *lock(&session.state) = SessionState::Polling;
        debug!(%device_id, motor_type = %session.motor_type, "session polling");
        session
    }

    // ── identity ─────────────────────────────────────────────────────────

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    pub fn motor_type(&self) -> &str {
        &self.motor_type
    }

    pub fn encoder_attached(&self) -> bool {
        self.encoder_attached
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn stop_latched(&self) -> bool {
        self.stop_latched.load(Ordering::SeqCst)
    }

    pub fn reset_latched(&self) -> bool {
        self.reset_latched.load(Ordering::SeqCst)
    }

    // ── command handlers ─────────────────────────────────────────────────

    /// Handle the "send desired speed" action.
    ///
    /// Parses `raw` as a percentage, rejecting empty or malformed input with
    /// no state change. The value is clamped to `[-100, 100]` and converted
    /// to the client's `[-1.0, 1.0]` domain. A pending stop latch is cleared
    /// with its own boolean write before the speed is issued.
    pub fn send_speed_input(&self, raw: &str) {
        let Some(percent) = parse_number(raw) else {
            debug!(device_id = %self.device_id, input = raw, "speed input rejected");
            return;
        };
        let percent = percent.clamp(-100.0, 100.0);

        if self.stop_latched.load(Ordering::SeqCst) {
            match self.client.clear_stop(self.device_id) {
                Ok(()) => {}
                Err(e) => warn!(device_id = %self.device_id, error = %e, "stop clear dropped"),
            }
            self.stop_latched.store(false, Ordering::SeqCst);
        }

        if let Err(e) = self.client.set_speed(self.device_id, percent / 100.0) {
            warn!(device_id = %self.device_id, error = %e, "speed command dropped");
        }
    }

    /// Handle the "send reset position" action, mirroring
    /// [`send_speed_input`] for the reset latch and the position slot.
    /// Position is in rotations and is not clamped.
    ///
    /// [`send_speed_input`]: MotorSession::send_speed_input
    pub fn send_position_input(&self, raw: &str) {
        let Some(rotations) = parse_number(raw) else {
            debug!(device_id = %self.device_id, input = raw, "position input rejected");
            return;
        };

        if self.reset_latched.load(Ordering::SeqCst) {
            match self.client.clear_reset(self.device_id) {
                Ok(()) => {}
                Err(e) => warn!(device_id = %self.device_id, error = %e, "reset clear dropped"),
            }
            self.reset_latched.store(false, Ordering::SeqCst);
        }

        if let Err(e) = self.client.set_position(self.device_id, rotations) {
            warn!(device_id = %self.device_id, error = %e, "position command dropped");
        }
    }

    /// Handle the Stop button: latch `stop` true on the wire and locally.
    /// The local flag only flips when the write was accepted.
    pub fn press_stop(&self) {
        match self.client.stop(self.device_id) {
            Ok(()) => self.stop_latched.store(true, Ordering::SeqCst),
            Err(e) => warn!(device_id = %self.device_id, error = %e, "stop command dropped"),
        }
    }

    /// Handle the Reset button, symmetrically to [`press_stop`].
    ///
    /// [`press_stop`]: MotorSession::press_stop
    pub fn press_reset(&self) {
        match self.client.reset(self.device_id) {
            Ok(()) => self.reset_latched.store(true, Ordering::SeqCst),
            Err(e) => warn!(device_id = %self.device_id, error = %e, "reset command dropped"),
        }
    }

    // ── teardown ─────────────────────────────────────────────────────────

    /// Disarm the poll task and mark the session closed. Idempotent. The
    /// device id is released by the owning bench, which calls this first.
    pub(crate) fn close(&self) {
        {
            let mut state = lock(&self.state);
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        // Cancel before anything else: after this send no further tick body
        // runs. An in-flight read completes and its snapshot is discarded by
        // the select.
        let _ = self.cancel.send(true);
        self.stop_latched.store(false, Ordering::SeqCst);
        self.reset_latched.store(false, Ordering::SeqCst);
        lock(&self.poll_task).take();
        debug!(device_id = %self.device_id, "session closed");
    }
}

/// Poll loop: one tick every `poll_period`, each tick a non-blocking cached
/// read handed to the sink. `Delay` tick behaviour guarantees a session's own
/// ticks never bunch up after a stall.
fn spawn_poll_task(
    device_id: DeviceId,
    client: Arc<DeviceTelemetryClient>,
    poll_period: Duration,
    sink: Arc<dyn SnapshotSink>,
    mut cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                // Cancellation wins over a due tick, so no tick body runs
                // once teardown has begun.
                biased;
                changed = cancel.changed() => {
                    // Either an explicit cancel or the session was dropped.
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = client.read_snapshot(device_id);
                    sink.on_snapshot(device_id, snapshot);
                }
            }
        }
        debug!(%device_id, "poll task stopped");
    })
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_accepts_signed_decimals() {
        assert_eq!(parse_number("50"), Some(50.0));
        assert_eq!(parse_number(" -12.5 "), Some(-12.5));
        assert_eq!(parse_number("0"), Some(0.0));
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("   "), None);
        assert_eq!(parse_number("fast"), None);
        assert_eq!(parse_number("1.2.3"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }
}
