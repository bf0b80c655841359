//! [`TestBench`] – the context object that glues sessions to the allocator
//! and the shared telemetry client.
//!
//! All session bookkeeping lives here rather than in ambient state: the slot
//! table, the session table, and the bench-wide session cap are owned by one
//! struct behind one mutex, so `next_available`-then-`claim` can never
//! interleave across concurrent creation requests, and the allocator stays
//! unit-testable on its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use motorbench_client::DeviceTelemetryClient;
use motorbench_types::{BenchError, DeviceId, DeviceIdRange};
use tracing::info;

use crate::allocator::SlotAllocator;
use crate::session::{MotorSession, SessionRequest, SnapshotSink};

/// Default poll cadence of a session's telemetry loop.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(200);

/// Bench-wide cap on simultaneously displayed devices. Independent of the id
/// range: ids 5–64 can be free and creation still refused at 4 sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Tuning knobs for a [`TestBench`].
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub max_sessions: usize,
    pub poll_period: Duration,
    pub id_range: DeviceIdRange,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            poll_period: DEFAULT_POLL_PERIOD,
            id_range: DeviceIdRange::default(),
        }
    }
}

struct BenchState {
    allocator: SlotAllocator,
    sessions: HashMap<DeviceId, Arc<MotorSession>>,
}

/// Owner of every live session. Create one per bench window.
///
/// Session creation spawns a tokio poll task, so [`TestBench::create_session`]
/// must be called from within a tokio runtime.
pub struct TestBench {
    client: Arc<DeviceTelemetryClient>,
    config: BenchConfig,
    state: Mutex<BenchState>,
}

impl TestBench {
    pub fn new(client: Arc<DeviceTelemetryClient>, config: BenchConfig) -> Self {
        let allocator = SlotAllocator::new(config.id_range);
        Self {
            client,
            config,
            state: Mutex::new(BenchState {
                allocator,
                sessions: HashMap::new(),
            }),
        }
    }

    pub fn client(&self) -> &Arc<DeviceTelemetryClient> {
        &self.client
    }

    /// Create a session for `request`, assigning the first free id at or
    /// above the requested one, and arm its poll loop.
    ///
    /// # Errors
    ///
    /// [`BenchError::SessionLimit`] when the session cap is reached –
    /// checked before any id is consumed, so a rejected attempt leaves the
    /// slot table untouched. [`BenchError::NoFreeDeviceId`] when the scan
    /// window is exhausted.
    pub fn create_session(
        &self,
        request: SessionRequest,
        sink: Arc<dyn SnapshotSink>,
    ) -> Result<Arc<MotorSession>, BenchError> {
        let mut state = lock(&self.state);

        if state.sessions.len() >= self.config.max_sessions {
            return Err(BenchError::SessionLimit(self.config.max_sessions));
        }

        let range = state.allocator.range();
        let id = state
            .allocator
            .next_available(request.requested_device_id)
            .ok_or(BenchError::NoFreeDeviceId {
                min: range.min.get(),
                max: range.max.get(),
            })?;
        state.allocator.claim(id);

        let session = MotorSession::spawn(
            id,
            &request,
            self.client.clone(),
            self.config.poll_period,
            sink,
        );
        state.sessions.insert(id, session.clone());
        info!(device_id = %id, motor_type = %request.motor_type, "session created");
        Ok(session)
    }

    /// Close `session`: disarm its poll task, release its device id, and
    /// drop it from the session table. Always accepted; closing an already
    /// closed session is a no-op.
    pub fn close_session(&self, session: &Arc<MotorSession>) {
        // Timer disarmed before the id is handed back, so a new session on
        // the same id can never race a stale tick.
        session.close();
        let mut state = lock(&self.state);
        state.allocator.release(session.device_id());
        state.sessions.remove(&session.device_id());
        info!(device_id = %session.device_id(), "session removed");
    }

    /// Session currently bound to `id`, if any.
    pub fn session(&self, id: DeviceId) -> Option<Arc<MotorSession>> {
        lock(&self.state).sessions.get(&id).cloned()
    }

    /// All live sessions, ordered by device id.
    pub fn sessions(&self) -> Vec<Arc<MotorSession>> {
        let state = lock(&self.state);
        let mut sessions: Vec<_> = state.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.device_id());
        sessions
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    pub fn capacity_remaining(&self) -> usize {
        self.config.max_sessions - self.active_sessions()
    }

    /// Whether the creation control should be offered at all: capacity left
    /// and at least one id free from the range minimum.
    pub fn can_create(&self) -> bool {
        let state = lock(&self.state);
        state.sessions.len() < self.config.max_sessions
            && state.allocator.next_available(state.allocator.range().min).is_some()
    }

    /// Id the creation control should pre-fill for `hint`, mirroring the
    /// assignment scan without claiming anything.
    pub fn next_device_id(&self, hint: DeviceId) -> Option<DeviceId> {
        lock(&self.state).allocator.next_available(hint)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
