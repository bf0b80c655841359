//! In-process bus simulation for tests and offline demos.
//!
//! [`SimBus`] implements the full [`KeyValueBus`] contract against a plain
//! in-memory table, and additionally records every accepted publish in a
//! journal so tests can assert on write *ordering*, not just final values.
//! The device side of a bench is simulated by feeding telemetry in with
//! [`SimBus::feed_float`] / [`SimBus::feed_bool`].
//!
//! Connectivity is modelled faithfully: publishes against a disconnected bus
//! are rejected and dropped, while subscriptions keep serving the last value
//! they saw (or their default), exactly as a real get-latest cache behaves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use motorbench_types::BenchError;

use crate::bus::{
    BoolPublisher, BoolSubscription, ConnectTarget, FloatPublisher, FloatSubscription,
    KeyValueBus,
};

/// A value stored in the simulated table.
#[derive(Debug, Clone, PartialEq)]
pub enum SimValue {
    Float(f64),
    Bool(bool),
}

struct SimState {
    connected: AtomicBool,
    values: RwLock<HashMap<String, SimValue>>,
    journal: Mutex<Vec<(String, SimValue)>>,
    subscriptions: AtomicUsize,
    disconnects: AtomicUsize,
    last_connection: Mutex<Option<(ConnectTarget, u16, String)>>,
}

/// Shared in-memory bus. Clone it cheaply – all clones share one table.
#[derive(Clone)]
pub struct SimBus {
    state: Arc<SimState>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SimState {
                connected: AtomicBool::new(false),
                values: RwLock::new(HashMap::new()),
                journal: Mutex::new(Vec::new()),
                subscriptions: AtomicUsize::new(0),
                disconnects: AtomicUsize::new(0),
                last_connection: Mutex::new(None),
            }),
        }
    }

    /// This bus as a trait object, for handing to the client.
    pub fn handle(&self) -> Arc<dyn KeyValueBus> {
        Arc::new(self.clone())
    }

    // ── device-side test surface ─────────────────────────────────────────

    /// Deliver a telemetry value as the device-side peer would.
    /// Works regardless of the client connection state.
    pub fn feed_float(&self, topic: &str, value: f64) {
        self.insert(topic, SimValue::Float(value));
    }

    /// Boolean counterpart of [`SimBus::feed_float`].
    pub fn feed_bool(&self, topic: &str, value: bool) {
        self.insert(topic, SimValue::Bool(value));
    }

    /// Current table value for `topic`, if any write or feed has reached it.
    pub fn value(&self, topic: &str) -> Option<SimValue> {
        self.read_values().get(topic).cloned()
    }

    /// Every publish accepted since the last [`SimBus::clear_journal`], in
    /// order of arrival.
    pub fn journal(&self) -> Vec<(String, SimValue)> {
        lock(&self.state.journal).clone()
    }

    pub fn clear_journal(&self) {
        lock(&self.state.journal).clear();
    }

    /// Number of subscriptions created over the bus lifetime.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.load(Ordering::SeqCst)
    }

    /// Number of teardown calls over the bus lifetime.
    pub fn disconnect_count(&self) -> usize {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    /// Parameters of the most recent successful connect.
    pub fn last_connection(&self) -> Option<(ConnectTarget, u16, String)> {
        lock(&self.state.last_connection).clone()
    }

    // ── internals ────────────────────────────────────────────────────────

    fn insert(&self, topic: &str, value: SimValue) {
        self.state
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(topic.to_string(), value);
    }

    fn read_values(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SimValue>> {
        self.state
            .values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyValueBus for SimBus {
    fn connect(
        &self,
        target: &ConnectTarget,
        port: u16,
        client_name: &str,
    ) -> Result<(), BenchError> {
        *lock(&self.state.last_connection) =
            Some((target.clone(), port, client_name.to_string()));
        self.state.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn disconnect(&self) -> Result<(), BenchError> {
        // Tolerated when already down, as a real transport teardown is.
        self.state.connected.store(false, Ordering::SeqCst);
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::SeqCst)
    }

    fn subscribe_float(&self, topic: &str, default: f64) -> Arc<dyn FloatSubscription> {
        self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        Arc::new(SimFloatSubscription {
            bus: self.clone(),
            topic: topic.to_string(),
            default,
        })
    }

    fn subscribe_bool(&self, topic: &str, default: bool) -> Arc<dyn BoolSubscription> {
        self.state.subscriptions.fetch_add(1, Ordering::SeqCst);
        Arc::new(SimBoolSubscription {
            bus: self.clone(),
            topic: topic.to_string(),
            default,
        })
    }

    fn publish_float(&self, topic: &str) -> Arc<dyn FloatPublisher> {
        Arc::new(SimFloatPublisher {
            bus: self.clone(),
            topic: topic.to_string(),
        })
    }

    fn publish_bool(&self, topic: &str) -> Arc<dyn BoolPublisher> {
        Arc::new(SimBoolPublisher {
            bus: self.clone(),
            topic: topic.to_string(),
        })
    }
}

struct SimFloatSubscription {
    bus: SimBus,
    topic: String,
    default: f64,
}

impl FloatSubscription for SimFloatSubscription {
    fn get(&self) -> f64 {
        match self.bus.value(&self.topic) {
            Some(SimValue::Float(v)) => v,
            _ => self.default,
        }
    }
}

struct SimBoolSubscription {
    bus: SimBus,
    topic: String,
    default: bool,
}

impl BoolSubscription for SimBoolSubscription {
    fn get(&self) -> bool {
        match self.bus.value(&self.topic) {
            Some(SimValue::Bool(v)) => v,
            _ => self.default,
        }
    }
}

struct SimFloatPublisher {
    bus: SimBus,
    topic: String,
}

impl FloatPublisher for SimFloatPublisher {
    fn set(&self, value: f64) -> Result<(), BenchError> {
        self.bus.publish(&self.topic, SimValue::Float(value))
    }
}

struct SimBoolPublisher {
    bus: SimBus,
    topic: String,
}

impl BoolPublisher for SimBoolPublisher {
    fn set(&self, value: bool) -> Result<(), BenchError> {
        self.bus.publish(&self.topic, SimValue::Bool(value))
    }
}

impl SimBus {
    fn publish(&self, topic: &str, value: SimValue) -> Result<(), BenchError> {
        if !self.is_connected() {
            return Err(BenchError::Bus("sim bus has no client connection".into()));
        }
        self.insert(topic, value.clone());
        lock(&self.state.journal).push((topic.to_string(), value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connected() -> SimBus {
        let bus = SimBus::new();
        bus.connect(&ConnectTarget::Local, 5810, "test").unwrap();
        bus
    }

    #[test]
    fn subscription_serves_default_until_first_value() {
        let bus = connected();
        let sub = bus.subscribe_float("MotorStats/1/busVoltage", 0.0);
        assert_eq!(sub.get(), 0.0);
        bus.feed_float("MotorStats/1/busVoltage", 12.6);
        assert_eq!(sub.get(), 12.6);
    }

    #[test]
    fn publish_while_disconnected_is_rejected_and_dropped() {
        let bus = SimBus::new();
        let publisher = bus.publish_float("MotorController/1/desiredSpeed");
        assert!(publisher.set(0.5).is_err());
        assert_eq!(bus.value("MotorController/1/desiredSpeed"), None);
        assert!(bus.journal().is_empty());
    }

    #[test]
    fn journal_preserves_write_order() {
        let bus = connected();
        bus.publish_bool("a").set(true).unwrap();
        bus.publish_float("b").set(1.0).unwrap();
        bus.publish_bool("a").set(false).unwrap();

        let journal = bus.journal();
        let topics: Vec<&str> = journal.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(topics, vec!["a", "b", "a"]);
    }

    #[test]
    fn cached_values_survive_disconnect() {
        let bus = connected();
        let sub = bus.subscribe_float("MotorStats/2/velocity", 0.0);
        bus.feed_float("MotorStats/2/velocity", 900.0);
        bus.disconnect().unwrap();
        assert_eq!(sub.get(), 900.0);
    }

    #[test]
    fn wrong_typed_value_falls_back_to_default() {
        let bus = connected();
        let sub = bus.subscribe_bool("MotorStats/1/odd", false);
        bus.feed_float("MotorStats/1/odd", 3.0);
        assert!(!sub.get());
    }
}
