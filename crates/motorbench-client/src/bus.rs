//! Contract for the external key/value telemetry-and-command bus.
//!
//! The bench core never talks to a socket directly. It depends on this small
//! set of traits, modelled on the subscribe/publish surface of an NT4-style
//! networked table store: hierarchical string topics, typed get-latest
//! subscriptions, and typed set-value publishers. A real network transport
//! implements these traits out of tree; [`SimBus`][crate::sim::SimBus] is the
//! in-process implementation used by tests and offline demos.
//!
//! Two guarantees every implementation must uphold:
//!
//! * [`FloatSubscription::get`] / [`BoolSubscription::get`] return the most
//!   recently delivered value (or the subscription default) **without
//!   blocking** – a disconnected bus yields stale data, never a hang.
//! * Publisher `set` calls are best-effort: a disconnected bus returns
//!   [`BenchError::Bus`] and drops the write instead of failing fatally.

use std::sync::Arc;

use motorbench_types::BenchError;
use serde::Deserialize;

/// Standard client port of the bus protocol.
pub const DEFAULT_PORT: u16 = 5810;

fn default_client_name() -> String {
    "motorbench".to_string()
}

/// Connection parameters recognised by [`KeyValueBus::connect`].
///
/// `server` and `team` are mutually exclusive; when neither is given the
/// client connects to the local host, which is the right default for a
/// simulator running on the same machine.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectOptions {
    /// Explicit server hostname or IP.
    #[serde(default)]
    pub server: Option<String>,
    /// Team number for discovery-based addressing.
    #[serde(default)]
    pub team: Option<u16>,
    /// Client port; [`DEFAULT_PORT`] when absent.
    #[serde(default)]
    pub port: Option<u16>,
    /// Display label this client registers under.
    #[serde(default = "default_client_name")]
    pub client_name: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            server: None,
            team: None,
            port: None,
            client_name: default_client_name(),
        }
    }
}

impl ConnectOptions {
    /// Resolve the addressing mode.
    ///
    /// # Errors
    ///
    /// Returns [`BenchError::InvalidOptions`] when both `server` and `team`
    /// are supplied.
    pub fn target(&self) -> Result<ConnectTarget, BenchError> {
        match (&self.team, &self.server) {
            (Some(_), Some(_)) => Err(BenchError::InvalidOptions(
                "`server` and `team` are mutually exclusive".into(),
            )),
            (Some(team), None) => Ok(ConnectTarget::Team(*team)),
            (None, Some(server)) => Ok(ConnectTarget::Server(server.clone())),
            (None, None) => Ok(ConnectTarget::Local),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }
}

/// Resolved addressing mode for one `connect` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Discovery-based addressing by team number.
    Team(u16),
    /// Explicit hostname or IP.
    Server(String),
    /// Local host, for a simulator on the same machine.
    Local,
}

/// Read handle for one float topic. `get` never blocks.
pub trait FloatSubscription: Send + Sync {
    fn get(&self) -> f64;
}

/// Read handle for one boolean topic. `get` never blocks.
pub trait BoolSubscription: Send + Sync {
    fn get(&self) -> bool;
}

/// Write handle for one float topic.
pub trait FloatPublisher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BenchError::Bus`] when the bus is unreachable; the write is
    /// dropped.
    fn set(&self, value: f64) -> Result<(), BenchError>;
}

/// Write handle for one boolean topic.
pub trait BoolPublisher: Send + Sync {
    /// # Errors
    ///
    /// Returns [`BenchError::Bus`] when the bus is unreachable; the write is
    /// dropped.
    fn set(&self, value: bool) -> Result<(), BenchError>;
}

/// The external key/value store this client runs against.
///
/// Subscription and publisher creation always succeeds – handles for a topic
/// can be created before the connection is up, and they keep working (with
/// stale or dropped values) after it goes down. Only `set` calls observe
/// connectivity.
pub trait KeyValueBus: Send + Sync {
    /// Establish the client role. Implementations must tear down any
    /// existing client role first so repeated calls never accumulate
    /// duplicate connections.
    fn connect(
        &self,
        target: &ConnectTarget,
        port: u16,
        client_name: &str,
    ) -> Result<(), BenchError>;

    /// Tear down the client role. Cached subscription values survive.
    fn disconnect(&self) -> Result<(), BenchError>;

    fn is_connected(&self) -> bool;

    fn subscribe_float(&self, topic: &str, default: f64) -> Arc<dyn FloatSubscription>;
    fn subscribe_bool(&self, topic: &str, default: bool) -> Arc<dyn BoolSubscription>;
    fn publish_float(&self, topic: &str) -> Arc<dyn FloatPublisher>;
    fn publish_bool(&self, topic: &str) -> Arc<dyn BoolPublisher>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_takes_precedence_when_server_absent() {
        let opts = ConnectOptions {
            team: Some(9176),
            ..Default::default()
        };
        assert_eq!(opts.target().unwrap(), ConnectTarget::Team(9176));
    }

    #[test]
    fn explicit_server_is_used_when_team_absent() {
        let opts = ConnectOptions {
            server: Some("10.91.76.2".into()),
            ..Default::default()
        };
        assert_eq!(
            opts.target().unwrap(),
            ConnectTarget::Server("10.91.76.2".into())
        );
    }

    #[test]
    fn no_addressing_options_falls_back_to_local() {
        let opts = ConnectOptions::default();
        assert_eq!(opts.target().unwrap(), ConnectTarget::Local);
        assert_eq!(opts.port(), DEFAULT_PORT);
    }

    #[test]
    fn server_and_team_together_are_rejected() {
        let opts = ConnectOptions {
            server: Some("127.0.0.1".into()),
            team: Some(9176),
            ..Default::default()
        };
        assert!(matches!(opts.target(), Err(BenchError::InvalidOptions(_))));
    }

    #[test]
    fn explicit_port_overrides_default() {
        let opts = ConnectOptions {
            port: Some(5811),
            ..Default::default()
        };
        assert_eq!(opts.port(), 5811);
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: ConnectOptions = toml_like_json(r#"{"team": 9176}"#);
        assert_eq!(opts.team, Some(9176));
        assert_eq!(opts.client_name, "motorbench");
        assert!(opts.server.is_none());
    }

    fn toml_like_json(raw: &str) -> ConnectOptions {
        serde_json::from_str(raw).unwrap()
    }
}
