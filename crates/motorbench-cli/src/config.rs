//! Configuration vault – reads/writes `~/.motorbench/config.toml`.

use motorbench_client::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.motorbench/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Explicit bus server hostname or IP. Mutually exclusive with `team`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// Team number for discovery-based addressing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<u16>,

    /// Bus client port; the protocol default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Display label this client registers under.
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Run the in-process device simulation rig alongside the REPL.
    #[serde(default = "default_sim")]
    pub sim: bool,

    /// Telemetry poll cadence per session, milliseconds.
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
}

fn default_client_name() -> String {
    "motorbench".to_string()
}
fn default_sim() -> bool {
    true
}
fn default_poll_period_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: None,
            team: None,
            port: None,
            client_name: default_client_name(),
            sim: default_sim(),
            poll_period_ms: default_poll_period_ms(),
        }
    }
}

impl Config {
    /// Connection parameters for the telemetry client.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            server: self.server.clone(),
            team: self.team,
            port: self.port,
            client_name: self.client_name.clone(),
        }
    }
}

/// Return the path to `~/.motorbench/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".motorbench").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Persist the config, creating `~/.motorbench/` when needed.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| format!("Failed to create {}: {}", dir.display(), e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to encode config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write {}: {}", path.display(), e))
}

/// Apply `MOTORBENCH_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `MOTORBENCH_SERVER` | `server` |
/// | `MOTORBENCH_TEAM` | `team` |
/// | `MOTORBENCH_PORT` | `port` |
/// | `MOTORBENCH_SIM` | `sim` (`0`/`false` disable the rig) |
fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(server) = std::env::var("MOTORBENCH_SERVER") {
        if !server.is_empty() {
            cfg.server = Some(server);
        }
    }
    if let Ok(team) = std::env::var("MOTORBENCH_TEAM") {
        if let Ok(team) = team.parse() {
            cfg.team = Some(team);
        }
    }
    if let Ok(port) = std::env::var("MOTORBENCH_PORT") {
        if let Ok(port) = port.parse() {
            cfg.port = Some(port);
        }
    }
    if let Ok(sim) = std::env::var("MOTORBENCH_SIM") {
        cfg.sim = !matches!(sim.as_str(), "0" | "false" | "no");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert_eq!(load_from(&path).unwrap().map(|c| c.sim), None);
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let cfg = Config {
            server: Some("10.91.76.2".into()),
            poll_period_ms: 100,
            sim: false,
            ..Default::default()
        };
        save_to(&cfg, &path).unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.server.as_deref(), Some("10.91.76.2"));
        assert_eq!(loaded.poll_period_ms, 100);
        assert!(!loaded.sim);
        assert_eq!(loaded.client_name, "motorbench");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "team = 9176\n").unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.team, Some(9176));
        assert_eq!(loaded.poll_period_ms, 200);
        assert!(loaded.sim);
    }

    #[test]
    fn config_path_is_under_home() {
        let path = config_path_for_home("/home/bench");
        assert_eq!(
            path,
            PathBuf::from("/home/bench/.motorbench/config.toml")
        );
    }

    #[test]
    fn connect_options_carry_addressing_fields() {
        let cfg = Config {
            team: Some(9176),
            port: Some(5811),
            ..Default::default()
        };
        let opts = cfg.connect_options();
        assert_eq!(opts.team, Some(9176));
        assert_eq!(opts.port, Some(5811));
        assert_eq!(opts.client_name, "motorbench");
    }
}
