use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::DEFAULT_INTERVAL_MS;

pub const TELEMETRY_PORT: u16 = 5_005;
pub const COMMAND_PORT: u16 = 5_006;

/// Search order when no config path is given on the command line.
pub const CONFIG_PATHS: &[&str] = &["/etc/fieldnms/targets.json", "targets.json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_command_port")]
    pub command_port: u16,
    #[serde(default = "default_telemetry_dest")]
    pub telemetry_dest: String,
    #[serde(default = "default_telemetry_interval_ms")]
    pub telemetry_interval_ms: u64,
    /// Port for the embedded web console; 0 disables it.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default)]
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub host: String,
    #[serde(default = "default_target_interval")]
    pub interval_ms: u64,
}

fn default_command_port() -> u16 {
    COMMAND_PORT
}

fn default_telemetry_dest() -> String {
    format!("255.255.255.255:{TELEMETRY_PORT}")
}

fn default_telemetry_interval_ms() -> u64 {
    1_000
}

fn default_http_port() -> u16 {
    8_080
}

fn default_target_interval() -> u64 {
    DEFAULT_INTERVAL_MS
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command_port: default_command_port(),
            telemetry_dest: default_telemetry_dest(),
            telemetry_interval_ms: default_telemetry_interval_ms(),
            http_port: default_http_port(),
            targets: bootstrap_targets(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration. An explicit path must exist and parse; with
    /// no path, the first file found in `CONFIG_PATHS` is used, and the
    /// built-in target set applies when none exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        for candidate in CONFIG_PATHS {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::from_file(path);
            }
        }
        info!("no config file found, using built-in targets");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: ProbeConfig = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(path = %path.display(), targets = config.targets.len(), "config loaded");
        Ok(config)
    }
}

/// Targets monitored when the probe starts with no config at all:
/// the local gateway, a public resolver and a public web host.
pub fn bootstrap_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec {
            name: "gw".into(),
            host: "192.168.1.1".into(),
            interval_ms: 4_000,
        },
        TargetSpec {
            name: "dns1".into(),
            host: "8.8.8.8".into(),
            interval_ms: 6_000,
        },
        TargetSpec {
            name: "web".into(),
            host: "www.google.com".into(),
            interval_ms: 7_000,
        },
    ]
}
