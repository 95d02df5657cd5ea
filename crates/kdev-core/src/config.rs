use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `rollout.timeout_secs` when set to a valid integer.
pub const ROLLOUT_TIMEOUT_ENV: &str = "KDEV_ROLLOUT_TIMEOUT_SECS";

// ---------------------------------------------------------------------------
// RolloutConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolloutConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_timeout_secs() -> u64 {
    600
}

fn default_initial_interval_ms() -> u64 {
    1000
}

fn default_max_interval_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Namespace the profiles' workloads live in. `None` uses the kubeconfig
    /// default.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Kubeconfig context. `None` uses the current context.
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub rollout: RolloutConfig,
    /// How long a forced stop waits after SIGTERM before sending SIGKILL.
    #[serde(default = "default_terminate_grace_ms")]
    pub terminate_grace_ms: u64,
}

fn default_terminate_grace_ms() -> u64 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            context: None,
            rollout: RolloutConfig::default(),
            terminate_grace_ms: default_terminate_grace_ms(),
        }
    }
}

impl Config {
    /// Load `.kdev/config.yaml`, falling back to defaults when the file is
    /// absent. Environment overrides are applied last.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        let mut config = if path.exists() {
            let data = std::fs::read_to_string(&path)?;
            serde_yaml::from_str(&data)?
        } else {
            Config::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(secs) = std::env::var(ROLLOUT_TIMEOUT_ENV)
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.rollout.timeout_secs = secs;
        }
    }

    pub fn terminate_grace(&self) -> Duration {
        Duration::from_millis(self.terminate_grace_ms)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
