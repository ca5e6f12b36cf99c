use crate::error::{GateError, Result};
use crate::plan::{FirstRun, Intent};
use crate::reconcile::{LockOptions, ReconcileOptions};
use crate::store::sqlite::SqliteOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// LockConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockConfig {
    #[serde(default = "default_lock_enabled")]
    pub enabled: bool,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_lock_enabled() -> bool {
    true
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_wait_secs() -> u64 {
    300
}

fn default_poll_ms() -> u64 {
    1000
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            enabled: default_lock_enabled(),
            ttl_secs: default_ttl_secs(),
            wait_secs: default_wait_secs(),
            poll_ms: default_poll_ms(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_migrations")]
    pub migrations: PathBuf,
    #[serde(default = "default_tracking_table")]
    pub tracking_table: String,
    #[serde(default)]
    pub force_fix: bool,
    #[serde(default)]
    pub first_run: FirstRun,
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
    #[serde(default)]
    pub lock: LockConfig,
}

fn default_migrations() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_tracking_table() -> String {
    "schema_version".to_string()
}

fn default_busy_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations: default_migrations(),
            tracking_table: default_tracking_table(),
            force_fix: false,
            first_run: FirstRun::default(),
            step_timeout_secs: None,
            busy_timeout_secs: default_busy_timeout_secs(),
            lock: LockConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            GateError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&data)
            .map_err(|e| GateError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Non-fatal problems are `Warning`; `Error` entries must stop the run.
    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.database_url.as_deref().is_some_and(|u| u.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "database_url is empty".to_string(),
            });
        }

        if self.step_timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "step_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.lock.enabled && self.lock.ttl_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "lock.ttl_secs must be greater than zero".to_string(),
            });
        }

        if self.lock.enabled && self.lock.poll_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lock.poll_ms=0 spins on the lease table".to_string(),
            });
        }

        // A step that outlives the lease lets another replica take over mid-run.
        if let (true, Some(step)) = (self.lock.enabled, self.step_timeout_secs) {
            if step > self.lock.ttl_secs {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "step_timeout_secs={} exceeds lock.ttl_secs={}",
                        step, self.lock.ttl_secs
                    ),
                });
            }
        }

        if !self.lock.enabled {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "lease lock disabled; concurrent replicas rely on step guards only"
                    .to_string(),
            });
        }

        warnings
    }

    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            tracking_table: self.tracking_table.clone(),
            busy_timeout: Duration::from_secs(self.busy_timeout_secs),
            step_timeout: self.step_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            intent: if self.force_fix {
                Intent::ForceFix
            } else {
                Intent::Normal
            },
            first_run: self.first_run,
            lock: self.lock.enabled.then(|| LockOptions {
                ttl: Duration::from_secs(self.lock.ttl_secs),
                wait: Duration::from_secs(self.lock.wait_secs),
                poll: Duration::from_millis(self.lock.poll_ms),
            }),
        }
    }
}
