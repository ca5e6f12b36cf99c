use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::Args;
use schemagate_core::cancel::CancelToken;
use schemagate_core::config::{Config, WarnLevel};
use schemagate_core::migrations;
use schemagate_core::plan::FirstRun;
use schemagate_core::store::sqlite::SqliteStore;
use schemagate_core::GateError;
use std::path::PathBuf;

/// Store and reconciliation options shared by every subcommand.
///
/// Precedence: flag, then environment, then `--config` file, then defaults.
#[derive(Args, Debug, Default)]
pub struct StoreArgs {
    /// YAML file supplying any of the options below
    #[arg(long, global = true, env = "SCHEMAGATE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Store connection string (sqlite://<path>, sqlite:<path> or a bare path)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Directory of migration files
    #[arg(long, global = true, env = "SCHEMAGATE_MIGRATIONS")]
    pub migrations: Option<PathBuf>,

    /// Table holding the current revision
    #[arg(long, global = true, env = "SCHEMAGATE_TRACKING_TABLE")]
    pub tracking_table: Option<String>,

    /// Replay the tip migration (step back once, then upgrade to head)
    #[arg(long, global = true, env = "SCHEMAGATE_FORCE_FIX", value_parser = FalseyValueParser::new())]
    pub force_fix: bool,

    /// Policy when no tracking table exists: stamp, discover or apply
    #[arg(long, global = true, env = "SCHEMAGATE_FIRST_RUN")]
    pub first_run: Option<FirstRun>,

    /// Abort a single migration step after this many seconds
    #[arg(long, global = true, env = "SCHEMAGATE_STEP_TIMEOUT_SECS")]
    pub step_timeout_secs: Option<u64>,

    /// How long to wait for another replica's reconciliation lease
    #[arg(long, global = true, env = "SCHEMAGATE_LOCK_WAIT_SECS")]
    pub lock_wait_secs: Option<u64>,

    /// Lifetime of the reconciliation lease between renewals
    #[arg(long, global = true, env = "SCHEMAGATE_LEASE_TTL_SECS")]
    pub lease_ttl_secs: Option<u64>,

    /// Skip the reconciliation lease
    #[arg(long, global = true, env = "SCHEMAGATE_NO_LOCK", value_parser = FalseyValueParser::new())]
    pub no_lock: bool,
}

impl StoreArgs {
    /// Merge flags and environment over the config file and validate the
    /// result. Error-level warnings fail with `InvalidConfig`.
    pub fn resolve(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if let Some(dir) = &self.migrations {
            config.migrations = dir.clone();
        }
        if let Some(table) = &self.tracking_table {
            config.tracking_table = table.clone();
        }
        if self.force_fix {
            config.force_fix = true;
        }
        if let Some(policy) = self.first_run {
            config.first_run = policy;
        }
        if self.step_timeout_secs.is_some() {
            config.step_timeout_secs = self.step_timeout_secs;
        }
        if let Some(secs) = self.lock_wait_secs {
            config.lock.wait_secs = secs;
        }
        if let Some(secs) = self.lease_ttl_secs {
            config.lock.ttl_secs = secs;
        }
        if self.no_lock {
            config.lock.enabled = false;
        }

        let mut errors = Vec::new();
        for warning in config.validate() {
            match warning.level {
                WarnLevel::Error => errors.push(warning.message),
                WarnLevel::Warning => tracing::warn!("{}", warning.message),
            }
        }
        if !errors.is_empty() {
            return Err(GateError::InvalidConfig(errors.join("; ")).into());
        }
        Ok(config)
    }
}

pub fn database_url(config: &Config) -> anyhow::Result<&str> {
    config
        .database_url
        .as_deref()
        .ok_or_else(|| GateError::InvalidConfig("DATABASE_URL is not set".into()).into())
}

/// Load the revision graph and connect to the store.
pub fn open_store(config: &Config, cancel: CancelToken) -> anyhow::Result<SqliteStore> {
    let url = database_url(config)?;
    let graph = migrations::load_dir(&config.migrations).with_context(|| {
        format!("failed to load migrations from {}", config.migrations.display())
    })?;
    let store = SqliteStore::open(url, graph, &config.sqlite_options(), cancel)
        .context("failed to connect to the migration store")?;
    Ok(store)
}
