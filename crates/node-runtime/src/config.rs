//! # Node Configuration
//!
//! Aggregates the per-subsystem configs. Every field has a default and can be
//! overridden through `QV_*` environment variables:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `QV_COMMITTEE_SIZE` | `committee_size` |
//! | `QV_LOG` | `log_filter` (`RUST_LOG` takes precedence) |
//! | `QV_DUTIES` | `duties` |
//! | `QV_DATA_DIR` | `data_dir` |
//! | `QV_DUTY_TIMEOUT_MS` | `duty_timeout` |
//! | `QV_ROUND_TIMEOUT_MS` | `controller.instance.round_timeout_base` |
//! | `QV_ROUND_TIMEOUT_MAX_MS` | `controller.instance.round_timeout_max` |
//! | `QV_SYNC_TIMEOUT_MS` | `controller.sync_request_timeout` |
//! | `QV_SYNC_MAX_BATCH` | `controller.sync_max_batch` |
//! | `QV_FORK_V1_HEIGHT` | `controller.fork_v1_activation_height` |
//! | `QV_READ_MODE` | `controller.read_mode` |
//! | `QV_DUTY_SLOT_TIMEOUT` | `runner.duty_execution_slot_timeout` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use qv_03_controller::ControllerConfig;
use qv_04_duty_runner::RunnerConfig;
use thiserror::Error;

/// Smallest committee tolerating one faulty operator.
pub const MIN_COMMITTEE_SIZE: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("committee of {0} operators cannot tolerate a fault (need at least {min})", min = MIN_COMMITTEE_SIZE)]
    CommitteeTooSmall(u64),

    #[error("round timeout base {base:?} exceeds max {max:?}")]
    RoundTimeoutOrder { base: Duration, max: Duration },
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Operators in the devnet committee
    pub committee_size: u64,
    /// `tracing` env-filter directive
    pub log_filter: String,
    /// Duties the devnet runs before exiting
    pub duties: u64,
    /// RocksDB root; memory when unset
    pub data_dir: Option<PathBuf>,
    /// How long the devnet waits for every operator to submit a duty
    pub duty_timeout: Duration,
    pub controller: ControllerConfig,
    pub runner: RunnerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            committee_size: 4,
            log_filter: "info".to_string(),
            duties: 3,
            data_dir: None,
            duty_timeout: Duration::from_secs(30),
            controller: ControllerConfig::default(),
            runner: RunnerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each `QV_*`
    /// variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(size) = parse(&lookup, "QV_COMMITTEE_SIZE")? {
            config.committee_size = size;
        }
        if let Some(filter) = lookup("QV_LOG") {
            config.log_filter = filter;
        }
        if let Some(duties) = parse(&lookup, "QV_DUTIES")? {
            config.duties = duties;
        }
        if let Some(dir) = lookup("QV_DATA_DIR") {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(ms) = parse(&lookup, "QV_DUTY_TIMEOUT_MS")? {
            config.duty_timeout = Duration::from_millis(ms);
        }

        let controller = &mut config.controller;
        if let Some(ms) = parse(&lookup, "QV_ROUND_TIMEOUT_MS")? {
            controller.instance.round_timeout_base = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "QV_ROUND_TIMEOUT_MAX_MS")? {
            controller.instance.round_timeout_max = Duration::from_millis(ms);
        }
        if let Some(ms) = parse(&lookup, "QV_SYNC_TIMEOUT_MS")? {
            controller.sync_request_timeout = Duration::from_millis(ms);
        }
        if let Some(batch) = parse(&lookup, "QV_SYNC_MAX_BATCH")? {
            controller.sync_max_batch = batch;
        }
        if let Some(height) = parse(&lookup, "QV_FORK_V1_HEIGHT")? {
            controller.fork_v1_activation_height = height;
        }
        if let Some(read_mode) = parse(&lookup, "QV_READ_MODE")? {
            controller.read_mode = read_mode;
        }
        if let Some(slots) = parse(&lookup, "QV_DUTY_SLOT_TIMEOUT")? {
            config.runner.duty_execution_slot_timeout = slots;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.committee_size < MIN_COMMITTEE_SIZE {
            return Err(ConfigError::CommitteeTooSmall(self.committee_size));
        }
        let instance = &self.controller.instance;
        if instance.round_timeout_base > instance.round_timeout_max {
            return Err(ConfigError::RoundTimeoutOrder {
                base: instance.round_timeout_base,
                max: instance.round_timeout_max,
            });
        }
        Ok(())
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
