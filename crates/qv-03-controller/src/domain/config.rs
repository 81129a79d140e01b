//! Controller configuration

use std::time::Duration;

use qv_02_instance::InstanceConfig;
use shared_types::Height;

use super::fork::ForkSchedule;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub instance: InstanceConfig,
    /// Burst of sync requests allowed
    pub sync_rate_capacity: u64,
    pub sync_rate_refill_per_sec: u64,
    pub sync_request_timeout: Duration,
    /// Heights per decided-range request
    pub sync_max_batch: u64,
    /// Attempts per batch before the sync gives up
    pub sync_max_attempts: u32,
    /// Extra attempts for a failed decided write
    pub storage_retries: u32,
    pub fork_v1_activation_height: Height,
    /// Never broadcast decided messages
    pub read_mode: bool,
    pub decided_channel_capacity: usize,
    /// Verified consensus messages held for the next height until its
    /// instance starts
    pub max_pending_messages: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            instance: InstanceConfig::default(),
            sync_rate_capacity: 5,
            sync_rate_refill_per_sec: 1,
            sync_request_timeout: Duration::from_secs(10),
            sync_max_batch: 25,
            sync_max_attempts: 3,
            storage_retries: 2,
            fork_v1_activation_height: 0,
            read_mode: false,
            decided_channel_capacity: 64,
            max_pending_messages: 64,
        }
    }
}

impl ControllerConfig {
    pub fn fork_schedule(&self) -> ForkSchedule {
        ForkSchedule {
            v1_activation_height: self.fork_v1_activation_height,
        }
    }
}
