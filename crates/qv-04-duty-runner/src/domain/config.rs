//! Runner configuration

use super::duty::Slot;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Slots after a decision during which partial signatures are still
    /// collected before the next duty may replace the execution
    pub duty_execution_slot_timeout: Slot,
    /// Partial signatures kept while the local instance has not decided
    pub max_early_partials: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            duty_execution_slot_timeout: 32,
            max_early_partials: 16,
        }
    }
}
