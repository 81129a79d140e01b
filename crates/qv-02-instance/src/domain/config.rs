//! Instance configuration and round-timeout policy

use std::time::Duration;

use shared_types::Round;

/// Instance configuration
#[derive(Clone, Debug)]
pub struct InstanceConfig {
    /// Timeout of the first round
    pub round_timeout_base: Duration,
    /// Upper bound on any round's timeout
    pub round_timeout_max: Duration,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            round_timeout_base: Duration::from_secs(2),
            round_timeout_max: Duration::from_secs(60),
        }
    }
}

impl InstanceConfig {
    pub fn timeout_policy(&self) -> RoundTimeoutPolicy {
        RoundTimeoutPolicy {
            base: self.round_timeout_base,
            max: self.round_timeout_max,
        }
    }
}

/// Exponential backoff: `base * 2^(round - 1)`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundTimeoutPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl RoundTimeoutPolicy {
    pub fn timeout_for(&self, round: Round) -> Duration {
        let exponent = round.saturating_sub(1).min(31) as u32;
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let policy = InstanceConfig::default().timeout_policy();
        assert_eq!(policy.timeout_for(1), Duration::from_secs(2));
        assert_eq!(policy.timeout_for(2), Duration::from_secs(4));
        assert_eq!(policy.timeout_for(5), Duration::from_secs(32));
        assert_eq!(policy.timeout_for(6), Duration::from_secs(60));
        assert_eq!(policy.timeout_for(u64::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_round_zero_uses_base() {
        let policy = InstanceConfig::default().timeout_policy();
        assert_eq!(policy.timeout_for(0), Duration::from_secs(2));
    }
}
