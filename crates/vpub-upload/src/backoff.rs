//! Randomized exponential backoff.
//!
//! The delay before retry `n` is drawn uniformly from `[0, base * 2^n)`,
//! so worst-case total wait stays bounded while concurrent sessions do not
//! retry in lockstep.

use std::time::Duration;

use rand::Rng;

/// Default unit for the backoff ceiling.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Exponent at which the ceiling stops growing.
pub const DEFAULT_MAX_EXPONENT: u32 = 10;

/// Stateless backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Ceiling unit; the ceiling for retry `n` is `base * 2^n`
    pub base: Duration,
    /// Largest exponent applied to `base`
    pub max_exponent: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: DEFAULT_BACKOFF_BASE,
            max_exponent: DEFAULT_MAX_EXPONENT,
        }
    }
}

impl BackoffPolicy {
    /// Policy whose delays are always zero.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max_exponent: 0,
        }
    }

    /// Exclusive upper bound of the delay for a given retry count.
    pub fn ceiling(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.min(self.max_exponent).min(31);
        self.base.saturating_mul(1u32 << exponent)
    }

    /// Draw the wait before retry `retry_count` (1 on the first retry).
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let ceiling_nanos = self.ceiling(retry_count).as_nanos().min(u64::MAX as u128) as u64;
        if ceiling_nanos == 0 {
            return Duration::ZERO;
        }

        let nanos = rand::rng().random_range(0..ceiling_nanos);
        Duration::from_nanos(nanos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_doubles() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.ceiling(1), Duration::from_secs(2));
        assert_eq!(policy.ceiling(2), Duration::from_secs(4));
        assert_eq!(policy.ceiling(10), Duration::from_secs(1024));
    }

    #[test]
    fn test_ceiling_stops_at_max_exponent() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.ceiling(11), policy.ceiling(10));
        assert_eq!(policy.ceiling(u32::MAX), policy.ceiling(10));
    }

    #[test]
    fn test_delay_within_bounds() {
        let policy = BackoffPolicy::default();
        for retry in 1..=10 {
            let ceiling = Duration::from_secs(1u64 << retry);
            for _ in 0..200 {
                let delay = policy.next_delay(retry);
                assert!(delay < ceiling, "retry {} gave {:?}", retry, delay);
            }
        }
    }

    #[test]
    fn test_delays_are_jittered() {
        let policy = BackoffPolicy::default();
        let first = policy.next_delay(10);
        let differs = (0..50).any(|_| policy.next_delay(10) != first);
        assert!(differs);
    }

    #[test]
    fn test_immediate_policy() {
        let policy = BackoffPolicy::immediate();
        assert_eq!(policy.next_delay(1), Duration::ZERO);
        assert_eq!(policy.next_delay(10), Duration::ZERO);
    }
}
