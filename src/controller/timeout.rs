//! Requeue policies
//!
//! `Fixed` requeues every resource on the same period. `FastRetry` answers
//! the first few passes of a resource quickly and then settles on the steady
//! period; it is keyed by the attempt counter and only enabled on request.

use std::time::Duration;

use super::attempts::AttemptTracker;
use super::ResourceId;

/// Default period between forced reconciliations
pub const RECONCILE_PERIOD: Duration = Duration::from_secs(60);

/// Period for the first fast retry
pub const VERY_SHORT_WAIT: Duration = Duration::from_secs(1);

/// Period for the following fast retries
pub const SHORT_WAIT: Duration = Duration::from_secs(5);

/// Number of passes answered by the fast ladder before settling
const FAST_RETRY_STEPS: u32 = 3;

/// How long to wait before the next forced reconciliation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Same period regardless of attempt history
    Fixed(Duration),
    /// 1s, 5s, 5s, then `steady`
    FastRetry {
        /// Period once the ladder is exhausted
        steady: Duration,
    },
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::Fixed(RECONCILE_PERIOD)
    }
}

impl TimeoutPolicy {
    /// Build the opt-in ladder with the default steady period
    pub fn fast_retry() -> Self {
        Self::FastRetry {
            steady: RECONCILE_PERIOD,
        }
    }

    /// Next requeue delay for `id`; the ladder advances the counter
    pub fn next(&self, attempts: &AttemptTracker, id: &ResourceId) -> Duration {
        match self {
            Self::Fixed(period) => *period,
            Self::FastRetry { steady } => {
                let attempt = attempts.get(id);
                if attempt >= FAST_RETRY_STEPS {
                    return *steady;
                }
                attempts.increment(id);
                match attempt {
                    0 => VERY_SHORT_WAIT,
                    _ => SHORT_WAIT,
                }
            }
        }
    }
}

impl std::str::FromStr for TimeoutPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fixed" => Ok(Self::default()),
            "fast-retry" => Ok(Self::fast_retry()),
            _ => Err(crate::Error::validation(
                "timeout-policy",
                format!("unknown timeout policy: {s}, expected one of: fixed, fast-retry"),
            )),
        }
    }
}
