//! Reconnection backoff.
//!
//! Two failure kinds climb separate ladders:
//!
//! - **Server busy** (420, 5xx, anything that is neither 200 nor a client
//!   error): doubles from 10 seconds and gives up once the next delay would
//!   pass 240 seconds, so the sleeps are 10, 20, 40, 80 and 160 seconds.
//! - **Network error** (refused, reset, timeout, TLS failure): grows by one
//!   second at a time and gives up once the next delay would pass 16 seconds.
//!
//! The first attempt of a connect cycle never sleeps. A fresh [`Backoff`] is
//! used for every cycle, so a stream that ran fine for a while starts again
//! from zero after it drops.
//!
//! # Example
//!
//! ```
//! use httpstream_client::{Backoff, BackoffDecision, BackoffPolicy, FailureKind};
//! use std::time::Duration;
//!
//! let mut backoff = Backoff::new(BackoffPolicy::default());
//! assert_eq!(backoff.delay(), Duration::ZERO);
//!
//! let decision = backoff.next(FailureKind::ServerBusy);
//! assert_eq!(decision, BackoffDecision::Retry(Duration::from_secs(10)));
//! ```

use std::time::Duration;

/// Default ladder values.
pub mod defaults {
    use std::time::Duration;

    /// First delay after a busy response.
    pub const SERVER_BUSY_INITIAL: Duration = Duration::from_secs(10);

    /// Busy delays beyond this give up.
    pub const SERVER_BUSY_MAX: Duration = Duration::from_secs(240);

    /// Increment applied after each network failure.
    pub const NETWORK_STEP: Duration = Duration::from_secs(1);

    /// Network delays beyond this give up.
    pub const NETWORK_MAX: Duration = Duration::from_secs(16);
}

/// Backoff ladder configuration.
///
/// ```
/// use httpstream_client::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::new()
///     .server_busy_initial(Duration::from_secs(1))
///     .server_busy_max(Duration::from_secs(8))
///     .network_max(Duration::from_secs(4));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// First delay after a busy response; later ones double.
    pub server_busy_initial: Duration,

    /// Give up once the next busy delay would exceed this.
    pub server_busy_max: Duration,

    /// Added to the delay after each network failure.
    pub network_step: Duration,

    /// Give up once the next network delay would exceed this.
    pub network_max: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            server_busy_initial: defaults::SERVER_BUSY_INITIAL,
            server_busy_max: defaults::SERVER_BUSY_MAX,
            network_step: defaults::NETWORK_STEP,
            network_max: defaults::NETWORK_MAX,
        }
    }
}

impl BackoffPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server_busy_initial(mut self, delay: Duration) -> Self {
        self.server_busy_initial = delay;
        self
    }

    pub fn server_busy_max(mut self, delay: Duration) -> Self {
        self.server_busy_max = delay;
        self
    }

    pub fn network_step(mut self, step: Duration) -> Self {
        self.network_step = step;
        self
    }

    pub fn network_max(mut self, delay: Duration) -> Self {
        self.network_max = delay;
        self
    }

    /// Validate the policy configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.server_busy_initial.is_zero() {
            return Err("server_busy_initial must be greater than zero");
        }
        if self.network_step.is_zero() {
            return Err("network_step must be greater than zero");
        }
        if self.server_busy_initial > self.server_busy_max {
            return Err("server_busy_initial must not exceed server_busy_max");
        }
        if self.network_step > self.network_max {
            return Err("network_step must not exceed network_max");
        }
        Ok(())
    }
}

/// Why the last connection attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FailureKind {
    #[default]
    None,
    ServerBusy,
    NetworkError,
}

/// What to do after a failed attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackoffDecision {
    /// Sleep this long, then try again.
    Retry(Duration),
    /// The ladder for this failure kind is exhausted.
    GiveUp,
}

/// Backoff state for one connect cycle.
#[derive(Clone, Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    server_busy: Duration,
    network: Duration,
    delay: Duration,
    kind: FailureKind,
    attempts: u32,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            server_busy: Duration::ZERO,
            network: Duration::ZERO,
            delay: Duration::ZERO,
            kind: FailureKind::None,
            attempts: 0,
        }
    }

    /// Delay to sleep before the next attempt.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Kind of the most recent failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Number of failures recorded since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Return to the initial state with no pending delay.
    pub fn reset(&mut self) {
        self.server_busy = Duration::ZERO;
        self.network = Duration::ZERO;
        self.delay = Duration::ZERO;
        self.kind = FailureKind::None;
        self.attempts = 0;
    }

    /// Record a failure and climb the matching ladder.
    pub fn next(&mut self, kind: FailureKind) -> BackoffDecision {
        let next = match kind {
            FailureKind::None => {
                self.reset();
                return BackoffDecision::Retry(Duration::ZERO);
            }
            FailureKind::ServerBusy => {
                let next = if self.server_busy.is_zero() {
                    self.policy.server_busy_initial
                } else {
                    self.server_busy.saturating_mul(2)
                };
                if next > self.policy.server_busy_max {
                    return BackoffDecision::GiveUp;
                }
                self.server_busy = next;
                next
            }
            FailureKind::NetworkError => {
                let next = self.network.saturating_add(self.policy.network_step);
                if next > self.policy.network_max {
                    return BackoffDecision::GiveUp;
                }
                self.network = next;
                next
            }
        };

        self.kind = kind;
        self.delay = next;
        self.attempts += 1;
        BackoffDecision::Retry(next)
    }
}
