//! Escalation ladder: `Normal -> Challenge -> Delay -> Locked`.
//!
//! Pure functions over attempt samples so every transition is testable
//! without a store. The `Locked` interval is anchored to the failure that
//! crossed the threshold, not to lock entry: hammering a locked account
//! does not push the unlock time forward. Attempts rejected while locked
//! are recorded with a distinct outcome upstream and never reach these
//! functions as failures.

use chrono::{DateTime, Duration, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LadderPolicy {
    /// Consecutive/windowed failures before a challenge is demanded.
    pub challenge_after: u32,
    /// Failures before enforced backoff starts.
    pub delay_after: u32,
    /// Failures before the fixed-duration lock.
    pub lock_after: u32,
    /// Sliding window over which failures are counted.
    pub window: Duration,
    /// Lock duration, counted from the triggering failure.
    pub lock_duration: Duration,
    pub delay_base: Duration,
    pub delay_max: Duration,
}

impl LadderPolicy {
    /// Default ladder for the password entry point.
    #[must_use]
    pub fn password() -> Self {
        Self {
            challenge_after: 3,
            delay_after: 5,
            lock_after: 10,
            window: Duration::minutes(15),
            lock_duration: Duration::minutes(15),
            delay_base: Duration::seconds(2),
            delay_max: Duration::seconds(60),
        }
    }

    /// Tighter ladder for the second factor: 6-digit codes leave far less
    /// room for guessing than passwords.
    #[must_use]
    pub fn second_factor() -> Self {
        Self {
            challenge_after: 3,
            delay_after: 4,
            lock_after: 5,
            window: Duration::minutes(15),
            lock_duration: Duration::minutes(15),
            delay_base: Duration::seconds(5),
            delay_max: Duration::seconds(60),
        }
    }
}

/// One login attempt as seen by the ladder, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSample {
    pub failed: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Normal,
    /// Demand a CAPTCHA-style challenge before checking credentials.
    Challenge,
    /// Enforced backoff; the attempt is rejected with a retry hint.
    Delay { retry_after: Duration },
    /// Hard lock regardless of credential correctness.
    Locked { retry_after: Duration },
}

impl GuardState {
    fn severity(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Challenge => 1,
            Self::Delay { .. } => 2,
            Self::Locked { .. } => 3,
        }
    }

    /// Combine two ladder outcomes; the harsher one wins, and equal-rank
    /// timed states keep the longer wait.
    #[must_use]
    pub fn worst(self, other: Self) -> Self {
        match (self, other) {
            (Self::Locked { retry_after: a }, Self::Locked { retry_after: b }) => Self::Locked {
                retry_after: a.max(b),
            },
            (Self::Delay { retry_after: a }, Self::Delay { retry_after: b }) => Self::Delay {
                retry_after: a.max(b),
            },
            (a, b) => {
                if a.severity() >= b.severity() {
                    a
                } else {
                    b
                }
            }
        }
    }
}

/// Evaluate the identifier ladder: consecutive failures, broken by the
/// most recent success.
#[must_use]
pub fn evaluate_identifier(
    samples: &[AttemptSample],
    now: DateTime<Utc>,
    policy: &LadderPolicy,
) -> GuardState {
    let failures = failure_times(samples, now, policy.window, true);
    evaluate(&failures, now, policy)
}

/// Evaluate the origin-address ladder: all failures in the window count,
/// successes in between do not reset anything.
#[must_use]
pub fn evaluate_origin(
    samples: &[AttemptSample],
    now: DateTime<Utc>,
    policy: &LadderPolicy,
) -> GuardState {
    let failures = failure_times(samples, now, policy.window, false);
    evaluate(&failures, now, policy)
}

/// Collect failure timestamps within the window, newest first.
/// `consecutive` stops the streak at the first success.
fn failure_times(
    samples: &[AttemptSample],
    now: DateTime<Utc>,
    window: Duration,
    consecutive: bool,
) -> Vec<DateTime<Utc>> {
    let cutoff = now - window;
    let mut failures = Vec::new();
    for sample in samples {
        if sample.at < cutoff {
            // Samples arrive newest-first; everything past here is older.
            break;
        }
        if sample.failed {
            failures.push(sample.at);
        } else if consecutive {
            break;
        }
    }
    failures
}

fn evaluate(failures: &[DateTime<Utc>], now: DateTime<Utc>, policy: &LadderPolicy) -> GuardState {
    let count = u32::try_from(failures.len()).unwrap_or(u32::MAX);

    if count >= policy.lock_after {
        // The triggering failure is the lock_after-th chronologically
        // within the current streak. With newest-first ordering that is
        // index (count - lock_after).
        let trigger_index = (count - policy.lock_after) as usize;
        if let Some(trigger_at) = failures.get(trigger_index) {
            let locked_until = *trigger_at + policy.lock_duration;
            if now < locked_until {
                return GuardState::Locked {
                    retry_after: locked_until - now,
                };
            }
        }
    }

    if count >= policy.delay_after {
        let exponent = (count - policy.delay_after).min(20);
        let backoff = policy
            .delay_base
            .checked_mul(1 << exponent)
            .unwrap_or(policy.delay_max)
            .min(policy.delay_max);
        if let Some(newest) = failures.first() {
            let until = *newest + backoff;
            if now < until {
                return GuardState::Delay {
                    retry_after: until - now,
                };
            }
        }
        // Backoff satisfied; a challenge is still required at this depth.
        return GuardState::Challenge;
    }

    if count >= policy.challenge_after {
        return GuardState::Challenge;
    }

    GuardState::Normal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(now: DateTime<Utc>, seconds_ago: i64) -> DateTime<Utc> {
        now - Duration::seconds(seconds_ago)
    }

    fn failures(now: DateTime<Utc>, ages: &[i64]) -> Vec<AttemptSample> {
        ages.iter()
            .map(|&seconds_ago| AttemptSample {
                failed: true,
                at: at(now, seconds_ago),
            })
            .collect()
    }

    #[test]
    fn fresh_identifier_is_normal() {
        let now = Utc::now();
        let state = evaluate_identifier(&[], now, &LadderPolicy::password());
        assert_eq!(state, GuardState::Normal);
    }

    #[test]
    fn challenge_after_three_failures() {
        let now = Utc::now();
        let samples = failures(now, &[10, 20, 30]);
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert_eq!(state, GuardState::Challenge);
    }

    #[test]
    fn delay_after_five_failures_with_backoff() {
        let now = Utc::now();
        // Newest failure just happened; backoff base is 2s.
        let samples = failures(now, &[1, 10, 20, 30, 40]);
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert!(matches!(state, GuardState::Delay { .. }));

        // Once the backoff has elapsed the attempt may proceed, but still
        // behind a challenge.
        let samples = failures(now, &[30, 40, 50, 60, 70]);
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert_eq!(state, GuardState::Challenge);
    }

    #[test]
    fn tenth_failure_locks_even_for_correct_secret() {
        let now = Utc::now();
        let ages: Vec<i64> = (0..10).map(|i| i * 5).collect();
        let samples = failures(now, &ages);
        // The guard runs before credential checking, so "correct secret"
        // never gets a say while this state is Locked.
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert!(matches!(state, GuardState::Locked { .. }));
    }

    #[test]
    fn lock_is_anchored_to_the_triggering_failure() {
        let now = Utc::now();
        let policy = LadderPolicy::password();
        // Ten failures, the 10th (chronologically) happened 600s ago; two
        // more recent failures must not move the unlock time.
        let mut ages: Vec<i64> = (0..10).map(|i| 600 + i * 10).collect();
        let state = evaluate_identifier(&failures(now, &ages), now, &policy);
        let GuardState::Locked { retry_after } = state else {
            panic!("expected lock, got {state:?}");
        };
        let base_retry = retry_after;

        ages.insert(0, 5);
        ages.insert(0, 1);
        let state = evaluate_identifier(&failures(now, &ages), now, &policy);
        let GuardState::Locked { retry_after } = state else {
            panic!("expected lock, got {state:?}");
        };
        assert_eq!(retry_after, base_retry);
    }

    #[test]
    fn lock_expires_after_its_duration() {
        let now = Utc::now();
        let policy = LadderPolicy::password();
        // All ten failures happened over 15 minutes ago, so they are also
        // outside the window: the ladder is back to Normal.
        let ages: Vec<i64> = (0..10).map(|i| 901 + i * 2).collect();
        let state = evaluate_identifier(&failures(now, &ages), now, &policy);
        assert_eq!(state, GuardState::Normal);
    }

    #[test]
    fn success_resets_identifier_but_not_origin() {
        let now = Utc::now();
        let policy = LadderPolicy::password();
        let mut samples = failures(now, &[10, 20, 30]);
        // A success between the newest failure and the older three.
        samples.insert(1, AttemptSample {
            failed: false,
            at: at(now, 15),
        });

        // Identifier ladder: streak is just the newest failure.
        let state = evaluate_identifier(&samples, now, &policy);
        assert_eq!(state, GuardState::Normal);

        // Origin ladder: all four failures still count.
        let state = evaluate_origin(&samples, now, &policy);
        assert_eq!(state, GuardState::Challenge);
    }

    #[test]
    fn second_factor_ladder_locks_sooner() {
        let now = Utc::now();
        let samples = failures(now, &[1, 5, 10, 15, 20]);
        let state = evaluate_identifier(&samples, now, &LadderPolicy::second_factor());
        assert!(matches!(state, GuardState::Locked { .. }));

        // Same five failures stay short of the password lock threshold.
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert!(!matches!(state, GuardState::Locked { .. }));
    }

    #[test]
    fn old_failures_age_out_of_the_window() {
        let now = Utc::now();
        let samples = failures(now, &[1000, 1100, 1200, 1300]);
        let state = evaluate_identifier(&samples, now, &LadderPolicy::password());
        assert_eq!(state, GuardState::Normal);
    }

    #[test]
    fn worst_prefers_harsher_state_and_longer_wait() {
        let lock_a = GuardState::Locked {
            retry_after: Duration::seconds(10),
        };
        let lock_b = GuardState::Locked {
            retry_after: Duration::seconds(60),
        };
        assert_eq!(lock_a.worst(lock_b), lock_b);
        assert_eq!(GuardState::Normal.worst(GuardState::Challenge), GuardState::Challenge);
        assert_eq!(
            GuardState::Challenge.worst(GuardState::Delay {
                retry_after: Duration::seconds(2)
            }),
            GuardState::Delay {
                retry_after: Duration::seconds(2)
            }
        );
    }
}
