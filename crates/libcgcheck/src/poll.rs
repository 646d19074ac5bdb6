use std::fmt::Debug;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::attribute;
use crate::error::VerifyError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(30);

/// What a single evaluation of the predicate observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    Converged(T),
    Pending(T),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Converged(T),
    /// Carries the last value observed before the deadline, if any read
    /// succeeded at all.
    TimedOut(Option<T>),
}

#[derive(Debug, Clone)]
pub struct PollResult<T> {
    pub elapsed: Duration,
    pub attempts: u32,
    pub outcome: Outcome<T>,
}

impl<T> PollResult<T> {
    pub fn converged(&self) -> bool {
        matches!(self.outcome, Outcome::Converged(_))
    }

    /// The final observed value.
    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Converged(value) => Some(value),
            Outcome::TimedOut(last) => last.as_ref(),
        }
    }
}

impl<T: Debug> PollResult<T> {
    /// Turns a timeout into [`VerifyError::TimedOut`], describing the
    /// awaited condition as `what`.
    pub fn into_result(self, what: &str) -> Result<T, VerifyError> {
        match self.outcome {
            Outcome::Converged(value) => Ok(value),
            Outcome::TimedOut(last) => Err(VerifyError::TimedOut {
                what: what.to_owned(),
                elapsed: self.elapsed,
                last: match last {
                    Some(value) => format!("{value:?}"),
                    None => "nothing".to_owned(),
                },
            }),
        }
    }
}

/// Re-evaluates a predicate until it holds or a deadline passes.
///
/// The poller holds no state between calls, so a predicate that already
/// holds converges on the first attempt without sleeping.
#[derive(Debug, Clone, Copy)]
pub struct ConvergencePoller {
    interval: Duration,
    deadline: Duration,
}

impl Default for ConvergencePoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_DEADLINE)
    }
}

impl ConvergencePoller {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Runs `probe` until it reports [`Probe::Converged`].
    ///
    /// Transient failures, i.e. files that do not exist yet, count as not
    /// converged. Any other error ends polling and is returned.
    pub fn poll_until<T, F>(&self, mut probe: F) -> Result<PollResult<T>, VerifyError>
    where
        F: FnMut() -> Result<Probe<T>, VerifyError>,
    {
        let start = Instant::now();
        let mut last = None;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match probe() {
                Ok(Probe::Converged(value)) => {
                    let elapsed = start.elapsed();
                    tracing::debug!(attempts, ?elapsed, "converged");
                    return Ok(PollResult {
                        elapsed,
                        attempts,
                        outcome: Outcome::Converged(value),
                    });
                }
                Ok(Probe::Pending(value)) => last = Some(value),
                Err(err) if err.is_transient() => {
                    tracing::debug!(attempts, %err, "not converged yet");
                }
                Err(err) => return Err(err),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.deadline {
                tracing::debug!(attempts, ?elapsed, "deadline passed");
                return Ok(PollResult {
                    elapsed,
                    attempts,
                    outcome: Outcome::TimedOut(last),
                });
            }

            thread::sleep(self.interval.min(self.deadline - elapsed));
        }
    }

    /// Polls a numeric control file until its value reaches `at_least`.
    pub fn until_at_least(&self, path: &Path, at_least: u64) -> Result<PollResult<u64>, VerifyError> {
        self.poll_until(|| {
            let value = attribute::read_u64(path)?;
            tracing::debug!(?path, value, at_least, "read counter");
            if value >= at_least {
                Ok(Probe::Converged(value))
            } else {
                Ok(Probe::Pending(value))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;

    fn short() -> ConvergencePoller {
        ConvergencePoller::new(Duration::from_millis(1), Duration::from_millis(50))
    }

    #[test]
    fn test_converges_after_pending() {
        let mut calls = 0;
        let result = short()
            .poll_until(|| {
                calls += 1;
                if calls < 3 {
                    Ok(Probe::Pending(calls))
                } else {
                    Ok(Probe::Converged(calls))
                }
            })
            .unwrap();

        assert!(result.converged());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.outcome, Outcome::Converged(3));
    }

    #[test]
    fn test_already_true_does_not_sleep() {
        let poller = ConvergencePoller::new(Duration::from_secs(60), Duration::from_secs(120));
        for _ in 0..2 {
            let result = poller.poll_until(|| Ok(Probe::Converged(()))).unwrap();
            assert!(result.converged());
            assert_eq!(result.attempts, 1);
            assert!(result.elapsed < Duration::from_secs(60));
        }
    }

    #[test]
    fn test_timeout_keeps_last_value() {
        let mut value = 0;
        let result = short()
            .poll_until(|| {
                value += 1;
                Ok(Probe::Pending(value))
            })
            .unwrap();

        assert!(!result.converged());
        assert!(result.elapsed >= Duration::from_millis(50));
        assert_eq!(result.value(), Some(&value));

        let err = result.into_result("counter").unwrap_err();
        assert!(matches!(err, VerifyError::TimedOut { what, .. } if what == "counter"));
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("memory.max_usage_in_bytes");
        let mut calls = 0;

        let result = short()
            .poll_until(|| {
                calls += 1;
                if calls == 3 {
                    set_fixture(tmp.path(), "memory.max_usage_in_bytes", "4096\n").unwrap();
                }
                let value = attribute::read_u64(&path)?;
                Ok(Probe::Converged(value))
            })
            .unwrap();

        assert_eq!(result.outcome, Outcome::Converged(4096));
        assert_eq!(result.attempts, 3);
    }

    #[test]
    fn test_never_readable_times_out_without_value() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("docker/abc/memory.max_usage_in_bytes");

        let result = short().until_at_least(&path, 1).unwrap();
        assert_eq!(result.outcome, Outcome::TimedOut(None));
        let err = result.into_result("memory usage").unwrap_err();
        assert!(err.to_string().ends_with("last observed: nothing"));
    }

    #[test]
    fn test_malformed_data_aborts() {
        let tmp = tempfile::tempdir().unwrap();
        let path = set_fixture(tmp.path(), "memory.max_usage_in_bytes", "lots\n").unwrap();

        let mut calls = 0;
        let err = short()
            .poll_until(|| {
                calls += 1;
                attribute::read_u64(&path).map(Probe::Converged)
            })
            .unwrap_err();
        assert!(matches!(err, VerifyError::MalformedData { .. }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_until_at_least() {
        let tmp = tempfile::tempdir().unwrap();
        let path = set_fixture(tmp.path(), "memory.max_usage_in_bytes", "100\n").unwrap();

        let result = short().until_at_least(&path, 200).unwrap();
        assert_eq!(result.outcome, Outcome::TimedOut(Some(100)));

        set_fixture(tmp.path(), "memory.max_usage_in_bytes", "300\n").unwrap();
        let result = short().until_at_least(&path, 200).unwrap();
        assert_eq!(result.outcome, Outcome::Converged(300));
    }
}
