//! Polling loops
//!
//! The director polls twice: until every node answers a ping, and until the
//! control node reports every shard finished. Both loops are a
//! [`PollPolicy`]: a fixed interval, an optional deadline, and cancellation
//! through the shutdown signal.

use std::future::Future;
use std::time::{Duration, Instant};

use fleet_core::{DispatchConfig, Error, Result, ShutdownReceiver};
use tracing::{debug, info};

/// Interval and deadline of one polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Wait between attempts
    pub interval: Duration,

    /// Give up after this long; `None` polls forever
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    /// Poll every `interval` with no deadline
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Liveness default: every 15 seconds, forever
    pub fn liveness() -> Self {
        Self::new(Duration::from_secs(15))
    }

    /// Readiness default: every 30 seconds, forever
    pub fn readiness() -> Self {
        Self::new(Duration::from_secs(30))
    }

    /// Liveness policy from the dispatch settings
    pub fn liveness_from(dispatch: &DispatchConfig) -> Self {
        Self {
            interval: dispatch.liveness_interval,
            deadline: dispatch.liveness_deadline,
        }
    }

    /// Readiness policy from the dispatch settings
    pub fn readiness_from(dispatch: &DispatchConfig) -> Self {
        Self {
            interval: dispatch.readiness_interval,
            deadline: dispatch.readiness_deadline,
        }
    }

    /// Set the deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Run `attempt` until it yields a value
    ///
    /// `attempt` receives the 1-based attempt number and returns `Ok(None)`
    /// to be polled again. Errors end the loop immediately. A deadline that
    /// would pass before the next attempt ends it with `BarrierTimeout`; a
    /// shutdown signal during the wait ends it with `Cancelled`.
    pub async fn run<T, F, Fut>(
        &self,
        name: &str,
        mut shutdown: Option<&mut ShutdownReceiver>,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let started = Instant::now();
        let mut number: u32 = 0;

        loop {
            number += 1;
            if let Some(value) = attempt(number).await? {
                info!(poll = name, attempts = number, "Poll completed");
                return Ok(value);
            }

            if let Some(deadline) = self.deadline {
                if started.elapsed() + self.interval > deadline {
                    return Err(Error::BarrierTimeout {
                        barrier_id: name.to_string(),
                        timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    });
                }
            }

            debug!(
                poll = name,
                attempt = number,
                interval_ms = self.interval.as_millis() as u64,
                "Not done yet, waiting"
            );

            match shutdown.as_deref_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.interval) => {}
                        _ = fleet_core::shutdown::wait_for(rx) => {
                            info!(poll = name, attempts = number, "Poll cancelled");
                            return Err(Error::Cancelled {
                                operation: name.to_string(),
                            });
                        }
                    }
                }
                None => tokio::time::sleep(self.interval).await,
            }
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::readiness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Shutdown;

    fn fast() -> PollPolicy {
        PollPolicy::new(Duration::from_millis(10))
    }

    #[test]
    fn test_defaults() {
        assert_eq!(PollPolicy::liveness().interval, Duration::from_secs(15));
        assert_eq!(PollPolicy::readiness().interval, Duration::from_secs(30));
        assert_eq!(PollPolicy::readiness().deadline, None);

        let dispatch = DispatchConfig::default();
        assert_eq!(PollPolicy::liveness_from(&dispatch), PollPolicy::liveness());
        assert_eq!(PollPolicy::readiness_from(&dispatch), PollPolicy::readiness());
    }

    #[tokio::test]
    async fn test_first_attempt_success_does_not_wait() {
        let policy = PollPolicy::liveness();
        let started = Instant::now();

        let value = policy
            .run("liveness", None, |n| async move { Ok(Some(n)) })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_polls_until_done() {
        let value = fast()
            .run("readiness", None, |n| async move {
                Ok(if n == 4 { Some("ready") } else { None })
            })
            .await
            .unwrap();
        assert_eq!(value, "ready");
    }

    #[tokio::test]
    async fn test_error_stops_polling() {
        let mut calls = 0;
        let result: Result<()> = fast()
            .run("readiness", None, |_| {
                calls += 1;
                async {
                    Err(Error::Remote {
                        message: "boom".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(Error::Remote { .. })));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_deadline() {
        let policy = fast().with_deadline(Duration::from_millis(50));
        let result: Result<()> = policy.run("readiness", None, |_| async { Ok(None) }).await;

        assert!(matches!(
            result,
            Err(Error::BarrierTimeout { barrier_id, timeout_ms: 50 }) if barrier_id == "readiness"
        ));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_wait() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        let policy = PollPolicy::readiness();

        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.trigger();
        });

        let result: Result<()> = tokio::time::timeout(
            Duration::from_secs(2),
            policy.run("readiness", Some(&mut rx), |_| async { Ok(None) }),
        )
        .await
        .unwrap();

        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }
}
