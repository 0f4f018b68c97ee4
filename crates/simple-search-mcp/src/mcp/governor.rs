//! Deadline enforcement for blocking reads and tool calls.
//!
//! At most one deadline is armed at a time. Arming takes `&mut self`, so overlapping
//! deadlines are rejected by the borrow checker rather than at runtime.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the next request line.
    Read,
    /// Running a tool call.
    Call,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    pub phase: Phase,
    pub limit: Duration,
}

impl fmt::Display for TimedOut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let limit = describe(self.limit);
        match self.phase {
            Phase::Read => write!(f, "Timed out waiting for a request after {limit}"),
            Phase::Call => write!(f, "Search timed out after {limit}"),
        }
    }
}

impl std::error::Error for TimedOut {}

fn describe(limit: Duration) -> String {
    if limit.subsec_nanos() == 0 {
        let secs = limit.as_secs();
        if secs == 1 {
            "1 second".to_string()
        } else {
            format!("{secs} seconds")
        }
    } else {
        format!("{} milliseconds", limit.as_millis())
    }
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    phase: Phase,
    since: Instant,
}

#[derive(Debug, Default)]
pub struct Governor {
    armed: Option<Armed>,
}

impl Governor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Phase of the currently armed deadline, if any.
    pub fn armed(&self) -> Option<Phase> {
        self.armed.map(|a| a.phase)
    }

    /// Run `op` under `limit`. On expiry the operation is dropped and `TimedOut` returned.
    pub async fn with_deadline<F>(
        &mut self,
        phase: Phase,
        limit: Duration,
        op: F,
    ) -> Result<F::Output, TimedOut>
    where
        F: Future,
    {
        self.armed = Some(Armed {
            phase,
            since: Instant::now(),
        });
        let out = tokio::time::timeout(limit, op).await;
        if let Some(armed) = self.armed.take() {
            tracing::trace!(
                ?phase,
                elapsed_ms = armed.since.elapsed().as_millis() as u64,
                "deadline disarmed"
            );
        }
        out.map_err(|_| TimedOut { phase, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_within_limit_and_disarms() {
        let mut g = Governor::new();
        let v = g
            .with_deadline(Phase::Call, Duration::from_secs(1), async { 7 })
            .await
            .unwrap();
        assert_eq!(v, 7);
        assert_eq!(g.armed(), None);
    }

    #[tokio::test]
    async fn expiry_interrupts_the_operation() {
        let mut g = Governor::new();
        let started = Instant::now();
        let err = g
            .with_deadline(Phase::Read, Duration::from_millis(30), async {
                tokio::time::sleep(Duration::from_secs(10)).await;
            })
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(err.phase, Phase::Read);
        assert_eq!(g.armed(), None);
    }

    #[test]
    fn messages_name_the_phase_and_limit() {
        let call = TimedOut {
            phase: Phase::Call,
            limit: Duration::from_secs(45),
        };
        assert_eq!(call.to_string(), "Search timed out after 45 seconds");

        let read = TimedOut {
            phase: Phase::Read,
            limit: Duration::from_secs(30),
        };
        assert_eq!(
            read.to_string(),
            "Timed out waiting for a request after 30 seconds"
        );

        let short = TimedOut {
            phase: Phase::Call,
            limit: Duration::from_millis(250),
        };
        assert_eq!(short.to_string(), "Search timed out after 250 milliseconds");

        let one = TimedOut {
            phase: Phase::Call,
            limit: Duration::from_secs(1),
        };
        assert_eq!(one.to_string(), "Search timed out after 1 second");
    }
}
