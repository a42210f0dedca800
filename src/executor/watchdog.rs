//! Global run timeout
//!
//! Races the whole run against the configured wall-clock budget. When the
//! budget runs out the run future is dropped, which kills the in-flight
//! subprocess and removes the scratch directory.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Enforces the `-timeout` budget of a run
#[derive(Debug)]
pub struct Watchdog {
    budget: Option<Duration>,
    started: Instant,
}

impl Watchdog {
    /// Start the clock; a zero budget means unbounded
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            budget: budget.filter(|d| !d.is_zero()),
            started: Instant::now(),
        }
    }

    pub fn budget(&self) -> Option<Duration> {
        self.budget
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.budget
            .map(|budget| budget.saturating_sub(self.started.elapsed()))
    }

    /// Drive `work` to completion unless the budget runs out first.
    pub async fn guard<T, F>(&self, work: F) -> EngineResult<T>
    where
        F: Future<Output = EngineResult<T>>,
    {
        let Some(remaining) = self.remaining() else {
            return work.await;
        };

        match tokio::time::timeout(remaining, work).await {
            Ok(result) => result,
            Err(_) => {
                let elapsed = self.started.elapsed();
                warn!("run exceeded its {:?} budget", self.budget.unwrap_or_default());
                Err(EngineError::TimeoutAbort { elapsed })
            }
        }
    }
}
