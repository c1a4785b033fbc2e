//! Run-wide budgets and stop signalling.
//!
//! A [`RunContext`] is shared by `Arc` between every unit worker. Budgets are
//! checked between cycles only: a worker that is already inside the commit
//! critical section always finishes its stage/measure/commit before it
//! notices the run is stopping.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::domain::models::{IterationConfig, StopReason};

/// Global limits of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBudget {
    /// Generation attempts across all units
    pub max_iterations: u32,
    pub max_wall_time: Duration,
}

impl RunBudget {
    pub fn from_config(config: &IterationConfig) -> Self {
        Self {
            max_iterations: config.max_total_iterations,
            max_wall_time: Duration::from_secs(config.max_wall_time_secs),
        }
    }
}

/// Shared, lock-free run state.
#[derive(Debug)]
pub struct RunContext {
    budget: RunBudget,
    started: Instant,
    iterations: AtomicU32,
    fatal_streak: AtomicU32,
    stop: watch::Sender<Option<StopReason>>,
}

impl RunContext {
    pub fn new(budget: RunBudget) -> Self {
        let (stop, _) = watch::channel(None);
        Self {
            budget,
            started: Instant::now(),
            iterations: AtomicU32::new(0),
            fatal_streak: AtomicU32::new(0),
            stop,
        }
    }

    pub const fn budget(&self) -> RunBudget {
        self.budget
    }

    /// Claim one iteration from the global budget.
    ///
    /// Returns the 1-based iteration number, or the reason the run is
    /// stopping. Spending the last iteration or the wall clock records the
    /// matching stop reason.
    pub fn try_begin_iteration(&self) -> Result<u32, StopReason> {
        if let Some(reason) = self.stop_reason() {
            return Err(reason);
        }
        if self.started.elapsed() >= self.budget.max_wall_time {
            self.request_stop(StopReason::WallClockBudgetSpent);
            return Err(self.stop_reason().unwrap_or(StopReason::WallClockBudgetSpent));
        }
        let max = self.budget.max_iterations;
        match self
            .iterations
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < max).then_some(used + 1)
            }) {
            Ok(used) => Ok(used + 1),
            Err(_) => {
                self.request_stop(StopReason::IterationBudgetSpent);
                Err(self.stop_reason().unwrap_or(StopReason::IterationBudgetSpent))
            }
        }
    }

    pub fn iterations_used(&self) -> u32 {
        self.iterations.load(Ordering::Acquire)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Record a stop reason. The first reason recorded wins.
    pub fn request_stop(&self, reason: StopReason) {
        self.stop.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
    }

    /// Mark the run as cancelled by the operator.
    pub fn cancel(&self) {
        self.request_stop(StopReason::Cancelled);
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop.borrow().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.borrow().is_some()
    }

    /// A generation succeeded; the run-wide fatal streak starts over.
    pub fn record_generation_success(&self) {
        self.fatal_streak.store(0, Ordering::Release);
    }

    /// An auth / invalid-response error happened; returns the new streak.
    pub fn record_fatal_candidate(&self) -> u32 {
        self.fatal_streak.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Sleep for `duration`, waking early if the run stops.
    pub async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut stopped = self.stop.subscribe();
        tokio::select! {
            () = tokio::time::sleep(duration) => {}
            _ = stopped.wait_for(Option::is_some) => {}
        }
    }
}
