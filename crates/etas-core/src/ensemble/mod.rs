//! Multi-threaded ensemble of independent catalogs.
//!
//! See [`EnsembleGenerator`] for the run lifecycle.

pub mod generator;

pub use generator::{resolve_threads, EnsembleGenerator};

use std::time::{Duration, Instant};

use etas_common::{Error, Result};
use serde::Serialize;

/// Catalog counts at one point of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub completed: u64,
    pub requested: u64,
    pub elapsed: Duration,
}

impl ProgressSnapshot {
    pub fn fraction(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        self.completed as f64 / self.requested as f64
    }
}

/// Run options for one ensemble.
#[derive(Debug, Clone)]
pub struct EnsembleOptions {
    pub num_catalogs: u64,
    /// Worker threads; 0 uses the available parallelism.
    pub num_threads: usize,
    /// Workers stop claiming catalogs once this passes.
    pub deadline: Option<Instant>,
    pub progress_interval: Duration,
    /// Base seed; `None` draws one from entropy.
    pub seed: Option<u64>,
    /// Seed each catalog and scan it without expanding generations.
    pub seed_only: bool,
    /// How often the driving thread wakes to check on workers.
    pub poll_interval: Duration,
}

impl EnsembleOptions {
    pub fn new(num_catalogs: u64) -> Self {
        Self {
            num_catalogs,
            num_threads: 0,
            deadline: None,
            progress_interval: Duration::from_secs(2),
            seed: None,
            seed_only: false,
            poll_interval: Duration::from_millis(20),
        }
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn seed_only(mut self, seed_only: bool) -> Self {
        self.seed_only = seed_only;
        self
    }
}

/// How the work loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleOutcome {
    Completed,
    /// Deadline reached with catalogs outstanding. Not an error by itself.
    TimedOut,
    /// A worker failed; the whole run stopped.
    Aborted,
}

/// Result of [`EnsembleGenerator::run`]. Accumulators have been finalized
/// by the time this is returned, whatever the outcome.
#[derive(Debug)]
pub struct EnsembleResult {
    pub outcome: EnsembleOutcome,
    pub completed: u64,
    pub requested: u64,
    pub elapsed: Duration,
    pub threads: usize,
    pub base_seed: u64,
    /// The failure that aborted the run.
    pub error: Option<Error>,
}

impl EnsembleResult {
    pub fn is_complete(&self) -> bool {
        self.outcome == EnsembleOutcome::Completed
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed,
            requested: self.requested,
            elapsed: self.elapsed,
        }
    }

    /// Completed catalogs, or the abort error.
    pub fn into_completed(self) -> Result<u64> {
        match self.outcome {
            EnsembleOutcome::Aborted => Err(self.error.unwrap_or_else(|| Error::ThreadAbort {
                message: "ensemble aborted".to_string(),
            })),
            _ => Ok(self.completed),
        }
    }
}
