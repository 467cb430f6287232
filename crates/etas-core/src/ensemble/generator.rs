//! The ensemble work loop.
//!
//! ```text
//! pre_launch        begin_initialization, begin_accumulation(num_catalogs)
//! run_loop          workers: claim index → seed → generate → scan, until
//!                   done, deadline or abort
//! post_termination  end_initialization, end_accumulation (always)
//! ```

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Instant;

use etas_common::{CatalogParams, Error, Result};
use tracing::{debug, error, info, warn};

use super::{EnsembleOptions, EnsembleOutcome, EnsembleResult, ProgressSnapshot};
use crate::accum::{Accumulator, CatalogScanner};
use crate::engine::{CatalogGenerator, CatalogStorage, Initializer};
use crate::random::RandomStream;

/// Worker count for a request of `requested` threads (0 = auto) and
/// `num_catalogs` catalogs.
pub fn resolve_threads(requested: usize, num_catalogs: u64) -> usize {
    let threads = if requested == 0 {
        thread::available_parallelism().map_or(1, |n| n.get())
    } else {
        requested
    };
    let cap = usize::try_from(num_catalogs).unwrap_or(usize::MAX).max(1);
    threads.clamp(1, cap)
}

/// State shared by every worker of one run.
struct RunState<'a> {
    init: &'a dyn Initializer,
    accumulators: &'a [&'a dyn Accumulator],
    requested: u64,
    base_seed: u64,
    deadline: Option<Instant>,
    seed_only: bool,
    next_index: AtomicU64,
    completed: AtomicU64,
    abort: AtomicBool,
    first_error: Mutex<Option<Error>>,
}

impl RunState<'_> {
    fn should_stop(&self) -> bool {
        if self.abort.load(Ordering::Acquire) {
            return true;
        }
        matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    fn fail(&self, err: Error) {
        self.abort.store(true, Ordering::Release);
        let mut slot = match self.first_error.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    fn take_error(&self) -> Option<Error> {
        match self.first_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn worker(&self, worker: usize) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.work(worker)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(worker, error = %err, "ensemble worker failed");
                self.fail(err);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(worker, %message, "ensemble worker panicked");
                self.fail(Error::ThreadAbort { message });
            }
        }
    }

    fn work(&self, worker: usize) -> Result<()> {
        let mut seeder = self.init.make_seeder();
        let mut scanner = CatalogScanner::new(self.accumulators);
        let mut generator = CatalogGenerator::new();
        let mut storage = CatalogStorage::new(&CatalogParams::default());
        let mut rng = RandomStream::new(self.base_seed);

        seeder.open()?;
        scanner.open()?;
        let mut done = 0u64;
        let result = (|| -> Result<()> {
            while !self.should_stop() {
                let index = self.next_index.fetch_add(1, Ordering::AcqRel);
                if index >= self.requested {
                    break;
                }
                rng.reseed_for_catalog(index);
                seeder.seed_catalog(&mut storage, &mut rng)?;
                if !self.seed_only {
                    generator.generate_all_generations(&mut storage, &mut rng)?;
                }
                scanner.scan(&storage, index)?;
                self.completed.fetch_add(1, Ordering::AcqRel);
                done += 1;
            }
            Ok(())
        })();
        let closed = scanner.close();
        let seeder_closed = seeder.close();
        debug!(worker, catalogs = done, "ensemble worker finished");
        result.and(closed).and(seeder_closed)
    }

    fn snapshot(&self, start: Instant) -> ProgressSnapshot {
        ProgressSnapshot {
            completed: self.completed.load(Ordering::Acquire),
            requested: self.requested,
            elapsed: start.elapsed(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Drives `num_catalogs` independent seed → generate → scan iterations
/// across a pool of scoped worker threads.
///
/// Each catalog's random stream is derived from the base seed and the
/// catalog index, so a seeded run produces the same merged statistics for
/// any thread count. Workers claim catalog indices with a shared
/// fetch-and-add counter and own everything else they touch.
#[derive(Debug, Clone)]
pub struct EnsembleGenerator {
    options: EnsembleOptions,
}

impl EnsembleGenerator {
    pub fn new(options: EnsembleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EnsembleOptions {
        &self.options
    }

    /// Run one ensemble.
    ///
    /// Returns `Err` only for failures before launch (validation,
    /// initialization) or while finalizing a run that did not already
    /// abort. A worker failure is reported as
    /// [`EnsembleOutcome::Aborted`] with the error attached.
    pub fn run(
        &self,
        init: &mut dyn Initializer,
        accumulators: &mut [&mut dyn Accumulator],
        progress: Option<&dyn Fn(&ProgressSnapshot)>,
    ) -> Result<EnsembleResult> {
        let opts = &self.options;
        self.pre_launch(init, accumulators)?;

        let start = Instant::now();
        let threads = resolve_threads(opts.num_threads, opts.num_catalogs);
        let base_seed = opts
            .seed
            .unwrap_or_else(|| RandomStream::from_entropy().base_seed());
        info!(
            catalogs = opts.num_catalogs,
            threads,
            base_seed,
            seed_only = opts.seed_only,
            "ensemble started"
        );

        let (completed, run_error, timed_out) = {
            let shared: Vec<&dyn Accumulator> =
                accumulators.iter().map(|acc| &**acc as &dyn Accumulator).collect();
            let state = RunState {
                init: &*init,
                accumulators: &shared,
                requested: opts.num_catalogs,
                base_seed,
                deadline: opts.deadline,
                seed_only: opts.seed_only,
                next_index: AtomicU64::new(0),
                completed: AtomicU64::new(0),
                abort: AtomicBool::new(false),
                first_error: Mutex::new(None),
            };
            self.run_loop(&state, threads, start, progress);
            let completed = state.completed.load(Ordering::Acquire);
            let timed_out = completed < opts.num_catalogs && !state.abort.load(Ordering::Acquire);
            (completed, state.take_error(), timed_out)
        };

        let finalized = Self::post_termination(init, accumulators);
        let elapsed = start.elapsed();

        let (outcome, error) = match (run_error, finalized) {
            (Some(err), post) => {
                if let Err(post_err) = post {
                    warn!(error = %post_err, "finalizing an aborted ensemble also failed");
                }
                (EnsembleOutcome::Aborted, Some(err))
            }
            (None, Err(err)) => return Err(err),
            (None, Ok(())) if timed_out => (EnsembleOutcome::TimedOut, None),
            (None, Ok(())) => (EnsembleOutcome::Completed, None),
        };

        let result = EnsembleResult {
            outcome,
            completed,
            requested: opts.num_catalogs,
            elapsed,
            threads,
            base_seed,
            error,
        };
        if let Some(callback) = progress {
            callback(&result.snapshot());
        }
        info!(
            outcome = ?result.outcome,
            completed = result.completed,
            requested = result.requested,
            elapsed_ms = elapsed.as_millis() as u64,
            "ensemble finished"
        );
        Ok(result)
    }

    fn pre_launch(
        &self,
        init: &mut dyn Initializer,
        accumulators: &mut [&mut dyn Accumulator],
    ) -> Result<()> {
        let n = self.options.num_catalogs;
        if n == 0 {
            return Err(Error::invalid("num_catalogs", "must be positive"));
        }
        let capacity = usize::try_from(n)
            .map_err(|_| Error::invalid("num_catalogs", format!("{n} exceeds addressable capacity")))?;
        init.begin_initialization()?;
        for acc in accumulators.iter_mut() {
            if let Err(err) = acc.begin_accumulation(capacity) {
                let _ = init.end_initialization();
                return Err(err);
            }
        }
        Ok(())
    }

    fn run_loop(
        &self,
        state: &RunState<'_>,
        threads: usize,
        start: Instant,
        progress: Option<&dyn Fn(&ProgressSnapshot)>,
    ) {
        let interval = self.options.progress_interval;
        let poll = self.options.poll_interval;
        thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| s.spawn(move || state.worker(worker)))
                .collect();

            let mut next_report = start + interval;
            while handles.iter().any(|h| !h.is_finished()) {
                thread::sleep(poll);
                if Instant::now() >= next_report {
                    let snapshot = state.snapshot(start);
                    debug!(
                        completed = snapshot.completed,
                        requested = snapshot.requested,
                        "ensemble progress"
                    );
                    if let Some(callback) = progress {
                        callback(&snapshot);
                    }
                    next_report += interval;
                }
            }

            for handle in handles {
                if let Err(payload) = handle.join() {
                    state.fail(Error::ThreadAbort {
                        message: panic_message(payload.as_ref()),
                    });
                }
            }
        });
    }

    fn post_termination(
        init: &mut dyn Initializer,
        accumulators: &mut [&mut dyn Accumulator],
    ) -> Result<()> {
        let mut first = init.end_initialization();
        for acc in accumulators.iter_mut() {
            let result = acc.end_accumulation();
            if first.is_ok() {
                first = result;
            }
        }
        first
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accum::{SimRangingAccumulator, TimeMagAccumulator};
    use crate::engine::FixedInitializer;
    use etas_math::inverse_branch_ratio;
    use std::time::Duration;

    fn init(tend: f64) -> FixedInitializer {
        let mut params = CatalogParams::default();
        params.range.tend = tend;
        params.a = inverse_branch_ratio(0.5, params.p, params.c, params.b, params.alpha, 3.0, 9.5, 365.0);
        FixedInitializer::single_mainshock(params, 0.0, 6.0)
    }

    #[test]
    fn zero_catalogs_is_rejected() {
        let mut init = init(10.0);
        let generator = EnsembleGenerator::new(EnsembleOptions::new(0));
        assert!(matches!(
            generator.run(&mut init, &mut [], None),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn completes_every_catalog() {
        let mut init = init(10.0);
        let mut acc = SimRangingAccumulator::new(SimRangingAccumulator::uniform_bins(0.0, 10.0, 10)).unwrap();
        let generator = EnsembleGenerator::new(EnsembleOptions::new(200).with_threads(3).with_seed(Some(9)));
        let result = generator.run(&mut init, &mut [&mut acc], None).unwrap();
        assert_eq!(result.outcome, EnsembleOutcome::Completed);
        assert_eq!(result.completed, 200);
        assert_eq!(result.threads, 3);
        assert_eq!(acc.get_size(), 200);
        assert!(!init.is_active());
    }

    #[test]
    fn expired_deadline_times_out_and_still_finalizes() {
        let mut init = init(10.0);
        let mut acc = TimeMagAccumulator::new(vec![0.0, 10.0], vec![3.0]).unwrap();
        let options = EnsembleOptions::new(1_000)
            .with_threads(2)
            .with_deadline(Some(Instant::now() - Duration::from_millis(1)));
        let result = EnsembleGenerator::new(options)
            .run(&mut init, &mut [&mut acc], None)
            .unwrap();
        assert_eq!(result.outcome, EnsembleOutcome::TimedOut);
        assert_eq!(result.completed, 0);
        assert_eq!(acc.get_size(), 0);
    }

    #[test]
    fn capacity_failure_aborts() {
        // An accumulator that was sized by someone else and fills up first.
        struct Undersized(TimeMagAccumulator);
        impl Accumulator for Undersized {
            fn make_consumer(&self) -> Box<dyn crate::accum::CatalogConsumer + Send + '_> {
                self.0.make_consumer()
            }
            fn begin_accumulation(&mut self, _capacity: usize) -> Result<()> {
                self.0.begin_accumulation(5)
            }
            fn increase_capacity(&mut self, capacity: usize) -> Result<()> {
                self.0.increase_capacity(capacity)
            }
            fn end_accumulation(&mut self) -> Result<()> {
                self.0.end_accumulation()
            }
        }

        let mut init = init(5.0);
        let mut acc = Undersized(TimeMagAccumulator::new(vec![0.0, 5.0], vec![3.0]).unwrap());
        let generator = EnsembleGenerator::new(EnsembleOptions::new(50).with_threads(2).with_seed(Some(1)));
        let result = generator.run(&mut init, &mut [&mut acc], None).unwrap();
        assert_eq!(result.outcome, EnsembleOutcome::Aborted);
        assert!(matches!(result.error, Some(Error::CapacityExceeded { capacity: 5, .. })));
        assert_eq!(acc.0.get_size(), 5);
    }

    #[test]
    fn progress_callback_sees_final_snapshot() {
        use std::cell::RefCell;
        let seen = RefCell::new(Vec::new());
        let callback = |s: &ProgressSnapshot| seen.borrow_mut().push(s.completed);
        let mut init = init(5.0);
        let options = EnsembleOptions::new(20)
            .with_threads(1)
            .with_progress_interval(Duration::from_millis(1));
        EnsembleGenerator::new(options)
            .run(&mut init, &mut [], Some(&callback))
            .unwrap();
        assert_eq!(seen.borrow().last().copied(), Some(20));
    }
}
