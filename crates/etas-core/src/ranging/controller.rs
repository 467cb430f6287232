//! The ranging control law.
//!
//! Each simulation attempt runs a trial ensemble over the initial duration
//! and measures two things: how many bins a `1 - exceed_fraction` share of
//! catalogs survives through, and the catalog size at `size_fractile`
//! within that surviving duration. The size ratio `target / size`, clamped,
//! moves the minimum magnitude by `-log10(ratio) / b`. Once an attempt
//! after the first lands inside the convergence band, the range it ran
//! with, cut to the surviving duration, is the answer.

use std::sync::Arc;
use std::time::Instant;

use etas_common::{CatalogRange, Error, Result};
use tracing::info_span;

use super::{RangingAttempt, RangingMethod, RangingOptions, RangingOutcome};
use crate::accum::{PoissonCache, SeedEstAccumulator, SimRangingAccumulator, NO_MAG_NEG};
use crate::engine::Initializer;
use crate::ensemble::{EnsembleGenerator, EnsembleOptions, EnsembleOutcome, EnsembleResult};
use crate::logging::{event_names, LogContext, Stage};
use crate::random::derive_seed;

/// Adaptive range search in front of a full simulation.
#[derive(Debug, Clone)]
pub struct RangingController {
    options: RangingOptions,
}

impl RangingController {
    pub fn new(options: RangingOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RangingOptions {
        &self.options
    }

    /// Choose a range and write it into `init`.
    ///
    /// On failure the initializer is left with its initial range and the
    /// error carries the last attempted range.
    pub fn run(
        &self,
        init: &mut dyn Initializer,
        deadline: Option<Instant>,
        ctx: &LogContext,
    ) -> Result<RangingOutcome> {
        let method = self.options.method;
        let span = info_span!("ranging", %method, run_id = %ctx.run_id);
        let _guard = span.enter();

        let start = Instant::now();
        let initial = init.get_range();
        initial.validate()?;
        crate::log_event!(
            ctx,
            INFO,
            event_names::RANGING_STARTED,
            Stage::Ranging,
            format!("Ranging with method {method}"),
            mag_min_sim = initial.mag_min_sim,
            mag_max_sim = initial.mag_max_sim,
            tend = initial.tend
        );

        let mut attempts = Vec::new();
        let result = match method {
            RangingMethod::Simulation => self.simulation(init, &initial, deadline, ctx, &mut attempts),
            RangingMethod::SeedEstimate => self.seed_estimate(init, &initial, deadline, &mut attempts),
            RangingMethod::None => Ok(initial.clone()),
        };

        let range = match result.and_then(|range| init.set_range(&range).map(|()| range)) {
            Ok(range) => range,
            Err(err) => {
                let _ = init.set_range(&initial);
                let last = err.last_range().unwrap_or(&initial);
                crate::log_event!(
                    ctx,
                    ERROR,
                    event_names::RANGING_FAILED,
                    Stage::Ranging,
                    err.to_string(),
                    attempts = attempts.len() as u64,
                    code = err.code(),
                    mag_min_sim = last.mag_min_sim,
                    mag_max_sim = last.mag_max_sim,
                    tend = last.tend
                );
                return Err(err);
            }
        };

        crate::log_event!(
            ctx,
            INFO,
            event_names::RANGING_CONVERGED,
            Stage::Ranging,
            "Ranging finished",
            attempts = attempts.len() as u64,
            mag_min_sim = range.mag_min_sim,
            mag_max_sim = range.mag_max_sim,
            tend = range.tend
        );
        Ok(RangingOutcome {
            method,
            range,
            initial_range: initial,
            attempts,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn check_time(&self, attempt: u32, range: &CatalogRange, deadline: Option<Instant>) -> Result<()> {
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < self.options.min_attempt || remaining.is_zero() {
                return Err(Error::RangingTimeout {
                    attempt,
                    range: Box::new(range.clone()),
                });
            }
        }
        Ok(())
    }

    fn trial(&self, attempt: u32, deadline: Option<Instant>, seed_only: bool) -> EnsembleGenerator {
        let options = EnsembleOptions::new(self.options.num_catalogs)
            .with_threads(self.options.num_threads)
            .with_deadline(deadline)
            .with_seed(self.options.seed.map(|s| derive_seed(s, u64::from(attempt))))
            .seed_only(seed_only);
        EnsembleGenerator::new(options)
    }

    /// Map an unusable trial run to the ranging failure it stands for.
    fn check_trial(attempt: u32, range: &CatalogRange, result: EnsembleResult) -> Result<u64> {
        match result.outcome {
            EnsembleOutcome::Aborted => Err(Error::RangingAbort {
                attempt,
                message: result
                    .error
                    .map_or_else(|| "trial ensemble aborted".to_string(), |e| e.to_string()),
            }),
            EnsembleOutcome::TimedOut if result.completed * 2 < result.requested => {
                Err(Error::RangingTimeout {
                    attempt,
                    range: Box::new(range.clone()),
                })
            }
            _ => Ok(result.completed),
        }
    }

    fn non_convergence(attempt: u32, range: &CatalogRange, reason: String) -> Error {
        Error::RangingNonConvergence {
            attempt,
            reason,
            range: Box::new(range.clone()),
        }
    }

    fn ratio(&self, size: u64) -> f64 {
        let (lo, hi) = self.options.ratio_clamp;
        (self.options.target_size as f64 / size.max(1) as f64).clamp(lo, hi)
    }

    fn simulation(
        &self,
        init: &mut dyn Initializer,
        initial: &CatalogRange,
        deadline: Option<Instant>,
        ctx: &LogContext,
        attempts: &mut Vec<RangingAttempt>,
    ) -> Result<CatalogRange> {
        let opts = &self.options;
        let b = init.get_b_value();
        let bins = SimRangingAccumulator::uniform_bins(initial.tbegin, initial.tend, opts.time_bins);
        let mut acc = SimRangingAccumulator::new(bins)?;
        let mut range = initial.clone();

        for attempt in 1..=opts.max_attempts {
            self.check_time(attempt, &range, deadline)?;
            crate::log_event!(
                ctx,
                INFO,
                event_names::RANGING_ATTEMPT_STARTED,
                Stage::Ranging,
                format!("Ranging attempt {attempt}"),
                attempt = attempt,
                mag_min_sim = range.mag_min_sim,
                mag_max_sim = range.mag_max_sim
            );
            let started = Instant::now();
            init.set_range(&range)?;
            let result = self.trial(attempt, deadline, false).run(init, &mut [&mut acc], None)?;
            let completed = Self::check_trial(attempt, &range, result)?;

            let survival = acc.get_survival_bins(opts.exceed_fraction);
            if survival == 0 {
                return Err(Self::non_convergence(
                    attempt,
                    &range,
                    format!(
                        "more than {} of catalogs stopped within the first bin",
                        opts.exceed_fraction
                    ),
                ));
            }
            let survival_tend = acc.time_values()[survival];
            if survival_tend - range.tbegin < opts.min_duration_days {
                return Err(Self::non_convergence(
                    attempt,
                    &range,
                    format!(
                        "surviving duration {:.3} days is below the minimum {} days",
                        survival_tend - range.tbegin,
                        opts.min_duration_days
                    ),
                ));
            }
            let last_bin = survival - 1;
            let size = acc.get_bin_fractile(last_bin, opts.size_fractile);
            let high_mag =
                acc.get_high_mag_fractile_conditioned(last_bin, last_bin, 1.0 - opts.exceed_fraction);
            let ratio = self.ratio(size);

            attempts.push(RangingAttempt {
                attempt,
                range: range.clone(),
                completed,
                size_at_fractile: size,
                survival_bins: Some(survival),
                survival_tend,
                high_mag: (high_mag > NO_MAG_NEG).then_some(high_mag),
                ratio,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
            crate::log_event!(
                ctx,
                INFO,
                event_names::RANGING_ATTEMPT_FINISHED,
                Stage::Ranging,
                format!("Ranging attempt {attempt} measured size {size}"),
                attempt = attempt,
                completed = completed,
                size = size,
                ratio = ratio,
                survival_tend = survival_tend
            );

            let (lo, hi) = opts.converge;
            if attempt > 1 && (lo..=hi).contains(&ratio) {
                let mut converged = range.clone();
                converged.tend = survival_tend;
                return Ok(converged);
            }

            let mut next = range.clone();
            next.set_mag_min_clamped(range.mag_min_sim - ratio.log10() / b);
            if high_mag > NO_MAG_NEG {
                next.set_mag_max_clamped(high_mag.max(next.mag_min_sim) + opts.min_mag_gap);
            }
            if next.mag_max_sim - next.mag_min_sim < opts.min_mag_gap {
                return Err(Self::non_convergence(
                    attempt,
                    &next,
                    format!(
                        "max magnitude {:.2} is within {} of min magnitude {:.2}",
                        next.mag_max_sim, opts.min_mag_gap, next.mag_min_sim
                    ),
                ));
            }
            crate::log_event!(
                ctx,
                DEBUG,
                event_names::RANGING_ADJUSTED,
                Stage::Ranging,
                "Adjusted range",
                attempt = attempt,
                mag_min_sim = next.mag_min_sim,
                mag_max_sim = next.mag_max_sim
            );
            range = next;
        }

        Err(Self::non_convergence(
            opts.max_attempts,
            &range,
            format!(
                "size ratio outside [{}, {}] after {} attempts",
                opts.converge.0, opts.converge.1, opts.max_attempts
            ),
        ))
    }

    /// Smallest candidate minimum magnitude whose estimated size fractile
    /// fits the target.
    fn seed_estimate(
        &self,
        init: &mut dyn Initializer,
        initial: &CatalogRange,
        deadline: Option<Instant>,
        attempts: &mut Vec<RangingAttempt>,
    ) -> Result<CatalogRange> {
        let opts = &self.options;
        if !(opts.seed_est_mag_step > 0.0) {
            return Err(Error::invalid("seed_est_mag_step", "must be positive"));
        }
        self.check_time(1, initial, deadline)?;
        let started = Instant::now();
        let mags = SeedEstAccumulator::candidate_mags(
            initial.mag_min_lo,
            initial.mag_min_hi,
            opts.seed_est_mag_step,
        );
        let mut acc = SeedEstAccumulator::new(
            mags.clone(),
            opts.seed_est_generations,
            Arc::new(PoissonCache::new()),
        )?;
        init.set_range(initial)?;
        let result = self.trial(1, deadline, true).run(init, &mut [&mut acc], None)?;
        let completed = Self::check_trial(1, initial, result)?;

        let last = acc.generations() - 1;
        let sizes: Vec<u64> = (0..mags.len())
            .map(|j| acc.get_fractile(last, j, opts.size_fractile))
            .collect();
        let Some(j) = sizes.iter().position(|&s| s <= opts.target_size) else {
            return Err(Self::non_convergence(
                1,
                initial,
                format!(
                    "estimated size {} at mag {:.2} exceeds target {}",
                    sizes.last().copied().unwrap_or(0),
                    initial.mag_min_hi,
                    opts.target_size
                ),
            ));
        };

        let mut range = initial.clone();
        range.set_mag_min_clamped(mags[j]);
        if range.mag_max_sim - range.mag_min_sim < opts.min_mag_gap {
            return Err(Self::non_convergence(
                1,
                &range,
                format!(
                    "max magnitude {:.2} is within {} of min magnitude {:.2}",
                    range.mag_max_sim, opts.min_mag_gap, range.mag_min_sim
                ),
            ));
        }
        attempts.push(RangingAttempt {
            attempt: 1,
            range: range.clone(),
            completed,
            size_at_fractile: sizes[j],
            survival_bins: None,
            survival_tend: range.tend,
            high_mag: None,
            ratio: self.ratio(sizes[j]),
            elapsed_ms: started.elapsed().as_millis() as u64,
        });
        Ok(range)
    }
}
