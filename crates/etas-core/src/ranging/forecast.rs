//! Ranging followed by the full simulation.

use std::time::{Duration, Instant};

use etas_common::{Error, Result};
use serde::Serialize;

use super::{RangingController, RangingOptions, RangingOutcome};
use crate::accum::Accumulator;
use crate::engine::Initializer;
use crate::ensemble::{
    EnsembleGenerator, EnsembleOptions, EnsembleOutcome, EnsembleResult, ProgressSnapshot,
};
use crate::logging::{event_names, LogContext, Stage};

/// Everything one forecast run needs besides the initializer and the
/// forecast accumulators.
#[derive(Debug, Clone)]
pub struct ForecastPlan {
    pub ranging: RangingOptions,
    /// Full simulation; its deadline is derived from `time_limit`.
    pub simulation: EnsembleOptions,
    /// Budget for ranging plus simulation.
    pub time_limit: Option<Duration>,
    /// Share of `time_limit` ranging may use.
    pub ranging_fraction: f64,
    /// A timed-out simulation still counts with this many catalogs.
    pub min_sim_catalogs: u64,
    /// End of the last forecast time bin. A ranged duration that stops
    /// short of it is logged as a truncated forecast.
    pub forecast_end: Option<f64>,
}

/// Full-simulation counters for reports.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationSummary {
    pub outcome: EnsembleOutcome,
    pub completed: u64,
    pub requested: u64,
    pub elapsed_ms: u64,
    pub threads: usize,
    pub base_seed: u64,
}

impl From<&EnsembleResult> for SimulationSummary {
    fn from(result: &EnsembleResult) -> Self {
        Self {
            outcome: result.outcome,
            completed: result.completed,
            requested: result.requested,
            elapsed_ms: result.elapsed.as_millis() as u64,
            threads: result.threads,
            base_seed: result.base_seed,
        }
    }
}

/// True when a simulation ending at `tend` reaches time `t`.
pub fn covers(tend: f64, t: f64) -> bool {
    t <= tend + 1e-9 * tend.abs().max(1.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastRun {
    pub ranging: RangingOutcome,
    pub simulation: SimulationSummary,
}

/// Range, then simulate into `accumulators` with the chosen range.
///
/// The simulation fails with [`Error::SimulationTimeout`] only when the
/// deadline leaves fewer than `min_sim_catalogs` completed catalogs, and
/// with [`Error::SimulationAbort`] when a worker fails.
pub fn run_forecast(
    init: &mut dyn Initializer,
    plan: &ForecastPlan,
    accumulators: &mut [&mut dyn Accumulator],
    progress: Option<&dyn Fn(&ProgressSnapshot)>,
    ctx: &LogContext,
) -> Result<ForecastRun> {
    let start = Instant::now();
    let deadline = plan.time_limit.map(|limit| start + limit);
    let ranging_deadline = plan
        .time_limit
        .map(|limit| start + limit.mul_f64(plan.ranging_fraction.clamp(0.0, 1.0)));

    let ranging = RangingController::new(plan.ranging.clone()).run(init, ranging_deadline, ctx)?;
    if let Some(end) = plan.forecast_end.filter(|&end| !covers(ranging.range.tend, end)) {
        crate::log_event!(
            ctx,
            WARN,
            event_names::RANGING_TRUNCATED,
            Stage::Ranging,
            format!(
                "Ranged duration ends at {} days, before the last forecast bin at {} days",
                ranging.range.tend, end
            ),
            tend = ranging.range.tend,
            forecast_end = end
        );
    }

    let options = plan.simulation.clone().with_deadline(deadline);
    crate::log_event!(
        ctx,
        INFO,
        event_names::SIMULATE_STARTED,
        Stage::Simulate,
        format!("Simulating {} catalogs", options.num_catalogs),
        catalogs = options.num_catalogs,
        mag_min_sim = ranging.range.mag_min_sim,
        tend = ranging.range.tend
    );
    let result = EnsembleGenerator::new(options).run(init, accumulators, progress)?;
    let simulation = SimulationSummary::from(&result);

    match result.outcome {
        EnsembleOutcome::Aborted => {
            let message = result
                .error
                .map_or_else(|| "simulation aborted".to_string(), |e| e.to_string());
            crate::log_event!(
                ctx,
                ERROR,
                event_names::SIMULATE_FAILED,
                Stage::Simulate,
                message.clone(),
                completed = simulation.completed
            );
            return Err(Error::SimulationAbort { message });
        }
        EnsembleOutcome::TimedOut if simulation.completed < plan.min_sim_catalogs => {
            crate::log_event!(
                ctx,
                ERROR,
                event_names::SIMULATE_FAILED,
                Stage::Simulate,
                "Simulation timed out",
                completed = simulation.completed,
                required = plan.min_sim_catalogs
            );
            return Err(Error::SimulationTimeout {
                completed: simulation.completed,
                required: plan.min_sim_catalogs,
            });
        }
        EnsembleOutcome::TimedOut => {
            crate::log_event!(
                ctx,
                WARN,
                event_names::SIMULATE_FINISHED,
                Stage::Simulate,
                "Simulation stopped at the deadline with a partial ensemble",
                completed = simulation.completed,
                requested = simulation.requested
            );
        }
        EnsembleOutcome::Completed => {
            crate::log_event!(
                ctx,
                INFO,
                event_names::SIMULATE_FINISHED,
                Stage::Simulate,
                "Simulation complete",
                completed = simulation.completed,
                elapsed_ms = simulation.elapsed_ms
            );
        }
    }

    Ok(ForecastRun { ranging, simulation })
}
