//! Forecast and ranging reports.
//!
//! A [`Report`] collects what a command produced (ranging history,
//! simulation counters, forecast tables, bin-size tables) and renders it as
//! JSON, Markdown or a one-line summary.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use etas_common::{OutputFormat, Result, SCHEMA_VERSION};
use serde::Serialize;

use crate::accum::{ForecastQuery, SimRangingAccumulator, TimeMagAccumulator};
use crate::ranging::{covers, RangingOutcome, SimulationSummary};

/// Count fractiles for every `[time][mag]` cell at one fractile level.
#[derive(Debug, Clone, Serialize)]
pub struct FractileTable {
    pub fractile: f64,
    /// `[time_bin][mag_bin]`, cumulative.
    pub counts: Vec<Vec<u64>>,
}

/// Forecast tables from a merged [`TimeMagAccumulator`].
#[derive(Debug, Clone, Serialize)]
pub struct ForecastTables {
    pub catalogs: u64,
    pub time_values: Vec<f64>,
    pub mag_values: Vec<f64>,
    pub fractiles: Vec<FractileTable>,
    /// Probability of at least one event, `[time_bin][mag_bin]`.
    pub prob_occur: Vec<Vec<f64>>,
    /// End of the simulated duration.
    pub simulated_tend: f64,
    /// Per time bin: false when the bin ends after `simulated_tend`, so
    /// its counts stop at `simulated_tend`.
    pub complete: Vec<bool>,
}

impl ForecastTables {
    /// Tables for catalogs simulated up to `simulated_tend`.
    pub fn from_accumulator(
        acc: &TimeMagAccumulator,
        fractiles: &[f64],
        simulated_tend: f64,
    ) -> Result<Self> {
        let complete = acc.time_values()[1..]
            .iter()
            .map(|&t_end| covers(simulated_tend, t_end))
            .collect();
        Ok(Self {
            catalogs: acc.get_size(),
            time_values: acc.time_values().to_vec(),
            mag_values: acc.mag_values().to_vec(),
            fractiles: fractiles
                .iter()
                .map(|&fractile| FractileTable {
                    fractile,
                    counts: acc.get_fractile_array(fractile),
                })
                .collect(),
            prob_occur: acc.get_prob_occur_array(0)?,
            simulated_tend,
            complete,
        })
    }

    pub fn is_truncated(&self) -> bool {
        self.complete.iter().any(|&c| !c)
    }
}

/// One row per time bin of a simulation-ranging ensemble.
#[derive(Debug, Clone, Serialize)]
pub struct BinRow {
    pub bin: usize,
    pub t_end: f64,
    /// Cumulative count at each requested fractile.
    pub counts: Vec<u64>,
    /// Catalogs that stopped before the end of this bin.
    pub stopped: u64,
}

/// Per-bin count fractiles from a [`SimRangingAccumulator`].
#[derive(Debug, Clone, Serialize)]
pub struct BinSizeTable {
    pub catalogs: u64,
    pub fractiles: Vec<f64>,
    pub rows: Vec<BinRow>,
    /// Catalog size at the median, when recorded.
    pub median_size: Option<f64>,
}

impl BinSizeTable {
    pub fn from_accumulator(acc: &SimRangingAccumulator, fractiles: &[f64]) -> Self {
        use crate::accum::Accumulator;

        let rows = (0..acc.bins())
            .map(|bin| BinRow {
                bin,
                t_end: acc.bin_end(bin),
                counts: fractiles
                    .iter()
                    .map(|&f| acc.get_bin_fractile(bin, f))
                    .collect(),
                stopped: acc.stopped_before(bin + 1),
            })
            .collect();
        Self {
            catalogs: acc.get_size(),
            fractiles: fractiles.to_vec(),
            rows,
            median_size: acc.catalog_size_fractile(0.5),
        }
    }
}

/// Everything one command reports.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub schema_version: String,
    pub command: String,
    pub run_id: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranging: Option<RangingOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<SimulationSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forecast: Option<ForecastTables>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bin_sizes: Option<BinSizeTable>,
}

impl Report {
    pub fn new(command: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            command: command.into(),
            run_id: run_id.into(),
            generated_at: Utc::now(),
            config_id: None,
            ranging: None,
            simulation: None,
            forecast: None,
            bin_sizes: None,
        }
    }

    pub fn with_config_id(mut self, id: impl Into<String>) -> Self {
        self.config_id = Some(id.into());
        self
    }

    pub fn with_ranging(mut self, ranging: RangingOutcome) -> Self {
        self.ranging = Some(ranging);
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationSummary) -> Self {
        self.simulation = Some(simulation);
        self
    }

    pub fn with_forecast(mut self, forecast: ForecastTables) -> Self {
        self.forecast = Some(forecast);
        self
    }

    pub fn with_bin_sizes(mut self, table: BinSizeTable) -> Self {
        self.bin_sizes = Some(table);
        self
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Md => Ok(self.to_markdown()),
            OutputFormat::Summary => Ok(self.to_summary()),
        }
    }

    /// One line: run, range and catalog counts.
    pub fn to_summary(&self) -> String {
        let mut parts = vec![format!("[{}] {}", self.run_id, self.command)];
        if let Some(r) = &self.ranging {
            parts.push(format!(
                "range {} attempts={} mag=[{:.2},{:.2}] t=[{},{}]",
                r.method,
                r.attempts.len(),
                r.range.mag_min_sim,
                r.range.mag_max_sim,
                r.range.tbegin,
                r.range.tend
            ));
        }
        if let Some(s) = &self.simulation {
            parts.push(format!(
                "catalogs {}/{} in {}ms ({:?})",
                s.completed, s.requested, s.elapsed_ms, s.outcome
            ));
        }
        if let Some(f) = &self.forecast {
            if let (Some(row), Some(&m)) = (f.prob_occur.last(), f.mag_values.first()) {
                if let Some(p) = row.first() {
                    parts.push(format!("P(M>={m}) = {p:.4}"));
                }
            }
            if f.is_truncated() {
                parts.push(format!("truncated at t={}", f.simulated_tend));
            }
        }
        parts.join(" | ")
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# ETAS {}", self.command);
        let _ = writeln!(out);
        let _ = writeln!(out, "- run: `{}`", self.run_id);
        let _ = writeln!(out, "- generated: {}", self.generated_at.to_rfc3339());
        if let Some(id) = &self.config_id {
            let _ = writeln!(out, "- config: `{}`", id);
        }

        if let Some(r) = &self.ranging {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Ranging ({})", r.method);
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "Final range: M {:.2} to {:.2}, t {} to {} days ({} ms)",
                r.range.mag_min_sim, r.range.mag_max_sim, r.range.tbegin, r.range.tend, r.elapsed_ms
            );
            if !r.attempts.is_empty() {
                let _ = writeln!(out);
                let _ = writeln!(out, "| Attempt | mag_min | mag_max | tend | catalogs | size | survival tend | ratio |");
                let _ = writeln!(out, "|---|---|---|---|---|---|---|---|");
                for a in &r.attempts {
                    let _ = writeln!(
                        out,
                        "| {} | {:.2} | {:.2} | {} | {} | {} | {} | {:.3} |",
                        a.attempt,
                        a.range.mag_min_sim,
                        a.range.mag_max_sim,
                        a.range.tend,
                        a.completed,
                        a.size_at_fractile,
                        a.survival_tend,
                        a.ratio
                    );
                }
            }
        }

        if let Some(s) = &self.simulation {
            let _ = writeln!(out);
            let _ = writeln!(out, "## Simulation");
            let _ = writeln!(out);
            let _ = writeln!(
                out,
                "{} of {} catalogs, {} threads, {} ms, seed {} ({:?})",
                s.completed, s.requested, s.threads, s.elapsed_ms, s.base_seed, s.outcome
            );
        }

        if let Some(f) = &self.forecast {
            write_forecast_markdown(&mut out, f);
        }
        if let Some(t) = &self.bin_sizes {
            write_bin_sizes_markdown(&mut out, t);
        }
        out
    }
}

fn time_label(f: &ForecastTables, bin: usize) -> String {
    let mark = if f.complete.get(bin).copied().unwrap_or(true) { "" } else { "*" };
    format!("{}-{}{mark}", f.time_values[0], f.time_values[bin + 1])
}

fn write_forecast_markdown(out: &mut String, f: &ForecastTables) {
    let header: String = f.mag_values.iter().map(|m| format!(" M>={m} |")).collect();
    let rule: String = f.mag_values.iter().map(|_| "---|").collect();

    for table in &f.fractiles {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Count at fractile {}", table.fractile);
        let _ = writeln!(out);
        let _ = writeln!(out, "| Days |{header}");
        let _ = writeln!(out, "|---|{rule}");
        for (i, row) in table.counts.iter().enumerate() {
            let cells: String = row.iter().map(|c| format!(" {c} |")).collect();
            let _ = writeln!(out, "| {} |{cells}", time_label(f, i));
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## Probability of at least one event ({} catalogs)", f.catalogs);
    let _ = writeln!(out);
    let _ = writeln!(out, "| Days |{header}");
    let _ = writeln!(out, "|---|{rule}");
    for (i, row) in f.prob_occur.iter().enumerate() {
        let cells: String = row.iter().map(|p| format!(" {p:.4} |")).collect();
        let _ = writeln!(out, "| {} |{cells}", time_label(f, i));
    }

    if f.is_truncated() {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "\\* Simulated only to t = {} days; counts in these rows stop there.",
            f.simulated_tend
        );
    }
}

fn write_bin_sizes_markdown(out: &mut String, t: &BinSizeTable) {
    let _ = writeln!(out);
    let _ = writeln!(out, "## Cumulative counts per bin ({} catalogs)", t.catalogs);
    if let Some(m) = t.median_size {
        let _ = writeln!(out);
        let _ = writeln!(out, "Median catalog size: {m}");
    }
    let _ = writeln!(out);
    let header: String = t.fractiles.iter().map(|f| format!(" {:.0}% |", f * 100.0)).collect();
    let rule: String = t.fractiles.iter().map(|_| "---|").collect();
    let _ = writeln!(out, "| Bin | t_end |{header} stopped |");
    let _ = writeln!(out, "|---|---|{rule}---|");
    for row in &t.rows {
        let cells: String = row.counts.iter().map(|c| format!(" {c} |")).collect();
        let _ = writeln!(out, "| {} | {} |{cells} {} |", row.bin, row.t_end, row.stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::EnsembleOutcome;

    fn tables() -> ForecastTables {
        ForecastTables {
            catalogs: 4,
            time_values: vec![0.0, 1.0, 7.0],
            mag_values: vec![3.0, 5.0],
            fractiles: vec![FractileTable {
                fractile: 0.5,
                counts: vec![vec![3, 0], vec![8, 1]],
            }],
            prob_occur: vec![vec![0.75, 0.0], vec![1.0, 0.25]],
            simulated_tend: 7.0,
            complete: vec![true, true],
        }
    }

    fn summary() -> SimulationSummary {
        SimulationSummary {
            outcome: EnsembleOutcome::Completed,
            completed: 4,
            requested: 4,
            elapsed_ms: 12,
            threads: 2,
            base_seed: 7,
        }
    }

    #[test]
    fn test_json_skips_missing_sections() {
        let report = Report::new("simulate", "run-1").with_simulation(summary());
        let json = report.render(OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["simulation"]["completed"], 4);
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert!(value.get("ranging").is_none());
        assert!(value.get("forecast").is_none());
    }

    #[test]
    fn test_markdown_tables() {
        let md = Report::new("forecast", "run-1")
            .with_simulation(summary())
            .with_forecast(tables())
            .to_markdown();
        assert!(md.contains("## Count at fractile 0.5"));
        assert!(md.contains("| Days | M>=3 | M>=5 |"));
        assert!(md.contains("| 0-7 | 8 | 1 |"));
        assert!(md.contains("| 0-1 | 0.7500 | 0.0000 |"));
    }

    #[test]
    fn test_truncated_bins_are_marked() {
        let mut f = tables();
        f.simulated_tend = 3.5;
        f.complete = vec![true, false];
        assert!(f.is_truncated());

        let report = Report::new("forecast", "run-2").with_forecast(f);
        let md = report.to_markdown();
        assert!(md.contains("| 0-1 | 3 | 0 |"));
        assert!(md.contains("| 0-7* | 8 | 1 |"));
        assert!(md.contains("Simulated only to t = 3.5 days"));
        assert!(report.to_summary().contains("truncated at t=3.5"));

        let json: serde_json::Value =
            serde_json::from_str(&report.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(json["forecast"]["complete"], serde_json::json!([true, false]));
    }

    #[test]
    fn test_summary_line() {
        let line = Report::new("forecast", "run-9")
            .with_simulation(summary())
            .with_forecast(tables())
            .to_summary();
        assert!(line.starts_with("[run-9] forecast"));
        assert!(line.contains("catalogs 4/4"));
        assert!(line.contains("P(M>=3) = 1.0000"));
    }
}
