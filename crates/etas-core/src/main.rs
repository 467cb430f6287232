//! ETAS Aftershock Ensemble Core
//!
//! The main entry point for etas-core, handling:
//! - Adaptive ranging of the simulation range
//! - Ensemble simulation and forecast tables
//! - Branch ratio conversion
//! - Configuration checks and inspection

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use etas_common::{format_error_human, Error, ErrorReport, OutputFormat, SCHEMA_VERSION};
use etas_core::accum::{SimRangingAccumulator, TimeMagAccumulator};
use etas_core::config::{
    self, build_initializer, catalog_params, forecast_plan, load_config, productivity_a,
    ConfigOptions, ConfigSource, PresetName, ResolvedConfig,
};
use etas_core::ensemble::{EnsembleGenerator, EnsembleOptions, EnsembleOutcome, ProgressSnapshot};
use etas_core::events::{JsonlWriter, Phase, ProgressEmitter, ProgressEvent, RunEmitter};
use etas_core::exit_codes::ExitCode;
use etas_core::logging::{
    event_names, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use etas_core::ranging::{run_forecast, RangingController, RangingMethod, SimulationSummary};
use etas_core::report::{BinSizeTable, ForecastTables, Report};
use etas_math::branch_ratio;

/// ETAS aftershock ensemble forecasting
#[derive(Parser)]
#[command(name = "etas-core")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Forecast configuration file (JSON, or TOML by extension)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Configuration preset applied over the file
    #[arg(long, global = true)]
    preset: Option<PresetName>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Worker threads (0 = available parallelism)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Base random seed; fixes every catalog's random stream
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Write ensemble progress events as JSONL on stderr
    #[arg(long, global = true)]
    progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Range, simulate, and print forecast tables
    Forecast(ForecastArgs),

    /// Run adaptive ranging only and print the attempt history
    Range(RangeArgs),

    /// Simulate a fixed-range ensemble and print per-bin count fractiles
    Simulate(SimulateArgs),

    /// Convert between branch ratio and productivity
    BranchRatio(BranchRatioArgs),

    /// Validate configuration
    Check,

    /// Configuration management
    Config(ConfigArgs),

    /// Print version information
    Version,
}

// ============================================================================
// Command argument structs
// ============================================================================

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Simulation,
    SeedEstimate,
    None,
}

impl From<MethodArg> for RangingMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Simulation => RangingMethod::Simulation,
            MethodArg::SeedEstimate => RangingMethod::SeedEstimate,
            MethodArg::None => RangingMethod::None,
        }
    }
}

#[derive(Args, Debug)]
struct ForecastArgs {
    /// Catalogs in the full simulation
    #[arg(long)]
    catalogs: Option<u64>,

    /// Ranging method
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Total time limit in seconds (0 = none)
    #[arg(long)]
    time_limit: Option<f64>,
}

#[derive(Args, Debug)]
struct RangeArgs {
    /// Catalogs per ranging attempt
    #[arg(long)]
    catalogs: Option<u64>,

    /// Ranging method
    #[arg(long, value_enum)]
    method: Option<MethodArg>,

    /// Target catalog size
    #[arg(long)]
    target: Option<u64>,

    /// Time limit in seconds (0 = none)
    #[arg(long)]
    time_limit: Option<f64>,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Catalogs to simulate
    #[arg(long, default_value_t = 1_000)]
    catalogs: u64,

    /// Equal time bins spanning the configured range
    #[arg(long, default_value_t = 50)]
    bins: usize,

    /// Time limit in seconds (0 = none)
    #[arg(long)]
    time_limit: Option<f64>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("value").required(true).args(["n", "a"])))]
struct BranchRatioArgs {
    /// Branch ratio to convert to productivity
    #[arg(long)]
    n: Option<f64>,

    /// Productivity (log10) to convert to branch ratio
    #[arg(long, allow_negative_numbers = true)]
    a: Option<f64>,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration and its snapshot
    Show,
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(log_level, cli.global.log_format));

    let ctx = LogContext::for_current_run();
    etas_core::log_event!(
        ctx,
        DEBUG,
        event_names::RUN_STARTED,
        Stage::Init,
        "etas-core started",
        version = env!("CARGO_PKG_VERSION")
    );

    let exit_code = match &cli.command {
        Commands::Forecast(args) => run_forecast_cmd(&cli.global, &ctx, args),
        Commands::Range(args) => run_range(&cli.global, &ctx, args),
        Commands::Simulate(args) => run_simulate(&cli.global, &ctx, args),
        Commands::BranchRatio(args) => run_branch_ratio(&cli.global, &ctx, args),
        Commands::Check => run_check(&cli.global, &ctx),
        Commands::Config(args) => match args.command {
            ConfigCommands::Show => run_config_show(&cli.global, &ctx),
        },
        Commands::Version => {
            print_version(&cli.global);
            ExitCode::Clean
        }
    };

    etas_core::log_event!(
        ctx,
        DEBUG,
        event_names::RUN_FINISHED,
        Stage::Report,
        "etas-core finished",
        exit_code = exit_code.as_i32()
    );
    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Shared helpers
// ============================================================================

fn load(global: &GlobalOpts, ctx: &LogContext) -> Result<ResolvedConfig, ExitCode> {
    let options = ConfigOptions {
        config_path: global.config.clone(),
        preset: global.preset,
    };
    match load_config(&options) {
        Ok(resolved) => {
            match &resolved.location.path {
                Some(path) => etas_core::log_event!(
                    ctx,
                    INFO,
                    event_names::CONFIG_LOADED,
                    Stage::Init,
                    format!("Loaded config from {}", path.display()),
                    source = tracing::field::display(&resolved.location.source)
                ),
                None => etas_core::log_event!(
                    ctx,
                    DEBUG,
                    event_names::CONFIG_DEFAULT_USED,
                    Stage::Init,
                    "No config file found, using built-in defaults"
                ),
            }
            Ok(resolved)
        }
        Err(e) => {
            etas_core::log_event!(
                ctx,
                ERROR,
                event_names::CONFIG_ERROR,
                Stage::Init,
                e.to_string()
            );
            Err(output_config_error(global, &e))
        }
    }
}

fn progress_emitter(global: &GlobalOpts) -> Option<JsonlWriter<std::io::Stderr>> {
    global.progress.then(|| JsonlWriter::new(std::io::stderr()))
}

fn time_limit_override(limit: Option<f64>) -> Option<Option<Duration>> {
    limit.map(|secs| (secs > 0.0).then(|| Duration::from_secs_f64(secs)))
}

fn print_report(global: &GlobalOpts, ctx: &LogContext, report: &Report) -> ExitCode {
    match report.render(global.format) {
        Ok(text) => {
            println!("{}", text);
            etas_core::log_event!(
                ctx,
                DEBUG,
                event_names::REPORT_WRITTEN,
                Stage::Report,
                format!("{} report written", report.command),
                format = tracing::field::display(global.format)
            );
            ExitCode::Clean
        }
        Err(e) => output_error(global, ctx, &e),
    }
}

fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

fn output_error(global: &GlobalOpts, ctx: &LogContext, error: &Error) -> ExitCode {
    let exit_code = ExitCode::from_error(error);
    etas_core::log_event!(
        ctx,
        ERROR,
        event_names::INTERNAL_ERROR,
        Stage::Report,
        error.to_string(),
        code = error.code(),
        exit_code = exit_code.as_i32()
    );

    match global.format {
        OutputFormat::Json => {
            let report = ErrorReport::from(error)
                .with_context("run_id", &ctx.run_id)
                .with_context("exit_code", exit_code.code_name());
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "status": "error",
                "error": report,
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_else(|_| report.to_json())
            );
        }
        OutputFormat::Summary => {
            eprintln!("[{}] error: {}", ctx.run_id, error);
        }
        OutputFormat::Md => {
            eprintln!("{}", format_error_human(error, false));
        }
    }

    exit_code
}

fn output_config_error(global: &GlobalOpts, error: &config::ConfigError) -> ExitCode {
    let exit_code = match error {
        config::ConfigError::NotFound { .. } => ExitCode::ArgsError,
        config::ConfigError::Invalid { .. } => ExitCode::ConfigError,
        config::ConfigError::VersionMismatch { .. } => ExitCode::VersionError,
    };

    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "status": "error",
                "error": {
                    "code": exit_code.as_i32(),
                    "kind": exit_code.code_name(),
                    "message": error.to_string(),
                }
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string())
            );
        }
        OutputFormat::Summary => {
            eprintln!("config error: {}", error);
        }
        OutputFormat::Md => {
            eprintln!("# Configuration Error");
            eprintln!();
            eprintln!("Error: {}", error);
        }
    }

    exit_code
}

// ============================================================================
// Command implementations
// ============================================================================

fn run_forecast_cmd(global: &GlobalOpts, ctx: &LogContext, args: &ForecastArgs) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let cfg = &resolved.config;

    let mut plan = forecast_plan(cfg, global.threads, global.seed);
    if let Some(n) = args.catalogs {
        plan.simulation.num_catalogs = n;
        plan.min_sim_catalogs = plan.min_sim_catalogs.min(n);
    }
    if let Some(method) = args.method {
        plan.ranging.method = method.into();
    }
    if let Some(limit) = time_limit_override(args.time_limit) {
        plan.time_limit = limit;
    }

    let result = build_initializer(cfg).and_then(|mut init| {
        let mut acc = TimeMagAccumulator::new(cfg.bins.time_values.clone(), cfg.bins.mag_values.clone())?;
        let emitter = progress_emitter(global);
        let run_emitter = emitter
            .as_ref()
            .map(|e| RunEmitter::new(ctx.run_id.clone(), e as &dyn ProgressEmitter));
        let on_progress = |snapshot: &ProgressSnapshot| {
            if let Some(e) = &run_emitter {
                e.emit(ProgressEvent::from_snapshot(Phase::Simulate, snapshot));
            }
        };
        let progress: Option<&dyn Fn(&ProgressSnapshot)> =
            run_emitter.is_some().then_some(&on_progress as &dyn Fn(&ProgressSnapshot));

        let run = run_forecast(&mut init, &plan, &mut [&mut acc], progress, ctx)?;
        let tables = ForecastTables::from_accumulator(&acc, &cfg.bins.fractiles, run.ranging.range.tend)?;
        Ok((run, tables))
    });

    match result {
        Ok((run, tables)) => {
            let partial = run.simulation.outcome == EnsembleOutcome::TimedOut;
            let report = Report::new("forecast", &ctx.run_id)
                .with_config_id(resolved.snapshot().short_id())
                .with_ranging(run.ranging)
                .with_simulation(run.simulation)
                .with_forecast(tables);
            match print_report(global, ctx, &report) {
                ExitCode::Clean if partial => ExitCode::PartialEnsemble,
                code => code,
            }
        }
        Err(e) => output_error(global, ctx, &e),
    }
}

fn run_range(global: &GlobalOpts, ctx: &LogContext, args: &RangeArgs) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let cfg = &resolved.config;

    let plan = forecast_plan(cfg, global.threads, global.seed);
    let mut options = plan.ranging;
    if let Some(n) = args.catalogs {
        options.num_catalogs = n;
    }
    if let Some(method) = args.method {
        options.method = method.into();
    }
    if let Some(target) = args.target {
        options.target_size = target;
    }
    let limit = time_limit_override(args.time_limit).unwrap_or(plan.time_limit);
    let deadline = limit.map(|l| Instant::now() + l);

    let result = build_initializer(cfg)
        .and_then(|mut init| RangingController::new(options).run(&mut init, deadline, ctx));

    match result {
        Ok(outcome) => {
            let report = Report::new("range", &ctx.run_id)
                .with_config_id(resolved.snapshot().short_id())
                .with_ranging(outcome);
            print_report(global, ctx, &report)
        }
        Err(e) => output_error(global, ctx, &e),
    }
}

fn run_simulate(global: &GlobalOpts, ctx: &LogContext, args: &SimulateArgs) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let cfg = &resolved.config;
    if args.bins == 0 {
        return output_error(global, ctx, &Error::invalid("bins", "must be positive"));
    }

    let threads = global.threads.unwrap_or(cfg.ensemble.num_threads);
    let mut options = EnsembleOptions::new(args.catalogs)
        .with_threads(threads)
        .with_seed(global.seed.or(cfg.ensemble.seed))
        .with_progress_interval(Duration::from_millis(cfg.ensemble.progress_interval_ms.max(1)));
    if let Some(Some(limit)) = time_limit_override(args.time_limit) {
        options = options.with_deadline(Some(Instant::now() + limit));
    }

    let result = build_initializer(cfg).and_then(|mut init| {
        let range = &cfg.range;
        let mut acc = SimRangingAccumulator::new(SimRangingAccumulator::uniform_bins(
            range.tbegin,
            range.tend,
            args.bins,
        ))?;
        let emitter = progress_emitter(global);
        let on_progress = |snapshot: &ProgressSnapshot| {
            if let Some(e) = &emitter {
                e.emit(ProgressEvent::from_snapshot(Phase::Simulate, snapshot).with_run_id(&ctx.run_id));
            }
        };
        let progress: Option<&dyn Fn(&ProgressSnapshot)> =
            emitter.is_some().then_some(&on_progress as &dyn Fn(&ProgressSnapshot));

        etas_core::log_event!(
            ctx,
            INFO,
            event_names::SIMULATE_STARTED,
            Stage::Simulate,
            format!("Simulating {} catalogs", args.catalogs),
            catalogs = args.catalogs,
            bins = args.bins
        );
        let result = EnsembleGenerator::new(options).run(&mut init, &mut [&mut acc], progress)?;
        if result.outcome == EnsembleOutcome::Aborted {
            let message = result
                .error
                .as_ref()
                .map_or_else(|| "simulation aborted".to_string(), |e| e.to_string());
            return Err(Error::SimulationAbort { message });
        }
        let table = BinSizeTable::from_accumulator(&acc, &cfg.bins.fractiles);
        Ok((SimulationSummary::from(&result), table))
    });

    match result {
        Ok((summary, table)) => {
            let partial = summary.outcome == EnsembleOutcome::TimedOut;
            let report = Report::new("simulate", &ctx.run_id)
                .with_config_id(resolved.snapshot().short_id())
                .with_simulation(summary)
                .with_bin_sizes(table);
            match print_report(global, ctx, &report) {
                ExitCode::Clean if partial => ExitCode::PartialEnsemble,
                code => code,
            }
        }
        Err(e) => output_error(global, ctx, &e),
    }
}

fn run_branch_ratio(global: &GlobalOpts, ctx: &LogContext, args: &BranchRatioArgs) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let mut model = resolved.config.model.clone();
    model.a = args.a;
    model.branch_ratio = args.n;

    let a = match productivity_a(&model) {
        Ok(a) => a,
        Err(e) => return output_error(global, ctx, &e),
    };
    let n = branch_ratio(a, model.p, model.c, model.b, model.alpha, model.mref, model.msup, model.tint);

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "a": a,
            "branch_ratio": n,
            "input": if args.n.is_some() { "branch_ratio" } else { "a" },
            "params": {
                "p": model.p,
                "c": model.c,
                "b": model.b,
                "alpha": model.alpha,
                "mref": model.mref,
                "msup": model.msup,
                "tint": model.tint,
            },
        })),
        OutputFormat::Summary => println!("a = {a:.6} | n = {n:.6}"),
        OutputFormat::Md => {
            println!("# Branch Ratio");
            println!();
            println!("| a | n | p | c | b | alpha | tint |");
            println!("|---|---|---|---|---|---|---|");
            println!(
                "| {:.6} | {:.6} | {} | {} | {} | {} | {} |",
                a, n, model.p, model.c, model.b, model.alpha, model.tint
            );
        }
    }
    ExitCode::Clean
}

fn run_check(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let cfg = &resolved.config;

    let mut results: Vec<serde_json::Value> = Vec::new();
    let mut all_ok = true;

    let mut push = |name: &str, outcome: Result<serde_json::Value, Error>| match outcome {
        Ok(details) => results.push(serde_json::json!({
            "check": name,
            "status": "ok",
            "details": details,
        })),
        Err(e) => {
            all_ok = false;
            results.push(serde_json::json!({
                "check": name,
                "status": "error",
                "error": e.to_string(),
            }));
        }
    };

    push(
        "config",
        Ok(serde_json::json!({
            "source": resolved.location.source.to_string(),
            "path": resolved.location.path.as_ref().map(|p| p.display().to_string()),
            "using_defaults": resolved.location.source == ConfigSource::BuiltinDefault,
        })),
    );
    push(
        "model",
        catalog_params(&cfg.model, &cfg.range).map(|p| serde_json::json!({ "a": p.a })),
    );
    push(
        "bins",
        TimeMagAccumulator::new(cfg.bins.time_values.clone(), cfg.bins.mag_values.clone()).map(|_| {
            serde_json::json!({
                "time_bins": cfg.bins.time_values.len() - 1,
                "mag_bins": cfg.bins.mag_values.len(),
            })
        }),
    );
    push(
        "seeds",
        build_initializer(cfg).map(|_| serde_json::json!({ "count": cfg.model.seeds.len() })),
    );

    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "run_id": ctx.run_id,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": if all_ok { "ok" } else { "error" },
        "checks": results,
    });

    match global.format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Summary => {
            println!("[{}] check: {}", ctx.run_id, if all_ok { "OK" } else { "FAILED" });
        }
        OutputFormat::Md => {
            println!("# Configuration Check");
            println!();
            for r in &results {
                println!("- {}: {}", r["check"].as_str().unwrap_or("?"), r["status"].as_str().unwrap_or("?"));
                if let Some(err) = r["error"].as_str() {
                    println!("  - {}", err);
                }
            }
        }
    }

    if all_ok {
        ExitCode::Clean
    } else {
        ExitCode::ConfigError
    }
}

fn run_config_show(global: &GlobalOpts, ctx: &LogContext) -> ExitCode {
    let resolved = match load(global, ctx) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let snapshot = resolved.snapshot();

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "snapshot": snapshot,
            "config": resolved.config,
        })),
        OutputFormat::Summary => println!(
            "config {} from {} ({})",
            snapshot.short_id(),
            snapshot.config_source,
            snapshot.config_path.as_deref().unwrap_or("defaults")
        ),
        OutputFormat::Md => {
            println!("# Configuration");
            println!();
            println!("- id: `{}`", snapshot.short_id());
            println!("- source: {}", snapshot.config_source);
            if let Some(path) = &snapshot.config_path {
                println!("- path: `{}`", path);
            }
            if let Some(preset) = &snapshot.preset {
                println!("- preset: {}", preset);
            }
            let s = &snapshot.summary;
            println!();
            println!("| p | c | b | alpha | seeds | catalogs | ranging | target |");
            println!("|---|---|---|---|---|---|---|---|");
            println!(
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                s.p, s.c, s.b, s.alpha, s.seed_count, s.num_catalogs, s.ranging_method, s.target_size
            );
        }
    }
    ExitCode::Clean
}

fn print_version(global: &GlobalOpts) {
    let version_info = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "config_schema_version": config::CONFIG_SCHEMA_VERSION,
        "etas_core_version": env!("CARGO_PKG_VERSION"),
        "rust_version": env!("CARGO_PKG_RUST_VERSION"),
    });

    match global.format {
        OutputFormat::Json => print_json(&version_info),
        _ => {
            println!("etas-core {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
        }
    }
}
