//! Error types for ETAS ensemble forecasting.
//!
//! Every failure the core can raise is one variant of [`Error`], carried in
//! an explicit [`Result`]. Each variant has:
//! - a stable numeric code for machine parsing
//! - a category for grouping
//! - a recoverability hint (timeouts and non-convergence may be retried by
//!   the caller with relaxed parameters; sizing errors and aborts may not)
//! - a remediation line for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Ranging Did Not Converge
//!   Reason: ranging did not converge at attempt 8: ratio 3.2 outside [0.8, 1.2]
//!   Fix: Relax the target catalog size or widen the magnitude bounds.
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 31,
//!   "category": "ranging",
//!   "message": "ranging did not converge at attempt 8: ...",
//!   "recoverable": true,
//!   "suggested_action": "relax_parameters",
//!   "context": { "attempt": 8, "range": { "tbegin": 0.0, ... } }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::params::CatalogRange;

/// Result type alias for ETAS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Configuration and argument validation.
    Config,
    /// Accumulator sizing and consumer protocol.
    Accumulation,
    /// Adaptive ranging.
    Ranging,
    /// Full-size simulation and worker threads.
    Simulation,
    /// Numerical failures in the rate kernels.
    Numerical,
    /// File I/O and serialization.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Accumulation => write!(f, "accumulation"),
            ErrorCategory::Ranging => write!(f, "ranging"),
            ErrorCategory::Simulation => write!(f, "simulation"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested follow-up for agents driving the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry unchanged, possibly with a longer time limit.
    Retry,
    /// Retry with a relaxed target or wider bounds.
    RelaxParameters,
    /// Run `etas-core check` on the configuration.
    RunCheck,
    /// An internal defect; report it with the logged context.
    ReportBug,
    /// Fix the environment (disk, permissions) by hand.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RelaxParameters => write!(f, "relax_parameters"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::ReportBug => write!(f, "report_bug"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration and validation errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid parameter {field}: {message}")]
    InvalidParameter { field: String, message: String },

    // Accumulation errors (20-29)
    #[error("accumulator capacity exceeded: slot {attempted} requested, capacity {capacity}")]
    CapacityExceeded { capacity: usize, attempted: usize },

    #[error("consumer protocol violation: {0}")]
    ConsumerState(String),

    // Ranging errors (30-39)
    #[error("ranging timed out before attempt {attempt}")]
    RangingTimeout {
        attempt: u32,
        range: Box<CatalogRange>,
    },

    #[error("ranging did not converge at attempt {attempt}: {reason}")]
    RangingNonConvergence {
        attempt: u32,
        reason: String,
        range: Box<CatalogRange>,
    },

    #[error("ranging aborted at attempt {attempt}: {message}")]
    RangingAbort { attempt: u32, message: String },

    // Simulation errors (40-49)
    #[error("simulation timed out: {completed} of {required} required catalogs completed")]
    SimulationTimeout { completed: u64, required: u64 },

    #[error("simulation aborted: {message}")]
    SimulationAbort { message: String },

    #[error("ensemble worker aborted: {message}")]
    ThreadAbort { message: String },

    // Numerical errors (50-59)
    #[error("numerical failure: {0}")]
    Numerical(String),

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidParameter {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Returns the stable error code.
    ///
    /// - 10-19: configuration and validation
    /// - 20-29: accumulation
    /// - 30-39: ranging
    /// - 40-49: simulation
    /// - 50-59: numerical
    /// - 60-69: I/O
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::InvalidParameter { .. } => 11,
            Error::CapacityExceeded { .. } => 20,
            Error::ConsumerState(_) => 21,
            Error::RangingTimeout { .. } => 30,
            Error::RangingNonConvergence { .. } => 31,
            Error::RangingAbort { .. } => 32,
            Error::SimulationTimeout { .. } => 40,
            Error::SimulationAbort { .. } => 41,
            Error::ThreadAbort { .. } => 42,
            Error::Numerical(_) => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::InvalidParameter { .. } => ErrorCategory::Config,
            Error::CapacityExceeded { .. } | Error::ConsumerState(_) => {
                ErrorCategory::Accumulation
            }
            Error::RangingTimeout { .. }
            | Error::RangingNonConvergence { .. }
            | Error::RangingAbort { .. } => ErrorCategory::Ranging,
            Error::SimulationTimeout { .. }
            | Error::SimulationAbort { .. }
            | Error::ThreadAbort { .. } => ErrorCategory::Simulation,
            Error::Numerical(_) => ErrorCategory::Numerical,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Whether the caller may retry, possibly with relaxed parameters.
    ///
    /// Aborts and sizing errors point at a defect and are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => true,
            Error::InvalidParameter { .. } => true,

            Error::CapacityExceeded { .. } => false,
            Error::ConsumerState(_) => false,

            Error::RangingTimeout { .. } => true,
            Error::RangingNonConvergence { .. } => true,
            Error::RangingAbort { .. } => false,

            Error::SimulationTimeout { .. } => true,
            Error::SimulationAbort { .. } => false,
            Error::ThreadAbort { .. } => false,

            Error::Numerical(_) => false,

            Error::Io(_) => true,
            Error::Json(_) => true,
        }
    }

    /// Returns the suggested action for agents.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::InvalidParameter { .. } => SuggestedAction::RunCheck,
            Error::CapacityExceeded { .. } | Error::ConsumerState(_) => SuggestedAction::ReportBug,
            Error::RangingTimeout { .. } | Error::SimulationTimeout { .. } => {
                SuggestedAction::Retry
            }
            Error::RangingNonConvergence { .. } => SuggestedAction::RelaxParameters,
            Error::RangingAbort { .. }
            | Error::SimulationAbort { .. }
            | Error::ThreadAbort { .. }
            | Error::Numerical(_) => SuggestedAction::ReportBug,
            Error::Io(_) | Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'etas-core check' to validate the configuration file."
            }
            Error::InvalidParameter { .. } => {
                "Correct the named parameter; 'etas-core config show' prints the resolved values."
            }
            Error::CapacityExceeded { .. } => {
                "More catalogs were scanned than the accumulator was sized for. Report this with the log."
            }
            Error::ConsumerState(_) => {
                "A consumer was opened twice or used while closed. Report this with the log."
            }
            Error::RangingTimeout { .. } => {
                "Increase the time limit or the ranging time fraction, or lower the ranging catalog count."
            }
            Error::RangingNonConvergence { .. } => {
                "Relax the target catalog size or widen the magnitude bounds."
            }
            Error::RangingAbort { .. } => {
                "A ranging worker failed. Rerun with '-v' and report the logged attempt state."
            }
            Error::SimulationTimeout { .. } => {
                "Increase the time limit or lower the minimum number of completed catalogs."
            }
            Error::SimulationAbort { .. } | Error::ThreadAbort { .. } => {
                "A simulation worker failed. Rerun with '-v' and report the logged range."
            }
            Error::Numerical(_) => {
                "A rate integral returned a non-finite value. Check p, c, b and the time range."
            }
            Error::Io(_) => {
                "Check file paths, permissions and disk space, then retry."
            }
            Error::Json(_) => {
                "Invalid JSON. Check syntax with 'jq . <file>'."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::InvalidParameter { .. } => "Invalid Parameter",
            Error::CapacityExceeded { .. } => "Accumulator Capacity Exceeded",
            Error::ConsumerState(_) => "Consumer Protocol Violation",
            Error::RangingTimeout { .. } => "Ranging Timeout",
            Error::RangingNonConvergence { .. } => "Ranging Did Not Converge",
            Error::RangingAbort { .. } => "Ranging Aborted",
            Error::SimulationTimeout { .. } => "Simulation Timeout",
            Error::SimulationAbort { .. } => "Simulation Aborted",
            Error::ThreadAbort { .. } => "Worker Thread Aborted",
            Error::Numerical(_) => "Numerical Failure",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }

    /// The last attempted range, for ranging failures that carry one.
    pub fn last_range(&self) -> Option<&CatalogRange> {
        match self {
            Error::RangingTimeout { range, .. } | Error::RangingNonConvergence { range, .. } => {
                Some(range.as_ref())
            }
            _ => None,
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the caller may retry.
    pub recoverable: bool,

    /// Suggested action for agents.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (attempt number, last range).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for ErrorReport {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::InvalidParameter { field, .. } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::CapacityExceeded {
                capacity,
                attempted,
            } => {
                context.insert("capacity".to_string(), serde_json::json!(capacity));
                context.insert("attempted".to_string(), serde_json::json!(attempted));
            }
            Error::RangingTimeout { attempt, range }
            | Error::RangingNonConvergence { attempt, range, .. } => {
                context.insert("attempt".to_string(), serde_json::json!(attempt));
                if let Ok(v) = serde_json::to_value(range.as_ref()) {
                    context.insert("range".to_string(), v);
                }
            }
            Error::RangingAbort { attempt, .. } => {
                context.insert("attempt".to_string(), serde_json::json!(attempt));
            }
            Error::SimulationTimeout {
                completed,
                required,
            } => {
                context.insert("completed".to_string(), serde_json::json!(completed));
                context.insert("required".to_string(), serde_json::json!(required));
            }
            _ => {}
        }

        ErrorReport {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl ErrorReport {
    /// Add additional context to the report.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }
}

/// Format an error for human-readable stderr output.
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range() -> CatalogRange {
        CatalogRange::default()
    }

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("x".into()).code(), 10);
        assert_eq!(
            Error::CapacityExceeded {
                capacity: 4,
                attempted: 4
            }
            .code(),
            20
        );
        assert_eq!(
            Error::RangingNonConvergence {
                attempt: 3,
                reason: "r".into(),
                range: Box::new(range())
            }
            .code(),
            31
        );
        assert_eq!(Error::ThreadAbort { message: "p".into() }.code(), 42);
    }

    #[test]
    fn test_timeout_and_non_convergence_are_distinct() {
        let timeout = Error::RangingTimeout {
            attempt: 2,
            range: Box::new(range()),
        };
        let stuck = Error::RangingNonConvergence {
            attempt: 2,
            reason: "ratio".into(),
            range: Box::new(range()),
        };
        assert_ne!(timeout.code(), stuck.code());
        assert_eq!(timeout.category(), stuck.category());
        assert_eq!(timeout.suggested_action(), SuggestedAction::Retry);
        assert_eq!(stuck.suggested_action(), SuggestedAction::RelaxParameters);
    }

    #[test]
    fn test_error_recoverable() {
        assert!(Error::SimulationTimeout {
            completed: 10,
            required: 100
        }
        .is_recoverable());
        assert!(!Error::ThreadAbort {
            message: "boom".into()
        }
        .is_recoverable());
        assert!(!Error::CapacityExceeded {
            capacity: 1,
            attempted: 1
        }
        .is_recoverable());
    }

    #[test]
    fn test_last_range() {
        let err = Error::RangingTimeout {
            attempt: 1,
            range: Box::new(range()),
        };
        assert_eq!(err.last_range(), Some(&range()));
        assert!(Error::Numerical("nan".into()).last_range().is_none());
    }

    #[test]
    fn test_report_carries_range_context() {
        let err = Error::RangingNonConvergence {
            attempt: 8,
            reason: "ratio 3.2 outside [0.8, 1.2]".into(),
            range: Box::new(range()),
        };
        let report = ErrorReport::from(&err);
        assert_eq!(report.code, 31);
        assert_eq!(report.category, ErrorCategory::Ranging);
        assert_eq!(report.context.get("attempt"), Some(&serde_json::json!(8)));
        assert!(report.context.contains_key("range"));

        let json = report.to_json();
        assert!(json.contains(r#""category":"ranging""#));
        assert!(json.contains(r#""suggested_action":"relax_parameters""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::invalid("c", "must be positive");
        let formatted = format_error_human(&err, false);
        assert!(formatted.contains("Invalid Parameter"));
        assert!(formatted.contains("invalid parameter c: must be positive"));
        assert!(formatted.contains("Fix:"));
    }

    #[test]
    fn test_display_forms() {
        assert_eq!(ErrorCategory::Accumulation.to_string(), "accumulation");
        assert_eq!(SuggestedAction::RelaxParameters.to_string(), "relax_parameters");
    }
}
