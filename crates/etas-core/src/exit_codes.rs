//! Exit codes for the etas-core CLI.
//!
//! Exit code ranges:
//! - 0-9: operational outcomes (parse the outcome from the code, not output)
//! - 10-19: user/environment errors, fixable by changing the input
//! - 20-29: internal errors, worth reporting

use etas_common::Error;

/// Exit codes for etas-core operations.
///
/// A stable contract for automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Operational outcomes (0-9)
    // ========================================================================
    /// Every requested catalog completed.
    Clean = 0,

    /// The deadline cut the ensemble short, but enough catalogs completed.
    PartialEnsemble = 1,

    // ========================================================================
    // User / environment errors (10-19)
    // ========================================================================
    /// Invalid arguments or parameter values.
    ArgsError = 10,

    /// Configuration file missing, unreadable or invalid.
    ConfigError = 11,

    /// Configuration schema version mismatch.
    VersionError = 13,

    /// Ranging ran out of time.
    RangingTimeout = 14,

    /// Ranging did not converge within its budget.
    NonConvergence = 15,

    /// Too few catalogs completed before the deadline.
    SimulationTimeout = 16,

    // ========================================================================
    // Internal errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report).
    InternalError = 20,

    /// I/O error.
    IoError = 21,

    /// A worker thread failed and the ensemble was abandoned.
    WorkerAbort = 22,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Codes 0-9.
    pub fn is_operational(self) -> bool {
        (self as i32) < 10
    }

    /// Codes 10-19.
    pub fn is_user_error(self) -> bool {
        (10..20).contains(&(self as i32))
    }

    /// Codes 20 and above.
    pub fn is_internal_error(self) -> bool {
        (self as i32) >= 20
    }

    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Code name for JSON output.
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PartialEnsemble => "OK_PARTIAL",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::ConfigError => "ERR_CONFIG",
            ExitCode::VersionError => "ERR_VERSION",
            ExitCode::RangingTimeout => "ERR_RANGING_TIMEOUT",
            ExitCode::NonConvergence => "ERR_NON_CONVERGENCE",
            ExitCode::SimulationTimeout => "ERR_SIMULATION_TIMEOUT",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::WorkerAbort => "ERR_WORKER_ABORT",
        }
    }

    /// Map a core error onto its exit code.
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::InvalidParameter { .. } => ExitCode::ArgsError,
            Error::Config(_) | Error::Json(_) => ExitCode::ConfigError,
            Error::RangingTimeout { .. } => ExitCode::RangingTimeout,
            Error::RangingNonConvergence { .. } => ExitCode::NonConvergence,
            Error::SimulationTimeout { .. } => ExitCode::SimulationTimeout,
            Error::RangingAbort { .. } | Error::SimulationAbort { .. } | Error::ThreadAbort { .. } => {
                ExitCode::WorkerAbort
            }
            Error::Io(_) => ExitCode::IoError,
            Error::CapacityExceeded { .. } | Error::ConsumerState(_) | Error::Numerical(_) => {
                ExitCode::InternalError
            }
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
