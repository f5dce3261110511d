//! Error taxonomy for the supervisor, its process units, and its logger.
//!
//! One enum per subsystem, `thiserror`-derived, mirroring the split the
//! teacher uses for `ProcessManagerError` / `PidFileError` / `ServiceStateError`.

use thiserror::Error;

/// Errors raised by `Logger` construction and accessors.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// `max_log_size` exceeds `max_buffer_size` at construction time.
    #[error(
        "max_log_size ({max_log_size}) must not exceed max_buffer_size ({max_buffer_size})"
    )]
    InvalidConfig {
        max_log_size: usize,
        max_buffer_size: usize,
    },

    /// `get_logs` was called with a negative `index` or `number_of_lines`.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Errors raised by a `ProcessUnit`.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// An operation was attempted from a status that forbids it.
    #[error("invalid state: {operation} is not valid while the process is {status}")]
    InvalidState {
        operation: &'static str,
        status: String,
    },

    /// The child could not be spawned.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// A readiness check exceeded its timeout without `pass_if_not_found`.
    #[error("ready check timed out after {timeout_ms}ms: {pattern}")]
    ReadyCheckTimeout { pattern: String, timeout_ms: u32 },

    /// The child reported an error, or exited abnormally, after becoming ready.
    #[error("process crashed: {0}")]
    RuntimeCrash(String),

    /// `send_stdin` was called but the process has no stdin pipe (already
    /// taken, or the process was never started with one).
    #[error("stdin is not available for this process")]
    StdinUnavailable,

    /// `send_stdin` was called while the process is not live.
    #[error("process is not running")]
    NotRunning,

    /// The underlying write to stdin failed.
    #[error("failed to write to stdin: {0}")]
    WriteFailed(std::io::Error),
}

/// Errors raised by the `Supervisor`.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// `start()` was called with no main processes configured.
    #[error("cannot start: no main processes are configured")]
    NoMainProcesses,

    /// `send_stdin` targeted an id not present in any cohort.
    #[error("process '{0}' not found")]
    ProcessNotFound(String),

    /// Propagated from a process unit the supervisor was driving.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Errors raised by a `CrashReporter` sink's `generate_report` step.
/// (`save_report` never fails observably, per spec.md §4.D.)
#[derive(Debug, Error)]
pub enum CrashReporterError {
    /// Failed to serialize a report for persistence.
    #[error("failed to serialize crash report: {0}")]
    Serialize(#[from] serde_json::Error),
}
