//! Local multi-process supervisor: readiness-gated dependency startup,
//! retrying main workloads, and ordered cleanup.
//!
//! The three collaborating pieces are [`logger::Logger`] (a bounded,
//! flag-tracking ring buffer of one process's output), [`process::ProcessUnit`]
//! (one managed child: spawn, readiness detection, retry/restart, graceful
//! stop), and [`supervisor::Supervisor`] (owns the dependency/main/cleanup
//! cohorts and orchestrates their lifecycle). [`crash_reporter`] is the
//! pluggable sink the supervisor reports into on crash.

#![warn(unused_crate_dependencies)]
#[cfg(test)]
use tempfile as _;
#[cfg(test)]
use tracing_subscriber as _;

/// Error taxonomy for the logger, process unit, and supervisor.
pub mod error;

/// Generic pub/sub used by log, process, and supervisor event streams.
pub mod listeners;

/// One-shot `ready`/`finished` completion signals.
pub mod completion;

/// Process Logger: bounded ring buffer with flag pattern tracking.
pub mod logger;

/// Process Unit: one managed child process and its state machine.
pub mod process;

/// Crash Reporter sink.
pub mod crash_reporter;

/// The Supervisor's typed event stream.
pub mod events;

/// Supervisor: owns the three cohorts and orchestrates their lifecycle.
pub mod supervisor;

/// Construction-time configuration for the Logger and Supervisor.
pub mod config;
