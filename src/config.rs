//! Construction-time configuration for the Logger and Supervisor, carrying
//! the defaults spec.md §6 states, validated where the spec says
//! construction should fail rather than at arbitrary call sites.

pub use crate::logger::LoggerConfig;

/// Recognized supervisor options (spec.md §6): `retries`, `cleanup_timeout_ms`,
/// and a crash reporter (defaulted to a filesystem-backed sink by the
/// `Supervisor` constructor, not here, since the reporter is trait-object
/// state rather than plain data). `wait_time` is intentionally not modeled:
/// spec.md notes it is accepted but unused by the source and is not part of
/// this crate's observable behavior.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_retries: u32,
    pub cleanup_timeout_ms: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            cleanup_timeout_ms: 5_000,
        }
    }
}
