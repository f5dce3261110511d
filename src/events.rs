//! The Supervisor's typed event stream (spec.md §6). A tagged enum with a
//! single emit sink, per the "dynamic `process:any-event` fanout" guidance
//! in spec.md §9. Consumers match on the tag instead of subscribing to a
//! channel per event name.

use serde::{Deserialize, Serialize};

use crate::process::ProcessStatus;

/// `Dependency | Main | Cleanup`, spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cohort {
    Dependency,
    Main,
    Cleanup,
}

/// One emitted supervisor event. Field names follow the payload shapes in
/// spec.md §6's event table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SupervisorEvent {
    ManagerStarted { timestamp: String },
    ManagerStopping { timestamp: String },
    ManagerStopped { timestamp: String },
    ManagerRestarting { timestamp: String },

    ProcessAdded { id: String, cohort: Cohort, timestamp: String },
    ProcessRemoved { id: String, cohort: Cohort, timestamp: String },
    ProcessStarted { id: String, cohort: Cohort, timestamp: String },
    ProcessReady { id: String, cohort: Cohort, timestamp: String },
    ProcessStopped {
        id: String,
        cohort: Cohort,
        exit_code: Option<i32>,
        signal: Option<i32>,
        timestamp: String,
    },
    ProcessCrashed {
        id: String,
        cohort: Cohort,
        error: String,
        retry_count: Option<u32>,
        timestamp: String,
    },
    ProcessRestarting { id: String, cohort: Cohort, timestamp: String },
    ProcessLog {
        id: String,
        cohort: Cohort,
        message: String,
        is_error: bool,
        timestamp: String,
    },

    DependencyFailed { id: String, error: String, timestamp: String },

    CleanupStarted { timestamp: String },
    CleanupFinished { timestamp: String },
    CleanupTimeout { id: String, error: String, timestamp: String },

    StatusMessage { message: String, timestamp: String },
    StateUpdate { snapshot: StateSnapshot, timestamp: String },
}

/// `{cohort_maps_snapshot}` from the `state:update` event, a read-only
/// accounting of which ids are in which cohort and their current status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub dependencies: Vec<(String, ProcessStatus)>,
    pub main: Vec<(String, ProcessStatus)>,
    pub cleanup: Vec<(String, ProcessStatus)>,
}

pub(crate) fn now_iso8601() -> String {
    chrono::Utc::now().to_rfc3339()
}
