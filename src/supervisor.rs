//! Supervisor: owns the three ordered cohorts and orchestrates their
//! lifecycle. See spec.md §4.E.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use nix::sys::signal::Signal;
use tracing::warn;

use crate::config::SupervisorConfig;
use crate::crash_reporter::{CohortKind, CrashKind, CrashReporter, FsCrashReporter, ReportContext};
use crate::error::SupervisorError;
use crate::events::{now_iso8601, Cohort, StateSnapshot, SupervisorEvent};
use crate::listeners::{Listeners, SubscriptionToken};
use crate::process::ProcessUnit;

fn cohort_kind(cohort: Cohort) -> CohortKind {
    match cohort {
        Cohort::Dependency => CohortKind::Dependency,
        Cohort::Main => CohortKind::Main,
        Cohort::Cleanup => CohortKind::Cleanup,
    }
}

type Teardown = Box<dyn FnOnce() + Send>;

struct Inner {
    config: SupervisorConfig,
    dependencies: Mutex<HashMap<String, ProcessUnit>>,
    main: Mutex<HashMap<String, ProcessUnit>>,
    cleanup: Mutex<HashMap<String, ProcessUnit>>,
    cleanup_order: Mutex<Vec<String>>,
    retry_count: Mutex<HashMap<String, u32>>,
    running: AtomicBool,
    wiring: Mutex<HashMap<String, Vec<Teardown>>>,
    crash_reporter: Arc<dyn CrashReporter>,
    events: Arc<Listeners<SupervisorEvent>>,
}

/// Owns dependency/main/cleanup cohorts and drives their lifecycle. Cheap to
/// clone; clones share the same cohorts and event stream.
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Clone for Supervisor {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Supervisor {
    /// Uses a filesystem-backed crash reporter rooted at
    /// `<system-temp>/procsuper/crash-reports`, per spec.md §4.D's default.
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_crash_reporter(
            config,
            Arc::new(FsCrashReporter::with_default_dir("procsuper")),
        )
    }

    pub fn with_crash_reporter(config: SupervisorConfig, crash_reporter: Arc<dyn CrashReporter>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                dependencies: Mutex::new(HashMap::new()),
                main: Mutex::new(HashMap::new()),
                cleanup: Mutex::new(HashMap::new()),
                cleanup_order: Mutex::new(Vec::new()),
                retry_count: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                wiring: Mutex::new(HashMap::new()),
                crash_reporter,
                events: Arc::new(Listeners::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn on_event(&self, listener: impl Fn(SupervisorEvent) + Send + Sync + 'static) -> SubscriptionToken<SupervisorEvent> {
        self.inner.events.subscribe(listener)
    }

    pub fn crash_reporter(&self) -> Arc<dyn CrashReporter> {
        Arc::clone(&self.inner.crash_reporter)
    }

    // -- cohort membership -------------------------------------------------

    pub fn add_dependency(&self, id: impl Into<String>, unit: ProcessUnit) {
        let id = id.into();
        self.inner.dependencies.lock().expect("supervisor poisoned").insert(id.clone(), unit);
        self.emit(SupervisorEvent::ProcessAdded {
            id,
            cohort: Cohort::Dependency,
            timestamp: now_iso8601(),
        });
    }

    pub fn add_main(&self, id: impl Into<String>, unit: ProcessUnit) {
        let id = id.into();
        self.inner.main.lock().expect("supervisor poisoned").insert(id.clone(), unit);
        self.emit(SupervisorEvent::ProcessAdded {
            id,
            cohort: Cohort::Main,
            timestamp: now_iso8601(),
        });
    }

    pub fn add_cleanup(&self, id: impl Into<String>, unit: ProcessUnit) {
        let id = id.into();
        self.inner.cleanup.lock().expect("supervisor poisoned").insert(id.clone(), unit);
        let mut order = self.inner.cleanup_order.lock().expect("supervisor poisoned");
        if !order.contains(&id) {
            order.push(id.clone());
        }
        drop(order);
        self.emit(SupervisorEvent::ProcessAdded {
            id,
            cohort: Cohort::Cleanup,
            timestamp: now_iso8601(),
        });
    }

    pub fn remove_dependency(&self, id: &str) {
        self.teardown_wiring(id);
        self.inner.dependencies.lock().expect("supervisor poisoned").remove(id);
        self.emit(SupervisorEvent::ProcessRemoved {
            id: id.to_string(),
            cohort: Cohort::Dependency,
            timestamp: now_iso8601(),
        });
    }

    pub fn remove_main(&self, id: &str) {
        self.teardown_wiring(id);
        self.inner.main.lock().expect("supervisor poisoned").remove(id);
        self.inner.retry_count.lock().expect("supervisor poisoned").remove(id);
        self.emit(SupervisorEvent::ProcessRemoved {
            id: id.to_string(),
            cohort: Cohort::Main,
            timestamp: now_iso8601(),
        });
    }

    pub fn remove_cleanup(&self, id: &str) {
        self.teardown_wiring(id);
        self.inner.cleanup.lock().expect("supervisor poisoned").remove(id);
        self.inner
            .cleanup_order
            .lock()
            .expect("supervisor poisoned")
            .retain(|x| x != id);
        self.emit(SupervisorEvent::ProcessRemoved {
            id: id.to_string(),
            cohort: Cohort::Cleanup,
            timestamp: now_iso8601(),
        });
    }

    pub fn get_dependency(&self, id: &str) -> Option<ProcessUnit> {
        self.inner.dependencies.lock().expect("supervisor poisoned").get(id).cloned()
    }

    pub fn get_main(&self, id: &str) -> Option<ProcessUnit> {
        self.inner.main.lock().expect("supervisor poisoned").get(id).cloned()
    }

    pub fn get_cleanup(&self, id: &str) -> Option<ProcessUnit> {
        self.inner.cleanup.lock().expect("supervisor poisoned").get(id).cloned()
    }

    /// Proxies to the owning unit's logger. Supplements the spec's §4.A
    /// `Logger::reset` with a thin pass-through, the way the teacher exposes
    /// `Daemon::pid_file_handle`-style accessors.
    pub fn reset_process_logs(&self, id: &str) -> bool {
        match self.find_any(id) {
            Some(unit) => {
                unit.logger().reset();
                true
            }
            None => false,
        }
    }

    fn find_any(&self, id: &str) -> Option<ProcessUnit> {
        self.get_main(id).or_else(|| self.get_dependency(id)).or_else(|| self.get_cleanup(id))
    }

    // -- lifecycle -----------------------------------------------------

    /// Fails with `NoMainProcesses` if the main cohort is empty. Otherwise
    /// starts every dependency, awaits their readiness (aborting startup on
    /// the first rejection), then starts every main process.
    pub fn start(&self) -> Result<(), SupervisorError> {
        if self.inner.main.lock().expect("supervisor poisoned").is_empty() {
            return Err(SupervisorError::NoMainProcesses);
        }

        self.inner.running.store(true, Ordering::SeqCst);
        self.emit(SupervisorEvent::ManagerStarted { timestamp: now_iso8601() });

        let dependencies: Vec<(String, ProcessUnit)> = self
            .inner
            .dependencies
            .lock()
            .expect("supervisor poisoned")
            .iter()
            .map(|(id, unit)| (id.clone(), unit.clone()))
            .collect();

        for (id, unit) in &dependencies {
            self.wire_unit(id, unit, Cohort::Dependency);
            self.emit(SupervisorEvent::ProcessStarted {
                id: id.clone(),
                cohort: Cohort::Dependency,
                timestamp: now_iso8601(),
            });
            if let Err(e) = unit.start() {
                warn!(id = %id, error = %e, "dependency failed to spawn");
            }
        }

        if !dependencies.is_empty() {
            // Join every dependency's readiness concurrently: spawn one
            // waiter thread per dependency rather than awaiting them one at
            // a time, so a slow dependency earlier in iteration order can't
            // mask a faster sibling's failure.
            let (tx, rx) = mpsc::channel();
            for (id, unit) in &dependencies {
                let tx = tx.clone();
                let id = id.clone();
                let unit = unit.clone();
                thread::spawn(move || {
                    let result = unit.ready().wait();
                    let _ = tx.send((id, result));
                });
            }
            drop(tx);

            let mut failure = None;
            for _ in 0..dependencies.len() {
                let Ok((id, result)) = rx.recv() else {
                    break;
                };
                if let Err(error) = result {
                    failure = Some((id, error));
                    break;
                }
            }
            if let Some((failed_id, error)) = failure {
                self.emit(SupervisorEvent::DependencyFailed {
                    id: failed_id,
                    error,
                    timestamp: now_iso8601(),
                });
                // Cancel every dependency's pending readiness checks by
                // stopping it outright, including ones still mid-check.
                for (_, unit) in &dependencies {
                    let finished = unit.stop(Duration::from_millis(1000), Signal::SIGINT);
                    let _ = finished.wait();
                }
                self.stop();
                self.state_update();
                return Ok(());
            }
        }

        self.start_main_processes();
        self.state_update();
        Ok(())
    }

    fn start_main_processes(&self) {
        let mains: Vec<(String, ProcessUnit)> = self
            .inner
            .main
            .lock()
            .expect("supervisor poisoned")
            .iter()
            .map(|(id, unit)| (id.clone(), unit.clone()))
            .collect();
        for (id, unit) in mains {
            self.wire_unit(&id, &unit, Cohort::Main);
            self.emit(SupervisorEvent::ProcessStarted {
                id: id.clone(),
                cohort: Cohort::Main,
                timestamp: now_iso8601(),
            });
            if let Err(e) = unit.start() {
                warn!(id = %id, error = %e, "main process failed to spawn");
            }
        }
    }

    /// Stops every live main process, runs cleanup tasks in insertion order
    /// (each bounded by `cleanup_timeout_ms`), then stops dependencies.
    /// Re-entrant calls while already stopping/stopped are no-ops.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.emit(SupervisorEvent::ManagerStopping { timestamp: now_iso8601() });

        let mains: Vec<ProcessUnit> = self.inner.main.lock().expect("supervisor poisoned").values().cloned().collect();
        for unit in &mains {
            if unit.status().is_live() {
                let finished = unit.stop(Duration::from_millis(1000), Signal::SIGINT);
                let _ = finished.wait();
            }
        }

        self.emit(SupervisorEvent::CleanupStarted { timestamp: now_iso8601() });
        self.status_message("Running cleanup processes...");

        let cleanup_order = self.inner.cleanup_order.lock().expect("supervisor poisoned").clone();
        let cleanup_units = self.inner.cleanup.lock().expect("supervisor poisoned").clone();
        for id in &cleanup_order {
            let Some(unit) = cleanup_units.get(id) else {
                continue;
            };
            self.wire_unit(id, unit, Cohort::Cleanup);
            let _ = unit.prepare_for_restart();
            if let Err(e) = unit.start() {
                warn!(id = %id, error = %e, "cleanup task failed to spawn");
            }
            let timeout = Duration::from_millis(u64::from(self.inner.config.cleanup_timeout_ms));
            if unit.finished().wait_timeout(timeout).is_none() {
                self.emit(SupervisorEvent::CleanupTimeout {
                    id: id.clone(),
                    error: format!("cleanup task '{id}' timed out after {}ms", self.inner.config.cleanup_timeout_ms),
                    timestamp: now_iso8601(),
                });
            }
        }
        self.emit(SupervisorEvent::CleanupFinished { timestamp: now_iso8601() });

        let deps: Vec<ProcessUnit> = self.inner.dependencies.lock().expect("supervisor poisoned").values().cloned().collect();
        for unit in &deps {
            if unit.status().is_live() {
                let finished = unit.stop(Duration::from_millis(1000), Signal::SIGINT);
                let _ = finished.wait();
            }
        }

        self.emit(SupervisorEvent::ManagerStopped { timestamp: now_iso8601() });
        self.state_update();
    }

    /// Looks up `id` strictly in `cohort` when given, otherwise searches
    /// main, then dependency, then cleanup.
    pub fn restart_process(&self, id: &str, cohort: Option<Cohort>) {
        let found = match cohort {
            Some(Cohort::Main) => self.get_main(id).map(|u| (u, Cohort::Main)),
            Some(Cohort::Dependency) => self.get_dependency(id).map(|u| (u, Cohort::Dependency)),
            Some(Cohort::Cleanup) => self.get_cleanup(id).map(|u| (u, Cohort::Cleanup)),
            None => self
                .get_main(id)
                .map(|u| (u, Cohort::Main))
                .or_else(|| self.get_dependency(id).map(|u| (u, Cohort::Dependency)))
                .or_else(|| self.get_cleanup(id).map(|u| (u, Cohort::Cleanup))),
        };
        let Some((unit, cohort)) = found else {
            self.status_message(format!("Process {id} not found"));
            return;
        };
        self.emit(SupervisorEvent::ProcessRestarting {
            id: id.to_string(),
            cohort,
            timestamp: now_iso8601(),
        });
        let _ = unit.restart();
        self.state_update();
    }

    pub fn restart_all(&self) {
        self.emit(SupervisorEvent::ManagerRestarting { timestamp: now_iso8601() });
        if !self.is_running() {
            self.status_message("Not running, starting...");
            if let Err(e) = self.start() {
                self.status_message(format!("Failed to start: {e}"));
            }
            return;
        }

        self.status_message("Stopping processes...");
        self.stop();

        self.status_message("Preparing for restart...");
        for unit in self.all_units() {
            let _ = unit.prepare_for_restart();
        }

        self.status_message("Starting dependencies...");
        self.status_message("Starting main...");
        if let Err(e) = self.start() {
            self.status_message(format!("Failed to restart: {e}"));
            return;
        }
        self.status_message("All processes restarted");
    }

    pub fn restart_all_main(&self) {
        let mains: Vec<(String, ProcessUnit)> = self
            .inner
            .main
            .lock()
            .expect("supervisor poisoned")
            .iter()
            .map(|(id, unit)| (id.clone(), unit.clone()))
            .collect();
        for (id, unit) in mains {
            if unit.status().is_live() {
                let _ = unit.restart();
            }
            self.inner.retry_count.lock().expect("supervisor poisoned").remove(&id);
        }
    }

    pub fn send_stdin(&self, id: &str, input: &str, secret: bool) -> Result<(), SupervisorError> {
        let unit = self.find_any(id).ok_or_else(|| SupervisorError::ProcessNotFound(id.to_string()))?;
        unit.send_stdin(input, secret)?;
        Ok(())
    }

    fn all_units(&self) -> Vec<ProcessUnit> {
        let mut units: Vec<ProcessUnit> = self.inner.dependencies.lock().expect("supervisor poisoned").values().cloned().collect();
        units.extend(self.inner.main.lock().expect("supervisor poisoned").values().cloned());
        units.extend(self.inner.cleanup.lock().expect("supervisor poisoned").values().cloned());
        units
    }

    // -- handler wiring --------------------------------------------------

    fn wire_unit(&self, id: &str, unit: &ProcessUnit, cohort: Cohort) {
        self.teardown_wiring(id);
        let mut tokens: Vec<Teardown> = Vec::new();

        {
            let sup = self.clone();
            let unit_c = unit.clone();
            let id_c = id.to_string();
            let token = unit.on_crash(move |error| sup.handle_crash(&id_c, &unit_c, cohort, error));
            tokens.push(Box::new(move || drop(token)));
        }
        {
            let sup = self.clone();
            let id_c = id.to_string();
            let token = unit.on_exit(move |exit| {
                sup.emit(SupervisorEvent::ProcessStopped {
                    id: id_c.clone(),
                    cohort,
                    exit_code: exit.code,
                    signal: exit.signal,
                    timestamp: now_iso8601(),
                });
                sup.status_message(format!("Process {id_c} stopped"));
                sup.state_update();
            });
            tokens.push(Box::new(move || drop(token)));
        }
        {
            let sup = self.clone();
            let id_c = id.to_string();
            let token = unit.on_ready(move |_| {
                sup.emit(SupervisorEvent::ProcessReady {
                    id: id_c.clone(),
                    cohort,
                    timestamp: now_iso8601(),
                });
                sup.status_message(format!("Process {id_c} ready"));
                sup.state_update();
            });
            tokens.push(Box::new(move || drop(token)));
        }
        {
            let sup = self.clone();
            let id_c = id.to_string();
            let token = unit.logger().on_log(move |event| {
                sup.emit(SupervisorEvent::ProcessLog {
                    id: id_c.clone(),
                    cohort,
                    message: event.text,
                    is_error: false,
                    timestamp: now_iso8601(),
                });
            });
            tokens.push(Box::new(move || drop(token)));
        }
        {
            let sup = self.clone();
            let id_c = id.to_string();
            let token = unit.logger().on_error(move |event| {
                sup.emit(SupervisorEvent::ProcessLog {
                    id: id_c.clone(),
                    cohort,
                    message: event.text,
                    is_error: true,
                    timestamp: now_iso8601(),
                });
            });
            tokens.push(Box::new(move || drop(token)));
        }

        self.inner.wiring.lock().expect("supervisor poisoned").insert(id.to_string(), tokens);
    }

    fn teardown_wiring(&self, id: &str) {
        if let Some(tokens) = self.inner.wiring.lock().expect("supervisor poisoned").remove(id) {
            for teardown in tokens {
                teardown();
            }
        }
    }

    fn handle_crash(&self, id: &str, unit: &ProcessUnit, cohort: Cohort, error: String) {
        let current = *self.inner.retry_count.lock().expect("supervisor poisoned").get(id).unwrap_or(&0);
        self.emit(SupervisorEvent::ProcessCrashed {
            id: id.to_string(),
            cohort,
            error: error.clone(),
            retry_count: Some(current),
            timestamp: now_iso8601(),
        });

        if cohort == Cohort::Dependency {
            self.status_message(format!("Dependency {id} failed: {error}"));
            let report = self.inner.crash_reporter.generate_report(
                id,
                unit,
                CrashKind::DependencyFailed,
                Some(ReportContext {
                    error_message: Some(error),
                    cohort_kind: Some(CohortKind::Dependency),
                    ..Default::default()
                }),
            );
            self.inner.crash_reporter.save_report(report);
            self.stop();
            return;
        }

        if current < self.inner.config.max_retries {
            self.inner.retry_count.lock().expect("supervisor poisoned").insert(id.to_string(), current + 1);
            self.status_message(format!("Retry {}/{} for {id}", current + 1, self.inner.config.max_retries));
            let _ = unit.restart();
            self.state_update();
        } else {
            self.status_message(format!("Process {id} crashed too many times"));
            let report = self.inner.crash_reporter.generate_report(
                id,
                unit,
                CrashKind::MaxRetriesExceeded,
                Some(ReportContext {
                    error_message: Some(error),
                    retry_count: Some(current),
                    cohort_kind: Some(cohort_kind(cohort)),
                    ..Default::default()
                }),
            );
            self.inner.crash_reporter.save_report(report);
            let _ = unit.stop(Duration::from_millis(1000), Signal::SIGINT);
            self.stop();
        }
    }

    // -- event helpers -----------------------------------------------------

    fn emit(&self, event: SupervisorEvent) {
        self.inner.events.emit(event);
    }

    fn status_message(&self, message: impl Into<String>) {
        self.emit(SupervisorEvent::StatusMessage {
            message: message.into(),
            timestamp: now_iso8601(),
        });
    }

    fn state_update(&self) {
        let snapshot = self.snapshot();
        self.emit(SupervisorEvent::StateUpdate { snapshot, timestamp: now_iso8601() });
    }

    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            dependencies: self
                .inner
                .dependencies
                .lock()
                .expect("supervisor poisoned")
                .iter()
                .map(|(id, unit)| (id.clone(), unit.status()))
                .collect(),
            main: self
                .inner
                .main
                .lock()
                .expect("supervisor poisoned")
                .iter()
                .map(|(id, unit)| (id.clone(), unit.status()))
                .collect(),
            cleanup: self
                .inner
                .cleanup
                .lock()
                .expect("supervisor poisoned")
                .iter()
                .map(|(id, unit)| (id.clone(), unit.status()))
                .collect(),
        }
    }
}
