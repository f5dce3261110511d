//! End-to-end scenarios from spec.md §8, driven against real `sh -c` child
//! processes, the same shape as the teacher's `tests/integration/*.rs` harness,
//! minus the config-file/env-guard scaffolding this crate has no use for.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use procsuper::config::SupervisorConfig;
use procsuper::crash_reporter::{CrashReporter, NoopCrashReporter};
use procsuper::events::{Cohort, SupervisorEvent};
use procsuper::logger::LoggerConfig;
use procsuper::process::{ProcessUnit, ReadinessCheck};
use procsuper::supervisor::Supervisor;

fn small_logger() -> LoggerConfig {
    LoggerConfig {
        max_buffer_size: 50,
        max_log_size: 50,
        default_separator: String::new(),
    }
}

fn shell(script: &str, checks: Vec<ReadinessCheck>) -> ProcessUnit {
    ProcessUnit::new("sh", vec!["-c".to_string(), script.to_string()], checks, small_logger()).unwrap()
}

fn supervisor_with_noop_reporter(config: SupervisorConfig) -> Supervisor {
    Supervisor::with_crash_reporter(config, Arc::new(NoopCrashReporter::new()))
}

/// Scenario 1: no deps, one main, happy exit.
#[test]
fn scenario_no_deps_happy_exit() {
    let sup = supervisor_with_noop_reporter(SupervisorConfig::default());
    sup.add_main("main", shell("echo hello", Vec::new()));

    let events = Arc::new(Mutex::new(Vec::new()));
    let events_c = Arc::clone(&events);
    let _token = sup.on_event(move |e| events_c.lock().unwrap().push(e));

    sup.start().unwrap();
    let main = sup.get_main("main").unwrap();
    let result = main.finished().wait_timeout(Duration::from_secs(2));
    assert!(matches!(result, Some(Ok(_))));

    let log = events.lock().unwrap();
    assert!(log.iter().any(|e| matches!(e, SupervisorEvent::ProcessStopped { id, cohort: Cohort::Main, exit_code: Some(0), signal: None, .. } if id == "main")));
}

/// Scenario 2: dependency gates main.
#[test]
fn scenario_dependency_gates_main() {
    let sup = supervisor_with_noop_reporter(SupervisorConfig::default());
    sup.add_dependency(
        "dep",
        shell(
            "sleep 0.15; echo Database is ready!; sleep 1",
            vec![ReadinessCheck::new("Database is ready!", 5000)],
        ),
    );
    sup.add_main("main", shell("sleep 1", Vec::new()));

    let main_started = Arc::new(AtomicU32::new(0));
    let main_started_c = Arc::clone(&main_started);
    let _token = sup.on_event(move |e| {
        if let SupervisorEvent::ProcessStarted { id, cohort: Cohort::Main, .. } = e {
            if id == "main" {
                main_started_c.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    sup.start().unwrap();

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(main_started.load(Ordering::SeqCst), 0, "main must not start before dependency is ready");

    let dep = sup.get_dependency("dep").unwrap();
    assert_eq!(dep.ready().wait_timeout(Duration::from_secs(3)), Some(Ok(())));

    for _ in 0..50 {
        if main_started.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(main_started.load(Ordering::SeqCst), 1);

    sup.stop();
}

/// Scenario 3: retry then give up.
#[test]
fn scenario_retry_then_give_up() {
    let mut config = SupervisorConfig::default();
    config.max_retries = 2;
    let sup = supervisor_with_noop_reporter(config);
    sup.add_main("flaky", shell("exit 1", Vec::new()));

    let restarts = Arc::new(AtomicU32::new(0));
    let restarts_c = Arc::clone(&restarts);
    let stopped = Arc::new(AtomicU32::new(0));
    let stopped_c = Arc::clone(&stopped);
    let _token = sup.on_event(move |e| match e {
        SupervisorEvent::StatusMessage { message, .. } if message.starts_with("Retry") => {
            restarts_c.fetch_add(1, Ordering::SeqCst);
        }
        SupervisorEvent::ManagerStopped { .. } => {
            stopped_c.store(1, Ordering::SeqCst);
        }
        _ => {}
    });

    sup.start().unwrap();
    for _ in 0..100 {
        if stopped.load(Ordering::SeqCst) == 1 {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(restarts.load(Ordering::SeqCst), 2);
    assert!(!sup.is_running());
}

/// Scenario 4: cleanup order and timeout.
#[test]
fn scenario_cleanup_order_and_timeout() {
    let mut config = SupervisorConfig::default();
    config.cleanup_timeout_ms = 80;
    let sup = supervisor_with_noop_reporter(config);
    sup.add_main("main", shell("sleep 5", Vec::new()));
    sup.add_cleanup("A", shell("echo a", Vec::new()));
    sup.add_cleanup("B", shell("sleep 5", Vec::new()));
    sup.add_cleanup("C", shell("echo c", Vec::new()));

    let order = Arc::new(Mutex::new(Vec::new()));
    let order_c = Arc::clone(&order);
    let timeouts = Arc::new(Mutex::new(Vec::new()));
    let timeouts_c = Arc::clone(&timeouts);
    let finished_count = Arc::new(AtomicU32::new(0));
    let finished_c = Arc::clone(&finished_count);
    let _token = sup.on_event(move |e| match e {
        SupervisorEvent::ProcessStarted { id, cohort: Cohort::Cleanup, .. } => order_c.lock().unwrap().push(id),
        SupervisorEvent::CleanupTimeout { id, .. } => timeouts_c.lock().unwrap().push(id),
        SupervisorEvent::CleanupFinished { .. } => {
            finished_c.fetch_add(1, Ordering::SeqCst);
        }
        _ => {}
    });

    sup.start().unwrap();
    sup.stop();

    assert_eq!(order.lock().unwrap().as_slice(), ["A".to_string(), "B".to_string(), "C".to_string()]);
    assert_eq!(timeouts.lock().unwrap().as_slice(), ["B".to_string()]);
    assert_eq!(finished_count.load(Ordering::SeqCst), 1);
}

/// Scenario 5: logger eviction renumbers flags.
#[test]
fn scenario_logger_eviction_renumbers_flags() {
    use procsuper::logger::{FlagColor, FlagDefinition, Logger};

    let logger = Logger::new(LoggerConfig {
        max_buffer_size: 3,
        max_log_size: 3,
        default_separator: String::new(),
    })
    .unwrap();
    logger.add_flag("err", FlagDefinition::new("ERROR", FlagColor::Red));

    for chunk in ["ok1", "ERROR at 1", "ok2", "ok3", "ok4"] {
        logger.add_chunk(chunk, false, None);
    }

    assert_eq!(logger.snapshot_logs(), vec!["ok2".to_string(), "ok3".to_string(), "ok4".to_string()]);
    let flag = logger.get_flag("err").unwrap();
    assert_eq!(flag.count, 0);
    assert!(flag.matches.is_empty());
}

/// Scenario 6: stdin with secret.
#[test]
fn scenario_stdin_with_secret() {
    use procsuper::logger::LogEntryType;

    let sup = supervisor_with_noop_reporter(SupervisorConfig::default());
    sup.add_main("user", shell("cat > /dev/null; sleep 0.3", Vec::new()));

    sup.start().unwrap();
    let unit = sup.get_main("user").unwrap();
    assert_eq!(unit.ready().wait_timeout(Duration::from_secs(2)), Some(Ok(())));

    sup.send_stdin("user", "user", false).unwrap();
    sup.send_stdin("user", "pw", true).unwrap();

    let typed = unit.logger().get_typed_logs();
    let stdin_entries: Vec<_> = typed
        .iter()
        .filter(|e| matches!(e.entry_type, LogEntryType::UserInput | LogEntryType::UserInputSecret))
        .collect();
    assert_eq!(stdin_entries.len(), 2);
    assert_eq!(stdin_entries[0].entry_type, LogEntryType::UserInput);
    assert_eq!(stdin_entries[0].text, "user");
    assert_eq!(stdin_entries[1].entry_type, LogEntryType::UserInputSecret);
    assert_eq!(stdin_entries[1].text, "pw");

    sup.stop();
}
