//! Process Unit: owns one child process, its readiness checks, and its
//! `Logger`. Drives the status state machine described in spec.md §3/§4.C.
//!
//! A unit is cheap to clone (it wraps an `Arc`); clones share the same
//! child, logger, and listener registries. Background threads (stdout/stderr
//! readers, the exit waiter, readiness timers, the stop-escalation timer)
//! each hold a clone and tag their captured `generation` so that a
//! `prepare_for_restart()` invalidates stale callbacks instead of corrupting
//! the next lifetime's state, the same "timer + settled flag" race pattern
//! spec.md §9 calls for.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

use crate::completion::{self, Completion, Settler};
use crate::error::ProcessError;
use crate::listeners::{Listeners, SubscriptionToken};
use crate::logger::{LogEntryType, LogEvent, LogPattern, Logger, LoggerConfig};

/// The process unit's lifecycle state. `Running` and `Ready` are "live";
/// every other variant is terminal until `prepare_for_restart()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Created,
    Running,
    Ready,
    Stopping,
    Stopped,
    Completed,
    FailedByReadyCheck,
    Crashed,
    CouldNotSpawn,
}

impl ProcessStatus {
    pub fn is_live(self) -> bool {
        matches!(self, ProcessStatus::Running | ProcessStatus::Ready)
    }
}

impl std::fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// `{ pattern, timeout_ms, pass_if_not_found }` from spec.md §3.
#[derive(Debug, Clone)]
pub struct ReadinessCheck {
    pub pattern: LogPattern,
    pub timeout_ms: u32,
    pub pass_if_not_found: bool,
}

impl ReadinessCheck {
    pub fn new(pattern: impl Into<LogPattern>, timeout_ms: u32) -> Self {
        Self {
            pattern: pattern.into(),
            timeout_ms,
            pass_if_not_found: false,
        }
    }

    pub fn pass_if_not_found(mut self, value: bool) -> Self {
        self.pass_if_not_found = value;
        self
    }
}

/// The terminal exit information delivered to `finished`/`on_exit`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

type ReadySettler = Settler<(), String>;
type ReadyCompletion = Completion<(), String>;
type FinishedSettler = Settler<ExitInfo, String>;
type FinishedCompletion = Completion<ExitInfo, String>;

struct State {
    status: ProcessStatus,
    generation: u64,
    pid: Option<i32>,
    stdin: Option<std::process::ChildStdin>,
    checks_passed: usize,
    readiness_finalized: bool,
    was_killed: bool,
    check_tokens: Vec<SubscriptionToken<LogEvent>>,
    error_token: Option<SubscriptionToken<LogEvent>>,
    ready_settler: ReadySettler,
    ready_completion: ReadyCompletion,
    finished_settler: FinishedSettler,
    finished_completion: FinishedCompletion,
}

impl State {
    fn fresh() -> Self {
        let (ready_settler, ready_completion) = completion::pair();
        let (finished_settler, finished_completion) = completion::pair();
        Self {
            status: ProcessStatus::Created,
            generation: 0,
            pid: None,
            stdin: None,
            checks_passed: 0,
            readiness_finalized: false,
            was_killed: false,
            check_tokens: Vec::new(),
            error_token: None,
            ready_settler,
            ready_completion,
            finished_settler,
            finished_completion,
        }
    }
}

struct Inner {
    command: String,
    args: Vec<String>,
    checks: Vec<ReadinessCheck>,
    logger: Arc<Logger>,
    state: Mutex<State>,
    on_ready: Arc<Listeners<()>>,
    on_exit: Arc<Listeners<ExitInfo>>,
    on_crash: Arc<Listeners<String>>,
}

/// One managed child process. Clone freely; clones are handles to the same
/// unit (command, logger, and state machine are shared via `Arc`).
pub struct ProcessUnit {
    inner: Arc<Inner>,
}

impl Clone for ProcessUnit {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl ProcessUnit {
    pub fn new(
        command: impl Into<String>,
        args: Vec<String>,
        checks: Vec<ReadinessCheck>,
        logger_config: LoggerConfig,
    ) -> Result<Self, crate::error::LoggerError> {
        let logger = Arc::new(Logger::new(logger_config)?);
        Ok(Self {
            inner: Arc::new(Inner {
                command: command.into(),
                args,
                checks,
                logger,
                state: Mutex::new(State::fresh()),
                on_ready: Arc::new(Listeners::new()),
                on_exit: Arc::new(Listeners::new()),
                on_crash: Arc::new(Listeners::new()),
            }),
        })
    }

    pub fn status(&self) -> ProcessStatus {
        self.inner.state.lock().expect("process unit poisoned").status
    }

    pub fn logger(&self) -> Arc<Logger> {
        Arc::clone(&self.inner.logger)
    }

    pub fn ready(&self) -> ReadyCompletion {
        self.inner.state.lock().expect("process unit poisoned").ready_completion.clone()
    }

    pub fn finished(&self) -> FinishedCompletion {
        self.inner
            .state
            .lock()
            .expect("process unit poisoned")
            .finished_completion
            .clone()
    }

    pub fn on_ready(&self, listener: impl Fn(()) + Send + Sync + 'static) -> SubscriptionToken<()> {
        self.inner.on_ready.subscribe(listener)
    }

    pub fn on_exit(&self, listener: impl Fn(ExitInfo) + Send + Sync + 'static) -> SubscriptionToken<ExitInfo> {
        self.inner.on_exit.subscribe(listener)
    }

    pub fn on_crash(&self, listener: impl Fn(String) + Send + Sync + 'static) -> SubscriptionToken<String> {
        self.inner.on_crash.subscribe(listener)
    }

    /// Spawns the child with piped stdio and arms readiness checks.
    /// Fails with `InvalidState` unless currently `Created`.
    pub fn start(&self) -> Result<(), ProcessError> {
        {
            let state = self.inner.state.lock().expect("process unit poisoned");
            if state.status != ProcessStatus::Created {
                return Err(ProcessError::InvalidState {
                    operation: "start",
                    status: state.status.to_string(),
                });
            }
        }

        let mut command = Command::new(&self.inner.command);
        command
            .args(&self.inner.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = e.to_string();
                self.finish_with_spawn_failure(&message);
                return Err(ProcessError::SpawnFailed(e));
            }
        };

        let pid = child.id() as i32;
        let stdin = child.stdin.take();
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let generation = {
            let mut state = self.inner.state.lock().expect("process unit poisoned");
            state.status = ProcessStatus::Running;
            state.pid = Some(pid);
            state.stdin = stdin;
            state.checks_passed = 0;
            state.readiness_finalized = false;
            state.was_killed = false;
            state.generation
        };

        self.spawn_reader(stdout, false, generation);
        self.spawn_reader(stderr, true, generation);
        self.install_error_subscription(generation);
        self.spawn_waiter(child, generation);
        self.arm_readiness(generation);

        Ok(())
    }

    fn finish_with_spawn_failure(&self, message: &str) {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        state.status = ProcessStatus::CouldNotSpawn;
        state.ready_settler.settle(Err(message.to_string()));
        state.finished_settler.settle(Err(message.to_string()));
        drop(state);
        self.inner.on_crash.emit(message.to_string());
    }

    fn spawn_reader(&self, mut stream: impl Read + Send + 'static, is_error: bool, generation: u64) {
        let inner = Arc::clone(&self.inner);
        thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                let still_current = inner
                    .state
                    .lock()
                    .expect("process unit poisoned")
                    .generation
                    == generation;
                if !still_current {
                    break;
                }
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
                        inner.logger.add_chunk(text, is_error, None);
                    }
                    Err(_) => break,
                }
            }
        });
    }

    fn install_error_subscription(&self, generation: u64) {
        let unit = self.clone();
        let token = self.inner.logger.on_error(move |event| {
            unit.handle_external_error(event.text, generation);
        });
        self.inner.state.lock().expect("process unit poisoned").error_token = Some(token);
    }

    fn handle_external_error(&self, message: String, generation: u64) {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if state.generation != generation || !state.status.is_live() {
            return;
        }
        state.status = if state.status == ProcessStatus::Running {
            ProcessStatus::CouldNotSpawn
        } else {
            ProcessStatus::Crashed
        };
        state.readiness_finalized = true;
        let tokens = std::mem::take(&mut state.check_tokens);
        let error = ProcessError::RuntimeCrash(message).to_string();
        state.ready_settler.settle(Err(error.clone()));
        state.finished_settler.settle(Err(error.clone()));
        drop(state);
        for token in tokens {
            token.unsubscribe();
        }
        self.inner.on_crash.emit(error);
    }

    fn spawn_waiter(&self, mut child: std::process::Child, generation: u64) {
        let unit = self.clone();
        thread::spawn(move || {
            let result = child.wait();
            unit.handle_exit(result, generation);
        });
    }

    fn handle_exit(&self, result: std::io::Result<std::process::ExitStatus>, generation: u64) {
        let exit = exit_info(result);
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if state.generation != generation {
            return;
        }
        match state.status {
            ProcessStatus::Stopping => {
                state.status = ProcessStatus::Stopped;
                state.finished_settler.settle(Ok(exit));
                drop(state);
                self.inner.on_exit.emit(exit);
            }
            ProcessStatus::Running | ProcessStatus::Ready => {
                let all_checks_passed = state.checks_passed >= self.inner.checks.len();
                if exit.code == Some(0) && all_checks_passed {
                    state.status = ProcessStatus::Completed;
                    state.finished_settler.settle(Ok(exit));
                    drop(state);
                    self.inner.on_exit.emit(exit);
                } else {
                    state.status = ProcessStatus::Crashed;
                    let message = ProcessError::RuntimeCrash(format!(
                        "process exited with code {:?} signal {:?}",
                        exit.code, exit.signal
                    ))
                    .to_string();
                    state.ready_settler.settle(Err(message.clone()));
                    state.finished_settler.settle(Err(message.clone()));
                    drop(state);
                    self.inner.on_crash.emit(message);
                }
            }
            // An on_error/kill/readiness-timeout transition already won; per
            // spec.md §4.C this later exit is ignored for state purposes.
            _ => {}
        }
    }

    fn arm_readiness(&self, generation: u64) {
        if self.inner.checks.is_empty() {
            self.finalize_ready(generation);
            return;
        }
        for idx in 0..self.inner.checks.len() {
            let decided = Arc::new(AtomicBool::new(false));
            let check = self.inner.checks[idx].clone();

            let unit = self.clone();
            let decided_for_listener = Arc::clone(&decided);
            let pattern = check.pattern.clone();
            let token = self.inner.logger.on_log(move |event| {
                if decided_for_listener.load(Ordering::SeqCst) {
                    return;
                }
                if pattern.find_match(&event.text).is_some()
                    && !decided_for_listener.swap(true, Ordering::SeqCst)
                {
                    unit.on_check_resolved(idx, generation, true);
                }
            });
            self.inner
                .state
                .lock()
                .expect("process unit poisoned")
                .check_tokens
                .push(token);

            let unit = self.clone();
            let decided_for_timer = Arc::clone(&decided);
            let timeout_ms = check.timeout_ms;
            let pass_if_not_found = check.pass_if_not_found;
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(u64::from(timeout_ms)));
                if !decided_for_timer.swap(true, Ordering::SeqCst) {
                    unit.on_check_resolved(idx, generation, pass_if_not_found);
                }
            });
        }
    }

    fn finalize_ready(&self, generation: u64) {
        let settler = {
            let mut state = self.inner.state.lock().expect("process unit poisoned");
            if state.generation != generation || state.readiness_finalized {
                return;
            }
            if state.status != ProcessStatus::Running {
                return;
            }
            state.readiness_finalized = true;
            state.status = ProcessStatus::Ready;
            state.ready_settler.clone()
        };
        // Emit before settling: a thread blocked in `ready().wait()` must not
        // observe readiness until every `on_ready` listener has already run.
        self.inner.on_ready.emit(());
        settler.settle(Ok(()));
    }

    fn on_check_resolved(&self, idx: usize, generation: u64, passed: bool) {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if state.generation != generation || state.readiness_finalized {
            return;
        }
        if passed {
            state.checks_passed += 1;
            if state.checks_passed == self.inner.checks.len() {
                state.readiness_finalized = true;
                if state.status == ProcessStatus::Running {
                    state.status = ProcessStatus::Ready;
                }
                let tokens = std::mem::take(&mut state.check_tokens);
                let settler = state.ready_settler.clone();
                drop(state);
                for token in tokens {
                    token.unsubscribe();
                }
                // Emit before settling, same reasoning as `finalize_ready`.
                self.inner.on_ready.emit(());
                settler.settle(Ok(()));
            }
        } else {
            state.readiness_finalized = true;
            state.status = ProcessStatus::FailedByReadyCheck;
            let tokens = std::mem::take(&mut state.check_tokens);
            let check = &self.inner.checks[idx];
            let message = ProcessError::ReadyCheckTimeout {
                pattern: check.pattern.describe(),
                timeout_ms: check.timeout_ms,
            }
            .to_string();
            state.ready_settler.settle(Err(message.clone()));
            state.finished_settler.settle(Err(message.clone()));
            drop(state);
            for token in tokens {
                token.unsubscribe();
            }
            self.inner.on_crash.emit(message);
        }
    }

    /// Delivers `signal` (default SIGINT), marks `Stopping`, and arms an
    /// escalation timer that sends SIGKILL if still `Stopping` after
    /// `timeout_ms`. Safe to call on a non-live unit: it's a no-op that just
    /// returns the (likely already-settled) `finished` completion.
    pub fn stop(&self, timeout: Duration, signal_to_send: Signal) -> FinishedCompletion {
        let (generation, finished_completion, pid) = {
            let mut state = self.inner.state.lock().expect("process unit poisoned");
            if !state.status.is_live() {
                return state.finished_completion.clone();
            }
            state.status = ProcessStatus::Stopping;
            (state.generation, state.finished_completion.clone(), state.pid)
        };

        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid), signal_to_send);
        }

        let unit = self.clone();
        thread::spawn(move || {
            thread::sleep(timeout);
            let should_escalate = {
                let state = unit.inner.state.lock().expect("process unit poisoned");
                state.generation == generation && state.status == ProcessStatus::Stopping
            };
            if should_escalate {
                unit.send_kill_signal();
            }
        });

        finished_completion
    }

    fn send_kill_signal(&self) {
        let pid = self.inner.state.lock().expect("process unit poisoned").pid;
        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
    }

    /// Delivers SIGKILL and immediately transitions to `Crashed`. Fails with
    /// `InvalidState` unless currently live (`Running`/`Ready`).
    pub fn kill(&self) -> Result<(), ProcessError> {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if !state.status.is_live() {
            return Err(ProcessError::InvalidState {
                operation: "kill",
                status: state.status.to_string(),
            });
        }
        state.was_killed = true;
        state.status = ProcessStatus::Crashed;
        let pid = state.pid;
        let message = ProcessError::RuntimeCrash("process was killed".to_string()).to_string();
        state.ready_settler.settle(Err(message.clone()));
        state.finished_settler.settle(Err(message.clone()));
        drop(state);

        if let Some(pid) = pid {
            let _ = signal::kill(Pid::from_raw(pid), Signal::SIGKILL);
        }
        self.inner.on_crash.emit(message);
        Ok(())
    }

    /// If live or `Stopping`, stops and awaits `finished` first; otherwise
    /// resets directly. Either way, ends with a fresh `start()`.
    pub fn restart(&self) -> Result<(), ProcessError> {
        let status = self.status();
        if status.is_live() || status == ProcessStatus::Stopping {
            let finished = self.stop(Duration::from_millis(1000), Signal::SIGINT);
            let _ = finished.wait();
        }
        self.prepare_for_restart()?;
        self.start()
    }

    /// Resets to `Created` with fresh `ready`/`finished` signals. Fails with
    /// `InvalidState` if currently live or `Stopping`.
    pub fn prepare_for_restart(&self) -> Result<(), ProcessError> {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if state.status.is_live() || state.status == ProcessStatus::Stopping {
            return Err(ProcessError::InvalidState {
                operation: "prepare_for_restart",
                status: state.status.to_string(),
            });
        }
        state.generation += 1;
        state.status = ProcessStatus::Created;
        state.pid = None;
        state.stdin = None;
        state.checks_passed = 0;
        state.readiness_finalized = false;
        state.was_killed = false;
        let check_tokens = std::mem::take(&mut state.check_tokens);
        let error_token = state.error_token.take();
        let (ready_settler, ready_completion) = completion::pair();
        let (finished_settler, finished_completion) = completion::pair();
        state.ready_settler = ready_settler;
        state.ready_completion = ready_completion;
        state.finished_settler = finished_settler;
        state.finished_completion = finished_completion;
        drop(state);

        for token in check_tokens {
            token.unsubscribe();
        }
        if let Some(token) = error_token {
            token.unsubscribe();
        }
        Ok(())
    }

    /// Writes `input + "\n"` to stdin and records a typed-log entry.
    pub fn send_stdin(&self, input: &str, secret: bool) -> Result<(), ProcessError> {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        if state.stdin.is_none() {
            return Err(ProcessError::StdinUnavailable);
        }
        if !state.status.is_live() {
            return Err(ProcessError::NotRunning);
        }
        let line = format!("{input}\n");
        let write_result = state.stdin.as_mut().expect("checked above").write_all(line.as_bytes());
        if let Err(e) = write_result {
            return Err(ProcessError::WriteFailed(e));
        }
        drop(state);
        self.inner.logger.record_stdin(input, secret);
        Ok(())
    }

    /// Releases all timers and subscriptions. Idempotent.
    pub fn cleanup(&self) {
        let mut state = self.inner.state.lock().expect("process unit poisoned");
        let tokens = std::mem::take(&mut state.check_tokens);
        let error_token = state.error_token.take();
        drop(state);
        for token in tokens {
            token.unsubscribe();
        }
        if let Some(token) = error_token {
            token.unsubscribe();
        }
    }
}

fn exit_info(result: std::io::Result<std::process::ExitStatus>) -> ExitInfo {
    use std::os::unix::process::ExitStatusExt;
    match result {
        Ok(status) => ExitInfo {
            code: status.code(),
            signal: status.signal(),
        },
        Err(_) => ExitInfo {
            code: None,
            signal: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::LoggerConfig;

    fn logger_config() -> LoggerConfig {
        LoggerConfig {
            max_buffer_size: 100,
            max_log_size: 50,
            default_separator: String::new(),
        }
    }

    fn shell_unit(script: &str, checks: Vec<ReadinessCheck>) -> ProcessUnit {
        ProcessUnit::new(
            "sh",
            vec!["-c".to_string(), script.to_string()],
            checks,
            logger_config(),
        )
        .unwrap()
    }

    #[test]
    fn start_twice_is_invalid_state() {
        let unit = shell_unit("sleep 0.2", Vec::new());
        unit.start().unwrap();
        let err = unit.start().unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState { operation: "start", .. }));
        let _ = unit.finished().wait();
    }

    #[test]
    fn zero_checks_becomes_ready_immediately() {
        let unit = shell_unit("sleep 0.2", Vec::new());
        unit.start().unwrap();
        let result = unit.ready().wait_timeout(Duration::from_secs(2));
        assert_eq!(result, Some(Ok(())));
        assert_eq!(unit.status(), ProcessStatus::Ready);
        let _ = unit.finished().wait();
    }

    #[test]
    fn happy_exit_resolves_completed() {
        let unit = shell_unit("echo hello", Vec::new());
        unit.start().unwrap();
        let result = unit.finished().wait();
        assert!(result.is_ok());
        assert_eq!(unit.status(), ProcessStatus::Completed);
    }

    #[test]
    fn nonzero_exit_is_crashed() {
        let unit = shell_unit("exit 3", Vec::new());
        unit.start().unwrap();
        let result = unit.finished().wait();
        assert!(result.is_err());
        assert_eq!(unit.status(), ProcessStatus::Crashed);
    }

    #[test]
    fn readiness_check_gates_ready_on_matching_output() {
        let unit = shell_unit(
            "echo waiting; sleep 0.1; echo Database is ready!; sleep 0.5",
            vec![ReadinessCheck::new("Database is ready!", 5000)],
        );
        unit.start().unwrap();
        let result = unit.ready().wait_timeout(Duration::from_secs(3));
        assert_eq!(result, Some(Ok(())));
        let _ = unit.kill();
    }

    #[test]
    fn readiness_timeout_without_pass_if_not_found_fails() {
        let unit = shell_unit(
            "sleep 1",
            vec![ReadinessCheck::new("never matches", 50)],
        );
        unit.start().unwrap();
        let result = unit.ready().wait_timeout(Duration::from_secs(2));
        assert!(matches!(result, Some(Err(_))));
        assert_eq!(unit.status(), ProcessStatus::FailedByReadyCheck);
    }

    #[test]
    fn readiness_timeout_with_pass_if_not_found_succeeds() {
        let unit = shell_unit(
            "sleep 1",
            vec![ReadinessCheck::new("never matches", 50).pass_if_not_found(true)],
        );
        unit.start().unwrap();
        let result = unit.ready().wait_timeout(Duration::from_secs(2));
        assert_eq!(result, Some(Ok(())));
        let _ = unit.kill();
    }

    #[test]
    fn prepare_for_restart_requires_terminal_state() {
        let unit = shell_unit("sleep 0.3", Vec::new());
        unit.start().unwrap();
        let err = unit.prepare_for_restart().unwrap_err();
        assert!(matches!(err, ProcessError::InvalidState { .. }));
        let _ = unit.finished().wait();
    }

    #[test]
    fn restart_resets_to_created_with_fresh_signals() {
        let unit = shell_unit("echo hi", Vec::new());
        unit.start().unwrap();
        let _ = unit.finished().wait();
        assert!(unit.prepare_for_restart().is_ok());
        assert_eq!(unit.status(), ProcessStatus::Created);
        assert!(!unit.ready().is_settled());
        assert!(!unit.finished().is_settled());
    }

    #[test]
    fn send_stdin_requires_running_process() {
        let unit = shell_unit("sleep 0.2", Vec::new());
        let err = unit.send_stdin("hi", false).unwrap_err();
        assert!(matches!(err, ProcessError::StdinUnavailable));
    }

    #[test]
    fn send_stdin_writes_newline_terminated_lines_and_records_typed_log() {
        let unit = shell_unit("cat > /dev/null; sleep 0.3", Vec::new());
        unit.start().unwrap();
        unit.send_stdin("user", false).unwrap();
        unit.send_stdin("pw", true).unwrap();
        let typed = unit.logger().get_typed_logs();
        let entries: Vec<_> = typed
            .iter()
            .filter(|e| matches!(e.entry_type, LogEntryType::UserInput | LogEntryType::UserInputSecret))
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].entry_type, LogEntryType::UserInput);
        assert_eq!(entries[0].text, "user");
        assert_eq!(entries[1].entry_type, LogEntryType::UserInputSecret);
        assert_eq!(entries[1].text, "pw");
        let _ = unit.kill();
    }

    #[test]
    fn cleanup_is_idempotent() {
        let unit = shell_unit("sleep 0.1", vec![ReadinessCheck::new("x", 100)]);
        unit.start().unwrap();
        unit.cleanup();
        unit.cleanup();
        let _ = unit.finished().wait_timeout(Duration::from_secs(1));
    }
}
