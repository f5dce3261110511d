//! Process Logger: a bounded ring buffer of stdout/stderr chunks with
//! pattern-based "flag" counters and a typed-entry stream.
//!
//! See spec.md §3 and §4.A. The buffer back-reference problem ("evictable
//! ring with back-references" in the design notes) is solved in place:
//! on eviction every stored flag match's `log_index` is decremented, and any
//! match that would fall below zero is dropped, decrementing its flag's
//! count.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LoggerError;
use crate::listeners::{Listeners, SubscriptionToken};

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Configuration for a `Logger`, validated at construction time.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Hard cap on retained chunks (and typed-log entries); FIFO eviction.
    pub max_buffer_size: usize,
    /// Default page size for `get_logs` reads.
    pub max_log_size: usize,
    /// Default separator used to join chunks in `get_logs`.
    pub default_separator: String,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            max_buffer_size: 1000,
            max_log_size: 100,
            default_separator: String::new(),
        }
    }
}

/// A type tag carried alongside every entry in the typed-log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEntryType {
    Log,
    Error,
    Info,
    Warn,
    Debug,
    UserInput,
    UserInputSecret,
}

/// One entry in the logger's full ordered, typed history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypedLogEntry {
    pub entry_type: LogEntryType,
    pub text: String,
    pub timestamp_ms: u64,
}

/// A pattern matched against log chunks: either a literal substring or a
/// full regular expression.
#[derive(Debug, Clone)]
pub enum LogPattern {
    Literal(String),
    Regex(Regex),
}

impl LogPattern {
    pub fn find_match(&self, text: &str) -> Option<String> {
        match self {
            LogPattern::Literal(needle) => {
                text.contains(needle.as_str()).then(|| needle.clone())
            }
            LogPattern::Regex(re) => re.find(text).map(|m| m.as_str().to_string()),
        }
    }

    /// Human-readable form for error messages (e.g. ready-check timeouts).
    pub fn describe(&self) -> String {
        match self {
            LogPattern::Literal(s) => s.clone(),
            LogPattern::Regex(re) => re.as_str().to_string(),
        }
    }
}

impl From<&str> for LogPattern {
    fn from(value: &str) -> Self {
        LogPattern::Literal(value.to_string())
    }
}

impl From<String> for LogPattern {
    fn from(value: String) -> Self {
        LogPattern::Literal(value)
    }
}

impl From<Regex> for LogPattern {
    fn from(value: Regex) -> Self {
        LogPattern::Regex(value)
    }
}

/// Color tag for a flag, used by downstream renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagColor {
    Green,
    Blue,
    Red,
    Yellow,
    Teal,
    Purple,
    Orange,
}

/// A named pattern the logger tracks matches for.
#[derive(Debug, Clone)]
pub struct FlagDefinition {
    pub pattern: LogPattern,
    pub color: FlagColor,
    pub target_count: Option<u32>,
    pub context_window_size: u32,
}

impl FlagDefinition {
    pub fn new(pattern: impl Into<LogPattern>, color: FlagColor) -> Self {
        Self {
            pattern: pattern.into(),
            color,
            target_count: None,
            context_window_size: 5,
        }
    }

    pub fn with_target_count(mut self, target_count: u32) -> Self {
        self.target_count = Some(target_count);
        self
    }

    pub fn with_context_window_size(mut self, size: u32) -> Self {
        self.context_window_size = size;
        self
    }
}

/// A single recorded match of a flag's pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagMatch {
    pub log_index: usize,
    pub matched_text: String,
    pub timestamp_ms: u64,
    pub context_window_size: u32,
}

/// The live state of one registered flag: its definition plus every match
/// still within the retained buffer window.
#[derive(Debug, Clone)]
pub struct FlagState {
    pub definition: FlagDefinition,
    pub count: u32,
    pub matches: VecDeque<FlagMatch>,
}

impl FlagState {
    fn new(definition: FlagDefinition) -> Self {
        Self {
            definition,
            count: 0,
            matches: VecDeque::new(),
        }
    }
}

/// Payload delivered to `on_log`/`on_error` subscribers.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub text: String,
    pub is_error: bool,
    pub timestamp_ms: u64,
}

/// Options for `Logger::get_logs`. `number_of_lines` and `separator` default
/// to the logger's configured `max_log_size` and `default_separator`.
#[derive(Debug, Clone, Default)]
pub struct GetLogsOptions {
    pub index: i64,
    pub number_of_lines: Option<i64>,
    pub separator: Option<String>,
    pub most_recent_first: bool,
}

struct Inner {
    logs: VecDeque<String>,
    errors: VecDeque<String>,
    typed_log: Vec<TypedLogEntry>,
    flags: HashMap<String, FlagState>,
}

/// Bounded ring buffer of a process's stdout/stderr, with flag tracking.
///
/// Exclusively owned by one `ProcessUnit` for that unit's lifetime (spec.md
/// §3). All operations lock a single internal mutex, so `get_logs` always
/// observes a consistent snapshot and listeners see events in append order.
pub struct Logger {
    config: LoggerConfig,
    inner: Mutex<Inner>,
    on_log: Arc<Listeners<LogEvent>>,
    on_error: Arc<Listeners<LogEvent>>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        if config.max_log_size > config.max_buffer_size {
            return Err(LoggerError::InvalidConfig {
                max_log_size: config.max_log_size,
                max_buffer_size: config.max_buffer_size,
            });
        }
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                logs: VecDeque::new(),
                errors: VecDeque::new(),
                typed_log: Vec::new(),
                flags: HashMap::new(),
            }),
            on_log: Arc::new(Listeners::new()),
            on_error: Arc::new(Listeners::new()),
        })
    }

    /// Appends one chunk of output. `type_tag` defaults to `Error` when
    /// `is_error` is set, otherwise `Log`.
    pub fn add_chunk(&self, text: impl Into<String>, is_error: bool, type_tag: Option<LogEntryType>) {
        let text = text.into();
        let timestamp_ms = now_ms();
        let mut inner = self.inner.lock().expect("logger poisoned");

        inner.logs.push_back(text.clone());
        if inner.logs.len() > self.config.max_buffer_size {
            inner.logs.pop_front();
            evict_one(&mut inner.flags);
        }

        if is_error {
            inner.errors.push_back(text.clone());
            if inner.errors.len() > self.config.max_buffer_size {
                inner.errors.pop_front();
            }
        }

        let entry_type = type_tag.unwrap_or(if is_error {
            LogEntryType::Error
        } else {
            LogEntryType::Log
        });
        inner.typed_log.push(TypedLogEntry {
            entry_type,
            text: text.clone(),
            timestamp_ms,
        });
        if inner.typed_log.len() > self.config.max_buffer_size {
            inner.typed_log.remove(0);
        }

        let new_index = inner.logs.len() - 1;
        for flag in inner.flags.values_mut() {
            if let Some(matched_text) = flag.definition.pattern.find_match(&text) {
                flag.matches.push_back(FlagMatch {
                    log_index: new_index,
                    matched_text,
                    timestamp_ms,
                    context_window_size: flag.definition.context_window_size,
                });
                flag.count += 1;
            }
        }

        drop(inner);

        let event = LogEvent {
            text,
            is_error,
            timestamp_ms,
        };
        if is_error {
            self.on_error.emit(event);
        } else {
            self.on_log.emit(event);
        }
    }

    /// Returns a joined slice of retained log chunks. Empty (not an error)
    /// when `index` is at or beyond the buffer length.
    pub fn get_logs(&self, opts: GetLogsOptions) -> Result<String, LoggerError> {
        if opts.index < 0 {
            return Err(LoggerError::InvalidArgument("index must not be negative"));
        }
        if matches!(opts.number_of_lines, Some(n) if n < 0) {
            return Err(LoggerError::InvalidArgument(
                "number_of_lines must not be negative",
            ));
        }

        let inner = self.inner.lock().expect("logger poisoned");
        let len = inner.logs.len();
        let index = opts.index as usize;
        if index >= len {
            return Ok(String::new());
        }

        let number_of_lines = opts
            .number_of_lines
            .map(|n| n as usize)
            .unwrap_or(self.config.max_log_size);
        let separator = opts
            .separator
            .unwrap_or_else(|| self.config.default_separator.clone());

        if opts.most_recent_first {
            let end = len.saturating_sub(index);
            let start = end.saturating_sub(number_of_lines);
            let mut slice: Vec<&str> = inner
                .logs
                .iter()
                .skip(start)
                .take(end - start)
                .map(String::as_str)
                .collect();
            slice.reverse();
            Ok(slice.join(&separator))
        } else {
            let end = (index + number_of_lines).min(len);
            let slice: Vec<&str> = inner
                .logs
                .iter()
                .skip(index)
                .take(end - index)
                .map(String::as_str)
                .collect();
            Ok(slice.join(&separator))
        }
    }

    /// Returns the full ordered, typed history.
    pub fn get_typed_logs(&self) -> Vec<TypedLogEntry> {
        self.inner.lock().expect("logger poisoned").typed_log.clone()
    }

    /// Returns a snapshot clone of the retained `logs` ring, oldest first.
    pub fn snapshot_logs(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("logger poisoned")
            .logs
            .iter()
            .cloned()
            .collect()
    }

    pub fn on_log(&self, listener: impl Fn(LogEvent) + Send + Sync + 'static) -> SubscriptionToken<LogEvent> {
        self.on_log.subscribe(listener)
    }

    pub fn on_error(&self, listener: impl Fn(LogEvent) + Send + Sync + 'static) -> SubscriptionToken<LogEvent> {
        self.on_error.subscribe(listener)
    }

    /// Clears both ring buffers, the typed-log history, and every registered
    /// flag (definitions included).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().expect("logger poisoned");
        inner.logs.clear();
        inner.errors.clear();
        inner.typed_log.clear();
        inner.flags.clear();
    }

    pub fn add_flag(&self, name: impl Into<String>, definition: FlagDefinition) {
        let mut inner = self.inner.lock().expect("logger poisoned");
        inner.flags.insert(name.into(), FlagState::new(definition));
    }

    pub fn remove_flag(&self, name: &str) -> Option<FlagState> {
        self.inner.lock().expect("logger poisoned").flags.remove(name)
    }

    pub fn get_flag(&self, name: &str) -> Option<FlagState> {
        self.inner.lock().expect("logger poisoned").flags.get(name).cloned()
    }

    pub fn get_all_flags(&self) -> HashMap<String, FlagState> {
        self.inner.lock().expect("logger poisoned").flags.clone()
    }

    pub fn clear_flags(&self) {
        self.inner.lock().expect("logger poisoned").flags.clear();
    }

    /// Records a typed stdin entry (used by `ProcessUnit::send_stdin`).
    pub fn record_stdin(&self, input: &str, secret: bool) {
        let entry_type = if secret {
            LogEntryType::UserInputSecret
        } else {
            LogEntryType::UserInput
        };
        let mut inner = self.inner.lock().expect("logger poisoned");
        inner.typed_log.push(TypedLogEntry {
            entry_type,
            text: input.to_string(),
            timestamp_ms: now_ms(),
        });
        if inner.typed_log.len() > self.config.max_buffer_size {
            inner.typed_log.remove(0);
        }
    }

    /// Returns the chunks in `[log_index - window/2, log_index + window/2]`,
    /// clipped to buffer bounds.
    pub fn get_context_window(&self, log_index: usize, window_size: usize) -> Vec<String> {
        let inner = self.inner.lock().expect("logger poisoned");
        let len = inner.logs.len();
        if len == 0 {
            return Vec::new();
        }
        let half = window_size / 2;
        let start = log_index.saturating_sub(half);
        let end = (log_index + half).min(len - 1);
        if start > end || start >= len {
            return Vec::new();
        }
        inner
            .logs
            .iter()
            .skip(start)
            .take(end - start + 1)
            .cloned()
            .collect()
    }
}

/// Renumbers (or drops) every flag match after one chunk has been evicted
/// from the head of the ring. `count` never goes negative.
fn evict_one(flags: &mut HashMap<String, FlagState>) {
    for flag in flags.values_mut() {
        let mut dropped = 0u32;
        let mut renumbered = VecDeque::with_capacity(flag.matches.len());
        for mut m in std::mem::take(&mut flag.matches) {
            if m.log_index == 0 {
                dropped += 1;
                continue;
            }
            m.log_index -= 1;
            renumbered.push_back(m);
        }
        flag.matches = renumbered;
        flag.count = flag.count.saturating_sub(dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_buffer_size: usize, max_log_size: usize) -> LoggerConfig {
        LoggerConfig {
            max_buffer_size,
            max_log_size,
            default_separator: String::new(),
        }
    }

    #[test]
    fn construction_rejects_oversized_page() {
        let err = Logger::new(config(2, 3)).unwrap_err();
        assert!(matches!(err, LoggerError::InvalidConfig { .. }));
    }

    #[test]
    fn buffer_never_exceeds_capacity() {
        let logger = Logger::new(config(3, 3)).unwrap();
        for i in 0..10 {
            logger.add_chunk(format!("line {i}"), false, None);
        }
        assert_eq!(logger.snapshot_logs().len(), 3);
    }

    #[test]
    fn eviction_renumbers_and_drops_flag_matches() {
        // Scenario 5 from spec.md §8.
        let logger = Logger::new(config(3, 3)).unwrap();
        logger.add_flag("err", FlagDefinition::new("ERROR", FlagColor::Red));

        logger.add_chunk("ok1", false, None);
        logger.add_chunk("ERROR at 1", false, None);
        logger.add_chunk("ok2", false, None);
        logger.add_chunk("ok3", false, None);
        logger.add_chunk("ok4", false, None);

        assert_eq!(
            logger.snapshot_logs(),
            vec!["ok2".to_string(), "ok3".to_string(), "ok4".to_string()]
        );
        let flag = logger.get_flag("err").unwrap();
        assert_eq!(flag.count, 0);
        assert!(flag.matches.is_empty());
    }

    #[test]
    fn get_logs_boundary_behaviors() {
        let logger = Logger::new(config(5, 5)).unwrap();
        for i in 0..3 {
            logger.add_chunk(format!("{i}"), false, None);
        }

        let at_end = logger
            .get_logs(GetLogsOptions {
                index: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(at_end, "");

        let negative = logger.get_logs(GetLogsOptions {
            index: -1,
            ..Default::default()
        });
        assert!(matches!(negative, Err(LoggerError::InvalidArgument(_))));
    }

    #[test]
    fn get_logs_most_recent_first_reverses_the_tail() {
        let logger = Logger::new(config(5, 5)).unwrap();
        for i in 0..5 {
            logger.add_chunk(format!("{i}"), false, None);
        }

        let joined = logger
            .get_logs(GetLogsOptions {
                index: 0,
                number_of_lines: Some(3),
                separator: Some(",".to_string()),
                most_recent_first: true,
            })
            .unwrap();
        assert_eq!(joined, "4,3,2");
    }

    #[test]
    fn reset_clears_logs_and_flags() {
        let logger = Logger::new(config(5, 5)).unwrap();
        logger.add_flag("any", FlagDefinition::new("x", FlagColor::Blue));
        logger.add_chunk("xyz", false, None);

        logger.reset();

        assert_eq!(
            logger
                .get_logs(GetLogsOptions::default())
                .unwrap(),
            ""
        );
        assert!(logger.get_all_flags().is_empty());
    }

    #[test]
    fn error_chunks_mirror_into_errors_ring_and_error_event() {
        let logger = Logger::new(config(5, 5)).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let _token = logger.on_error(move |event| seen_clone.lock().unwrap().push(event.text));

        logger.add_chunk("boom", true, None);

        assert_eq!(seen.lock().unwrap().as_slice(), ["boom".to_string()]);
    }

    #[test]
    fn context_window_clips_to_bounds() {
        let logger = Logger::new(config(10, 10)).unwrap();
        for i in 0..5 {
            logger.add_chunk(format!("{i}"), false, None);
        }
        let window = logger.get_context_window(0, 4);
        assert_eq!(window, vec!["0", "1", "2"]);
    }

    #[test]
    fn regex_flag_matches_full_pattern() {
        let logger = Logger::new(config(10, 10)).unwrap();
        logger.add_flag(
            "warn",
            FlagDefinition::new(Regex::new(r"WARN\d+").unwrap(), FlagColor::Yellow),
        );
        logger.add_chunk("prefix WARN42 suffix", false, None);
        let flag = logger.get_flag("warn").unwrap();
        assert_eq!(flag.count, 1);
        assert_eq!(flag.matches[0].matched_text, "WARN42");
    }
}
