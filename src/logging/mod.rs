//! Asynchronous logging backend for the `log` facade.
//!
//! Call sites use `log::info!` and friends. [`install`] routes every record
//! into a bounded crossbeam queue drained by a dedicated thread that writes
//! colored lines to stderr. A full queue drops entries instead of blocking
//! the caller.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;

// ---------------------------------------------------------------------------
// Log Level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Off = 5,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Off => "OFF",
        }
    }

    /// Lenient parse; unknown names fall back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "off" | "none" | "disabled" => Self::Off,
            _ => Self::Info,
        }
    }

    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            Self::Trace => log::LevelFilter::Trace,
            Self::Debug => log::LevelFilter::Debug,
            Self::Info => log::LevelFilter::Info,
            Self::Warn => log::LevelFilter::Warn,
            Self::Error => log::LevelFilter::Error,
            Self::Off => log::LevelFilter::Off,
        }
    }

    fn color_code(&self) -> &'static str {
        match self {
            Self::Trace => "\x1b[90m", // gray
            Self::Debug => "\x1b[36m", // cyan
            Self::Info => "\x1b[32m",  // green
            Self::Warn => "\x1b[33m",  // yellow
            Self::Error => "\x1b[31m", // red
            Self::Off => "",
        }
    }
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Trace => Self::Trace,
            log::Level::Debug => Self::Debug,
            log::Level::Info => Self::Info,
            log::Level::Warn => Self::Warn,
            log::Level::Error => Self::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Log Entry
// ---------------------------------------------------------------------------

/// What a queued line describes
#[derive(Debug, Clone, PartialEq)]
pub enum EntryKind {
    /// A `log` record
    Message { target: Option<String>, text: String },
    /// Incoming request
    Request { method: String, path: String },
    /// Finished response
    Response {
        method: String,
        path: String,
        status: u16,
        duration_ms: f64,
    },
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub request_id: Option<String>,
    pub kind: EntryKind,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            request_id: None,
            kind: EntryKind::Message {
                target: None,
                text: message.into(),
            },
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        if let EntryKind::Message { target: slot, .. } = &mut self.kind {
            *slot = Some(target.into());
        }
        self
    }

    pub fn request(method: &str, path: &str, request_id: Option<&str>) -> Self {
        Self {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            request_id: request_id.map(str::to_owned),
            kind: EntryKind::Request {
                method: method.to_owned(),
                path: path.to_owned(),
            },
        }
    }

    /// 5xx responses are logged at warn
    pub fn response(
        method: &str,
        path: &str,
        status: u16,
        duration_ms: f64,
        request_id: Option<&str>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level: if status >= 500 {
                LogLevel::Warn
            } else {
                LogLevel::Info
            },
            request_id: request_id.map(str::to_owned),
            kind: EntryKind::Response {
                method: method.to_owned(),
                path: path.to_owned(),
                status,
                duration_ms,
            },
        }
    }

    /// One terminal line with ANSI colors
    fn format_colored(&self) -> String {
        const RESET: &str = "\x1b[0m";
        const DIM: &str = "\x1b[2m";
        const ARROW: &str = "\x1b[35m";

        let head = format!(
            "{DIM}{}{RESET} {}{:<5}{RESET}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
            self.level.color_code(),
            self.level.as_str()
        );
        let rid = self.request_id.as_deref().unwrap_or("-");

        match &self.kind {
            EntryKind::Message { target, text } => match target {
                Some(target) => format!("{head} {DIM}{target}{RESET} {text}"),
                None => format!("{head} {text}"),
            },
            EntryKind::Request { method, path } => {
                format!("{head} {ARROW}-->{RESET} {method} {path} {DIM}[{rid}]{RESET}")
            }
            EntryKind::Response {
                method,
                path,
                status,
                duration_ms,
            } => {
                let status_color = match *status {
                    200..=299 => "\x1b[32m",
                    300..=399 => "\x1b[36m",
                    400..=499 => "\x1b[33m",
                    500..=599 => "\x1b[31m",
                    _ => "\x1b[37m",
                };
                format!(
                    "{head} {ARROW}<--{RESET} {method} {path} {status_color}{status}{RESET} \
                     {DIM}{duration_ms:.2}ms [{rid}]{RESET}"
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Log Config
// ---------------------------------------------------------------------------

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to output.
    pub level: LogLevel,
    /// Enable request logging (incoming request).
    pub log_request: bool,
    /// Enable response logging (outgoing response with status and duration).
    pub log_response: bool,
    /// Queue capacity.
    pub queue_size: usize,
    /// Paths to skip logging for (e.g., health check endpoints).
    pub skip_paths: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_request: false,
            log_response: true,
            queue_size: 10_000,
            skip_paths: vec!["/_health".to_string(), "/favicon.ico".to_string()],
        }
    }
}

impl LogConfig {
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.log_request = enabled;
        self
    }

    pub fn should_skip_path(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|p| path.starts_with(p))
    }
}

// Dependency targets only reported at warn and above
const NOISY_TARGETS: &[&str] = &["hyper", "h2", "rustls", "reqwest", "tungstenite", "mio"];

fn is_noisy(target: &str) -> bool {
    NOISY_TARGETS
        .iter()
        .any(|t| target.starts_with(t))
}

// ---------------------------------------------------------------------------
// Log Queue (global singleton)
// ---------------------------------------------------------------------------

static LOG_QUEUE: RwLock<Option<LogQueueInner>> = RwLock::new(None);

struct LogQueueInner {
    sender: Sender<LogEntry>,
    config: Arc<RwLock<LogConfig>>,
    running: Arc<AtomicBool>,
}

pub struct LogQueue;

impl LogQueue {
    /// Initialize (or re-initialize) the global log queue.
    pub fn init(config: LogConfig) -> io::Result<()> {
        Self::shutdown();

        let (sender, receiver) = bounded::<LogEntry>(config.queue_size.max(1));
        let running = Arc::new(AtomicBool::new(true));
        let cfg = Arc::new(RwLock::new(config));

        *LOG_QUEUE.write() = Some(LogQueueInner {
            sender,
            config: cfg.clone(),
            running: running.clone(),
        });

        std::thread::Builder::new()
            .name("matchcast-logger".into())
            .spawn(move || log_consumer(receiver, cfg, running))?;
        Ok(())
    }

    /// Update log config at runtime.
    pub fn update_config(config: LogConfig) {
        let guard = LOG_QUEUE.read();
        if let Some(ref inner) = *guard {
            log::set_max_level(config.level.to_filter());
            *inner.config.write() = config;
        }
    }

    /// Shut down the log queue, flushing remaining entries.
    pub fn shutdown() {
        let guard = LOG_QUEUE.read();
        if let Some(ref inner) = *guard {
            inner.running.store(false, Ordering::SeqCst);
        }
        drop(guard);
        // Drop the old sender so the consumer thread exits
        *LOG_QUEUE.write() = None;
    }

    /// Get a copy of the current log config.
    pub fn config() -> Option<LogConfig> {
        let guard = LOG_QUEUE.read();
        guard.as_ref().map(|inner| inner.config.read().clone())
    }
}

/// Send a log entry to the queue (non-blocking, drops if full).
#[inline]
pub fn log_entry(entry: LogEntry) {
    let guard = LOG_QUEUE.read();
    if let Some(ref inner) = *guard {
        if entry.level < inner.config.read().level {
            return;
        }
        let _ = inner.sender.try_send(entry);
    }
}

/// Convenience: log a request.
#[inline]
pub fn log_request(method: &str, path: &str, request_id: Option<&str>) {
    match LogQueue::config() {
        Some(cfg) if cfg.log_request && !cfg.should_skip_path(path) => {}
        _ => return,
    }
    log_entry(LogEntry::request(method, path, request_id));
}

/// Convenience: log a response.
#[inline]
pub fn log_response(
    method: &str,
    path: &str,
    status: u16,
    duration_ms: f64,
    request_id: Option<&str>,
) {
    match LogQueue::config() {
        Some(cfg) if cfg.log_response && !cfg.should_skip_path(path) => {}
        _ => return,
    }
    log_entry(LogEntry::response(
        method,
        path,
        status,
        duration_ms,
        request_id,
    ));
}

/// Consumer thread: drains the queue and writes to stderr.
fn log_consumer(
    receiver: Receiver<LogEntry>,
    config: Arc<RwLock<LogConfig>>,
    running: Arc<AtomicBool>,
) {
    use std::io::Write;

    let stderr = io::stderr();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(std::time::Duration::from_millis(100)) {
            Ok(entry) => {
                if entry.level >= config.read().level {
                    let line = entry.format_colored();
                    let mut handle = stderr.lock();
                    let _ = writeln!(handle, "{}", line);
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    // Flush remaining entries
    for entry in receiver.try_iter() {
        if entry.level >= config.read().level {
            eprintln!("{}", entry.format_colored());
        }
    }
}

// ---------------------------------------------------------------------------
// `log` facade bridge
// ---------------------------------------------------------------------------

struct QueueLogger;

static LOGGER: QueueLogger = QueueLogger;

impl log::Log for QueueLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        if is_noisy(metadata.target()) && metadata.level() > log::Level::Warn {
            return false;
        }
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        log_entry(
            LogEntry::new(record.level().into(), record.args().to_string())
                .with_target(record.target()),
        );
    }

    fn flush(&self) {}
}

/// Start the queue and make it the `log` backend.
///
/// Installing twice keeps the first logger and only swaps the queue config.
pub fn install(config: LogConfig) -> io::Result<()> {
    let filter = config.level.to_filter();
    LogQueue::init(config)?;
    // set_logger only succeeds once per process
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(filter);
    Ok(())
}
