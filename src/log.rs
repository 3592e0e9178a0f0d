//! File logging for quorum runs.
//!
//! Every query fans out to several agents at once, so stdout is reserved for
//! the operator and diagnostics go to `~/.quorum/quorum.log` instead.
//!
//! Levels:
//! - ERROR: a control-boundary failure (no agents, missing backup)
//! - WARN: a recovered agent or file failure (timeout, neutral score, skipped copy)
//! - INFO: pipeline milestones (dispatch, ranking, apply, restore)
//! - DEBUG: per-agent and per-file detail
//! - TRACE: raw agent output
//!
//! `--debug` or `QUORUM_DEBUG=1` raises the level to DEBUG. `QUORUM_LOG=<level>`
//! selects any level explicitly and wins over both.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// Parse a level name as written in `QUORUM_LOG` (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            "trace" => Some(LogLevel::Trace),
            _ => None,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging to `~/.quorum/quorum.log`.
pub fn init(debug: bool) {
    if let Some(app_dir) = dirs::home_dir().map(|h| h.join(".quorum")) {
        init_at(&app_dir.join("quorum.log"), debug);
    } else {
        set_level(resolve_level(debug));
    }
}

/// Initialize logging to an explicit file. The file is truncated.
pub fn init_at(path: &Path, debug: bool) {
    set_level(resolve_level(debug));
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, "");
    LOG_PATH.set(path.to_path_buf()).ok();
}

fn resolve_level(debug: bool) -> LogLevel {
    if let Some(level) = std::env::var("QUORUM_LOG")
        .ok()
        .and_then(|v| LogLevel::parse(&v))
    {
        return level;
    }
    let env_debug = std::env::var("QUORUM_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level <= self::level()
}

pub fn log_at(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
            let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
        }
    }
}

/// Milliseconds elapsed since `start`, for latency lines.
pub fn elapsed_ms(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

#[macro_export]
macro_rules! qlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! qlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! qlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! qlog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
    };
}

/// Skips formatting entirely unless TRACE is enabled; raw agent output can be large.
#[macro_export]
macro_rules! qlog_trace {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
        }
    };
}
