// src/logging.rs
//
// Timestamped `tlog!` logging with level filtering (spec's ambient logging
// section): `DEBUG`/`INFO`/`WARNING`/`ERROR`/`CRITICAL`, matching Python
// `logging`'s level names so `--loglevel` keeps the original's vocabulary.
// Optional file logging is the teacher's `init_file_logging`/
// `stop_file_logging`, adapted from a timestamped-reports-directory scheme
// to the single `--logfile <path>` the CLI surface actually takes.

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

/// Global log file handle. When `Some`, `tlog!` writes to both stderr and this file.
static LOG_FILE: Mutex<Option<std::fs::File>> = Mutex::new(None);

/// Log severity, matching Python `logging`'s level names (spec's ambient
/// logging section / `original_source/lesyd.py`'s `--loglevel` choices).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<LogLevel> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARNING" => Some(LogLevel::Warning),
            "ERROR" => Some(LogLevel::Error),
            "CRITICAL" => Some(LogLevel::Critical),
            _ => None,
        }
    }
}

static MIN_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warning as u8);

/// Set the minimum level `tlog!` will emit. Default is `WARNING`, matching
/// the Python original's `logging.basicConfig` default.
pub fn set_level(level: LogLevel) {
    MIN_LEVEL.store(level as u8, Ordering::Relaxed);
}

fn enabled(level: LogLevel) -> bool {
    level as u8 >= MIN_LEVEL.load(Ordering::Relaxed)
}

/// Emit one line if `level` is at or above the configured minimum.
pub fn log_at(level: LogLevel, args: std::fmt::Arguments) {
    if !enabled(level) {
        return;
    }
    use std::io::Write as _;
    let msg = format!("{} {}", chrono::Local::now().format("%H:%M:%S%.3f"), args);
    eprintln!("{}", msg);
    if let Ok(mut guard) = LOG_FILE.lock() {
        if let Some(ref mut f) = *guard {
            let _ = writeln!(f, "{}", msg);
        }
    }
}

/// Start appending every `tlog!` line to `path`, in addition to stderr.
pub fn init_file_logging(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| format!("failed to open {}: {e}", path.display()))?;

    if let Ok(mut guard) = LOG_FILE.lock() {
        *guard = Some(file);
    }

    eprintln!(
        "{} [logging] file logging started: {}",
        chrono::Local::now().format("%H:%M:%S%.3f"),
        path.display()
    );

    Ok(())
}

/// Stop file logging and close the log file.
#[allow(dead_code)]
pub fn stop_file_logging() {
    if let Ok(mut guard) = LOG_FILE.lock() {
        if guard.is_some() {
            *guard = None;
            eprintln!(
                "{} [logging] file logging stopped",
                chrono::Local::now().format("%H:%M:%S%.3f")
            );
        }
    }
}

/// Timestamped logging macro, gated by the configured minimum level.
/// Prepends `HH:MM:SS.mmm` local time to every message written to stderr.
/// Also writes to the log file when file logging is enabled.
///
/// `tlog!(debug, "...")` / `tlog!(warning, "...")` / etc. tag the level
/// explicitly; a bare `tlog!("...")` defaults to `INFO`.
#[macro_export]
macro_rules! tlog {
    (debug, $($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Debug, format_args!($($arg)*))
    };
    (info, $($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Info, format_args!($($arg)*))
    };
    (warning, $($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Warning, format_args!($($arg)*))
    };
    (error, $($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Error, format_args!($($arg)*))
    };
    (critical, $($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Critical, format_args!($($arg)*))
    };
    ($($arg:tt)*) => {
        $crate::logging::log_at($crate::logging::LogLevel::Info, format_args!($($arg)*))
    };
}
