//! Per-run log file for pixelsel.
//!
//! `init` opens `pixelsel/pixelsel.log` under the platform data directory,
//! wiping whatever the previous run left there:
//!   Windows:  `%APPDATA%`
//!   Linux:    `$XDG_DATA_HOME` or `~/.local/share`
//!   macOS:    `~/Library/Application Support`
//!
//! Code logs through `log_info!` / `log_warn!` / `log_err!`. Before `init`
//! (and with echo off) those macros return without formatting anything.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

struct Session {
    path: PathBuf,
    file: Mutex<File>,
}

static SESSION: OnceLock<Session> = OnceLock::new();
static ECHO: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// Where this run is logging, if `init` succeeded.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

/// Also copy log lines to stderr (`--verbose`).
pub fn set_echo(enabled: bool) {
    ECHO.store(enabled, Ordering::Relaxed);
}

fn enabled() -> bool {
    SESSION.get().is_some() || ECHO.load(Ordering::Relaxed)
}

/// Append a raw line. Write failures are dropped.
pub fn write_line(line: &str) {
    if ECHO.load(Ordering::Relaxed) {
        eprintln!("{}", line);
    }
    if let Some(session) = SESSION.get()
        && let Ok(mut file) = session.file.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Append `[HH:MM:SS] [LEVEL] message`. Used by the logging macros.
pub fn write(level: Level, args: fmt::Arguments<'_>) {
    if !enabled() {
        return;
    }
    write_line(&format!("[{}] [{}] {}", clock(), level, args));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Open the log in the platform data directory.
pub fn init() {
    init_at(&data_dir().join("pixelsel").join("pixelsel.log"));
}

/// Open the log at `path` and route panics into it. Later calls do nothing.
pub fn init_at(path: &Path) {
    if SESSION.get().is_some() {
        return;
    }
    if let Some(dir) = path.parent() {
        let _ = fs::create_dir_all(dir);
    }

    let opened = OpenOptions::new().create(true).write(true).truncate(true).open(path);
    let file = match opened {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    let _ = SESSION.set(Session { path: path.to_path_buf(), file: Mutex::new(file) });

    write_line(&format!("=== pixelsel run, unix time {} ===", unix_secs().unwrap_or(0)));
    write_line(&format!("log: {}", path.display()));
    write_line("");

    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format!("[{}] [PANIC] {}", clock(), info));
        chained(info);
    }));
}

fn data_dir() -> PathBuf {
    let env = |key: &str| std::env::var_os(key).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    {
        if let Some(dir) = env("APPDATA") {
            return dir;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = env("HOME") {
            return home.join("Library").join("Application Support");
        }
    }

    env("XDG_DATA_HOME")
        .or_else(|| env("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn unix_secs() -> Option<u64> {
    SystemTime::now().duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// UTC wall clock, `HH:MM:SS`.
fn clock() -> String {
    match unix_secs() {
        Some(s) => format!("{:02}:{:02}:{:02}", s / 3600 % 24, s / 60 % 60, s % 60),
        None => "--:--:--".to_string(),
    }
}
