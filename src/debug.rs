//! Renewal diagnostics for gmail-token-renew
//!
//! Stdout carries the operator transcript, token included, so step traces go
//! to ~/.config/gmail-token-renew/debug.log instead. Each run is tagged with
//! the Secret Manager project it works against. Only secret names, lengths
//! and step transitions belong here; never values.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use crate::config;

const LOG_FILE: &str = "debug.log";

static RENEWAL_TRACE: OnceLock<Mutex<RenewalTrace>> = OnceLock::new();

struct RenewalTrace {
    project: String,
    file: Option<File>,
    started: Instant,
}

/// Header written when a renewal run opens the log
fn session_header(project: &str, started_at: &str) -> String {
    format!("\n===== token renewal for {} started at {} =====", project, started_at)
}

/// One trace line: elapsed seconds, project tag, message
fn trace_line(elapsed: Duration, project: &str, message: &str) -> String {
    format!("[{:>8.3}s {}] {}", elapsed.as_secs_f64(), project, message)
}

/// Starts the trace for one renewal run. With `enabled` false every
/// `debug_log!` call is a no-op.
pub fn init(enabled: bool, project: &str) {
    let file = enabled
        .then(|| config::ensure_config_dir().ok())
        .flatten()
        .and_then(|dir| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE))
                .ok()
        })
        .map(|mut f| {
            let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
            let _ = writeln!(f, "{}", session_header(project, &now));
            f
        });

    let _ = RENEWAL_TRACE.set(Mutex::new(RenewalTrace {
        project: project.to_string(),
        file,
        started: Instant::now(),
    }));
}

/// Appends a step to the trace, if one is open.
pub fn log(message: &str) {
    if let Some(trace) = RENEWAL_TRACE.get()
        && let Ok(mut guard) = trace.lock()
    {
        let line = trace_line(guard.started.elapsed(), &guard.project, message);
        if let Some(ref mut file) = guard.file {
            let _ = writeln!(file, "{}", line);
            let _ = file.flush();
        }
    }
}

/// Logs a formatted renewal step.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::debug::log(&format!($($arg)*))
    };
}
