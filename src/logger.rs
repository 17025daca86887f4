//! Terminal logging with colored prefixes.
//!
//! - `log!(module; fmt...)`: always printed, `[module]` prefix
//! - `debug!(module; fmt...)`: printed only with `--verbose`
//! - [`status`]: one timestamped line per reload cycle
//!
//! ```ignore
//! log!("reload"; "{} instances started", count);
//! debug!("graph"; "module {} imports {:?}", name, imports);
//! ```
//!
//! `error` and `warning` prefixes go to stderr, everything else to stdout.

use std::io::{Write, stderr, stdout};
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use crossterm::{
    cursor, queue,
    terminal::{Clear, ClearType},
};
use owo_colors::OwoColorize;
use parking_lot::Mutex;

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn set_verbose(v: bool) {
    VERBOSE.store(v, Ordering::SeqCst);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::SeqCst)
}

// ============================================================================
// Macros
// ============================================================================

/// Log a message with a colored module prefix.
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Log a message only when `--verbose` is set. Arguments are not evaluated otherwise.
#[macro_export]
macro_rules! debug {
    ($module:expr; $($arg:tt)*) => {{
        if $crate::logger::is_verbose() {
            $crate::logger::log($module, &format!($($arg)*))
        }
    }};
}

// ============================================================================
// Prefixed lines
// ============================================================================

pub fn log(module: &str, message: &str) {
    let line = format!("{} {message}", colorize_prefix(module));
    if is_diagnostic(module) {
        let mut err = stderr().lock();
        writeln!(err, "{line}").ok();
    } else {
        let mut out = stdout().lock();
        writeln!(out, "{line}").ok();
        out.flush().ok();
    }
    // A prefixed line breaks the overwritable status block
    STATUS.lock().last_lines = 0;
}

fn is_diagnostic(module: &str) -> bool {
    module.eq_ignore_ascii_case("error") || module.eq_ignore_ascii_case("warning")
}

fn colorize_prefix(module: &str) -> String {
    let prefix = format!("[{module}]");
    match module.to_ascii_lowercase().as_str() {
        "run" | "reload" => prefix.bright_blue().bold().to_string(),
        "watch" => prefix.bright_green().bold().to_string(),
        "app" => prefix.bright_magenta().bold().to_string(),
        "check" => prefix.bright_cyan().bold().to_string(),
        "error" => prefix.bright_red().bold().to_string(),
        _ => prefix.bright_yellow().bold().to_string(),
    }
}

// ============================================================================
// Cycle status
// ============================================================================

/// How a reload cycle ended, as far as the terminal is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing changed. Overwritten by the next status line.
    Quiet,
    /// Instances were stopped or started.
    Applied,
    /// Some instances are blocked.
    Warning,
    /// Per-file, per-entry or per-instance errors.
    Failed,
}

impl Outcome {
    fn symbol(self) -> String {
        match self {
            Self::Quiet => String::new(),
            Self::Applied => "✓".green().to_string(),
            Self::Warning => "⚠".yellow().to_string(),
            Self::Failed => "✗".red().to_string(),
        }
    }
}

/// Status block of the most recent cycle.
///
/// A quiet cycle replaces the previous quiet block in place, so an idle
/// manager does not scroll the terminal. Every other outcome stays on screen.
pub struct CycleStatus {
    /// Lines of the previous quiet block, cleared before the next status.
    last_lines: usize,
}

static STATUS: LazyLock<Mutex<CycleStatus>> = LazyLock::new(|| Mutex::new(CycleStatus::new()));

impl CycleStatus {
    pub const fn new() -> Self {
        Self { last_lines: 0 }
    }

    pub fn show(&mut self, outcome: Outcome, summary: &str, detail: &str) {
        let mut out = stdout().lock();
        if self.last_lines > 0 {
            #[allow(clippy::cast_possible_truncation)]
            let lines = self.last_lines as u16;
            queue!(out, cursor::MoveUp(lines), Clear(ClearType::FromCursorDown)).ok();
        }

        let block = render_block(&clock(unix_secs()), outcome, summary, detail);
        write!(out, "{block}").ok();
        out.flush().ok();

        self.last_lines = match outcome {
            Outcome::Quiet => block.lines().count(),
            _ => 0,
        };
    }
}

/// Show one cycle outcome on the shared status block.
pub fn status(outcome: Outcome, summary: &str, detail: &str) {
    STATUS.lock().show(outcome, summary, detail);
}

fn render_block(time: &str, outcome: Outcome, summary: &str, detail: &str) -> String {
    let timestamp = format!("[{time}]").dimmed().to_string();
    let head = match outcome {
        Outcome::Quiet => format!("{timestamp} {}", summary.dimmed()),
        _ => format!("{timestamp} {} {summary}", outcome.symbol()),
    };
    let mut block = format!("{head}\n");
    for line in detail.lines().filter(|l| !l.is_empty()) {
        block.push_str(&format!("  {line}\n"));
    }
    block
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// `HH:MM:SS` (UTC) of a unix timestamp.
fn clock(secs: u64) -> String {
    let (h, m, s) = ((secs / 3600) % 24, (secs / 60) % 60, secs % 60);
    format!("{h:02}:{m:02}:{s:02}")
}

// ============================================================================
// Tests
// ============================================================================
