//! Styled terminal output for the operator CLI.
//!
//! Uses `anstyle` for ANSI style definitions and `anstream` for auto-detecting
//! terminal capabilities. Output gracefully degrades to plain text when piped
//! or when the terminal doesn't support colors.

mod styles;

use std::io::Write;

use conveyor_shared::kv::TaskStatus;
pub(crate) use styles::clap_styles;
use styles::{ERROR, HEADER, LABEL, PENDING, SUCCESS, WARNING};

/// Print an error message to stderr (red X prefix).
pub(crate) fn error(msg: impl std::fmt::Display) {
    let mut out = anstream::stderr().lock();
    writeln!(out, "{ERROR}✗ {msg}{ERROR:#}").ok();
}

/// Print a warning message (yellow exclamation prefix).
pub(crate) fn warning(msg: impl std::fmt::Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{WARNING}! {msg}{WARNING:#}").ok();
}

/// Print a section header (bold, cyan).
pub(crate) fn header(msg: impl std::fmt::Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "{HEADER}{msg}{HEADER:#}").ok();
}

/// Print a labeled value ("  Label: value" with the label bolded).
pub(crate) fn label(name: impl std::fmt::Display, value: impl std::fmt::Display) {
    let mut out = anstream::stdout().lock();
    writeln!(out, "  {LABEL}{name}:{LABEL:#} {value}").ok();
}

/// Print a `Status: <value>` line colored by `TaskStatus` — dim while
/// pending/queued, yellow while processing, green once completed, red on
/// failure (§4.2).
pub(crate) fn task_status_label(status: TaskStatus) {
    let mut out = anstream::stdout().lock();
    let rendered = format!("{status:?}").to_lowercase();
    match status {
        TaskStatus::Pending | TaskStatus::Queued => {
            writeln!(out, "  {LABEL}Status:{LABEL:#} {PENDING}{rendered}{PENDING:#}").ok()
        }
        TaskStatus::Processing => {
            writeln!(out, "  {LABEL}Status:{LABEL:#} {WARNING}{rendered}{WARNING:#}").ok()
        }
        TaskStatus::Completed => {
            writeln!(out, "  {LABEL}Status:{LABEL:#} {SUCCESS}{rendered}{SUCCESS:#}").ok()
        }
        TaskStatus::Failed => {
            writeln!(out, "  {LABEL}Status:{LABEL:#} {ERROR}{rendered}{ERROR:#}").ok()
        }
    };
}

/// Print a status line with a colored icon based on health/status.
pub(crate) fn status_icon(healthy: bool, msg: impl std::fmt::Display) {
    let mut out = anstream::stdout().lock();
    if healthy {
        writeln!(out, "  {SUCCESS}✓{SUCCESS:#} {msg}").ok();
    } else {
        writeln!(out, "  {ERROR}✗{ERROR:#} {msg}").ok();
    }
}
