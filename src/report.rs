//! Report generation collaborator seam and default generator
//!
//! The engine only decides *when* a report happens; *what* it contains
//! belongs to the [`ReportGenerator`] implementation. The bundled
//! [`BasicGenerator`] writes a small JSON envelope so the crate is
//! usable out of the box; embedders with a richer formatter swap it via
//! `trigger::set_generator`.
//!
//! This module also owns the default file-naming policy.

use crate::config;
use crate::trigger::TriggerEvent;
use chrono::Local;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Turns a trigger description into a formatted diagnostic report.
///
/// Implementations may be invoked from inside a fatal-error handler
/// while the runtime is in an indeterminate state, and are responsible
/// for being safe under that condition.
pub trait ReportGenerator: Send + Sync {
    fn write_report(&self, event: &TriggerEvent<'_>, out: &mut dyn Write) -> std::io::Result<()>;
}

// =============================================================================
// Default generator
// =============================================================================

#[derive(Serialize)]
struct ErrorDetail {
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<String>,
}

#[derive(Serialize)]
struct Envelope<'a> {
    report_version: u32,
    trigger: &'static str,
    location: &'a str,
    timestamp: String,
    pid: u32,
    command_line: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorDetail>,
}

/// Minimal JSON report: trigger attribution, timestamp, process
/// identity and the script error if one was supplied.
pub struct BasicGenerator;

impl ReportGenerator for BasicGenerator {
    fn write_report(&self, event: &TriggerEvent<'_>, out: &mut dyn Write) -> std::io::Result<()> {
        let envelope = Envelope {
            report_version: 1,
            trigger: event.kind.label(),
            location: event.location,
            timestamp: Local::now().to_rfc3339(),
            pid: std::process::id(),
            command_line: std::env::args().collect(),
            error: event.error.map(|e| ErrorDetail {
                message: e.message(),
                stack: e.stack(),
            }),
        };
        serde_json::to_writer_pretty(&mut *out, &envelope)?;
        out.write_all(b"\n")
    }
}

// =============================================================================
// File-naming policy
// =============================================================================

static SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Default report filename: `report.<date>.<time>.<pid>.<seq>.json`.
/// The sequence component makes back-to-back default-named reports
/// distinct even within one clock second.
pub fn default_filename() -> String {
    let seq = SEQUENCE.fetch_add(1, Ordering::SeqCst);
    format!(
        "report.{}.{}.{}.json",
        Local::now().format("%Y%m%d.%H%M%S"),
        std::process::id(),
        seq
    )
}

/// Resolve the output path for a report: explicit per-call name, then
/// the configured override, then a fresh default name, inside the
/// configured directory if one is set.
pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
    let name = match explicit {
        Some(name) => name.to_string(),
        None => config::filename().unwrap_or_else(default_filename),
    };
    match config::directory() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::TriggerKind;

    #[test]
    fn test_default_filenames_are_distinct() {
        let a = default_filename();
        let b = default_filename();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert!(a.starts_with("report."));
        assert!(a.ends_with(".json"));
    }

    #[test]
    fn test_envelope_contains_trigger_attribution() {
        let event = TriggerEvent {
            kind: TriggerKind::FatalError,
            location: "OOM",
            error: None,
            filename: None,
        };
        let mut buf = Vec::new();
        BasicGenerator.write_report(&event, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"trigger\": \"FatalError\""));
        assert!(text.contains("\"location\": \"OOM\""));
    }

    #[test]
    fn test_envelope_carries_script_error() {
        struct Boom;
        impl crate::runtime::ScriptError for Boom {
            fn message(&self) -> String {
                "boom".into()
            }
            fn stack(&self) -> Option<String> {
                Some("at main:1:1".into())
            }
        }
        let boom = Boom;
        let event = TriggerEvent {
            kind: TriggerKind::Exception,
            location: "uncaught exception",
            error: Some(&boom),
            filename: None,
        };
        let mut buf = Vec::new();
        BasicGenerator.write_report(&event, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("\"message\": \"boom\""));
        assert!(text.contains("at main:1:1"));
    }
}
