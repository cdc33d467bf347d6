//! Ripcord: diagnostic-report triggering for an embedded managed runtime
//!
//! Detects four trigger classes - explicit API call, fatal internal
//! error, uncaught script exception, external OS signal - and funnels
//! all of them into one de-duplicated, thread-safe path that generates
//! the report on a thread where inspecting runtime state is legal.
//! Report content itself is pluggable (`report::ReportGenerator`).

pub mod bridge;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pending;
pub mod report;
pub mod runtime;
pub mod signals;
pub mod trigger;
pub mod watchdog;
