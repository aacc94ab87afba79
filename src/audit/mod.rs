//! Audit Log
//!
//! Append-only record of every mutation and anomaly of one run, written to
//! the Master dataset once at the end.

pub mod event;
pub mod log;

pub use event::{AuditEvent, EventKind};
pub use log::{AuditLog, AUDIT_HEADER};
