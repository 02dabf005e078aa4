//! Audit trail of sanitization decisions.

pub mod logger;

pub use logger::{AuditEvent, AuditLogger, Status};
