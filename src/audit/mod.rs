//! Audit trail of document lifecycle events
//!
//! Provides:
//! - Append-only event log written alongside document mutations
//! - Change finder querying the log under a set of root paths
//!
//! Log ids increase monotonically. Clients may checkpoint either on the
//! last successful synchronization date or on the highest log id they
//! have seen (`upperBound` of a change summary).

mod finder;
mod log;
mod types;

pub use finder::{AuditChangeFinder, ChangeBound, ChangeFinder, ChangeQuery, DocumentChange};
pub use log::{append, AuditLog};
pub use types::{AuditEntry, AuditRecord, DocumentEvent, DOCUMENT_CATEGORY, DRIVE_CATEGORY};
