//! Audit trail data types

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of events emitted by document mutations
pub const DOCUMENT_CATEGORY: &str = "eventDocumentCategory";
/// Category of synchronization root (un)registration events
pub const DRIVE_CATEGORY: &str = "drive";

/// Document lifecycle events recorded in the audit trail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentEvent {
    DocumentCreated,
    DocumentModified,
    DocumentMoved,
    DocumentLocked,
    DocumentUnlocked,
    Deleted,
    RootRegistered,
    RootUnregistered,
}

impl DocumentEvent {
    pub const ALL: [DocumentEvent; 8] = [
        DocumentEvent::DocumentCreated,
        DocumentEvent::DocumentModified,
        DocumentEvent::DocumentMoved,
        DocumentEvent::DocumentLocked,
        DocumentEvent::DocumentUnlocked,
        DocumentEvent::Deleted,
        DocumentEvent::RootRegistered,
        DocumentEvent::RootUnregistered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentEvent::DocumentCreated => "documentCreated",
            DocumentEvent::DocumentModified => "documentModified",
            DocumentEvent::DocumentMoved => "documentMoved",
            DocumentEvent::DocumentLocked => "documentLocked",
            DocumentEvent::DocumentUnlocked => "documentUnlocked",
            DocumentEvent::Deleted => "deleted",
            DocumentEvent::RootRegistered => "rootRegistered",
            DocumentEvent::RootUnregistered => "rootUnregistered",
        }
    }

    pub fn category(&self) -> &'static str {
        if self.is_root_event() {
            DRIVE_CATEGORY
        } else {
            DOCUMENT_CATEGORY
        }
    }

    /// Root events are scoped to the user who emitted them
    pub fn is_root_event(&self) -> bool {
        matches!(self, DocumentEvent::RootRegistered | DocumentEvent::RootUnregistered)
    }

    /// Whether the document is gone from the client's point of view
    pub fn is_removal(&self) -> bool {
        matches!(self, DocumentEvent::Deleted | DocumentEvent::RootUnregistered)
    }
}

impl fmt::Display for DocumentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentEvent::ALL
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown audit event: {}", s))
    }
}

/// An entry to append to the audit trail
#[derive(Debug, Clone)]
pub struct AuditRecord<'a> {
    pub event: DocumentEvent,
    pub repository: &'a str,
    pub doc_id: &'a str,
    pub doc_path: &'a str,
    pub doc_type: &'a str,
    pub principal: &'a str,
}

/// A stored audit entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Monotonically increasing log id
    pub id: i64,
    pub event: DocumentEvent,
    pub category: String,
    pub repository: String,
    pub doc_id: String,
    pub doc_path: String,
    pub doc_type: String,
    pub principal: String,
    pub event_date: DateTime<Utc>,
}
