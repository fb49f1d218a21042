//! Synchronization data types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::DocumentChange;
use crate::repository::{DocumentModel, DocumentRef};

/// A registered synchronization root as served from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRootEntry {
    pub reference: DocumentRef,
    pub path: String,
    pub doc_type: String,
}

impl From<&DocumentModel> for SyncRootEntry {
    fn from(doc: &DocumentModel) -> Self {
        Self {
            reference: doc.reference(),
            path: doc.path.clone(),
            doc_type: doc.doc_type.clone(),
        }
    }
}

/// Where a client's previous successful synchronization ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub last_sync_date: Option<DateTime<Utc>>,
    /// Highest audit log id seen, preferred over the date when present
    pub lower_bound: Option<i64>,
}

impl SyncCheckpoint {
    /// First poll of a device, nothing synchronized yet
    pub fn initial() -> Self {
        Self::default()
    }

    pub fn since_date(date: DateTime<Utc>) -> Self {
        Self {
            last_sync_date: Some(date),
            lower_bound: None,
        }
    }

    pub fn since_log_id(log_id: i64) -> Self {
        Self {
            last_sync_date: None,
            lower_bound: Some(log_id),
        }
    }

    pub fn is_initial(&self) -> bool {
        self.last_sync_date.is_none() && self.lower_bound.is_none()
    }
}

/// Outcome of a change summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    NoChanges,
    FoundChanges,
    /// The client has to run a full resynchronization
    TooManyChanges,
}

/// Changes under a user's synchronization roots since a checkpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChangeSummary {
    /// Most recent first, at most one per document
    pub file_system_changes: Vec<DocumentChange>,
    /// Current snapshot of every changed document still readable
    pub changed_documents: BTreeMap<String, DocumentModel>,
    pub status: SummaryStatus,
    /// Server time of this summary, milliseconds since the epoch
    pub sync_date: i64,
    /// Highest audit log id covered by this summary
    pub upper_bound: i64,
    /// `repository:docId` of every active root, comma separated
    pub active_synchronization_root_definitions: String,
    pub has_too_many_changes: bool,
}

impl DocumentChangeSummary {
    pub fn new(
        file_system_changes: Vec<DocumentChange>,
        changed_documents: BTreeMap<String, DocumentModel>,
        sync_date: DateTime<Utc>,
        upper_bound: i64,
        active_synchronization_root_definitions: String,
    ) -> Self {
        let status = if file_system_changes.is_empty() {
            SummaryStatus::NoChanges
        } else {
            SummaryStatus::FoundChanges
        };

        Self {
            file_system_changes,
            changed_documents,
            status,
            sync_date: sync_date.timestamp_millis(),
            upper_bound,
            active_synchronization_root_definitions,
            has_too_many_changes: false,
        }
    }

    pub fn too_many_changes(
        sync_date: DateTime<Utc>,
        upper_bound: i64,
        active_synchronization_root_definitions: String,
    ) -> Self {
        Self {
            file_system_changes: Vec::new(),
            changed_documents: BTreeMap::new(),
            status: SummaryStatus::TooManyChanges,
            sync_date: sync_date.timestamp_millis(),
            upper_bound,
            active_synchronization_root_definitions,
            has_too_many_changes: true,
        }
    }
}

/// Format roots as `repository:docId,repository:docId`
pub fn format_root_definitions<'a>(
    repository: &str,
    roots: impl IntoIterator<Item = &'a DocumentRef>,
) -> String {
    roots
        .into_iter()
        .map(|r| format!("{}:{}", repository, r))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse `repository:docId` pairs, skipping malformed items
pub fn parse_root_definitions(definitions: &str) -> Vec<(String, DocumentRef)> {
    definitions
        .split(',')
        .map(str::trim)
        .filter_map(|item| item.split_once(':'))
        .filter(|(repo, id)| !repo.is_empty() && !id.is_empty())
        .map(|(repo, id)| (repo.to_string(), DocumentRef::new(id)))
        .collect()
}
