//! Change finder over the audit trail
//!
//! Turns audit entries recorded under a user's synchronization roots into
//! document changes. The result count is bounded: when more entries match
//! than the caller allows, the finder fails instead of truncating so the
//! client knows it has to run a full resynchronization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::log::AuditRow;
use super::types::{AuditEntry, DocumentEvent};
use crate::drive::blacklist::BlacklistedDocumentType;
use crate::error::{DriveError, DriveResult};

/// Lower bound of a change query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeBound {
    /// Entries strictly after the last successful synchronization date
    SyncDate(DateTime<Utc>),
    /// Entries with a log id strictly greater than this one
    LogId(i64),
}

/// Parameters of a change lookup
#[derive(Debug, Clone)]
pub struct ChangeQuery {
    pub repository: String,
    /// Paths of the active synchronization roots
    pub root_paths: Vec<String>,
    /// User whose root (un)registrations are included
    pub user: String,
    pub since: ChangeBound,
    /// Highest log id to consider, pins the window across concurrent writes
    pub upper_bound: i64,
    /// Maximum number of changes the caller accepts
    pub limit: usize,
}

/// A single document change derived from one audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChange {
    /// Audit log id, absent for changes synthesized from root definitions
    pub log_id: Option<i64>,
    pub event_id: DocumentEvent,
    pub repository_id: String,
    pub doc_uuid: String,
    pub doc_path: String,
    pub doc_type: String,
    /// Milliseconds since the epoch
    pub event_date: i64,
    pub principal: String,
    /// Name of the document at event time, absent for removals
    pub file_system_item_name: Option<String>,
}

impl From<AuditEntry> for DocumentChange {
    fn from(entry: AuditEntry) -> Self {
        let file_system_item_name = if entry.event.is_removal() {
            None
        } else {
            entry
                .doc_path
                .rsplit('/')
                .next()
                .filter(|name| !name.is_empty())
                .map(String::from)
        };

        Self {
            log_id: Some(entry.id),
            event_id: entry.event,
            repository_id: entry.repository,
            doc_uuid: entry.doc_id,
            doc_path: entry.doc_path,
            doc_type: entry.doc_type,
            event_date: entry.event_date.timestamp_millis(),
            principal: entry.principal,
            file_system_item_name,
        }
    }
}

/// Source of document changes under a set of root paths
#[async_trait]
pub trait ChangeFinder: Send + Sync {
    /// Changes ordered most recent first.
    ///
    /// Fails with [`DriveError::TooManyChanges`] when more than
    /// `query.limit` changes match.
    async fn find_changes(&self, query: &ChangeQuery) -> DriveResult<Vec<DocumentChange>>;
}

/// [`ChangeFinder`] backed by the SQLite audit trail
#[derive(Clone)]
pub struct AuditChangeFinder {
    pool: SqlitePool,
}

impl AuditChangeFinder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChangeFinder for AuditChangeFinder {
    async fn find_changes(&self, query: &ChangeQuery) -> DriveResult<Vec<DocumentChange>> {
        // One row past the limit tells overflow apart from an exact fit
        let fetch_limit = i64::try_from(query.limit)
            .ok()
            .and_then(|limit| limit.checked_add(1))
            .ok_or(DriveError::InvalidLimit(query.limit))?;

        if query.root_paths.is_empty() {
            return Ok(Vec::new());
        }

        let lower_clause = match query.since {
            ChangeBound::SyncDate(_) => "event_date > ?",
            ChangeBound::LogId(_) => "id > ?",
        };
        let type_placeholders = vec!["?"; BlacklistedDocumentType::ALL.len()].join(", ");
        let root_clauses = vec!["(doc_path = ? OR substr(doc_path, 1, ?) = ?)"; query.root_paths.len()]
            .join(" OR ");

        let sql = format!(
            r#"
            SELECT id, event, category, repository, doc_id, doc_path, doc_type,
                   principal, event_date
            FROM audit_log
            WHERE repository = ?
              AND {lower_clause}
              AND id <= ?
              AND doc_type NOT IN ({type_placeholders})
              AND ((event NOT IN (?, ?) AND ({root_clauses}))
                   OR (event IN (?, ?) AND principal = ?))
            ORDER BY event_date DESC, id DESC
            LIMIT ?
            "#
        );

        let mut q = sqlx::query_as::<_, AuditRow>(&sql).bind(&query.repository);
        q = match query.since {
            ChangeBound::SyncDate(date) => q.bind(date.timestamp_millis()),
            ChangeBound::LogId(id) => q.bind(id),
        };
        q = q.bind(query.upper_bound);
        for doc_type in BlacklistedDocumentType::ALL {
            q = q.bind(doc_type.as_str());
        }
        q = q
            .bind(DocumentEvent::RootRegistered.as_str())
            .bind(DocumentEvent::RootUnregistered.as_str());
        for root in &query.root_paths {
            let prefix = if root.ends_with('/') {
                root.clone()
            } else {
                format!("{}/", root)
            };
            q = q
                .bind(root)
                .bind(prefix.chars().count() as i64)
                .bind(prefix);
        }
        q = q
            .bind(DocumentEvent::RootRegistered.as_str())
            .bind(DocumentEvent::RootUnregistered.as_str())
            .bind(&query.user)
            .bind(fetch_limit);

        let rows = q.fetch_all(&self.pool).await?;

        if rows.len() > query.limit {
            tracing::debug!(
                "Too many changes for {} in {}: more than {}",
                query.user,
                query.repository,
                query.limit
            );
            return Err(DriveError::TooManyChanges { limit: query.limit });
        }

        Ok(rows
            .into_iter()
            .filter_map(AuditRow::into_entry)
            .map(DocumentChange::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::log::{append, AuditLog};
    use crate::audit::types::AuditRecord;

    async fn log(
        pool: &SqlitePool,
        event: DocumentEvent,
        doc_id: &str,
        doc_path: &str,
        doc_type: &str,
        principal: &str,
    ) -> i64 {
        append(
            pool,
            &AuditRecord {
                event,
                repository: "default",
                doc_id,
                doc_path,
                doc_type,
                principal,
            },
        )
        .await
        .unwrap()
    }

    async fn query(pool: &SqlitePool, roots: &[&str], since: ChangeBound, limit: usize) -> ChangeQuery {
        ChangeQuery {
            repository: "default".to_string(),
            root_paths: roots.iter().map(|r| r.to_string()).collect(),
            user: "jdoe".to_string(),
            since,
            upper_bound: AuditLog::new(pool).max_log_id().await.unwrap(),
            limit,
        }
    }

    #[tokio::test]
    async fn test_changes_are_scoped_to_roots() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());

        log(&pool, DocumentEvent::DocumentCreated, "a", "/ws/a", "Folder", "jdoe").await;
        log(&pool, DocumentEvent::DocumentCreated, "a1", "/ws/a/note.txt", "File", "jdoe").await;
        log(&pool, DocumentEvent::DocumentCreated, "ab", "/ws/ab", "Folder", "jdoe").await;
        log(&pool, DocumentEvent::DocumentCreated, "b", "/ws/b", "Folder", "jdoe").await;

        let q = query(&pool, &["/ws/a"], ChangeBound::LogId(0), 100).await;
        let changes = finder.find_changes(&q).await.unwrap();

        let ids: Vec<&str> = changes.iter().map(|c| c.doc_uuid.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a"]);
        assert_eq!(changes[0].file_system_item_name.as_deref(), Some("note.txt"));
    }

    #[tokio::test]
    async fn test_empty_roots_yield_no_changes() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        log(&pool, DocumentEvent::RootRegistered, "a", "/ws/a", "Folder", "jdoe").await;

        let q = query(&pool, &[], ChangeBound::LogId(0), 100).await;
        assert!(finder.find_changes(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_exceeded_fails_instead_of_truncating() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        for i in 0..3 {
            let id = format!("doc-{}", i);
            log(&pool, DocumentEvent::DocumentModified, &id, &format!("/ws/{}", id), "File", "jdoe").await;
        }

        let q = query(&pool, &["/ws"], ChangeBound::LogId(0), 2).await;
        let err = finder.find_changes(&q).await.unwrap_err();
        assert!(matches!(err, DriveError::TooManyChanges { limit: 2 }));

        let q = query(&pool, &["/ws"], ChangeBound::LogId(0), 3).await;
        assert_eq!(finder.find_changes(&q).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_unrepresentable_limit_is_rejected() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        log(&pool, DocumentEvent::DocumentCreated, "a", "/ws/a", "Folder", "jdoe").await;

        for limit in [usize::MAX, i64::MAX as usize] {
            let q = query(&pool, &["/ws"], ChangeBound::LogId(0), limit).await;
            let err = finder.find_changes(&q).await.unwrap_err();
            assert!(matches!(err, DriveError::InvalidLimit(l) if l == limit));
        }

        let q = query(&pool, &["/ws"], ChangeBound::LogId(0), i64::MAX as usize - 1).await;
        assert_eq!(finder.find_changes(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_blacklisted_types_are_filtered() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        log(&pool, DocumentEvent::DocumentModified, "p", "/ws/profile", "UserProfile", "jdoe").await;
        log(&pool, DocumentEvent::DocumentModified, "f", "/ws/file", "File", "jdoe").await;

        let q = query(&pool, &["/ws"], ChangeBound::LogId(0), 10).await;
        let changes = finder.find_changes(&q).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_uuid, "f");
    }

    #[tokio::test]
    async fn test_root_events_only_for_requesting_user() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        log(&pool, DocumentEvent::RootRegistered, "a", "/ws/a", "Folder", "other").await;
        log(&pool, DocumentEvent::RootUnregistered, "old", "/elsewhere/old", "Folder", "jdoe").await;

        let q = query(&pool, &["/ws/a"], ChangeBound::LogId(0), 10).await;
        let changes = finder.find_changes(&q).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_uuid, "old");
        assert_eq!(changes[0].event_id, DocumentEvent::RootUnregistered);
        assert!(changes[0].file_system_item_name.is_none());
    }

    #[tokio::test]
    async fn test_sync_date_and_upper_bound_window() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        let old = log(&pool, DocumentEvent::DocumentCreated, "a", "/ws/a", "File", "jdoe").await;
        let new = log(&pool, DocumentEvent::DocumentModified, "b", "/ws/b", "File", "jdoe").await;

        sqlx::query("UPDATE audit_log SET event_date = ? WHERE id = ?")
            .bind(1_000_i64)
            .bind(old)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE audit_log SET event_date = ? WHERE id = ?")
            .bind(3_000_i64)
            .bind(new)
            .execute(&pool)
            .await
            .unwrap();

        let since = crate::db::millis_to_datetime(2_000);
        let mut q = query(&pool, &["/ws"], ChangeBound::SyncDate(since), 10).await;
        let changes = finder.find_changes(&q).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].doc_uuid, "b");
        assert_eq!(changes[0].event_date, 3_000);

        // Entries past the upper bound are left for the next poll
        q.upper_bound = old;
        assert!(finder.find_changes(&q).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_repositories_are_ignored() {
        let pool = crate::db::test_pool().await;
        let finder = AuditChangeFinder::new(pool.clone());
        append(
            &pool,
            &AuditRecord {
                event: DocumentEvent::DocumentCreated,
                repository: "archive",
                doc_id: "x",
                doc_path: "/ws/x",
                doc_type: "File",
                principal: "jdoe",
            },
        )
        .await
        .unwrap();

        let q = query(&pool, &["/ws"], ChangeBound::LogId(0), 10).await;
        assert!(finder.find_changes(&q).await.unwrap().is_empty());
    }
}
