//! Audit trail persistence

use chrono::Utc;
use sqlx::{Sqlite, SqlitePool};
use std::str::FromStr;

use super::types::{AuditEntry, AuditRecord, DocumentEvent};
use crate::db::millis_to_datetime;

/// Append an entry to the audit trail, returning its log id.
///
/// Takes any executor so document mutations can log inside their own
/// transaction.
pub async fn append<'e, E>(executor: E, record: &AuditRecord<'_>) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT INTO audit_log (event, category, repository, doc_id, doc_path, doc_type,
                               principal, event_date)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.event.as_str())
    .bind(record.event.category())
    .bind(record.repository)
    .bind(record.doc_id)
    .bind(record.doc_path)
    .bind(record.doc_type)
    .bind(record.principal)
    .bind(Utc::now().timestamp_millis())
    .execute(executor)
    .await?;

    tracing::trace!(
        "Audit {} on {} ({}) by {}",
        record.event,
        record.doc_path,
        record.doc_id,
        record.principal
    );

    Ok(result.last_insert_rowid())
}

/// Read access to the audit trail
pub struct AuditLog<'a> {
    pool: &'a SqlitePool,
}

impl<'a> AuditLog<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Highest log id written so far, 0 for an empty trail
    pub async fn max_log_id(&self) -> Result<i64, sqlx::Error> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM audit_log")
            .fetch_one(self.pool)
            .await?;

        Ok(row.0.unwrap_or(0))
    }

    /// History of a document, most recent first
    pub async fn entries_for_document(
        &self,
        repository: &str,
        doc_id: &str,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, event, category, repository, doc_id, doc_path, doc_type,
                   principal, event_date
            FROM audit_log
            WHERE repository = ? AND doc_id = ?
            ORDER BY id DESC
            "#,
        )
        .bind(repository)
        .bind(doc_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(AuditRow::into_entry).collect())
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AuditRow {
    pub id: i64,
    pub event: String,
    pub category: String,
    pub repository: String,
    pub doc_id: String,
    pub doc_path: String,
    pub doc_type: String,
    pub principal: String,
    pub event_date: i64,
}

impl AuditRow {
    pub(crate) fn into_entry(self) -> Option<AuditEntry> {
        let event = match DocumentEvent::from_str(&self.event) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Skipping audit entry {}: {}", self.id, e);
                return None;
            }
        };

        Some(AuditEntry {
            id: self.id,
            event,
            category: self.category,
            repository: self.repository,
            doc_id: self.doc_id,
            doc_path: self.doc_path,
            doc_type: self.doc_type,
            principal: self.principal,
            event_date: millis_to_datetime(self.event_date),
        })
    }
}
