//! Database schema initialization

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;

/// Initialize the database schema
pub async fn initialize_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_SQL).execute(pool).await?;

    Ok(())
}

/// Create the `/` document of a repository if it does not exist yet
pub async fn ensure_repository_root(pool: &SqlitePool, repository: &str) -> Result<String> {
    let existing: Option<(String,)> = sqlx::query_as(
        "SELECT id FROM documents WHERE repository = ? AND path = '/' AND deleted = 0",
    )
    .bind(repository)
    .fetch_optional(pool)
    .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp_millis();

    sqlx::query(
        r#"
        INSERT INTO documents (id, repository, parent_id, path, name, doc_type, folderish,
                               created_at, modified_at)
        VALUES (?, ?, NULL, '/', '', 'Root', 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(repository)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    tracing::info!("Created root document for repository {}", repository);
    Ok(id)
}

const SCHEMA_SQL: &str = r#"
-- Documents (folders and files) of every repository
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    repository TEXT NOT NULL,
    parent_id TEXT,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    folderish INTEGER NOT NULL DEFAULT 0,
    locked_by TEXT,
    deleted INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    modified_at INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_live_path
    ON documents(repository, path) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents(parent_id);

-- Access control entries, inherited along the path
CREATE TABLE IF NOT EXISTS acl (
    document_id TEXT NOT NULL,
    principal TEXT NOT NULL,
    permission TEXT NOT NULL,
    PRIMARY KEY (document_id, principal)
);

-- Audit trail of document lifecycle events
CREATE TABLE IF NOT EXISTS audit_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event TEXT NOT NULL,
    category TEXT NOT NULL,
    repository TEXT NOT NULL,
    doc_id TEXT NOT NULL,
    doc_path TEXT NOT NULL,
    doc_type TEXT NOT NULL,
    principal TEXT NOT NULL,
    event_date INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_repository_date ON audit_log(repository, event_date);
CREATE INDEX IF NOT EXISTS idx_audit_doc ON audit_log(doc_id);

-- Synchronization roots, ordered by registration
CREATE TABLE IF NOT EXISTS sync_roots (
    user_id TEXT NOT NULL,
    repository TEXT NOT NULL,
    document_id TEXT NOT NULL,
    position INTEGER NOT NULL,
    registered_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, repository, document_id)
);

CREATE INDEX IF NOT EXISTS idx_sync_roots_document ON sync_roots(document_id);
"#;
