//! Document persistence
//!
//! Every mutation checks the session principal's permissions first, then
//! updates the documents and appends the matching audit entry in a single
//! transaction.

use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use uuid::Uuid;

use super::session::Session;
use super::types::{
    child_path, validate_name, DocumentModel, DocumentRef, DocumentRow,
    NewDocument, Permission,
};
use crate::audit::{self, AuditRecord, DocumentEvent};
use crate::error::{DriveError, DriveResult};

const DOCUMENT_COLUMNS: &str = "id, repository, parent_id, path, name, doc_type, folderish, \
                                locked_by, deleted, created_at, modified_at";

/// Session-scoped document repository
pub struct DocumentRepository<'a> {
    session: &'a Session,
}

impl<'a> DocumentRepository<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    pub(crate) fn session(&self) -> &Session {
        self.session
    }

    /// Look a document up without permission checks
    pub(crate) async fn lookup(
        &self,
        doc_ref: &DocumentRef,
        include_deleted: bool,
    ) -> DriveResult<Option<DocumentModel>> {
        let sql = format!(
            "SELECT {} FROM documents WHERE id = ? AND repository = ? AND (deleted = 0 OR ?)",
            DOCUMENT_COLUMNS
        );

        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(doc_ref.as_str())
            .bind(self.session.repository())
            .bind(include_deleted)
            .fetch_optional(self.session.pool())
            .await?;

        Ok(row.map(DocumentModel::from))
    }

    /// Fetch a live document readable by the session principal
    pub async fn get_document(&self, doc_ref: &DocumentRef) -> DriveResult<DocumentModel> {
        let doc = self
            .lookup(doc_ref, false)
            .await?
            .ok_or_else(|| DriveError::NotFound(doc_ref.to_string()))?;
        self.check_permission(&doc, Permission::Read).await?;
        Ok(doc)
    }

    /// Fetch a live document by path
    pub async fn get_by_path(&self, path: &str) -> DriveResult<DocumentModel> {
        let sql = format!(
            "SELECT {} FROM documents WHERE repository = ? AND path = ? AND deleted = 0",
            DOCUMENT_COLUMNS
        );

        let doc = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(self.session.repository())
            .bind(path)
            .fetch_optional(self.session.pool())
            .await?
            .map(DocumentModel::from)
            .ok_or_else(|| DriveError::NotFound(path.to_string()))?;

        self.check_permission(&doc, Permission::Read).await?;
        Ok(doc)
    }

    /// Live children of a folder, ordered by name
    pub async fn children(&self, parent: &DocumentRef) -> DriveResult<Vec<DocumentModel>> {
        let parent = self.get_document(parent).await?;

        let sql = format!(
            "SELECT {} FROM documents WHERE parent_id = ? AND deleted = 0 ORDER BY name ASC",
            DOCUMENT_COLUMNS
        );

        let rows = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(&parent.id)
            .fetch_all(self.session.pool())
            .await?;

        Ok(rows.into_iter().map(DocumentModel::from).collect())
    }

    /// Create a document under a folder
    pub async fn create_document(&self, new: &NewDocument) -> DriveResult<DocumentModel> {
        validate_name(&new.name).map_err(DriveError::InvalidPath)?;

        let parent = self.get_document(&DocumentRef::new(&new.parent_id)).await?;
        if !parent.folderish {
            return Err(DriveError::NotFolderish(parent.path));
        }
        self.check_permission(&parent, Permission::Write).await?;

        let path = child_path(&parent.path, &new.name);
        self.ensure_path_free(&path).await?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp_millis();
        let principal = self.session.principal();

        let mut tx = self.session.pool().begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, repository, parent_id, path, name, doc_type, folderish,
                                   created_at, modified_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(self.session.repository())
        .bind(&parent.id)
        .bind(&path)
        .bind(&new.name)
        .bind(&new.doc_type)
        .bind(new.folderish)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        // Creators own what they create
        sqlx::query("INSERT INTO acl (document_id, principal, permission) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(principal)
            .bind(Permission::Everything.as_str())
            .execute(&mut *tx)
            .await?;

        self.log(&mut tx, DocumentEvent::DocumentCreated, &id, &path, &new.doc_type)
            .await?;

        tx.commit().await?;

        tracing::debug!("{} created {} ({})", principal, path, new.doc_type);

        self.lookup(&DocumentRef::new(id), false)
            .await?
            .ok_or_else(|| DriveError::NotFound(path))
    }

    /// Rename a document in place
    pub async fn rename(&self, doc_ref: &DocumentRef, new_name: &str) -> DriveResult<DocumentModel> {
        self.move_document(doc_ref, None, Some(new_name)).await
    }

    /// Move a document under another folder and/or rename it
    pub async fn move_document(
        &self,
        doc_ref: &DocumentRef,
        new_parent: Option<&DocumentRef>,
        new_name: Option<&str>,
    ) -> DriveResult<DocumentModel> {
        let doc = self.get_document(doc_ref).await?;
        if doc.parent_id.is_none() {
            return Err(DriveError::InvalidPath("the repository root cannot move".to_string()));
        }
        self.check_permission(&doc, Permission::Write).await?;

        let parent_id = match new_parent {
            Some(r) => r.as_str().to_string(),
            None => doc.parent_id.clone().unwrap_or_default(),
        };
        let parent = self.get_document(&DocumentRef::new(&parent_id)).await?;
        if !parent.folderish {
            return Err(DriveError::NotFolderish(parent.path));
        }
        if parent.id == doc.id || doc.is_ancestor_of(&parent) {
            return Err(DriveError::InvalidPath(format!(
                "cannot move {} into itself",
                doc.path
            )));
        }
        let moved = doc.parent_id.as_deref() != Some(parent.id.as_str());
        if moved {
            self.check_permission(&parent, Permission::Write).await?;
        }

        let name = new_name.unwrap_or(&doc.name);
        validate_name(name).map_err(DriveError::InvalidPath)?;

        let new_path = child_path(&parent.path, name);
        if new_path == doc.path {
            return Ok(doc);
        }
        self.ensure_path_free(&new_path).await?;

        let old_prefix = format!("{}/", doc.path);
        let now = Utc::now().timestamp_millis();
        let event = if moved {
            DocumentEvent::DocumentMoved
        } else {
            DocumentEvent::DocumentModified
        };

        let mut tx = self.session.pool().begin().await?;

        sqlx::query(
            "UPDATE documents SET parent_id = ?, name = ?, path = ?, modified_at = ? WHERE id = ?",
        )
        .bind(&parent.id)
        .bind(name)
        .bind(&new_path)
        .bind(now)
        .bind(&doc.id)
        .execute(&mut *tx)
        .await?;

        // Re-root the live subtree
        sqlx::query(
            r#"
            UPDATE documents
            SET path = ? || substr(path, ?)
            WHERE repository = ? AND deleted = 0 AND substr(path, 1, ?) = ?
            "#,
        )
        .bind(&new_path)
        .bind(doc.path.chars().count() as i64 + 1)
        .bind(self.session.repository())
        .bind(old_prefix.chars().count() as i64)
        .bind(&old_prefix)
        .execute(&mut *tx)
        .await?;

        self.log(&mut tx, event, &doc.id, &new_path, &doc.doc_type).await?;

        tx.commit().await?;

        tracing::debug!("{} moved {} to {}", self.session.principal(), doc.path, new_path);

        self.lookup(doc_ref, false)
            .await?
            .ok_or_else(|| DriveError::NotFound(doc_ref.to_string()))
    }

    /// Lock a document for the session principal
    pub async fn lock(&self, doc_ref: &DocumentRef) -> DriveResult<DocumentModel> {
        let doc = self.get_document(doc_ref).await?;
        self.check_permission(&doc, Permission::Write).await?;

        let principal = self.session.principal();
        match doc.locked_by.as_deref() {
            Some(owner) if owner == principal => return Ok(doc),
            Some(owner) => {
                return Err(DriveError::Conflict(format!(
                    "{} is locked by {}",
                    doc.path, owner
                )))
            }
            None => {}
        }

        self.set_lock(&doc, Some(principal), DocumentEvent::DocumentLocked)
            .await
    }

    /// Release a lock held by the session principal (administrators may
    /// release any lock)
    pub async fn unlock(&self, doc_ref: &DocumentRef) -> DriveResult<DocumentModel> {
        let doc = self.get_document(doc_ref).await?;
        self.check_permission(&doc, Permission::Write).await?;

        let principal = self.session.principal();
        match doc.locked_by.as_deref() {
            None => return Ok(doc),
            Some(owner) if owner != principal && !self.session.is_administrator(principal) => {
                return Err(DriveError::Conflict(format!(
                    "{} is locked by {}",
                    doc.path, owner
                )))
            }
            Some(_) => {}
        }

        self.set_lock(&doc, None, DocumentEvent::DocumentUnlocked)
            .await
    }

    async fn set_lock(
        &self,
        doc: &DocumentModel,
        owner: Option<&str>,
        event: DocumentEvent,
    ) -> DriveResult<DocumentModel> {
        let mut tx = self.session.pool().begin().await?;

        sqlx::query("UPDATE documents SET locked_by = ?, modified_at = ? WHERE id = ?")
            .bind(owner)
            .bind(Utc::now().timestamp_millis())
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;

        self.log(&mut tx, event, &doc.id, &doc.path, &doc.doc_type).await?;

        tx.commit().await?;

        self.lookup(&doc.reference(), false)
            .await?
            .ok_or_else(|| DriveError::NotFound(doc.id.clone()))
    }

    /// Delete a document and its live subtree.
    ///
    /// Returns the references of every removed document, deepest first.
    /// Callers forward them to the synchronization root manager.
    pub async fn delete_document(&self, doc_ref: &DocumentRef) -> DriveResult<Vec<DocumentRef>> {
        let doc = self.get_document(doc_ref).await?;
        if doc.parent_id.is_none() {
            return Err(DriveError::InvalidPath("the repository root cannot be deleted".to_string()));
        }
        self.check_permission(&doc, Permission::Write).await?;

        let prefix = format!("{}/", doc.path);
        let sql = format!(
            r#"
            SELECT {} FROM documents
            WHERE repository = ? AND deleted = 0 AND (id = ? OR substr(path, 1, ?) = ?)
            ORDER BY length(path) DESC, path DESC
            "#,
            DOCUMENT_COLUMNS
        );
        let subtree: Vec<DocumentModel> = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(self.session.repository())
            .bind(&doc.id)
            .bind(prefix.chars().count() as i64)
            .bind(&prefix)
            .fetch_all(self.session.pool())
            .await?
            .into_iter()
            .map(DocumentModel::from)
            .collect();

        let now = Utc::now().timestamp_millis();
        let mut tx = self.session.pool().begin().await?;

        for removed in &subtree {
            sqlx::query("UPDATE documents SET deleted = 1, modified_at = ? WHERE id = ?")
                .bind(now)
                .bind(&removed.id)
                .execute(&mut *tx)
                .await?;

            self.log(
                &mut tx,
                DocumentEvent::Deleted,
                &removed.id,
                &removed.path,
                &removed.doc_type,
            )
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "{} deleted {} ({} documents)",
            self.session.principal(),
            doc.path,
            subtree.len()
        );

        Ok(subtree.iter().map(DocumentModel::reference).collect())
    }

    /// Fail with a conflict when a live document already uses `path`
    async fn ensure_path_free(&self, path: &str) -> DriveResult<()> {
        let taken: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM documents WHERE repository = ? AND path = ? AND deleted = 0",
        )
        .bind(self.session.repository())
        .bind(path)
        .fetch_optional(self.session.pool())
        .await?;

        match taken {
            Some(_) => Err(DriveError::Conflict(format!("{} already exists", path))),
            None => Ok(()),
        }
    }

    async fn log(
        &self,
        conn: &mut SqliteConnection,
        event: DocumentEvent,
        doc_id: &str,
        doc_path: &str,
        doc_type: &str,
    ) -> DriveResult<i64> {
        let id = audit::append(
            conn,
            &AuditRecord {
                event,
                repository: self.session.repository(),
                doc_id,
                doc_path,
                doc_type,
                principal: self.session.principal(),
            },
        )
        .await?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::repository::testing::{admin_session, folder, session_for};

    #[tokio::test]
    async fn test_create_and_fetch_document() {
        let (pool, admin, root) = admin_session().await;
        let repo = admin.documents();

        let ws = folder(&admin, &root, "ws").await;
        assert_eq!(ws.path, "/ws");
        assert_eq!(ws.parent_id.as_deref(), Some(root.as_str()));

        let fetched = repo.get_by_path("/ws").await.unwrap();
        assert_eq!(fetched.id, ws.id);

        let history = AuditLog::new(&pool)
            .entries_for_document("default", &ws.id)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].event, DocumentEvent::DocumentCreated);
    }

    #[tokio::test]
    async fn test_duplicate_path_conflicts() {
        let (_pool, admin, root) = admin_session().await;
        folder(&admin, &root, "ws").await;

        let err = admin
            .documents()
            .create_document(&NewDocument {
                parent_id: root.clone(),
                name: "ws".to_string(),
                doc_type: "Folder".to_string(),
                folderish: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_requires_write_on_parent() {
        let (pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "ws").await;
        admin
            .documents()
            .grant(&ws.reference(), "jdoe", Permission::Read)
            .await
            .unwrap();

        let jdoe = session_for(&pool, "jdoe");
        let err = jdoe
            .documents()
            .create_document(&NewDocument {
                parent_id: ws.id.clone(),
                name: "mine".to_string(),
                doc_type: "Folder".to_string(),
                folderish: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DriveError::Security {
                permission: Permission::Write,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_move_rewrites_subtree_paths() {
        let (_pool, admin, root) = admin_session().await;
        let a = folder(&admin, &root, "a").await;
        let b = folder(&admin, &root, "b").await;
        let child = folder(&admin, &a.id, "child").await;
        let grandchild = folder(&admin, &child.id, "leaf").await;

        let repo = admin.documents();
        let moved = repo
            .move_document(&child.reference(), Some(&b.reference()), None)
            .await
            .unwrap();
        assert_eq!(moved.path, "/b/child");

        let leaf = repo.get_document(&grandchild.reference()).await.unwrap();
        assert_eq!(leaf.path, "/b/child/leaf");
    }

    #[tokio::test]
    async fn test_move_into_own_subtree_is_rejected() {
        let (_pool, admin, root) = admin_session().await;
        let a = folder(&admin, &root, "a").await;
        let inner = folder(&admin, &a.id, "inner").await;

        let err = admin
            .documents()
            .move_document(&a.reference(), Some(&inner.reference()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_rename_logs_modification() {
        let (pool, admin, root) = admin_session().await;
        let a = folder(&admin, &root, "a").await;

        let renamed = admin.documents().rename(&a.reference(), "renamed").await.unwrap();
        assert_eq!(renamed.path, "/renamed");

        let history = AuditLog::new(&pool)
            .entries_for_document("default", &a.id)
            .await
            .unwrap();
        assert_eq!(history[0].event, DocumentEvent::DocumentModified);
        assert_eq!(history[0].doc_path, "/renamed");
    }

    #[tokio::test]
    async fn test_lock_conflicts_between_principals() {
        let (pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "ws").await;
        admin
            .documents()
            .grant(&ws.reference(), "jdoe", Permission::Write)
            .await
            .unwrap();

        let jdoe = session_for(&pool, "jdoe");
        let locked = jdoe.documents().lock(&ws.reference()).await.unwrap();
        assert_eq!(locked.locked_by.as_deref(), Some("jdoe"));

        let other = session_for(&pool, "other");
        admin
            .documents()
            .grant(&ws.reference(), "other", Permission::Write)
            .await
            .unwrap();
        let err = other.documents().lock(&ws.reference()).await.unwrap_err();
        assert!(matches!(err, DriveError::Conflict(_)));

        let unlocked = jdoe.documents().unlock(&ws.reference()).await.unwrap();
        assert!(unlocked.locked_by.is_none());
    }

    #[tokio::test]
    async fn test_delete_returns_subtree_deepest_first() {
        let (pool, admin, root) = admin_session().await;
        let a = folder(&admin, &root, "a").await;
        let child = folder(&admin, &a.id, "child").await;
        let sibling = folder(&admin, &root, "ab").await;

        let removed = admin.documents().delete_document(&a.reference()).await.unwrap();
        assert_eq!(removed, vec![child.reference(), a.reference()]);

        let err = admin.documents().get_document(&a.reference()).await.unwrap_err();
        assert!(matches!(err, DriveError::NotFound(_)));
        assert!(admin.documents().get_document(&sibling.reference()).await.is_ok());

        // The path can be reused once the old document is gone
        folder(&admin, &root, "a").await;

        let history = AuditLog::new(&pool)
            .entries_for_document("default", &child.id)
            .await
            .unwrap();
        assert_eq!(history[0].event, DocumentEvent::Deleted);
    }

    #[tokio::test]
    async fn test_root_cannot_be_deleted() {
        let (_pool, admin, root) = admin_session().await;
        let err = admin
            .documents()
            .delete_document(&DocumentRef::new(root))
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::InvalidPath(_)));
    }
}
