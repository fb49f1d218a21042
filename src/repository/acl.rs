//! Access control
//!
//! Entries only grant. A principal's effective permission on a document is
//! the highest one granted to it, or to [`EVERYONE`], on the document or
//! any of its ancestors.

use super::store::DocumentRepository;
use super::types::{ancestor_paths, DocumentModel, DocumentRef, Permission, EVERYONE};
use crate::error::{DriveError, DriveResult};

impl<'a> DocumentRepository<'a> {
    /// Highest permission `principal` holds on `doc`
    pub async fn effective_permission(
        &self,
        principal: &str,
        doc: &DocumentModel,
    ) -> DriveResult<Option<Permission>> {
        let session = self.session();
        if session.is_administrator(principal) {
            return Ok(Some(Permission::Everything));
        }

        let paths = ancestor_paths(&doc.path);
        let placeholders = vec!["?"; paths.len()].join(", ");
        let sql = format!(
            r#"
            SELECT a.permission
            FROM acl a
            JOIN documents d ON d.id = a.document_id
            WHERE d.repository = ? AND d.deleted = 0
              AND a.principal IN (?, ?)
              AND d.path IN ({})
            "#,
            placeholders
        );

        let mut q = sqlx::query_as::<_, (String,)>(&sql)
            .bind(session.repository())
            .bind(principal)
            .bind(EVERYONE);
        for path in &paths {
            q = q.bind(path);
        }

        let granted = q.fetch_all(session.pool()).await?;

        Ok(granted
            .into_iter()
            .filter_map(|(p,)| p.parse::<Permission>().ok())
            .max())
    }

    pub async fn has_permission(
        &self,
        principal: &str,
        doc: &DocumentModel,
        permission: Permission,
    ) -> DriveResult<bool> {
        Ok(self
            .effective_permission(principal, doc)
            .await?
            .is_some_and(|held| held >= permission))
    }

    /// Fail with [`DriveError::Security`] unless `principal` holds `permission`
    pub async fn require_permission(
        &self,
        principal: &str,
        doc: &DocumentModel,
        permission: Permission,
    ) -> DriveResult<()> {
        if self.has_permission(principal, doc, permission).await? {
            Ok(())
        } else {
            Err(DriveError::Security {
                principal: principal.to_string(),
                permission,
                document: doc.path.clone(),
            })
        }
    }

    /// Permission check for the session principal
    pub async fn check_permission(
        &self,
        doc: &DocumentModel,
        permission: Permission,
    ) -> DriveResult<()> {
        let principal = self.session().principal().to_string();
        self.require_permission(&principal, doc, permission).await
    }

    /// Grant `permission` on a document, replacing any previous entry of
    /// the principal. Requires `Everything` on the document.
    pub async fn grant(
        &self,
        doc_ref: &DocumentRef,
        principal: &str,
        permission: Permission,
    ) -> DriveResult<()> {
        let doc = self.get_document(doc_ref).await?;
        self.check_permission(&doc, Permission::Everything).await?;

        sqlx::query(
            r#"
            INSERT INTO acl (document_id, principal, permission) VALUES (?, ?, ?)
            ON CONFLICT(document_id, principal) DO UPDATE SET permission = excluded.permission
            "#,
        )
        .bind(&doc.id)
        .bind(principal)
        .bind(permission.as_str())
        .execute(self.session().pool())
        .await?;

        tracing::debug!("Granted {} on {} to {}", permission, doc.path, principal);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::{admin_session, folder, session_for};

    #[tokio::test]
    async fn test_permissions_are_inherited() {
        let (_pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "ws").await;
        let inner = folder(&admin, &ws.id, "inner").await;
        let repo = admin.documents();

        repo.grant(&ws.reference(), "jdoe", Permission::Write).await.unwrap();

        assert_eq!(
            repo.effective_permission("jdoe", &inner).await.unwrap(),
            Some(Permission::Write)
        );
        assert!(repo.has_permission("jdoe", &inner, Permission::Read).await.unwrap());
        assert!(!repo.has_permission("jdoe", &inner, Permission::Everything).await.unwrap());
        assert!(!repo.has_permission("other", &inner, Permission::Read).await.unwrap());
    }

    #[tokio::test]
    async fn test_everyone_grants_apply_to_all() {
        let (_pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "public").await;
        let repo = admin.documents();

        repo.grant(&ws.reference(), EVERYONE, Permission::Read).await.unwrap();
        assert!(repo.has_permission("anyone", &ws, Permission::Read).await.unwrap());
        assert!(!repo.has_permission("anyone", &ws, Permission::Write).await.unwrap());
    }

    #[tokio::test]
    async fn test_grant_requires_everything() {
        let (pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "ws").await;
        admin
            .documents()
            .grant(&ws.reference(), "jdoe", Permission::Write)
            .await
            .unwrap();

        let jdoe = session_for(&pool, "jdoe");
        let err = jdoe
            .documents()
            .grant(&ws.reference(), "friend", Permission::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, DriveError::Security { .. }));
    }

    #[tokio::test]
    async fn test_creator_owns_new_documents() {
        let (pool, admin, root) = admin_session().await;
        let ws = folder(&admin, &root, "ws").await;
        admin
            .documents()
            .grant(&ws.reference(), "jdoe", Permission::Write)
            .await
            .unwrap();

        let jdoe = session_for(&pool, "jdoe");
        let mine = folder(&jdoe, &ws.id, "mine").await;
        assert_eq!(
            jdoe.documents().effective_permission("jdoe", &mine).await.unwrap(),
            Some(Permission::Everything)
        );
    }
}
