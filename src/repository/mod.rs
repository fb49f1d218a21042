//! Content repository
//!
//! Hierarchical documents with path-inherited access control. Every
//! mutation is recorded in the audit trail.

mod acl;
mod session;
mod store;
mod types;

pub use session::Session;
pub use store::DocumentRepository;
pub use types::{
    ancestor_paths, child_path, is_strict_descendant, DocumentModel, DocumentRef, NewDocument,
    Permission, EVERYONE,
};

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use sqlx::SqlitePool;

    use super::{DocumentModel, NewDocument, Session};

    pub const ADMIN: &str = "Administrator";

    /// Fresh database with a `default` repository, an administrator session
    /// and the id of the repository root
    pub async fn admin_session() -> (SqlitePool, Session, String) {
        let pool = crate::db::test_pool().await;
        let root = crate::db::ensure_repository_root(&pool, "default").await.unwrap();
        let session = session_for(&pool, ADMIN);
        (pool, session, root)
    }

    pub fn session_for(pool: &SqlitePool, principal: &str) -> Session {
        Session::new(pool.clone(), "default", principal)
            .with_administrators(Arc::new(vec![ADMIN.to_string()]))
    }

    pub async fn folder(session: &Session, parent_id: &str, name: &str) -> DocumentModel {
        create(session, parent_id, name, "Folder", true).await
    }

    pub async fn create(
        session: &Session,
        parent_id: &str,
        name: &str,
        doc_type: &str,
        folderish: bool,
    ) -> DocumentModel {
        session
            .documents()
            .create_document(&NewDocument {
                parent_id: parent_id.to_string(),
                name: name.to_string(),
                doc_type: doc_type.to_string(),
                folderish,
            })
            .await
            .unwrap()
    }
}
