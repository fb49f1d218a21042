//! Synchronization root management
//!
//! Keeps the ordered set of synchronization roots of each user and builds
//! change summaries for devices polling since their last successful
//! synchronization.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::blacklist::is_blacklisted;
use super::cache::RootsCache;
use super::types::{
    format_root_definitions, parse_root_definitions, DocumentChangeSummary, SyncCheckpoint,
    SyncRootEntry,
};
use crate::audit::{
    self, AuditChangeFinder, AuditLog, AuditRecord, ChangeBound, ChangeFinder, ChangeQuery,
    DocumentChange, DocumentEvent,
};
use crate::error::{DriveError, DriveResult};
use crate::repository::{is_strict_descendant, DocumentModel, DocumentRef, Permission, Session};

/// Per-user synchronization roots and change summaries
#[async_trait]
pub trait SyncRootManager: Send + Sync {
    /// Register a folderish document as a synchronization root of `user`.
    ///
    /// Fails with [`DriveError::Security`] if the user lacks write
    /// permission on the folder.
    async fn register_synchronization_root(
        &self,
        user: &str,
        root: &DocumentModel,
        session: &Session,
    ) -> DriveResult<()>;

    /// Stop synchronizing a folder. Unregistering a non-root does nothing.
    async fn unregister_synchronization_root(
        &self,
        user: &str,
        root: &DocumentModel,
        session: &Session,
    ) -> DriveResult<()>;

    /// Live roots of `user` in the session's repository, in registration
    /// order. Expected to stay small (around a hundred folders), so no
    /// paging.
    async fn get_synchronization_root_references(
        &self,
        user: &str,
        session: &Session,
    ) -> DriveResult<Vec<DocumentRef>>;

    /// Same set as [`Self::get_synchronization_root_references`], as paths
    async fn get_synchronization_root_paths(
        &self,
        user: &str,
        session: &Session,
    ) -> DriveResult<Vec<String>>;

    /// Purge a deleted document from every user's roots and drop cached
    /// root sets
    async fn handle_folder_deletion(&self, doc_ref: &DocumentRef) -> DriveResult<()>;

    /// Changes under the user's roots since the device's checkpoint
    async fn get_document_change_summary(
        &self,
        user: &str,
        session: &Session,
        checkpoint: &SyncCheckpoint,
        last_active_root_definitions: Option<&str>,
    ) -> DriveResult<DocumentChangeSummary>;
}

/// [`SyncRootManager`] persisting roots in SQLite
#[derive(Clone)]
pub struct DriveManager {
    pool: SqlitePool,
    cache: RootsCache,
    change_finder: Arc<dyn ChangeFinder>,
    change_limit: usize,
}

impl DriveManager {
    pub fn new(pool: SqlitePool, change_finder: Arc<dyn ChangeFinder>, change_limit: usize) -> Self {
        Self {
            pool,
            cache: RootsCache::new(),
            change_finder,
            change_limit,
        }
    }

    /// Manager reading changes from the audit trail of `pool`
    pub fn with_audit_finder(pool: SqlitePool, change_limit: usize) -> Self {
        let finder = Arc::new(AuditChangeFinder::new(pool.clone()));
        Self::new(pool, finder, change_limit)
    }

    /// Bound the roots cache to `capacity` (user, repository) entries
    pub fn with_roots_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = RootsCache::with_capacity(capacity);
        self
    }

    /// Drop every cached root set. Call after moves and permission changes.
    pub fn invalidate_caches(&self) {
        self.cache.clear();
    }

    /// Live root documents of `user`, in registration order
    async fn registered_roots(&self, user: &str, session: &Session) -> DriveResult<Vec<DocumentModel>> {
        let refs: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.document_id
            FROM sync_roots r
            JOIN documents d ON d.id = r.document_id
            WHERE r.user_id = ? AND r.repository = ? AND d.deleted = 0
            ORDER BY r.position ASC
            "#,
        )
        .bind(user)
        .bind(session.repository())
        .fetch_all(session.pool())
        .await?;

        let repo = session.documents();
        let mut roots = Vec::with_capacity(refs.len());
        for (id,) in refs {
            if let Some(doc) = repo.lookup(&DocumentRef::new(id), false).await? {
                roots.push(doc);
            }
        }
        Ok(roots)
    }

    /// Cached roots of `user` that are still readable by them
    async fn root_entries(&self, user: &str, session: &Session) -> DriveResult<Arc<Vec<SyncRootEntry>>> {
        if let Some(roots) = self.cache.get(user, session.repository()) {
            return Ok(roots);
        }
        let generation = self.cache.generation();

        let repo = session.documents();
        let mut entries = Vec::new();
        for doc in self.registered_roots(user, session).await? {
            if repo.has_permission(user, &doc, Permission::Read).await? {
                entries.push(SyncRootEntry::from(&doc));
            } else {
                tracing::debug!("Skipping unreadable root {} of {}", doc.path, user);
            }
        }

        Ok(self
            .cache
            .insert(user, session.repository(), entries, generation))
    }

    /// Delete one root row, logging the unregistration. Returns whether a
    /// row existed.
    async fn remove_root(&self, user: &str, session: &Session, root: &DocumentModel) -> DriveResult<bool> {
        let mut tx = session.pool().begin().await?;

        let result = sqlx::query(
            "DELETE FROM sync_roots WHERE user_id = ? AND repository = ? AND document_id = ?",
        )
        .bind(user)
        .bind(session.repository())
        .bind(&root.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        audit::append(
            &mut *tx,
            &AuditRecord {
                event: DocumentEvent::RootUnregistered,
                repository: session.repository(),
                doc_id: &root.id,
                doc_path: &root.path,
                doc_type: &root.doc_type,
                principal: user,
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!("Unregistered synchronization root {} for {}", root.path, user);
        Ok(true)
    }

    /// Synthesize a removal for a root the device still knew about
    async fn unregistered_root_change(
        &self,
        user: &str,
        session: &Session,
        doc_ref: &DocumentRef,
        sync_date: i64,
    ) -> DriveResult<DocumentChange> {
        let (doc_path, doc_type) = match session.documents().lookup(doc_ref, true).await? {
            Some(doc) => (doc.path, doc.doc_type),
            None => (String::new(), String::new()),
        };

        Ok(DocumentChange {
            log_id: None,
            event_id: DocumentEvent::Deleted,
            repository_id: session.repository().to_string(),
            doc_uuid: doc_ref.to_string(),
            doc_path,
            doc_type,
            event_date: sync_date,
            principal: user.to_string(),
            file_system_item_name: None,
        })
    }
}

#[async_trait]
impl SyncRootManager for DriveManager {
    async fn register_synchronization_root(
        &self,
        user: &str,
        root: &DocumentModel,
        session: &Session,
    ) -> DriveResult<()> {
        if is_blacklisted(&root.doc_type) {
            return Err(DriveError::Blacklisted(root.doc_type.clone()));
        }
        if !root.folderish {
            return Err(DriveError::NotFolderish(root.path.clone()));
        }
        session
            .documents()
            .require_permission(user, root, Permission::Write)
            .await?;

        let current = self.registered_roots(user, session).await?;
        if current.iter().any(|r| r.id == root.id) {
            tracing::debug!("{} is already a synchronization root of {}", root.path, user);
            return Ok(());
        }
        if let Some(ancestor) = current.iter().find(|r| r.is_ancestor_of(root)) {
            tracing::debug!(
                "{} is already synchronized by {} through root {}",
                root.path,
                user,
                ancestor.path
            );
            return Ok(());
        }

        // The new root covers any root registered below it
        for nested in current.iter().filter(|r| is_strict_descendant(&r.path, &root.path)) {
            self.remove_root(user, session, nested).await?;
        }

        let mut tx = session.pool().begin().await?;

        // A concurrent registration of the same folder may have won the race
        let inserted = sqlx::query(
            r#"
            INSERT INTO sync_roots (user_id, repository, document_id, position, registered_at)
            VALUES (?, ?, ?,
                    (SELECT COALESCE(MAX(position), -1) + 1 FROM sync_roots
                     WHERE user_id = ? AND repository = ?),
                    ?)
            ON CONFLICT (user_id, repository, document_id) DO NOTHING
            "#,
        )
        .bind(user)
        .bind(session.repository())
        .bind(&root.id)
        .bind(user)
        .bind(session.repository())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            tracing::debug!("{} is already a synchronization root of {}", root.path, user);
            return Ok(());
        }

        audit::append(
            &mut *tx,
            &AuditRecord {
                event: DocumentEvent::RootRegistered,
                repository: session.repository(),
                doc_id: &root.id,
                doc_path: &root.path,
                doc_type: &root.doc_type,
                principal: user,
            },
        )
        .await?;

        tx.commit().await?;
        self.cache.invalidate_user(user);

        tracing::info!("Registered synchronization root {} for {}", root.path, user);
        Ok(())
    }

    async fn unregister_synchronization_root(
        &self,
        user: &str,
        root: &DocumentModel,
        session: &Session,
    ) -> DriveResult<()> {
        if !self.remove_root(user, session, root).await? {
            tracing::debug!("{} is not a synchronization root of {}", root.path, user);
        }
        self.cache.invalidate_user(user);
        Ok(())
    }

    async fn get_synchronization_root_references(
        &self,
        user: &str,
        session: &Session,
    ) -> DriveResult<Vec<DocumentRef>> {
        let roots = self.root_entries(user, session).await?;
        Ok(roots.iter().map(|r| r.reference.clone()).collect())
    }

    async fn get_synchronization_root_paths(
        &self,
        user: &str,
        session: &Session,
    ) -> DriveResult<Vec<String>> {
        let roots = self.root_entries(user, session).await?;
        Ok(roots.iter().map(|r| r.path.clone()).collect())
    }

    async fn handle_folder_deletion(&self, doc_ref: &DocumentRef) -> DriveResult<()> {
        let result = sqlx::query("DELETE FROM sync_roots WHERE document_id = ?")
            .bind(doc_ref.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() > 0 {
            tracing::info!(
                "Removed deleted document {} from {} synchronization root sets",
                doc_ref,
                result.rows_affected()
            );
        }

        self.cache.clear();
        Ok(())
    }

    async fn get_document_change_summary(
        &self,
        user: &str,
        session: &Session,
        checkpoint: &SyncCheckpoint,
        last_active_root_definitions: Option<&str>,
    ) -> DriveResult<DocumentChangeSummary> {
        let sync_date = Utc::now();
        let upper_bound = AuditLog::new(session.pool()).max_log_id().await?;
        let roots = self.root_entries(user, session).await?;
        let active_definitions =
            format_root_definitions(session.repository(), roots.iter().map(|r| &r.reference));

        let since = match (checkpoint.lower_bound, checkpoint.last_sync_date) {
            (Some(log_id), _) => ChangeBound::LogId(log_id),
            (None, Some(date)) => ChangeBound::SyncDate(date),
            (None, None) => {
                tracing::debug!("First change summary for {}, full synchronization expected", user);
                return Ok(DocumentChangeSummary::new(
                    Vec::new(),
                    BTreeMap::new(),
                    sync_date,
                    upper_bound,
                    active_definitions,
                ));
            }
        };

        let query = ChangeQuery {
            repository: session.repository().to_string(),
            root_paths: roots.iter().map(|r| r.path.clone()).collect(),
            user: user.to_string(),
            since,
            upper_bound,
            limit: self.change_limit,
        };

        let found = match self.change_finder.find_changes(&query).await {
            Ok(changes) => changes,
            Err(DriveError::TooManyChanges { limit }) => {
                tracing::info!(
                    "More than {} changes for {} since {:?}, full synchronization required",
                    limit,
                    user,
                    since
                );
                return Ok(DocumentChangeSummary::too_many_changes(
                    sync_date,
                    upper_bound,
                    active_definitions,
                ));
            }
            Err(e) => return Err(e),
        };

        // Most recent change per document wins
        let mut seen = HashSet::new();
        let mut changes: Vec<DocumentChange> = found
            .into_iter()
            .filter(|c| seen.insert(c.doc_uuid.clone()))
            .collect();

        // Roots the device still synchronizes but that are gone server side
        if let Some(definitions) = last_active_root_definitions {
            let active: HashSet<&str> = roots.iter().map(|r| r.reference.as_str()).collect();
            let mut removed = Vec::new();
            for (repository, doc_ref) in parse_root_definitions(definitions) {
                if repository != session.repository()
                    || active.contains(doc_ref.as_str())
                    || seen.contains(doc_ref.as_str())
                {
                    continue;
                }
                seen.insert(doc_ref.to_string());
                removed.push(
                    self.unregistered_root_change(user, session, &doc_ref, sync_date.timestamp_millis())
                        .await?,
                );
            }
            removed.extend(changes);
            changes = removed;
        }

        let repo = session.documents();
        let mut changed_documents = BTreeMap::new();
        for change in changes.iter().filter(|c| !c.event_id.is_removal()) {
            let doc_ref = DocumentRef::new(&change.doc_uuid);
            let Some(doc) = repo.lookup(&doc_ref, false).await? else {
                continue;
            };
            if is_blacklisted(&doc.doc_type)
                || !repo.has_permission(user, &doc, Permission::Read).await?
            {
                continue;
            }
            changed_documents.insert(doc.id.clone(), doc);
        }

        tracing::debug!(
            "Change summary for {}: {} changes, upper bound {}",
            user,
            changes.len(),
            upper_bound
        );

        Ok(DocumentChangeSummary::new(
            changes,
            changed_documents,
            sync_date,
            upper_bound,
            active_definitions,
        ))
    }
}
