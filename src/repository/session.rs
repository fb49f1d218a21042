//! Repository sessions

use std::sync::Arc;

use sqlx::SqlitePool;

use super::store::DocumentRepository;

/// A principal bound to one repository.
///
/// Passed to every manager call and only borrowed for its duration.
#[derive(Clone)]
pub struct Session {
    pool: SqlitePool,
    repository: String,
    principal: String,
    administrators: Arc<Vec<String>>,
}

impl Session {
    pub fn new(pool: SqlitePool, repository: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            pool,
            repository: repository.into(),
            principal: principal.into(),
            administrators: Arc::new(Vec::new()),
        }
    }

    /// Principals holding every permission on every document
    pub fn with_administrators(mut self, administrators: Arc<Vec<String>>) -> Self {
        self.administrators = administrators;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub fn is_administrator(&self, principal: &str) -> bool {
        self.administrators.iter().any(|a| a == principal)
    }

    pub fn documents(&self) -> DocumentRepository<'_> {
        DocumentRepository::new(self)
    }
}
