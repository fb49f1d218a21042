//! Application state management

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::drive::DriveManager;
use crate::repository::Session;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    db: SqlitePool,
    drive: DriveManager,
    administrators: Arc<Vec<String>>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: Config, db: SqlitePool) -> Self {
        let drive = DriveManager::with_audit_finder(db.clone(), config.drive.change_limit)
            .with_roots_cache_capacity(config.drive.roots_cache_capacity);
        let administrators = Arc::new(config.drive.administrators.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                db,
                drive,
                administrators,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the database pool
    pub fn db(&self) -> &SqlitePool {
        &self.inner.db
    }

    /// Get the synchronization root manager
    pub fn drive(&self) -> &DriveManager {
        &self.inner.drive
    }

    /// Open a session for `principal`, on the default repository unless
    /// one is named
    pub fn session(&self, principal: &str, repository: Option<&str>) -> Session {
        let repository = repository.unwrap_or(&self.inner.config.drive.repository);
        Session::new(self.inner.db.clone(), repository, principal)
            .with_administrators(self.inner.administrators.clone())
    }
}
