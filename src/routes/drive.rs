//! Synchronization API endpoints
//!
//! Root registration and change summaries for the calling user.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::extract::DriveUser;
use crate::db::millis_to_datetime;
use crate::drive::{DocumentChangeSummary, SyncCheckpoint, SyncRootManager};
use crate::error::{DriveError, Result};
use crate::repository::DocumentRef;
use crate::state::AppState;

/// Create the drive router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/roots", get(list_roots))
        .route("/roots/:id", put(register_root).delete(unregister_root))
        .route("/changes", get(change_summary))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootsResponse {
    pub references: Vec<DocumentRef>,
    pub paths: Vec<String>,
}

/// Change summary query parameters
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesParams {
    /// Milliseconds since the epoch
    pub last_sync_date: Option<i64>,
    /// Highest audit log id already synchronized
    pub lower_bound: Option<i64>,
    pub last_sync_active_root_definitions: Option<String>,
}

impl ChangesParams {
    fn checkpoint(&self) -> SyncCheckpoint {
        SyncCheckpoint {
            last_sync_date: self.last_sync_date.map(millis_to_datetime),
            lower_bound: self.lower_bound,
        }
    }
}

async fn list_roots(
    State(state): State<AppState>,
    user: DriveUser,
) -> Result<Json<RootsResponse>> {
    let drive = state.drive();
    let references = drive
        .get_synchronization_root_references(&user.name, &user.session)
        .await?;
    let paths = drive
        .get_synchronization_root_paths(&user.name, &user.session)
        .await?;

    Ok(Json(RootsResponse { references, paths }))
}

async fn register_root(
    State(state): State<AppState>,
    user: DriveUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let doc = user.session.documents().get_document(&DocumentRef::new(id)).await?;
    state
        .drive()
        .register_synchronization_root(&user.name, &doc, &user.session)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unregister_root(
    State(state): State<AppState>,
    user: DriveUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    // No read check: users who lost access must still be able to drop the root
    let doc_ref = DocumentRef::new(id);
    let doc = user
        .session
        .documents()
        .lookup(&doc_ref, false)
        .await?
        .ok_or_else(|| DriveError::NotFound(doc_ref.to_string()))?;
    state
        .drive()
        .unregister_synchronization_root(&user.name, &doc, &user.session)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_summary(
    State(state): State<AppState>,
    user: DriveUser,
    Query(params): Query<ChangesParams>,
) -> Result<Json<DocumentChangeSummary>> {
    let summary = state
        .drive()
        .get_document_change_summary(
            &user.name,
            &user.session,
            &params.checkpoint(),
            params.last_sync_active_root_definitions.as_deref(),
        )
        .await?;
    Ok(Json(summary))
}
