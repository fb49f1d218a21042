//! Document API endpoints
//!
//! Thin layer over the repository. Deletions and moves are forwarded to the
//! synchronization root manager so root sets stay consistent.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::extract::DriveUser;
use crate::audit::{AuditEntry, AuditLog};
use crate::drive::SyncRootManager;
use crate::error::Result;
use crate::repository::{DocumentModel, DocumentRef, NewDocument, Permission};
use crate::state::AppState;

/// Create the documents router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_document))
        .route(
            "/:id",
            get(get_document).patch(update_document).delete(delete_document),
        )
        .route("/:id/children", get(list_children))
        .route("/:id/lock", post(lock_document))
        .route("/:id/unlock", post(unlock_document))
        .route("/:id/acl", post(grant_permission))
        .route("/:id/history", get(document_history))
}

/// Move and/or rename request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDocument {
    pub parent_id: Option<String>,
    pub name: Option<String>,
}

/// Permission grant request
#[derive(Debug, Deserialize)]
pub struct GrantRequest {
    pub principal: String,
    pub permission: Permission,
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub removed: Vec<DocumentRef>,
}

async fn create_document(
    user: DriveUser,
    Json(new): Json<NewDocument>,
) -> Result<(StatusCode, Json<DocumentModel>)> {
    let doc = user.session.documents().create_document(&new).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn get_document(user: DriveUser, Path(id): Path<String>) -> Result<Json<DocumentModel>> {
    let doc = user.session.documents().get_document(&DocumentRef::new(id)).await?;
    Ok(Json(doc))
}

async fn list_children(user: DriveUser, Path(id): Path<String>) -> Result<Json<Vec<DocumentModel>>> {
    let children = user.session.documents().children(&DocumentRef::new(id)).await?;
    Ok(Json(children))
}

async fn update_document(
    State(state): State<AppState>,
    user: DriveUser,
    Path(id): Path<String>,
    Json(update): Json<UpdateDocument>,
) -> Result<Json<DocumentModel>> {
    let new_parent = update.parent_id.map(DocumentRef::new);
    let doc = user
        .session
        .documents()
        .move_document(&DocumentRef::new(id), new_parent.as_ref(), update.name.as_deref())
        .await?;

    // Cached root paths may now be stale
    state.drive().invalidate_caches();
    Ok(Json(doc))
}

async fn delete_document(
    State(state): State<AppState>,
    user: DriveUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let removed = user
        .session
        .documents()
        .delete_document(&DocumentRef::new(id))
        .await?;

    for doc_ref in &removed {
        state.drive().handle_folder_deletion(doc_ref).await?;
    }

    Ok(Json(DeleteResponse { removed }))
}

async fn lock_document(user: DriveUser, Path(id): Path<String>) -> Result<Json<DocumentModel>> {
    let doc = user.session.documents().lock(&DocumentRef::new(id)).await?;
    Ok(Json(doc))
}

async fn unlock_document(user: DriveUser, Path(id): Path<String>) -> Result<Json<DocumentModel>> {
    let doc = user.session.documents().unlock(&DocumentRef::new(id)).await?;
    Ok(Json(doc))
}

async fn grant_permission(
    State(state): State<AppState>,
    user: DriveUser,
    Path(id): Path<String>,
    Json(grant): Json<GrantRequest>,
) -> Result<StatusCode> {
    user.session
        .documents()
        .grant(&DocumentRef::new(id), &grant.principal, grant.permission)
        .await?;

    state.drive().invalidate_caches();
    Ok(StatusCode::NO_CONTENT)
}

async fn document_history(user: DriveUser, Path(id): Path<String>) -> Result<Json<Vec<AuditEntry>>> {
    let doc = user.session.documents().get_document(&DocumentRef::new(id)).await?;
    let entries = AuditLog::new(user.session.pool())
        .entries_for_document(user.session.repository(), &doc.id)
        .await?;
    Ok(Json(entries))
}
