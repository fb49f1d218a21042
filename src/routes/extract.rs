//! Request identity extraction

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::error::AppError;
use crate::repository::Session;
use crate::state::AppState;

/// Header naming the calling user
pub const USER_HEADER: &str = "x-drive-user";
/// Header selecting the repository
pub const REPOSITORY_HEADER: &str = "x-drive-repository";

/// Authenticated caller with a session on the requested repository
pub struct DriveUser {
    pub name: String,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppState> for DriveUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let name = header(parts, USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing {} header", USER_HEADER)))?;
        let repository = header(parts, REPOSITORY_HEADER);

        let session = state.session(&name, repository.as_deref());
        Ok(Self { name, session })
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}
