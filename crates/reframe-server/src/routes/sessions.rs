//! Session metadata endpoint.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use reframe_session::Session;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::AppState;

/// Metadata of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub format: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_name: Option<String>,
    /// Number of transforms applied after the upload.
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl From<&Session> for SessionInfo {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.to_string(),
            width: session.image.width,
            height: session.image.height,
            size_bytes: session.size_bytes(),
            format: session.image.format.to_string(),
            content_type: session.image.format.content_type().to_string(),
            original_name: session.original_name.clone(),
            revision: session.revision,
            created_at: session.created_at,
            last_accessed_at: session.last_accessed_at,
        }
    }
}

/// `GET /transform/sessions/{id}`
pub async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionInfo>> {
    let session = state.peek_session(&id).await?;
    Ok(Json(SessionInfo::from(&session)))
}
