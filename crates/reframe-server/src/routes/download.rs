//! Download endpoint.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::state::AppState;

/// `GET /transform/download/{id}`
///
/// Serves the current image without touching the session's recency or TTL.
pub async fn download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let session = state.peek_session(&id).await?;
    let image = &session.image;

    let disposition = format!("attachment; filename=\"{}\"", session.download_name());
    let disposition = HeaderValue::from_str(&disposition)
        .map_err(|e| ServerError::Internal(format!("invalid download name: {e}")))?;

    debug!(
        session_id = %session.id,
        size_bytes = image.size_bytes(),
        format = %image.format,
        "Serving download"
    );

    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static(image.format.content_type()),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        image.data.clone(),
    )
        .into_response())
}
