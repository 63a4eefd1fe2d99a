//! Transform endpoints.
//!
//! `POST /transform/resize` accepts either a multipart upload, which creates
//! a new session, or a JSON body naming an existing session. Rotate and flip
//! always work on an existing session.

use std::time::Instant;

use axum::{
    Json,
    extract::{
        FromRequest, Multipart, Query, Request, State, multipart::MultipartError,
        rejection::QueryRejection,
    },
    http::{StatusCode, header},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use bytes::Bytes;
use reframe_image::{FlipAxis, Operation, ResizeSpec, Rotation};
use reframe_session::Session;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};
use crate::state::{AppState, sniff_upload};

/// Result of any transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    pub session_id: String,
    pub width: u32,
    pub height: u32,
    pub size_bytes: usize,
    pub format: String,
    pub processing_ms: u64,
    /// Size of the uploaded file; only set when the request created the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<usize>,
    /// `data:` URL of the result, when requested with `?preview=true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl TransformResponse {
    fn new(session: &Session, started: Instant, options: &TransformOptions) -> Self {
        Self {
            session_id: session.id.to_string(),
            width: session.image.width,
            height: session.image.height,
            size_bytes: session.size_bytes(),
            format: session.image.format.to_string(),
            processing_ms: started.elapsed().as_millis() as u64,
            original_size: None,
            image: options.preview.then(|| preview_url(session)),
        }
    }

    fn with_original_size(mut self, size: usize) -> Self {
        self.original_size = Some(size);
        self
    }
}

/// Inline copy of the session's current image.
fn preview_url(session: &Session) -> String {
    format!(
        "data:{};base64,{}",
        session.image.format.content_type(),
        STANDARD.encode(&session.image.data)
    )
}

/// Query options shared by every transform endpoint.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TransformOptions {
    #[serde(default)]
    pub preview: bool,
}

fn options(
    query: std::result::Result<Query<TransformOptions>, QueryRejection>,
) -> Result<TransformOptions> {
    query
        .map(|Query(options)| options)
        .map_err(|rejection| ServerError::InvalidParams(rejection.body_text()))
}

/// JSON body for resizing an existing session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub session_id: String,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
}

/// Quarter-turn direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
}

impl From<Direction> for Rotation {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Left => Rotation::Cw270,
            Direction::Right => Rotation::Cw90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateRequest {
    pub session_id: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    /// Clockwise degrees; any non-zero multiple of 90.
    #[serde(default)]
    pub angle: Option<i64>,
}

impl RotateRequest {
    fn rotation(&self) -> Result<Rotation> {
        match (self.direction, self.angle) {
            (Some(direction), None) => Ok(direction.into()),
            (None, Some(angle)) => Ok(Rotation::from_degrees(angle)?),
            (Some(_), Some(_)) => Err(ServerError::InvalidParams(
                "give either direction or angle, not both".to_string(),
            )),
            (None, None) => Err(ServerError::InvalidParams(
                "direction (left|right) or angle is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipRequest {
    pub session_id: String,
    pub axis: FlipAxis,
}

/// `POST /transform/resize`
pub async fn resize_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<TransformOptions>, QueryRejection>,
    request: Request,
) -> Result<Json<TransformResponse>> {
    let started = Instant::now();
    let options = options(query)?;
    let max_dimension = state.config.limits.max_dimension;

    if is_multipart(&request) {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| ServerError::InvalidParams(e.body_text()))?;
        let upload = read_upload(multipart).await?;
        let spec = ResizeSpec::new(upload.width, upload.height, max_dimension)?;
        let original_size = upload.data.len();
        let session = state
            .create_session(upload.data, upload.file_name, Operation::Resize(spec))
            .await?;
        let response =
            TransformResponse::new(&session, started, &options).with_original_size(original_size);
        return Ok(Json(response));
    }

    let Json(body) = parse_json::<ResizeRequest>(request, &state).await?;
    let spec = ResizeSpec::new(body.width, body.height, max_dimension)?;
    let session = state
        .transform_session(&body.session_id, Operation::Resize(spec))
        .await?;
    Ok(Json(TransformResponse::new(&session, started, &options)))
}

/// `POST /transform/rotate`
pub async fn rotate_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<TransformOptions>, QueryRejection>,
    request: Request,
) -> Result<Json<TransformResponse>> {
    let started = Instant::now();
    let options = options(query)?;
    let Json(body) = parse_json::<RotateRequest>(request, &state).await?;
    let rotation = body.rotation()?;

    let session = state
        .transform_session(&body.session_id, Operation::Rotate(rotation))
        .await?;
    Ok(Json(TransformResponse::new(&session, started, &options)))
}

/// `POST /transform/flip`
pub async fn flip_handler(
    State(state): State<AppState>,
    query: std::result::Result<Query<TransformOptions>, QueryRejection>,
    request: Request,
) -> Result<Json<TransformResponse>> {
    let started = Instant::now();
    let options = options(query)?;
    let Json(body) = parse_json::<FlipRequest>(request, &state).await?;

    let session = state
        .transform_session(&body.session_id, Operation::Flip(body.axis))
        .await?;
    Ok(Json(TransformResponse::new(&session, started, &options)))
}

fn is_multipart(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"))
}

/// JSON extraction with rejections reported as `invalid_params`, or
/// `capacity_exceeded` when the body is over the upload limit.
async fn parse_json<T>(request: Request, state: &AppState) -> Result<Json<T>>
where
    T: serde::de::DeserializeOwned,
{
    Json::<T>::from_request(request, state).await.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ServerError::CapacityExceeded(rejection.body_text())
        } else {
            ServerError::InvalidParams(rejection.body_text())
        }
    })
}

/// Fields of a resize upload.
struct Upload {
    data: Bytes,
    file_name: Option<String>,
    width: Option<i64>,
    height: Option<i64>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut image: Option<(Bytes, Option<String>)> = None;
    let mut width = None;
    let mut height = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let file_name = field.file_name().map(str::to_string);
                let declared_image = field
                    .content_type()
                    .is_some_and(|ct| ct.starts_with("image/"));
                let data = field.bytes().await.map_err(multipart_error)?;
                if !declared_image {
                    sniff_upload(&data)?;
                } else if data.is_empty() {
                    return Err(ServerError::InvalidParams(
                        "uploaded file is empty".to_string(),
                    ));
                }
                image = Some((data, file_name));
            }
            Some("width") => {
                let text = field.text().await.map_err(multipart_error)?;
                width = parse_dimension("width", &text)?;
            }
            Some("height") => {
                let text = field.text().await.map_err(multipart_error)?;
                height = parse_dimension("height", &text)?;
            }
            _ => {}
        }
    }

    let (data, file_name) = image
        .ok_or_else(|| ServerError::InvalidParams("missing 'image' file part".to_string()))?;

    Ok(Upload {
        data,
        file_name,
        width,
        height,
    })
}

/// Blank values count as absent.
fn parse_dimension(name: &str, value: &str) -> Result<Option<i64>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| {
        ServerError::InvalidParams(format!("{name} must be an integer, got '{value}'"))
    })
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::CapacityExceeded(e.body_text())
    } else {
        ServerError::InvalidParams(e.body_text())
    }
}
