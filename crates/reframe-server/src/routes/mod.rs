//! HTTP routes of a transform worker.

pub mod download;
pub mod health;
pub mod sessions;
pub mod transform;

pub use download::download_handler;
pub use health::{HealthResponse, SessionsHealth, health_routes};
pub use sessions::{SessionInfo, get_session_handler};
pub use transform::{
    Direction, FlipRequest, ResizeRequest, RotateRequest, TransformOptions, TransformResponse,
    flip_handler, resize_handler, rotate_handler,
};
