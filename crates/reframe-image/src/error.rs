//! Error types for codec and transform operations.

/// Error type for image transforms.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// Missing or illegal transform arguments.
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The bytes are an image format this build cannot handle.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The bytes are not a decodable image.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Decoded dimensions exceed the configured pixel budget.
    #[error("Image too large: {width}x{height} exceeds {max_pixels} pixels")]
    TooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    /// Encoding the result failed.
    #[error("Failed to encode {format}: {message}")]
    Encode { format: String, message: String },
}

impl TransformError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParams(msg.into())
    }
}

/// Result type for image transforms.
pub type Result<T> = std::result::Result<T, TransformError>;
