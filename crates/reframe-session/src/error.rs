//! Error types for session store operations.

/// Error type for session store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session was never issued, has been evicted, or has expired.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A single image is larger than the whole byte budget of the store.
    #[error("Image of {size} bytes exceeds session store capacity of {max} bytes")]
    CapacityExceeded { size: usize, max: usize },
}

/// Result type for session store operations.
pub type Result<T> = std::result::Result<T, Error>;
