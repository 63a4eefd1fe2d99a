//! Image codec and transform engine for Reframe.
//!
//! This crate owns everything that touches pixels:
//! - [`codec`]: decode raw bytes into a [`DynamicImage`] and encode it back
//!   into the session's format, with decode limits against image bombs
//! - [`ops`]: pure `resize`, `rotate` and `flip` transforms
//! - [`pipeline`]: the decode → transform → encode stages run for every
//!   request, each returning a [`Result`]
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG, WebP, GIF, BMP, TIFF) | `image::ImageReader` with `image::Limits` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Rotate | `DynamicImage::rotate90` / `rotate180` / `rotate270` |
//! | Flip | `DynamicImage::fliph` / `flipv` |
//! | Encode | `DynamicImage::write_to` in the source format |
//!
//! Nothing here is async: callers run the pipeline on a blocking thread.
//!
//! [`DynamicImage`]: image::DynamicImage

pub mod codec;
pub mod error;
pub mod format;
pub mod ops;
pub mod pipeline;

pub use codec::{CodecLimits, DecodedImage, decode, encode, probe};
pub use error::{Result, TransformError};
pub use format::ImageFormat;
pub use ops::{FlipAxis, ResizeSpec, Rotation, flip, resize, rotate};
pub use pipeline::{Operation, TransformOutput, TransformPipeline};
