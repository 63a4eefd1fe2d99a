//! Decode → transform → encode.

use std::time::Instant;

use image::DynamicImage;
use tracing::debug;

use crate::codec::{CodecLimits, decode, encode};
use crate::error::Result;
use crate::format::ImageFormat;
use crate::ops::{self, FlipAxis, ResizeSpec, Rotation};

/// A single transform applied to a session's working image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Resize(ResizeSpec),
    Rotate(Rotation),
    Flip(FlipAxis),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Resize(_) => "resize",
            Self::Rotate(_) => "rotate",
            Self::Flip(_) => "flip",
        }
    }

    pub fn apply(&self, image: &DynamicImage) -> Result<DynamicImage> {
        match self {
            Self::Resize(spec) => ops::resize(image, spec),
            Self::Rotate(rotation) => Ok(ops::rotate(image, *rotation)),
            Self::Flip(axis) => Ok(ops::flip(image, *axis)),
        }
    }
}

/// Encoded result of one pipeline run.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

/// Runs operations against encoded images under fixed codec limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransformPipeline {
    limits: CodecLimits,
}

impl TransformPipeline {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &CodecLimits {
        &self.limits
    }

    /// Decode `input`, apply `op`, and encode back into the source format.
    ///
    /// Blocking and CPU-bound.
    pub fn run(&self, input: &[u8], op: &Operation) -> Result<TransformOutput> {
        let started = Instant::now();

        let decoded = decode(input, &self.limits)?;
        let decoded_at = started.elapsed();

        let transformed = op.apply(&decoded.image)?;
        let bytes = encode(&transformed, decoded.format)?;

        debug!(
            op = op.name(),
            format = %decoded.format,
            width = transformed.width(),
            height = transformed.height(),
            size_bytes = bytes.len(),
            decode_ms = decoded_at.as_millis() as u64,
            total_ms = started.elapsed().as_millis() as u64,
            "Pipeline run complete"
        );

        Ok(TransformOutput {
            width: transformed.width(),
            height: transformed.height(),
            format: decoded.format,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::probe;
    use crate::error::TransformError;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 200])
        }));
        encode(&img, ImageFormat::Png).unwrap()
    }

    #[test]
    fn test_resize_rotate_flip_sequence() {
        let pipeline = TransformPipeline::default();
        let original = png(400, 300);

        let resize = Operation::Resize(ResizeSpec::new(Some(200), Some(150), 15_000).unwrap());
        let resized = pipeline.run(&original, &resize).unwrap();
        assert_eq!((resized.width, resized.height), (200, 150));
        assert_eq!(resized.format, ImageFormat::Png);

        let rotated = pipeline
            .run(&resized.bytes, &Operation::Rotate(Rotation::Cw90))
            .unwrap();
        assert_eq!((rotated.width, rotated.height), (150, 200));

        let flipped = pipeline
            .run(&rotated.bytes, &Operation::Flip(FlipAxis::Horizontal))
            .unwrap();
        assert_eq!((flipped.width, flipped.height), (150, 200));

        let (format, w, h) = probe(&flipped.bytes).unwrap();
        assert_eq!(format, ImageFormat::Png);
        assert_eq!((w, h), (150, 200));
    }

    #[test]
    fn test_preserves_jpeg_format() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 16, Rgb([90, 90, 90])));
        let jpeg = encode(&img, ImageFormat::Jpeg).unwrap();

        let out = TransformPipeline::default()
            .run(&jpeg, &Operation::Rotate(Rotation::Cw270))
            .unwrap();
        assert_eq!(out.format, ImageFormat::Jpeg);
        assert_eq!((out.width, out.height), (16, 32));
    }

    #[test]
    fn test_rejects_undecodable_input() {
        let result = TransformPipeline::default()
            .run(b"garbage", &Operation::Flip(FlipAxis::Vertical));
        assert!(matches!(result, Err(TransformError::Decode(_))));
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::Rotate(Rotation::Cw90).name(), "rotate");
        assert_eq!(Operation::Flip(FlipAxis::Vertical).name(), "flip");
    }
}
