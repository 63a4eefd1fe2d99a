//! Decode and encode primitives over the `image` crate.
//!
//! Decoding reads the header first and refuses images wider or taller than
//! [`CodecLimits::max_dimension`], or whose pixel count exceeds
//! [`CodecLimits::max_decode_pixels`], before any pixel buffer is
//! allocated. Encoding always targets the session's own format, converting
//! the pixel layout where the encoder requires it (JPEG has no alpha, GIF
//! wants RGBA, and so on).

use std::borrow::Cow;
use std::io::Cursor;

use image::{ColorType, DynamicImage, ImageReader};
use tracing::trace;

use crate::error::{Result, TransformError};
use crate::format::ImageFormat;

/// Bounds applied to codec work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecLimits {
    /// Largest width or height accepted when decoding or produced by a
    /// transform.
    pub max_dimension: u32,
    /// Largest `width * height` accepted when decoding.
    pub max_decode_pixels: u64,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_dimension: 15_000,
            max_decode_pixels: 268_402_689,
        }
    }
}

impl CodecLimits {
    pub fn new(max_dimension: u32, max_decode_pixels: u64) -> Self {
        Self {
            max_dimension,
            max_decode_pixels,
        }
    }

    fn image_limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        // RGBA8 worst case; wider pixel types hit the allocator limit sooner.
        limits.max_alloc = Some(self.max_decode_pixels.saturating_mul(4));
        limits
    }
}

/// A decoded image together with the format it was decoded from.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

impl DecodedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

fn reader(data: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| TransformError::Decode(e.to_string()))
}

/// Read format and dimensions from the image header without decoding pixels.
pub fn probe(data: &[u8]) -> Result<(ImageFormat, u32, u32)> {
    let reader = reader(data)?;
    let format = reader
        .format()
        .ok_or_else(|| TransformError::Decode("unrecognized image data".to_string()))
        .and_then(ImageFormat::try_from)?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| TransformError::Decode(e.to_string()))?;
    Ok((format, width, height))
}

/// Decode encoded bytes into a pixel buffer.
pub fn decode(data: &[u8], limits: &CodecLimits) -> Result<DecodedImage> {
    let (format, width, height) = probe(data)?;

    if width > limits.max_dimension || height > limits.max_dimension {
        return Err(TransformError::Decode(format!(
            "image is {width}x{height}, limit is {} per side",
            limits.max_dimension
        )));
    }

    let pixels = u64::from(width) * u64::from(height);
    if pixels > limits.max_decode_pixels {
        return Err(TransformError::TooLarge {
            width,
            height,
            max_pixels: limits.max_decode_pixels,
        });
    }

    let mut reader = reader(data)?;
    reader.limits(limits.image_limits());
    let image = reader
        .decode()
        .map_err(|e| TransformError::Decode(e.to_string()))?;

    trace!(%format, width, height, "Decoded image");

    Ok(DecodedImage { image, format })
}

/// Encode a pixel buffer into the given format.
pub fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let prepared = prepare_for(image, format);
    let mut out = Cursor::new(Vec::new());
    prepared
        .write_to(&mut out, format.to_image_format())
        .map_err(|e| TransformError::Encode {
            format: format.to_string(),
            message: e.to_string(),
        })?;
    Ok(out.into_inner())
}

/// Convert the pixel layout to one the target encoder accepts.
fn prepare_for(image: &DynamicImage, format: ImageFormat) -> Cow<'_, DynamicImage> {
    let color = image.color();
    match format {
        ImageFormat::Png => match color {
            ColorType::Rgb32F | ColorType::Rgba32F => {
                Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8()))
            }
            _ => Cow::Borrowed(image),
        },
        ImageFormat::Jpeg => match color {
            ColorType::Rgb8 | ColorType::L8 => Cow::Borrowed(image),
            _ => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
        },
        ImageFormat::Gif => match color {
            ColorType::Rgba8 => Cow::Borrowed(image),
            _ => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
        },
        ImageFormat::Webp | ImageFormat::Bmp | ImageFormat::Tiff => {
            match (color, color.has_alpha()) {
                (ColorType::Rgba8, _) | (ColorType::Rgb8, _) => Cow::Borrowed(image),
                (_, true) => Cow::Owned(DynamicImage::ImageRgba8(image.to_rgba8())),
                (_, false) => Cow::Owned(DynamicImage::ImageRgb8(image.to_rgb8())),
            }
        }
    }
}
