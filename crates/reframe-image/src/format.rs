//! Supported image formats and their content types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Image formats a session can hold.
///
/// A session keeps the format of its original upload; every transform
/// re-encodes into the same format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// MIME type served with downloads.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::Tiff => "image/tiff",
        }
    }

    /// File extension used for download file names.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
        }
    }

    /// Sniff the format from the leading bytes of an encoded image.
    pub fn detect(data: &[u8]) -> Result<Self> {
        let format = image::guess_format(data)
            .map_err(|_| TransformError::Decode("unrecognized image data".to_string()))?;
        Self::try_from(format)
    }

    pub(crate) fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Png => image::ImageFormat::Png,
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Webp => image::ImageFormat::WebP,
            Self::Gif => image::ImageFormat::Gif,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }
}

impl TryFrom<image::ImageFormat> for ImageFormat {
    type Error = TransformError;

    fn try_from(format: image::ImageFormat) -> Result<Self> {
        match format {
            image::ImageFormat::Png => Ok(Self::Png),
            image::ImageFormat::Jpeg => Ok(Self::Jpeg),
            image::ImageFormat::WebP => Ok(Self::Webp),
            image::ImageFormat::Gif => Ok(Self::Gif),
            image::ImageFormat::Bmp => Ok(Self::Bmp),
            image::ImageFormat::Tiff => Ok(Self::Tiff),
            other => Err(TransformError::UnsupportedFormat(format!("{other:?}"))),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
