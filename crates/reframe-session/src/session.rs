//! Session values held by the store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reframe_image::ImageFormat;

use crate::id::SessionId;

/// A complete encoded image together with its decoded geometry.
///
/// This is the unit swapped into a session on every transform; the buffer
/// is never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageState {
    pub data: Bytes,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl ImageState {
    pub fn new(data: impl Into<Bytes>, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            data: data.into(),
            format,
            width,
            height,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// One in-progress image.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub image: ImageState,
    /// File name of the original upload, if the client sent one.
    pub original_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    /// Number of transforms applied since creation.
    pub revision: u64,
}

impl Session {
    pub(crate) fn new(id: SessionId, image: ImageState, original_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            image,
            original_name,
            created_at: now,
            last_accessed_at: now,
            revision: 0,
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.image.size_bytes()
    }

    /// File name offered for download: the upload's stem with the
    /// extension of the current format.
    pub fn download_name(&self) -> String {
        let stem = self
            .original_name
            .as_deref()
            .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name))
            .map(|name| match name.rsplit_once('.') {
                Some((stem, _)) if !stem.is_empty() => stem,
                _ => name,
            })
            .filter(|stem| !stem.is_empty())
            .unwrap_or("image");

        let safe: String = stem
            .chars()
            .map(|c| {
                if c.is_control() || matches!(c, '"' | ';') {
                    '_'
                } else {
                    c
                }
            })
            .collect();

        format!("{safe}.{}", self.image.format.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(name: Option<&str>, format: ImageFormat) -> Session {
        Session::new(
            SessionId::generate(0),
            ImageState::new(vec![0u8; 4], format, 1, 1),
            name.map(str::to_string),
        )
    }

    #[test]
    fn test_download_name_uses_format_extension() {
        let s = session(Some("holiday.jpeg"), ImageFormat::Jpeg);
        assert_eq!(s.download_name(), "holiday.jpg");
    }

    #[test]
    fn test_download_name_strips_directories() {
        let s = session(Some("C:\\photos\\cat.png"), ImageFormat::Png);
        assert_eq!(s.download_name(), "cat.png");
        let s = session(Some("/tmp/dog.webp"), ImageFormat::Webp);
        assert_eq!(s.download_name(), "dog.webp");
    }

    #[test]
    fn test_download_name_fallback() {
        assert_eq!(session(None, ImageFormat::Gif).download_name(), "image.gif");
        assert_eq!(session(Some(""), ImageFormat::Png).download_name(), "image.png");
    }

    #[test]
    fn test_download_name_sanitizes_header_chars() {
        let s = session(Some("a\"b;c.png"), ImageFormat::Png);
        assert_eq!(s.download_name(), "a_b_c.png");
    }

    #[test]
    fn test_dotfile_keeps_name() {
        let s = session(Some(".hidden"), ImageFormat::Png);
        assert_eq!(s.download_name(), ".hidden.png");
    }
}
