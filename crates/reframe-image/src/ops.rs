//! Pure pixel transforms.
//!
//! Each function takes the current image by reference and returns a new one;
//! argument validation happens when the spec types are built, so the
//! transforms themselves only fail on computed dimensions.

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransformError};

/// Validated resize arguments.
///
/// At least one of `width` / `height` is present. When only one is given the
/// other is derived from the source aspect ratio at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeSpec {
    width: Option<u32>,
    height: Option<u32>,
    max_dimension: u32,
}

impl ResizeSpec {
    /// Validate raw request values. Each given value must be an integer in
    /// `1..=max_dimension`.
    pub fn new(width: Option<i64>, height: Option<i64>, max_dimension: u32) -> Result<Self> {
        if width.is_none() && height.is_none() {
            return Err(TransformError::invalid(
                "at least one of width or height is required",
            ));
        }
        Ok(Self {
            width: width
                .map(|w| check_dimension("width", w, max_dimension))
                .transpose()?,
            height: height
                .map(|h| check_dimension("height", h, max_dimension))
                .transpose()?,
            max_dimension,
        })
    }

    pub fn width(&self) -> Option<u32> {
        self.width
    }

    pub fn height(&self) -> Option<u32> {
        self.height
    }

    /// Final output dimensions for a source of `src_width` x `src_height`.
    pub fn target_dimensions(&self, src_width: u32, src_height: u32) -> Result<(u32, u32)> {
        let (width, height) = match (self.width, self.height) {
            (Some(w), Some(h)) => (w, h),
            (Some(w), None) => (w, scale(src_height, w, src_width)),
            (None, Some(h)) => (scale(src_width, h, src_height), h),
            (None, None) => return Err(TransformError::invalid("no target dimensions")),
        };

        if width > self.max_dimension || height > self.max_dimension {
            return Err(TransformError::InvalidParams(format!(
                "computed size {width}x{height} exceeds maximum dimension {}",
                self.max_dimension
            )));
        }
        Ok((width, height))
    }
}

fn check_dimension(name: &str, value: i64, max: u32) -> Result<u32> {
    if value < 1 || value > i64::from(max) {
        return Err(TransformError::InvalidParams(format!(
            "{name} must be between 1 and {max}, got {value}"
        )));
    }
    Ok(value as u32)
}

/// `other * given / source`, rounded, never below 1.
fn scale(other: u32, given: u32, source: u32) -> u32 {
    if source == 0 {
        return 1;
    }
    let scaled = (f64::from(other) * f64::from(given) / f64::from(source)).round();
    if scaled < 1.0 {
        1
    } else if scaled > f64::from(u32::MAX) {
        u32::MAX
    } else {
        scaled as u32
    }
}

/// Clockwise rotation by a multiple of 90 degrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rotation {
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Accept any non-zero multiple of 90; negative values rotate
    /// counterclockwise, so `-90` is the same as `270`.
    pub fn from_degrees(degrees: i64) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(TransformError::InvalidParams(format!(
                "angle must be a multiple of 90, got {degrees}"
            )));
        }
        match degrees.rem_euclid(360) {
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            _ => Err(TransformError::InvalidParams(format!(
                "angle must not be a full turn, got {degrees}"
            ))),
        }
    }

    pub fn degrees(&self) -> u32 {
        match self {
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Whether width and height trade places.
    pub fn swaps_dimensions(&self) -> bool {
        !matches!(self, Self::Cw180)
    }
}

/// Mirror axis for [`flip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    /// Mirror left-right.
    Horizontal,
    /// Mirror top-bottom.
    Vertical,
}

impl FlipAxis {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

pub fn resize(image: &DynamicImage, spec: &ResizeSpec) -> Result<DynamicImage> {
    let (width, height) = spec.target_dimensions(image.width(), image.height())?;
    if (width, height) == (image.width(), image.height()) {
        return Ok(image.clone());
    }
    Ok(image.resize_exact(width, height, FilterType::Lanczos3))
}

pub fn rotate(image: &DynamicImage, rotation: Rotation) -> DynamicImage {
    match rotation {
        Rotation::Cw90 => image.rotate90(),
        Rotation::Cw180 => image.rotate180(),
        Rotation::Cw270 => image.rotate270(),
    }
}

pub fn flip(image: &DynamicImage, axis: FlipAxis) -> DynamicImage {
    match axis {
        FlipAxis::Horizontal => image.fliph(),
        FlipAxis::Vertical => image.flipv(),
    }
}
