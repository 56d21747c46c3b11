// src/options.rs
//
// Compression options: target format, quality and optional bounding box.

use crate::error::{PipelineError, PipelineResult};
use std::fmt;
use std::str::FromStr;

/// Target encoder. Each variant fixes the output MIME type and file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionFormat {
    WebP,
    #[default]
    MozJpeg,
    OxiPng,
}

impl CompressionFormat {
    pub const ALL: [CompressionFormat; 3] = [
        CompressionFormat::WebP,
        CompressionFormat::MozJpeg,
        CompressionFormat::OxiPng,
    ];

    /// Stable identifier ("webp", "mozjpeg", "oxipng").
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionFormat::WebP => "webp",
            CompressionFormat::MozJpeg => "mozjpeg",
            CompressionFormat::OxiPng => "oxipng",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            CompressionFormat::WebP => "image/webp",
            CompressionFormat::MozJpeg => "image/jpeg",
            CompressionFormat::OxiPng => "image/png",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            CompressionFormat::WebP => "webp",
            CompressionFormat::MozJpeg => "jpg",
            CompressionFormat::OxiPng => "png",
        }
    }

    /// Human label for pickers.
    pub fn label(&self) -> &'static str {
        match self {
            CompressionFormat::WebP => "WebP",
            CompressionFormat::MozJpeg => "MozJPEG",
            CompressionFormat::OxiPng => "OxiPNG",
        }
    }

    /// OxiPNG output is lossless; the quality value only tunes effort.
    pub fn is_lossless(&self) -> bool {
        matches!(self, CompressionFormat::OxiPng)
    }
}

impl fmt::Display for CompressionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompressionFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(CompressionFormat::WebP),
            "mozjpeg" | "jpeg" | "jpg" => Ok(CompressionFormat::MozJpeg),
            "oxipng" | "png" => Ok(CompressionFormat::OxiPng),
            other => Err(PipelineError::invalid_argument(
                "format",
                other.to_string(),
                "Expected webp, mozjpeg or oxipng",
            )),
        }
    }
}

pub const MAX_QUALITY: u8 = 100;
pub const DEFAULT_QUALITY: u8 = 80;

/// Options applied to every entry in the batch.
///
/// Equality is structural; the pipeline treats a `set_options` call with an
/// equal value as a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompressionOptions {
    pub format: CompressionFormat,
    /// 0-100. `validate` rejects anything higher; codecs clamp on use.
    pub quality: u8,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            format: CompressionFormat::MozJpeg,
            quality: DEFAULT_QUALITY,
            max_width: None,
            max_height: None,
        }
    }
}

impl CompressionOptions {
    pub fn new(format: CompressionFormat, quality: u8) -> Self {
        Self {
            format,
            quality: quality.min(MAX_QUALITY),
            ..Self::default()
        }
    }

    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = Some(max_width);
        self
    }

    pub fn with_max_height(mut self, max_height: u32) -> Self {
        self.max_height = Some(max_height);
        self
    }

    /// Quality clamped to 0-100.
    pub fn effective_quality(&self) -> u8 {
        self.quality.min(MAX_QUALITY)
    }

    /// Quality as a 0.0-1.0 factor.
    pub fn quality_factor(&self) -> f32 {
        f32::from(self.effective_quality()) / 100.0
    }

    /// Reject out-of-range quality and bounding boxes that can never be
    /// satisfied.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.quality > MAX_QUALITY {
            return Err(PipelineError::invalid_argument(
                "quality",
                self.quality.to_string(),
                "Quality must be between 0 and 100",
            ));
        }
        if self.max_width == Some(0) || self.max_height == Some(0) {
            return Err(PipelineError::invalid_argument(
                "max_width/max_height",
                format!("{:?}x{:?}", self.max_width, self.max_height),
                "Bounds must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = CompressionOptions::default();
        assert_eq!(options.format, CompressionFormat::MozJpeg);
        assert_eq!(options.quality, 80);
        assert_eq!(options.max_width, None);
        assert_eq!(options.max_height, None);
    }

    #[test]
    fn test_format_table() {
        assert_eq!(CompressionFormat::WebP.mime_type(), "image/webp");
        assert_eq!(CompressionFormat::WebP.extension(), "webp");
        assert_eq!(CompressionFormat::MozJpeg.mime_type(), "image/jpeg");
        assert_eq!(CompressionFormat::MozJpeg.extension(), "jpg");
        assert_eq!(CompressionFormat::OxiPng.mime_type(), "image/png");
        assert_eq!(CompressionFormat::OxiPng.extension(), "png");
        assert!(CompressionFormat::OxiPng.is_lossless());
        assert!(!CompressionFormat::WebP.is_lossless());
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(
            "WEBP".parse::<CompressionFormat>().unwrap(),
            CompressionFormat::WebP
        );
        assert_eq!(
            "jpg".parse::<CompressionFormat>().unwrap(),
            CompressionFormat::MozJpeg
        );
        assert_eq!(
            " png ".parse::<CompressionFormat>().unwrap(),
            CompressionFormat::OxiPng
        );
        assert!("avif".parse::<CompressionFormat>().is_err());
        for format in CompressionFormat::ALL {
            assert_eq!(format.to_string().parse::<CompressionFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_quality_clamped() {
        let options = CompressionOptions::new(CompressionFormat::WebP, 250);
        assert_eq!(options.quality, 100);

        let raw = CompressionOptions {
            quality: 180,
            ..CompressionOptions::default()
        };
        assert_eq!(raw.effective_quality(), 100);
        assert!((raw.quality_factor() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_structural_equality() {
        let a = CompressionOptions::new(CompressionFormat::WebP, 80).with_max_width(1920);
        let b = CompressionOptions::new(CompressionFormat::WebP, 80).with_max_width(1920);
        assert_eq!(a, b);
        assert_ne!(a, b.clone().with_max_height(1080));
    }

    #[test]
    fn test_validate_rejects_quality_above_max() {
        let over = CompressionOptions {
            quality: 200,
            ..CompressionOptions::default()
        };
        assert!(matches!(
            over.validate(),
            Err(PipelineError::InvalidArgument { .. })
        ));
        assert!(CompressionOptions::new(CompressionFormat::WebP, 100)
            .validate()
            .is_ok());
        assert!(CompressionOptions::new(CompressionFormat::WebP, 0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        assert!(CompressionOptions::default().validate().is_ok());
        assert!(CompressionOptions::default()
            .with_max_width(0)
            .validate()
            .is_err());
        assert!(CompressionOptions::default()
            .with_max_height(0)
            .validate()
            .is_err());
    }
}
