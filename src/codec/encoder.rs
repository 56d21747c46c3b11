// src/codec/encoder.rs
//
// Encoder operations: MozJPEG, WebP (libwebp) and OxiPNG, with per-band
// quality settings.

use super::run_with_panic_policy;
use crate::error::{PipelineError, PipelineResult};
use crate::loader::MAX_DIMENSION;
use crate::options::{CompressionFormat, CompressionOptions};
use image::{DynamicImage, GenericImageView, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Encoder knobs derived from a 0-100 quality value.
///
/// Bands: High (>=85), Balanced (70-84), Fast (50-69), Fastest (<50).
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: f32::from(quality.min(100)),
        }
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }

    /// OxiPNG effort preset. PNG output is lossless, so quality only buys
    /// compression effort: higher quality spends more time.
    pub fn oxipng_preset(&self) -> u8 {
        match self.band() {
            QualityBand::High => 4,
            QualityBand::Balanced => 3,
            QualityBand::Fast => 2,
            QualityBand::Fastest => 1,
        }
    }
}

/// Encode `img` in the format selected by `options`.
pub fn encode(img: &DynamicImage, options: &CompressionOptions) -> PipelineResult<Vec<u8>> {
    let quality = options.effective_quality();
    match options.format {
        CompressionFormat::MozJpeg => encode_jpeg(img, quality),
        CompressionFormat::WebP => encode_webp(img, quality),
        CompressionFormat::OxiPng => encode_png(img, quality),
    }
}

/// Encode in the given source MIME type at maximum quality, falling back to
/// PNG when there is no encoder for it. Returns the bytes and the MIME type
/// actually produced.
pub fn encode_same_type(
    img: &DynamicImage,
    mime_type: &str,
) -> PipelineResult<(Vec<u8>, &'static str)> {
    match mime_type {
        "image/jpeg" => Ok((encode_jpeg(img, 100)?, "image/jpeg")),
        "image/webp" => Ok((encode_webp(img, 100)?, "image/webp")),
        _ => Ok((encode_plain_png(img)?, "image/png")),
    }
}

fn validate_dimensions(w: u32, h: u32, format: &'static str) -> PipelineResult<()> {
    if w == 0 || h == 0 {
        return Err(PipelineError::encode_failed(
            format,
            "width or height is zero",
        ));
    }
    if w > MAX_DIMENSION || h > MAX_DIMENSION {
        return Err(PipelineError::dimension_exceeds_limit(
            w.max(h),
            MAX_DIMENSION,
        ));
    }
    Ok(())
}

/// Encode to JPEG using mozjpeg: progressive, optimized Huffman coding,
/// 4:2:0 chroma. Alpha is discarded.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> PipelineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        validate_dimensions(w, h, "jpeg")?;
        let pixels: &[u8] = rgb.as_raw();

        let settings = QualitySettings::new(quality);
        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let mut output = Vec::with_capacity((w as usize * h as usize * 3 / 10).max(4096));
        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                PipelineError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;
            for row in pixels.chunks(w as usize * 3) {
                writer.write_scanlines(row).map_err(|e| {
                    PipelineError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }
            writer.finish().map_err(|e| {
                PipelineError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }
        Ok(output)
    })
}

/// Encode to lossy WebP. Alpha is kept only when the source has it.
pub fn encode_webp(img: &DynamicImage, quality: u8) -> PipelineResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let (w, h) = img.dimensions();
        validate_dimensions(w, h, "webp")?;

        let rgba;
        let rgb;
        let encoder = if img.color().has_alpha() {
            rgba = img.to_rgba8();
            webp::Encoder::from_rgba(rgba.as_raw(), w, h)
        } else {
            rgb = match img {
                DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                _ => Cow::Owned(img.to_rgb8()),
            };
            webp::Encoder::from_rgb(rgb.as_raw(), w, h)
        };

        let mut config = webp::WebPConfig::new()
            .map_err(|_| PipelineError::resource_unavailable("WebP encoder"))?;
        let settings = QualitySettings::new(quality);
        config.quality = settings.quality();
        config.method = 4;
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            PipelineError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;
        Ok(mem.to_vec())
    })
}

/// Encode to PNG and re-optimize losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, quality: u8) -> PipelineResult<Vec<u8>> {
    let plain = encode_plain_png(img)?;
    run_with_panic_policy("encode:oxipng", || {
        let preset = QualitySettings::new(quality).oxipng_preset();
        let mut options = oxipng::Options::from_preset(preset);
        options.strip = oxipng::StripChunks::Safe;
        oxipng::optimize_from_memory(&plain, &options).map_err(|e| {
            PipelineError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

fn encode_plain_png(img: &DynamicImage) -> PipelineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let (w, h) = img.dimensions();
        validate_dimensions(w, h, "png")?;
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| PipelineError::encode_failed("png", format!("PNG encode failed: {e}")))?;
        Ok(buf)
    })
}
