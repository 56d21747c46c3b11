// src/codec/resize.rs
//
// Fit-within sizing (shrink only) and the resize itself: fast_image_resize
// with an image::imageops fallback.

use crate::error::{PipelineError, PipelineResult};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

#[cfg(feature = "native")]
use image::{RgbImage, RgbaImage};
#[cfg(feature = "native")]
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};

/// Target size for a `width`x`height` image inside an optional bounding box.
///
/// Width is bounded first, then height; aspect ratio is preserved with
/// rounding, and the result never exceeds the source size. A missing bound
/// imposes no constraint. Both dimensions stay at least 1.
pub fn fit_within(
    width: u32,
    height: u32,
    max_width: Option<u32>,
    max_height: Option<u32>,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let ratio = f64::from(width) / f64::from(height);
    let (mut target_w, mut target_h) = (width, height);

    if let Some(max_w) = max_width.filter(|m| *m > 0) {
        if target_w > max_w {
            target_w = max_w;
            target_h = round_dim(f64::from(target_w) / ratio);
        }
    }
    if let Some(max_h) = max_height.filter(|m| *m > 0) {
        if target_h > max_h {
            target_h = max_h;
            target_w = round_dim(f64::from(target_h) * ratio);
        }
    }

    (target_w.min(width), target_h.min(height))
}

fn round_dim(value: f64) -> u32 {
    (value.round() as u32).max(1)
}

/// Resize to exactly `dst_width`x`dst_height` with Lanczos3.
pub fn resize(img: DynamicImage, dst_width: u32, dst_height: u32) -> PipelineResult<DynamicImage> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 || dst_width == 0 || dst_height == 0 {
        return Err(PipelineError::resize_failed(
            (src_width, src_height),
            (dst_width, dst_height),
            "invalid dimensions for resize",
        ));
    }
    if (src_width, src_height) == (dst_width, dst_height) {
        return Ok(img);
    }

    #[cfg(feature = "native")]
    {
        fast_resize(img, dst_width, dst_height).map_err(|reason| {
            PipelineError::resize_failed((src_width, src_height), (dst_width, dst_height), reason)
        })
    }
    #[cfg(not(feature = "native"))]
    {
        Ok(resize_with_image_crate(&img, dst_width, dst_height))
    }
}

/// Resize through image::imageops, keeping alpha when present.
pub fn resize_with_image_crate(img: &DynamicImage, dst_width: u32, dst_height: u32) -> DynamicImage {
    let filter = FilterType::Lanczos3;
    if img.color().has_alpha() {
        DynamicImage::ImageRgba8(image::imageops::resize(
            &img.to_rgba8(),
            dst_width,
            dst_height,
            filter,
        ))
    } else {
        DynamicImage::ImageRgb8(image::imageops::resize(
            &img.to_rgb8(),
            dst_width,
            dst_height,
            filter,
        ))
    }
}

#[cfg(feature = "native")]
fn fast_resize(img: DynamicImage, dst_width: u32, dst_height: u32) -> Result<DynamicImage, String> {
    let (src_width, src_height) = img.dimensions();

    // Take the pixel buffer without copying when the layout already fits
    let (pixel_type, mut src_pixels): (PixelType, Vec<u8>) = match img {
        DynamicImage::ImageRgb8(rgb) => (PixelType::U8x3, rgb.into_raw()),
        DynamicImage::ImageRgba8(rgba) => (PixelType::U8x4, rgba.into_raw()),
        other if other.color().has_alpha() => (PixelType::U8x4, other.to_rgba8().into_raw()),
        other => (PixelType::U8x3, other.to_rgb8().into_raw()),
    };

    let primary = match fir::images::Image::from_slice_u8(
        src_width,
        src_height,
        src_pixels.as_mut_slice(),
        pixel_type,
    ) {
        Ok(src_image) => resize_fir(src_image, pixel_type, dst_width, dst_height),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let mut aligned = fir::images::Image::new(src_width, src_height, pixel_type);
            aligned.buffer_mut().copy_from_slice(&src_pixels);
            resize_fir(aligned, pixel_type, dst_width, dst_height)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    match primary {
        Ok(img) => Ok(img),
        Err(err) => {
            let fallback = match pixel_type {
                PixelType::U8x3 => RgbImage::from_raw(src_width, src_height, src_pixels)
                    .map(DynamicImage::ImageRgb8),
                _ => RgbaImage::from_raw(src_width, src_height, src_pixels)
                    .map(DynamicImage::ImageRgba8),
            }
            .ok_or_else(|| format!("{err}; fallback buffer mismatch"))?;
            Ok(resize_with_image_crate(&fallback, dst_width, dst_height))
        }
    }
}

#[cfg(feature = "native")]
fn resize_fir(
    mut src_image: fir::images::Image<'_>,
    pixel_type: PixelType,
    dst_width: u32,
    dst_height: u32,
) -> Result<DynamicImage, String> {
    let mut dst_image = fir::images::Image::new(dst_width, dst_height, pixel_type);
    let options =
        ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));

    let premultiply = matches!(pixel_type, PixelType::U8x4);
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }

    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }

    let dst_pixels = dst_image.into_vec();
    match pixel_type {
        PixelType::U8x3 => RgbImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| "failed to create rgb image from resized data".to_string()),
        _ => RgbaImage::from_raw(dst_width, dst_height, dst_pixels)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| "failed to create rgba image from resized data".to_string()),
    }
}
