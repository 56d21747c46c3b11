// src/codec/decoder.rs
//
// Decoder operations: JPEG (mozjpeg), PNG (zune-png), WebP (libwebp), others
// through the image crate. Decoded images are rotated/flipped upright.

use super::run_with_panic_policy;
use crate::error::{PipelineError, PipelineResult};
use crate::loader::detect_exif_orientation;
use crate::loader::firewall::check_dimensions;
use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageFormat, RgbImage, RgbaImage};
use mozjpeg::Decompress;
use webp::{BitstreamFeatures, Decoder as WebPDecoder};
use zune_core::bytestream::ZCursor;
use zune_core::colorspace::ColorSpace;
use zune_core::options::DecoderOptions;
use zune_png::PngDecoder;

/// Decode JPEG using mozjpeg (backed by libjpeg-turbo)
pub fn decode_jpeg_mozjpeg(data: &[u8]) -> PipelineResult<DynamicImage> {
    run_with_panic_policy("decode:mozjpeg", || {
        if !data.windows(2).any(|pair| pair == [0xFF, 0xD9]) {
            return Err(PipelineError::decode_failed(
                "mozjpeg: missing JPEG EOI marker",
            ));
        }

        let decompress = Decompress::new_mem(data).map_err(|e| {
            PipelineError::decode_failed(format!("mozjpeg decompress init failed: {e:?}"))
        })?;
        let mut decompress = decompress.rgb().map_err(|e| {
            PipelineError::decode_failed(format!("mozjpeg rgb conversion failed: {e:?}"))
        })?;

        let width = u32::try_from(decompress.width())
            .map_err(|_| PipelineError::decode_failed("mozjpeg: width out of range"))?;
        let height = u32::try_from(decompress.height())
            .map_err(|_| PipelineError::decode_failed("mozjpeg: height out of range"))?;
        check_dimensions(width, height)?;

        let pixels: Vec<[u8; 3]> = decompress.read_scanlines().map_err(|e| {
            PipelineError::decode_failed(format!("mozjpeg: failed to read scanlines: {e:?}"))
        })?;
        let flat: Vec<u8> = pixels.into_iter().flatten().collect();

        let rgb = RgbImage::from_raw(width, height, flat).ok_or_else(|| {
            PipelineError::decode_failed("mozjpeg: failed to create image from raw data")
        })?;
        Ok(DynamicImage::ImageRgb8(rgb))
    })
}

/// Decode PNG using zune-png. 16-bit input is stripped to 8-bit.
pub fn decode_png_zune(data: &[u8]) -> PipelineResult<DynamicImage> {
    run_with_panic_policy("decode:png", || {
        let options = DecoderOptions::default().png_set_strip_to_8bit(true);
        let mut decoder = PngDecoder::new_with_options(ZCursor::new(data), options);
        let pixels = decoder
            .decode()
            .map_err(|e| PipelineError::decode_failed(format!("png: decode failed: {e}")))?;

        let info = decoder
            .info()
            .ok_or_else(|| PipelineError::decode_failed("png: missing header info"))?;
        let width = info.width as u32;
        let height = info.height as u32;
        check_dimensions(width, height)?;

        let buf = match pixels {
            zune_core::result::DecodingResult::U8(v) => v,
            _ => {
                return Err(PipelineError::decode_failed(
                    "png: unexpected non-U8 pixel buffer",
                ))
            }
        };

        let colorspace = decoder
            .colorspace()
            .ok_or_else(|| PipelineError::decode_failed("png: missing colorspace"))?;

        let built = match colorspace {
            ColorSpace::RGB => RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8),
            ColorSpace::RGBA => {
                RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            ColorSpace::Luma => GrayImage::from_raw(width, height, buf).map(DynamicImage::ImageLuma8),
            ColorSpace::LumaA => {
                GrayAlphaImage::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            other => {
                return Err(PipelineError::decode_failed(format!(
                    "png: unsupported colorspace {other:?}"
                )))
            }
        };
        built.ok_or_else(|| PipelineError::decode_failed("png: pixel buffer size mismatch"))
    })
}

/// Decode WebP using libwebp. Animated WebP falls back to the image crate,
/// which yields the first frame.
pub fn decode_webp_libwebp(data: &[u8]) -> PipelineResult<DynamicImage> {
    run_with_panic_policy("decode:webp", || {
        let features = BitstreamFeatures::new(data).ok_or_else(|| {
            PipelineError::decode_failed("webp: failed to read bitstream features")
        })?;

        if features.has_animation() {
            return image::load_from_memory(data).map_err(|e| {
                PipelineError::decode_failed(format!("webp (animated) decode failed: {e}"))
            });
        }

        check_dimensions(features.width(), features.height())?;

        let decoded = WebPDecoder::new(data)
            .decode()
            .ok_or_else(|| PipelineError::decode_failed("webp: decode failed"))?;
        Ok(decoded.to_image())
    })
}

/// Decode other formats (GIF first frame, etc.) with the image crate.
pub fn decode_with_image_crate(data: &[u8]) -> PipelineResult<DynamicImage> {
    run_with_panic_policy("decode:image", || {
        image::load_from_memory(data)
            .map_err(|e| PipelineError::decode_failed(format!("decode failed: {e}")))
    })
}

/// Detect input format using magic bytes. Returns None if unknown.
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Decode, routing by magic bytes rather than the declared MIME type.
pub fn decode_image(bytes: &[u8]) -> PipelineResult<DynamicImage> {
    match detect_format(bytes) {
        Some(ImageFormat::Jpeg) => decode_jpeg_mozjpeg(bytes),
        Some(ImageFormat::Png) => decode_png_zune(bytes),
        Some(ImageFormat::WebP) => decode_webp_libwebp(bytes),
        Some(_) => decode_with_image_crate(bytes),
        None => Err(PipelineError::decode_failed("unrecognized image format")),
    }
}

/// Decode and apply the EXIF orientation so pixels match the display size
/// reported by the loader.
pub fn decode_oriented(bytes: &[u8]) -> PipelineResult<DynamicImage> {
    let img = decode_image(bytes)?;
    Ok(apply_orientation(img, detect_exif_orientation(bytes)))
}

pub fn apply_orientation(img: DynamicImage, orientation: Option<u16>) -> DynamicImage {
    match orientation {
        Some(2) => img.fliph(),
        Some(3) => img.rotate180(),
        Some(4) => img.flipv(),
        Some(5) => img.rotate90().fliph(),
        Some(6) => img.rotate90(),
        Some(7) => img.rotate270().fliph(),
        Some(8) => img.rotate270(),
        _ => img,
    }
}
