// src/codec.rs
//
// Codec adapter: the ImageCodec contract the scheduler drives, bounded and
// cancellable execution, and the native mozjpeg / libwebp / oxipng codec.

#[cfg(feature = "native")]
pub mod decoder;
#[cfg(feature = "native")]
pub mod encoder;
pub mod resize;

use crate::error::{PipelineError, PipelineResult};
use crate::loader::ImageInfo;
use crate::options::{CompressionFormat, CompressionOptions};
use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "native")]
use crate::handle::HandleProvider;
#[cfg(feature = "native")]
use crate::loader::ImageSource;
#[cfg(feature = "native")]
use image::GenericImageView;
#[cfg(feature = "native")]
use tracing::debug;

/// Output of one encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub format: CompressionFormat,
}

impl EncodedImage {
    pub fn new(bytes: Vec<u8>, format: CompressionFormat) -> Self {
        Self { bytes, format }
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Re-encodes a source image under the given options.
///
/// Implementations must resolve promptly with [`PipelineError::Cancelled`]
/// once `cancel` fires; any other error marks the entry failed.
pub trait ImageCodec: Send + Sync + 'static {
    fn encode(
        &self,
        source: &ImageInfo,
        options: &CompressionOptions,
        cancel: CancellationToken,
    ) -> impl Future<Output = PipelineResult<EncodedImage>> + Send;
}

/// Race `work` against cancellation and a wall-clock limit.
///
/// Cancellation wins ties. On timeout the work future is dropped and the
/// result is [`PipelineError::Timeout`].
pub async fn run_bounded<F, T>(
    work: F,
    cancel: &CancellationToken,
    limit: Duration,
) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::cancelled()),
        outcome = tokio::time::timeout(limit, work) => match outcome {
            Ok(result) => result,
            Err(_) => Err(PipelineError::timeout(limit.as_millis() as u64)),
        },
    }
}

/// Run codec work, converting a panic into [`PipelineError::InternalPanic`].
pub fn run_with_panic_policy<T, F>(stage: &'static str, work: F) -> PipelineResult<T>
where
    F: FnOnce() -> PipelineResult<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(result) => result,
        Err(payload) => Err(PipelineError::internal_panic(format!(
            "{stage}: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(feature = "native")]
#[inline]
fn checkpoint(cancel: &CancellationToken) -> PipelineResult<()> {
    if cancel.is_cancelled() {
        Err(PipelineError::cancelled())
    } else {
        Ok(())
    }
}

/// Default codec: decode, shrink-only fit, re-encode. CPU work runs on the
/// blocking pool and checks for cancellation between stages.
#[cfg(feature = "native")]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeCodec;

#[cfg(feature = "native")]
impl NativeCodec {
    pub fn new() -> Self {
        Self
    }

    /// Blocking encode of raw source bytes.
    pub fn encode_blocking(
        bytes: &[u8],
        options: &CompressionOptions,
        cancel: &CancellationToken,
    ) -> PipelineResult<EncodedImage> {
        let img = decoder::decode_oriented(bytes)?;
        checkpoint(cancel)?;

        let (width, height) = img.dimensions();
        let (target_w, target_h) =
            resize::fit_within(width, height, options.max_width, options.max_height);
        let img = if (target_w, target_h) != (width, height) {
            resize::resize(img, target_w, target_h)?
        } else {
            img
        };
        checkpoint(cancel)?;

        let encoded = encoder::encode(&img, options)?;
        Ok(EncodedImage::new(encoded, options.format))
    }
}

#[cfg(feature = "native")]
impl ImageCodec for NativeCodec {
    fn encode(
        &self,
        source: &ImageInfo,
        options: &CompressionOptions,
        cancel: CancellationToken,
    ) -> impl Future<Output = PipelineResult<EncodedImage>> + Send {
        let bytes = source.shared_bytes();
        let options = options.clone();
        let name = source.name.clone();
        async move {
            checkpoint(&cancel)?;
            let token = cancel.clone();
            let joined = tokio::task::spawn_blocking(move || {
                NativeCodec::encode_blocking(&bytes, &options, &token)
            })
            .await;
            let encoded = match joined {
                Ok(result) => result?,
                Err(e) if e.is_panic() => {
                    return Err(PipelineError::internal_panic(format!(
                        "encode task panicked: {e}"
                    )))
                }
                Err(_) => return Err(PipelineError::cancelled()),
            };
            debug!(%name, format = %encoded.format, bytes = encoded.byte_size(), "native encode finished");
            Ok(encoded)
        }
    }
}

/// Crop rectangle in display pixels. Fractional values are rounded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropArea {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rounded rectangle clamped to the image; at least 1x1.
    pub fn to_pixels(&self, img_width: u32, img_height: u32) -> (u32, u32, u32, u32) {
        let clamp = |v: f64, max: u32| -> u32 {
            if v.is_finite() {
                v.round().clamp(0.0, f64::from(max)) as u32
            } else {
                0
            }
        };
        let x = clamp(self.x, img_width.saturating_sub(1));
        let y = clamp(self.y, img_height.saturating_sub(1));
        let width = clamp(self.width, img_width - x).max(1);
        let height = clamp(self.height, img_height - y).max(1);
        (x, y, width, height)
    }
}

/// Produce a cropped copy of `source` as a new queue source, encoded in the
/// source's own MIME type (PNG for types without an encoder).
#[cfg(feature = "native")]
pub fn crop_source(
    source: &ImageInfo,
    area: CropArea,
    handles: &dyn HandleProvider,
) -> PipelineResult<ImageSource> {
    let img = decoder::decode_oriented(source.bytes())?;
    let (img_w, img_h) = img.dimensions();
    if img_w == 0 || img_h == 0 {
        return Err(PipelineError::decode_failed("empty image"));
    }
    let (x, y, width, height) = area.to_pixels(img_w, img_h);
    let cropped = img.crop_imm(x, y, width, height);

    let (bytes, mime_type) = encoder::encode_same_type(&cropped, &source.mime_type)?;
    let info = ImageInfo::new(source.name.clone(), mime_type, width, height, bytes);
    debug!(name = %info.name, width, height, size = info.size, "crop applied");
    ImageSource::allocate(info, handles)
}
