// src/loader.rs
//
// Metadata loading: admission checks, header probe, EXIF-aware dimensions and
// display handle allocation for a user-supplied file.

pub mod firewall;
pub mod source;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::handle::{DisplayHandle, HandleProvider, HandleRegistry};
use firewall::{check_dimensions, AdmissionFirewall};
use image::ImageReader;
use source::{FileLike, SharedBytes};
use std::fmt;
use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, Instrument};

// ===== SECURITY LIMITS =====

/// Maximum allowed image dimension (width or height).
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 10000 x 10000.
pub const MAX_PIXELS: u64 = 100_000_000;

/// Decoded metadata of an admitted file. Cloning shares the bytes.
#[derive(Clone)]
pub struct ImageInfo {
    pub name: String,
    pub mime_type: String,
    /// Display width (EXIF orientation applied)
    pub width: u32,
    /// Display height (EXIF orientation applied)
    pub height: u32,
    /// Byte length of the source file
    pub size: u64,
    bytes: SharedBytes,
}

impl ImageInfo {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        width: u32,
        height: u32,
        bytes: impl Into<SharedBytes>,
    ) -> Self {
        let bytes = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            width,
            height,
            size: bytes.len() as u64,
            bytes,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn shared_bytes(&self) -> SharedBytes {
        self.bytes.clone()
    }
}

impl fmt::Debug for ImageInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInfo")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.size)
            .finish()
    }
}

/// An image ready for the queue: metadata plus the handle that displays it.
#[derive(Debug)]
pub struct ImageSource {
    info: ImageInfo,
    handle: DisplayHandle,
}

impl ImageSource {
    pub fn new(info: ImageInfo, handle: DisplayHandle) -> Self {
        Self { info, handle }
    }

    /// Allocate a handle for `info` from `handles`.
    pub fn allocate(info: ImageInfo, handles: &dyn HandleProvider) -> PipelineResult<Self> {
        let handle = handles.create(info.bytes(), &info.mime_type)?;
        Ok(Self { info, handle })
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn handle(&self) -> &DisplayHandle {
        &self.handle
    }

    pub fn locator(&self) -> &str {
        self.handle.locator()
    }

    pub fn release(self) {
        self.handle.release();
    }

    pub(crate) fn into_handle(self) -> DisplayHandle {
        self.handle
    }
}

/// Turns files into queue-ready sources.
pub trait MetadataLoader: Send + Sync + 'static {
    /// Admission checks that need no I/O.
    fn validate(&self, file: &FileLike) -> PipelineResult<()>;

    /// Read, probe and allocate a display handle. A cancelled token makes the
    /// load fail with [`PipelineError::Cancelled`] and allocates nothing.
    fn load(
        &self,
        file: FileLike,
        cancel: CancellationToken,
    ) -> impl Future<Output = PipelineResult<ImageSource>> + Send;
}

/// Default loader: firewall checks, `image` header probe, EXIF orientation.
#[derive(Clone)]
pub struct ImageLoader {
    firewall: AdmissionFirewall,
    handles: Arc<dyn HandleProvider>,
}

impl ImageLoader {
    pub fn new(config: &PipelineConfig, handles: Arc<dyn HandleProvider>) -> Self {
        Self {
            firewall: AdmissionFirewall::from_config(config),
            handles,
        }
    }

    /// Loader with default limits and an in-memory handle registry.
    pub fn in_memory(registry: HandleRegistry) -> Self {
        Self::new(&PipelineConfig::default(), Arc::new(registry))
    }

    pub fn firewall(&self) -> &AdmissionFirewall {
        &self.firewall
    }

    pub fn handles(&self) -> &Arc<dyn HandleProvider> {
        &self.handles
    }

    /// Synchronous body of [`MetadataLoader::load`], without handle allocation.
    pub fn probe(&self, file: &FileLike) -> PipelineResult<ImageInfo> {
        self.firewall.check(file)?;
        let bytes = file.source.load()?;
        // the declared size may be stale or wrong
        self.firewall.enforce_size(bytes.len() as u64)?;
        let (width, height) = display_dimensions(&bytes)
            .map_err(|e| PipelineError::file_read_failed(file.name.clone(), e))?;
        check_dimensions(width, height)?;
        Ok(ImageInfo {
            name: file.name.clone(),
            mime_type: file.mime_type.clone(),
            width,
            height,
            size: bytes.len() as u64,
            bytes,
        })
    }
}

impl MetadataLoader for ImageLoader {
    fn validate(&self, file: &FileLike) -> PipelineResult<()> {
        self.firewall.check(file)
    }

    fn load(
        &self,
        file: FileLike,
        cancel: CancellationToken,
    ) -> impl Future<Output = PipelineResult<ImageSource>> + Send {
        let loader = self.clone();
        let span = debug_span!("load", name = %file.name);
        async move {
            let blocking = loader.clone();
            let source = tokio::task::spawn_blocking(move || {
                let info = blocking.probe(&file)?;
                if cancel.is_cancelled() {
                    return Err(PipelineError::cancelled());
                }
                ImageSource::allocate(info, blocking.handles.as_ref())
            })
            .await
            .map_err(|e| PipelineError::internal_panic(format!("loader task failed: {e}")))??;
            debug!(
                width = source.info.width,
                height = source.info.height,
                size = source.info.size,
                locator = source.locator(),
                "image loaded"
            );
            Ok(source)
        }
        .instrument(span)
    }
}

/// Header dimensions with EXIF orientations 5-8 (transposed) swapped.
pub fn display_dimensions(bytes: &[u8]) -> std::io::Result<(u32, u32)> {
    let (width, height) = probe_dimensions(bytes)?;
    match detect_exif_orientation(bytes) {
        Some(5..=8) => Ok((height, width)),
        _ => Ok((width, height)),
    }
}

/// Raw header dimensions, without decoding pixel data.
pub fn probe_dimensions(bytes: &[u8]) -> std::io::Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "unrecognized image format",
        ));
    }
    reader
        .into_dimensions()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
}

/// Extract EXIF Orientation tag (1-8). Returns None if missing or invalid.
pub fn detect_exif_orientation(bytes: &[u8]) -> Option<u16> {
    let mut cursor = Cursor::new(bytes);
    let exif = exif::Reader::new().read_from_container(&mut cursor).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    let orientation = field.value.get_uint(0)? as u16;
    (1..=8).contains(&orientation).then_some(orientation)
}
