// src/handle.rs
//
// Display handles: host-side references (locators) to byte buffers that a
// UI can render or download. Every handle is released exactly once, either
// explicitly or when it is dropped.

use crate::error::{PipelineError, PipelineResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

type Revoke = Box<dyn FnOnce() + Send>;

/// A releasable reference to a buffer owned by the host.
pub struct DisplayHandle {
    locator: String,
    revoke: Option<Revoke>,
}

impl DisplayHandle {
    pub fn new(locator: impl Into<String>, revoke: impl FnOnce() + Send + 'static) -> Self {
        Self {
            locator: locator.into(),
            revoke: Some(Box::new(revoke)),
        }
    }

    /// A handle with nothing to release.
    pub fn detached(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            revoke: None,
        }
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Release the underlying resource now.
    pub fn release(mut self) {
        self.revoke_now();
    }

    fn revoke_now(&mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

impl Drop for DisplayHandle {
    fn drop(&mut self) {
        self.revoke_now();
    }
}

impl fmt::Debug for DisplayHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayHandle")
            .field("locator", &self.locator)
            .field("live", &self.revoke.is_some())
            .finish()
    }
}

/// Allocates display handles for encoded or source bytes.
pub trait HandleProvider: Send + Sync + 'static {
    fn create(&self, bytes: &[u8], mime_type: &str) -> PipelineResult<DisplayHandle>;
}

impl<T: HandleProvider + ?Sized> HandleProvider for Arc<T> {
    fn create(&self, bytes: &[u8], mime_type: &str) -> PipelineResult<DisplayHandle> {
        (**self).create(bytes, mime_type)
    }
}

/// Allocation counters for a [`HandleRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HandleStats {
    pub created: u64,
    pub released: u64,
    pub live: usize,
}

struct RegisteredBlob {
    mime_type: String,
    bytes: Arc<[u8]>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    created: AtomicU64,
    released: AtomicU64,
    live: Mutex<HashMap<u64, RegisteredBlob>>,
}

/// In-memory handle provider with `blob:tinypress/<n>` locators.
///
/// Cloning shares the registry.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    inner: Arc<RegistryInner>,
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes and MIME type behind a live locator.
    pub fn resolve(&self, locator: &str) -> Option<(String, Arc<[u8]>)> {
        let id = locator
            .strip_prefix("blob:tinypress/")?
            .parse::<u64>()
            .ok()?;
        self.inner
            .live
            .lock()
            .get(&id)
            .map(|blob| (blob.mime_type.clone(), blob.bytes.clone()))
    }

    pub fn stats(&self) -> HandleStats {
        HandleStats {
            created: self.inner.created.load(Ordering::Acquire),
            released: self.inner.released.load(Ordering::Acquire),
            live: self.inner.live.lock().len(),
        }
    }
}

impl HandleProvider for HandleRegistry {
    fn create(&self, bytes: &[u8], mime_type: &str) -> PipelineResult<DisplayHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.live.lock().insert(
            id,
            RegisteredBlob {
                mime_type: mime_type.to_string(),
                bytes: Arc::from(bytes),
            },
        );
        self.inner.created.fetch_add(1, Ordering::AcqRel);

        let inner = Arc::clone(&self.inner);
        Ok(DisplayHandle::new(format!("blob:tinypress/{id}"), move || {
            if inner.live.lock().remove(&id).is_some() {
                inner.released.fetch_add(1, Ordering::AcqRel);
            }
        }))
    }
}

/// Handle provider backed by temporary files; locators are `file://` URLs.
/// The file is deleted when the handle is released.
#[derive(Debug, Clone, Default)]
pub struct TempFileHandles {
    dir: Option<PathBuf>,
}

impl TempFileHandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

impl HandleProvider for TempFileHandles {
    fn create(&self, bytes: &[u8], mime_type: &str) -> PipelineResult<DisplayHandle> {
        let suffix = format!(".{}", extension_for_mime(mime_type));
        let mut builder = tempfile::Builder::new();
        builder.prefix("tinypress-").suffix(&suffix);
        let created = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file =
            created.map_err(|_| PipelineError::resource_unavailable("Temporary file"))?;
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|_| PipelineError::resource_unavailable("Temporary file"))?;

        let path = file.into_temp_path();
        let locator = format!("file://{}", path.display());
        debug!(%locator, size = bytes.len(), "temp handle created");
        Ok(DisplayHandle::new(locator, move || {
            if let Err(e) = path.close() {
                warn!(error = %e, "failed to remove temp handle");
            }
        }))
    }
}
