// src/loader/source.rs
//
// File-like inputs and the byte sources behind them.

use crate::error::{PipelineError, PipelineResult};
use memmap2::Mmap;
use std::fmt;
use std::fs::File;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a file's bytes come from.
#[derive(Clone)]
pub enum Source {
    /// In-memory data (drag and drop, clipboard, tests)
    Memory(Arc<[u8]>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
    /// File path; mapped only when the loader runs
    Path(PathBuf),
}

impl Source {
    /// Resolve to readable bytes. Path sources are memory-mapped.
    pub fn load(&self) -> PipelineResult<SharedBytes> {
        match self {
            Source::Memory(data) => Ok(SharedBytes::Memory(data.clone())),
            Source::Mapped(mmap) => Ok(SharedBytes::Mapped(mmap.clone())),
            Source::Path(path) => map_file(path),
        }
    }

    /// Get the bytes directly. None for Path sources, which need loading first.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Source::Memory(data) => Some(&data[..]),
            Source::Mapped(mmap) => Some(mmap.as_ref()),
            Source::Path(_) => None,
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Memory(data) => write!(f, "Memory({} bytes)", data.len()),
            Source::Mapped(mmap) => write!(f, "Mapped({} bytes)", mmap.len()),
            Source::Path(path) => write!(f, "Path({})", path.display()),
        }
    }
}

fn map_file(path: &Path) -> PipelineResult<SharedBytes> {
    let name = path.to_string_lossy().to_string();
    let file = File::open(path).map_err(|e| PipelineError::file_read_failed(name.clone(), e))?;
    let len = file
        .metadata()
        .map_err(|e| PipelineError::file_read_failed(name.clone(), e))?
        .len();
    // Zero-length files cannot be mapped on every platform
    if len == 0 {
        return Ok(SharedBytes::Memory(Arc::from(Vec::new())));
    }
    // SAFETY: the mapping is read-only and kept alive by the Arc for as long
    // as any ImageInfo refers to it.
    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| PipelineError::file_read_failed(name, e))?;
    Ok(SharedBytes::Mapped(Arc::new(mmap)))
}

/// Cheaply clonable, immutable bytes of a loaded file.
#[derive(Clone)]
pub enum SharedBytes {
    Memory(Arc<[u8]>),
    Mapped(Arc<Mmap>),
}

impl Deref for SharedBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            SharedBytes::Memory(data) => &data[..],
            SharedBytes::Mapped(mmap) => mmap.as_ref(),
        }
    }
}

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

impl From<Vec<u8>> for SharedBytes {
    fn from(data: Vec<u8>) -> Self {
        SharedBytes::Memory(Arc::from(data))
    }
}

impl fmt::Debug for SharedBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedBytes({} bytes)", self.len())
    }
}

/// A user-supplied file: name, declared MIME type, declared size and bytes.
#[derive(Clone, Debug)]
pub struct FileLike {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub source: Source,
}

impl FileLike {
    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Arc<[u8]>>,
    ) -> Self {
        let data: Arc<[u8]> = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            size: data.len() as u64,
            source: Source::Memory(data),
        }
    }

    /// Describe a file on disk. The MIME type is derived from the extension
    /// the way a browser would; unknown extensions get an opaque type.
    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let metadata =
            std::fs::metadata(path).map_err(|e| PipelineError::file_read_failed(display, e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = image::ImageFormat::from_path(path)
            .map(|f| f.to_mime_type().to_string())
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok(Self {
            name,
            mime_type,
            size: metadata.len(),
            source: Source::Path(path.to_path_buf()),
        })
    }
}
