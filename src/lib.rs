// lib.rs
//
// tinypress: batch image compression pipeline
//
// Design goals:
// - One encode at a time, strict queue order
// - Every option change invalidates the whole batch
// - Stale codec output never lands on an entry
// - Every display handle released exactly once
// - Observers only ever see immutable snapshots

pub mod codec;
pub mod config;
pub mod error;
pub mod export;
pub mod handle;
pub mod loader;
pub mod options;
pub mod pipeline;

pub use codec::{CropArea, EncodedImage, ImageCodec};
pub use config::{PipelineConfig, YieldStrategy};
pub use error::{ErrorCategory, PipelineError, PipelineResult};
pub use export::{ArchiveManifest, BatchSummary, DownloadItem};
pub use handle::{DisplayHandle, HandleProvider, HandleRegistry, TempFileHandles};
pub use loader::source::FileLike;
pub use loader::{ImageInfo, ImageLoader, ImageSource, MetadataLoader};
pub use options::{CompressionFormat, CompressionOptions};
pub use pipeline::entry::{EntryId, EntryStatus};
pub use pipeline::store::{EntryView, QueueSnapshot, ResultView};
pub use pipeline::{BatchPipeline, EnqueueReport};

#[cfg(feature = "native")]
pub use codec::NativeCodec;
#[cfg(feature = "native")]
pub use pipeline::NativePipeline;
