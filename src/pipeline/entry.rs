// src/pipeline/entry.rs
//
// Batch entries and their lifecycle state.

use crate::handle::DisplayHandle;
use crate::loader::ImageSource;
use crate::options::CompressionFormat;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Stable, process-unique entry identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    Queued,
    Processing,
    Done,
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Queued => "queued",
            EntryStatus::Processing => "processing",
            EntryStatus::Done => "done",
            EntryStatus::Error => "error",
        }
    }

    /// Short label for list rows.
    pub fn label(&self) -> &'static str {
        match self {
            EntryStatus::Queued => "Queued",
            EntryStatus::Processing => "Compressing",
            EntryStatus::Done => "Done",
            EntryStatus::Error => "Failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded output of a finished entry.
#[derive(Debug)]
pub struct CompressedImage {
    pub bytes: Arc<[u8]>,
    pub format: CompressionFormat,
    handle: DisplayHandle,
}

impl CompressedImage {
    pub fn new(bytes: impl Into<Arc<[u8]>>, format: CompressionFormat, handle: DisplayHandle) -> Self {
        Self {
            bytes: bytes.into(),
            format,
            handle,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
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

/// Handles detached from entries but not yet released. Dropping the list
/// releases them.
pub type Retired = Vec<DisplayHandle>;

#[derive(Debug)]
enum EntryState {
    Queued,
    Processing,
    Done(CompressedImage),
    Error(String),
}

/// One image in the batch: its current source, an optional pre-edit source,
/// and where it is in the compression lifecycle.
///
/// A result exists only in `Done`, a failure reason only in `Error`.
#[derive(Debug)]
pub struct BatchEntry {
    id: EntryId,
    source: ImageSource,
    prior_source: Option<ImageSource>,
    state: EntryState,
}

impl BatchEntry {
    pub(crate) fn new(source: ImageSource) -> Self {
        Self {
            id: EntryId::next(),
            source,
            prior_source: None,
            state: EntryState::Queued,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn prior_source(&self) -> Option<&ImageSource> {
        self.prior_source.as_ref()
    }

    pub fn has_edit(&self) -> bool {
        self.prior_source.is_some()
    }

    pub fn status(&self) -> EntryStatus {
        match self.state {
            EntryState::Queued => EntryStatus::Queued,
            EntryState::Processing => EntryStatus::Processing,
            EntryState::Done(_) => EntryStatus::Done,
            EntryState::Error(_) => EntryStatus::Error,
        }
    }

    pub fn result(&self) -> Option<&CompressedImage> {
        match &self.state {
            EntryState::Done(result) => Some(result),
            _ => None,
        }
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.state {
            EntryState::Error(reason) => Some(reason),
            _ => None,
        }
    }

    fn set_state(&mut self, state: EntryState, retired: &mut Retired) {
        if let EntryState::Done(previous) = std::mem::replace(&mut self.state, state) {
            retired.push(previous.into_handle());
        }
    }

    /// Back to `Queued`, retiring any result. Returns true if there was one.
    pub(crate) fn requeue(&mut self, retired: &mut Retired) -> bool {
        let had_result = self.result().is_some();
        self.set_state(EntryState::Queued, retired);
        had_result
    }

    pub(crate) fn mark_processing(&mut self, retired: &mut Retired) {
        self.set_state(EntryState::Processing, retired);
    }

    pub(crate) fn complete(&mut self, result: CompressedImage, retired: &mut Retired) {
        self.set_state(EntryState::Done(result), retired);
    }

    pub(crate) fn fail(&mut self, reason: String, retired: &mut Retired) {
        self.set_state(EntryState::Error(reason), retired);
    }

    /// Swap in an edited source. The first edit keeps the original as the
    /// prior source; later edits retire the intermediate one.
    pub(crate) fn replace_source(&mut self, source: ImageSource, retired: &mut Retired) {
        let replaced = std::mem::replace(&mut self.source, source);
        if self.prior_source.is_none() {
            self.prior_source = Some(replaced);
        } else {
            retired.push(replaced.into_handle());
        }
        self.requeue(retired);
    }

    /// Restore the pre-edit source. Returns false when there was no edit.
    pub(crate) fn revert_source(&mut self, retired: &mut Retired) -> bool {
        let Some(prior) = self.prior_source.take() else {
            return false;
        };
        let edited = std::mem::replace(&mut self.source, prior);
        retired.push(edited.into_handle());
        self.requeue(retired);
        true
    }
}
