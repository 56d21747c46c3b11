// src/pipeline/store.rs
//
// Queue store: the ordered entry list, selection and enqueue error banner,
// plus the immutable snapshots handed to observers.

use super::entry::{BatchEntry, CompressedImage, EntryId, EntryStatus, Retired};
use super::selection::Selection;
use crate::error::{PipelineError, PipelineResult};
use crate::loader::{ImageInfo, ImageSource};
use crate::options::CompressionFormat;
use std::sync::Arc;

/// Read-only view of an entry's result.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultView {
    pub locator: String,
    pub size: u64,
    pub format: CompressionFormat,
    pub bytes: Arc<[u8]>,
}

/// Read-only view of an entry at snapshot time.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryView {
    pub id: EntryId,
    pub name: String,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub size: u64,
    pub locator: String,
    pub status: EntryStatus,
    pub result: Option<ResultView>,
    pub failure_reason: Option<String>,
    pub has_edit: bool,
}

impl EntryView {
    fn of(entry: &BatchEntry) -> Self {
        let info = entry.source().info();
        Self {
            id: entry.id(),
            name: info.name.clone(),
            mime_type: info.mime_type.clone(),
            width: info.width,
            height: info.height,
            size: info.size,
            locator: entry.source().locator().to_string(),
            status: entry.status(),
            result: entry.result().map(|r| ResultView {
                locator: r.locator().to_string(),
                size: r.size(),
                format: r.format,
                bytes: r.bytes.clone(),
            }),
            failure_reason: entry.failure_reason().map(str::to_string),
            has_edit: entry.has_edit(),
        }
    }

    /// Source size minus result size. Negative when the output grew.
    pub fn saved_bytes(&self) -> Option<i64> {
        self.result
            .as_ref()
            .map(|r| self.size as i64 - r.size as i64)
    }

    /// Percentage saved relative to the source size.
    pub fn saved_percent(&self) -> Option<f64> {
        let result = self.result.as_ref()?;
        if self.size == 0 {
            return None;
        }
        Some((1.0 - result.size as f64 / self.size as f64) * 100.0)
    }
}

/// Immutable picture of the queue published after every mutation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueueSnapshot {
    pub version: u64,
    pub entries: Vec<EntryView>,
    pub active: Option<EntryId>,
    pub last_enqueue_error: Option<String>,
}

impl QueueSnapshot {
    pub fn get(&self, id: EntryId) -> Option<&EntryView> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn active_entry(&self) -> Option<&EntryView> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn count(&self, status: EntryStatus) -> usize {
        self.entries.iter().filter(|e| e.status == status).count()
    }

    pub fn is_processing(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.status == EntryStatus::Processing)
    }

    /// Nothing left for the scheduler to pick up or finish.
    pub fn is_settled(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.status, EntryStatus::Done | EntryStatus::Error))
    }
}

/// Ordered collection of batch entries.
///
/// Mutations never release handles themselves: displaced results and
/// sources are parked until [`QueueStore::take_retired`] hands them out, so
/// an owner behind a lock can release them after unlocking. Whatever is
/// still parked is released when the store is dropped.
#[derive(Debug, Default)]
pub struct QueueStore {
    entries: Vec<BatchEntry>,
    selection: Selection,
    last_enqueue_error: Option<String>,
    retired: Retired,
}

fn find_mut(entries: &mut [BatchEntry], id: EntryId) -> PipelineResult<&mut BatchEntry> {
    entries
        .iter_mut()
        .find(|e| e.id() == id)
        .ok_or_else(|| PipelineError::entry_not_found(id.get()))
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn get(&self, id: EntryId) -> Option<&BatchEntry> {
        self.entries.iter().find(|e| e.id() == id)
    }

    /// Handles displaced since the last call. Dropping them releases them.
    pub fn take_retired(&mut self) -> Retired {
        std::mem::take(&mut self.retired)
    }

    fn after_change(&mut self) {
        self.selection.reconcile(&self.entries);
        if self.entries.is_empty() {
            self.last_enqueue_error = None;
        }
    }

    /// Append new queued entries in the given order.
    pub fn append(&mut self, sources: Vec<ImageSource>) -> Vec<EntryId> {
        let ids = sources
            .into_iter()
            .map(|source| {
                let entry = BatchEntry::new(source);
                let id = entry.id();
                self.entries.push(entry);
                id
            })
            .collect();
        self.after_change();
        ids
    }

    /// Record the outcome of an enqueue call: its first error, or none.
    pub fn set_enqueue_error(&mut self, error: Option<String>) {
        self.last_enqueue_error = error;
    }

    pub fn last_enqueue_error(&self) -> Option<&str> {
        self.last_enqueue_error.as_deref()
    }

    /// Remove every entry. The caller drops the returned entries, which
    /// releases their handles. Retired handles stay parked.
    pub fn clear(&mut self) -> Vec<BatchEntry> {
        let removed = std::mem::take(&mut self.entries);
        self.selection.clear();
        self.last_enqueue_error = None;
        removed
    }

    /// First queued entry in store order.
    pub fn next_queued(&self) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|e| e.status() == EntryStatus::Queued)
            .map(BatchEntry::id)
    }

    /// Move a queued entry to processing and hand back its source info.
    pub fn start(&mut self, id: EntryId) -> Option<ImageInfo> {
        let entry = find_mut(&mut self.entries, id).ok()?;
        if entry.status() != EntryStatus::Queued {
            return None;
        }
        entry.mark_processing(&mut self.retired);
        Some(entry.source().info().clone())
    }

    pub fn is_processing(&self, id: EntryId) -> bool {
        self.get(id)
            .is_some_and(|e| e.status() == EntryStatus::Processing)
    }

    /// Store a result on a processing entry. A result for an entry that is
    /// gone or no longer processing is retired and false is returned.
    pub fn complete(&mut self, id: EntryId, result: CompressedImage) -> bool {
        match find_mut(&mut self.entries, id) {
            Ok(entry) if entry.status() == EntryStatus::Processing => {
                entry.complete(result, &mut self.retired);
                true
            }
            _ => {
                self.retired.push(result.into_handle());
                false
            }
        }
    }

    /// Mark a processing entry failed. False if it is gone or not processing.
    pub fn fail(&mut self, id: EntryId, reason: String) -> bool {
        match find_mut(&mut self.entries, id) {
            Ok(entry) if entry.status() == EntryStatus::Processing => {
                entry.fail(reason, &mut self.retired);
                true
            }
            _ => false,
        }
    }

    /// Reset every entry to queued, retiring all results. Returns the
    /// number of results retired.
    pub fn requeue_all(&mut self) -> usize {
        let retired = &mut self.retired;
        self.entries
            .iter_mut()
            .map(|e| e.requeue(retired))
            .filter(|had_result| *had_result)
            .count()
    }

    /// Replace an entry's source with an edited one and queue it again.
    ///
    /// Fails for unknown or processing entries; the rejected source is then
    /// retired.
    pub fn reset_source(&mut self, id: EntryId, source: ImageSource) -> PipelineResult<()> {
        let entry = match find_mut(&mut self.entries, id) {
            Ok(entry) if entry.status() != EntryStatus::Processing => entry,
            Ok(_) => {
                self.retired.push(source.into_handle());
                return Err(PipelineError::entry_busy(id.get()));
            }
            Err(e) => {
                self.retired.push(source.into_handle());
                return Err(e);
            }
        };
        entry.replace_source(source, &mut self.retired);
        Ok(())
    }

    /// Restore the pre-edit source. `Ok(false)` when there is no edit.
    pub fn revert_edit(&mut self, id: EntryId) -> PipelineResult<bool> {
        let entry = find_mut(&mut self.entries, id)?;
        if !entry.has_edit() {
            return Ok(false);
        }
        if entry.status() == EntryStatus::Processing {
            return Err(PipelineError::entry_busy(id.get()));
        }
        Ok(entry.revert_source(&mut self.retired))
    }

    /// Queue a failed entry again. `Ok(false)` for entries not in error.
    pub fn retry(&mut self, id: EntryId) -> PipelineResult<bool> {
        let entry = find_mut(&mut self.entries, id)?;
        if entry.status() != EntryStatus::Error {
            return Ok(false);
        }
        entry.requeue(&mut self.retired);
        Ok(true)
    }

    pub fn set_active(&mut self, id: EntryId) -> bool {
        self.selection.select(id, &self.entries)
    }

    pub fn active_id(&self) -> Option<EntryId> {
        self.selection.active()
    }

    pub fn snapshot(&self, version: u64) -> QueueSnapshot {
        QueueSnapshot {
            version,
            entries: self.entries.iter().map(EntryView::of).collect(),
            active: self.selection.active(),
            last_enqueue_error: self.last_enqueue_error.clone(),
        }
    }
}
