// src/pipeline.rs
//
// BatchPipeline: the queue store, selection, scheduler and options reactor
// behind one facade.
//
// All queue state lives in one mutex that is never held across an await.
// Handles are created and released outside it. Every mutation publishes a
// fresh QueueSnapshot on a watch channel.

pub mod entry;
pub mod scheduler;
pub mod selection;
pub mod store;
pub mod yielder;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::export::{self, ArchiveManifest, BatchSummary, DownloadItem};
use crate::handle::HandleProvider;
use crate::loader::source::FileLike;
use crate::loader::{ImageSource, MetadataLoader};
use crate::codec::ImageCodec;
use crate::options::CompressionOptions;
use entry::EntryId;
use parking_lot::Mutex;
use scheduler::InFlight;
use std::sync::Arc;
use store::{QueueSnapshot, QueueStore};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use yielder::HostYield;

#[cfg(feature = "native")]
use crate::codec::{crop_source, CropArea, NativeCodec};
#[cfg(feature = "native")]
use crate::loader::ImageLoader;

pub(crate) struct PipelineState {
    pub(crate) store: QueueStore,
    pub(crate) options: CompressionOptions,
    pub(crate) in_flight: Option<InFlight>,
    pub(crate) next_job: u64,
    pub(crate) version: u64,
    pub(crate) closed: bool,
}

pub(crate) struct Shared<C> {
    pub(crate) state: Mutex<PipelineState>,
    pub(crate) codec: C,
    pub(crate) handles: Arc<dyn HandleProvider>,
    pub(crate) yielder: Arc<dyn HostYield>,
    pub(crate) config: PipelineConfig,
    pub(crate) wake: Notify,
    pub(crate) shutdown: CancellationToken,
    pub(crate) snapshots: watch::Sender<QueueSnapshot>,
}

impl<C> Shared<C> {
    pub(crate) fn publish(&self, state: &mut PipelineState) {
        state.version += 1;
        self.snapshots
            .send_replace(state.store.snapshot(state.version));
    }

    pub(crate) fn kick(&self) {
        self.wake.notify_one();
    }
}

/// Result of one [`BatchPipeline::enqueue`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnqueueReport {
    /// Ids of the new entries, in input order.
    pub added: Vec<EntryId>,
    /// One message per rejected file, in input order.
    pub errors: Vec<String>,
}

/// Batch compression pipeline.
///
/// Must be created inside a tokio runtime (with the time driver enabled);
/// it spawns one driver task that compresses queued entries one at a time.
pub struct BatchPipeline<L: MetadataLoader, C: ImageCodec> {
    loader: L,
    shared: Arc<Shared<C>>,
    driver: Option<JoinHandle<()>>,
}

#[cfg(feature = "native")]
pub type NativePipeline = BatchPipeline<ImageLoader, NativeCodec>;

#[cfg(feature = "native")]
impl BatchPipeline<ImageLoader, NativeCodec> {
    /// Pipeline with the default loader and the native codecs.
    pub fn native(config: PipelineConfig, handles: Arc<dyn HandleProvider>) -> PipelineResult<Self> {
        let loader = ImageLoader::new(&config, handles.clone());
        Self::new(loader, NativeCodec::new(), handles, config)
    }

    /// Crop an entry's current source and queue the result in its place.
    pub async fn crop_entry(&self, id: EntryId, area: CropArea) -> PipelineResult<()> {
        let info = {
            let state = self.shared.state.lock();
            state
                .store
                .get(id)
                .map(|e| e.source().info().clone())
                .ok_or_else(|| PipelineError::entry_not_found(id.get()))?
        };
        let handles = self.shared.handles.clone();
        let cropped = tokio::task::spawn_blocking(move || crop_source(&info, area, handles.as_ref()))
            .await
            .map_err(|e| PipelineError::internal_panic(format!("crop task failed: {e}")))??;
        self.reset_entry_source(id, cropped)
    }
}

impl<L: MetadataLoader, C: ImageCodec> BatchPipeline<L, C> {
    pub fn new(
        loader: L,
        codec: C,
        handles: Arc<dyn HandleProvider>,
        config: PipelineConfig,
    ) -> PipelineResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| PipelineError::resource_unavailable("Async runtime"))?;

        let (snapshots, _) = watch::channel(QueueSnapshot::default());
        let shared = Arc::new(Shared {
            state: Mutex::new(PipelineState {
                store: QueueStore::new(),
                options: CompressionOptions::default(),
                in_flight: None,
                next_job: 0,
                version: 0,
                closed: false,
            }),
            codec,
            handles,
            yielder: yielder::select_yield(&config),
            config,
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
            snapshots,
        });
        let driver = Some(runtime.spawn(Arc::clone(&shared).drive()));
        Ok(Self {
            loader,
            shared,
            driver,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn handles(&self) -> &Arc<dyn HandleProvider> {
        &self.shared.handles
    }

    /// Validate and load `files`, appending the accepted ones as queued
    /// entries in input order. Rejected files are reported, never queued.
    pub async fn enqueue(&self, files: Vec<FileLike>) -> EnqueueReport {
        let mut accepted: Vec<ImageSource> = Vec::with_capacity(files.len());
        let mut errors = Vec::new();

        for file in files {
            if let Err(e) = self.loader.validate(&file) {
                debug!(name = %file.name, error = %e, "file rejected");
                errors.push(e.user_message());
                continue;
            }
            let name = file.name.clone();
            match self.loader.load(file, self.shared.shutdown.child_token()).await {
                Ok(source) => accepted.push(source),
                Err(e) if e.is_cancelled() => break,
                Err(e) => {
                    warn!(%name, error = %e, "file could not be loaded");
                    errors.push(e.user_message());
                }
            }
        }

        let mut state = self.shared.state.lock();
        if state.closed {
            drop(state);
            // releases the handles of anything loaded meanwhile
            drop(accepted);
            return EnqueueReport {
                added: Vec::new(),
                errors,
            };
        }
        let added = state.store.append(accepted);
        state.store.set_enqueue_error(errors.first().cloned());
        self.shared.publish(&mut state);
        drop(state);

        info!(added = added.len(), rejected = errors.len(), "files enqueued");
        self.shared.kick();
        EnqueueReport { added, errors }
    }

    /// Replace the batch options. Any actual change cancels the running job,
    /// releases every result and queues every entry again. Returns whether
    /// the options changed.
    pub fn set_options(&self, options: CompressionOptions) -> PipelineResult<bool> {
        options.validate()?;
        let mut state = self.shared.state.lock();
        if state.closed || state.options == options {
            return Ok(false);
        }
        state.options = options;
        if !state.store.is_empty() {
            let cancelled = state.cancel_in_flight();
            let released = state.store.requeue_all();
            info!(
                entries = state.store.len(),
                released,
                cancelled = ?cancelled,
                "options changed, batch invalidated"
            );
        }
        let retired = state.store.take_retired();
        self.shared.publish(&mut state);
        drop(state);
        drop(retired);
        self.shared.kick();
        Ok(true)
    }

    pub fn options(&self) -> CompressionOptions {
        self.shared.state.lock().options.clone()
    }

    /// Cancel any running job and remove every entry.
    pub fn clear(&self) {
        let mut state = self.shared.state.lock();
        let cancelled = state.cancel_in_flight();
        let removed = state.store.clear();
        let retired = state.store.take_retired();
        self.shared.publish(&mut state);
        drop(state);

        info!(removed = removed.len(), cancelled = ?cancelled, "batch cleared");
        drop(removed);
        drop(retired);
    }

    /// Swap an entry's source for an edited one and queue it again.
    pub fn reset_entry_source(&self, id: EntryId, source: ImageSource) -> PipelineResult<()> {
        let mut state = self.shared.state.lock();
        let replaced = state.store.reset_source(id, source);
        let retired = state.store.take_retired();
        if replaced.is_ok() {
            self.shared.publish(&mut state);
        }
        drop(state);
        drop(retired);
        replaced?;
        debug!(entry = %id, "entry source replaced");
        self.shared.kick();
        Ok(())
    }

    /// Restore the pre-edit source. `Ok(false)` if the entry has no edit.
    pub fn revert_entry_edit(&self, id: EntryId) -> PipelineResult<bool> {
        let mut state = self.shared.state.lock();
        if !state.store.revert_edit(id)? {
            return Ok(false);
        }
        let retired = state.store.take_retired();
        self.shared.publish(&mut state);
        drop(state);
        drop(retired);
        debug!(entry = %id, "entry edit reverted");
        self.shared.kick();
        Ok(true)
    }

    /// Queue a failed entry again. `Ok(false)` if it is not in error.
    pub fn retry_entry(&self, id: EntryId) -> PipelineResult<bool> {
        let mut state = self.shared.state.lock();
        if !state.store.retry(id)? {
            return Ok(false);
        }
        self.shared.publish(&mut state);
        drop(state);
        debug!(entry = %id, "entry retried");
        self.shared.kick();
        Ok(true)
    }

    /// Make `id` the active entry. Unknown ids are ignored.
    pub fn set_active(&self, id: EntryId) -> bool {
        let mut state = self.shared.state.lock();
        let changed = state.store.active_id() != Some(id) && state.store.set_active(id);
        if changed {
            self.shared.publish(&mut state);
        }
        state.store.active_id() == Some(id)
    }

    pub fn active_id(&self) -> Option<EntryId> {
        self.shared.state.lock().store.active_id()
    }

    pub fn last_enqueue_error(&self) -> Option<String> {
        self.shared
            .state
            .lock()
            .store
            .last_enqueue_error()
            .map(str::to_string)
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> QueueSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    /// Receive every future snapshot.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.shared.snapshots.subscribe()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_snapshot(&self.shared.snapshots.borrow())
    }

    /// File name and bytes for a finished entry.
    pub fn download(&self, id: EntryId) -> Option<DownloadItem> {
        let snapshot = self.shared.snapshots.borrow();
        let view = snapshot.get(id)?;
        export::download_item(view, &self.shared.config.download_suffix)
    }

    /// Archive listing of every finished entry, named from the local clock.
    pub fn archive(&self) -> ArchiveManifest {
        ArchiveManifest::from_snapshot(
            &self.shared.snapshots.borrow(),
            &self.shared.config.archive_prefix,
            chrono::Local::now(),
        )
    }

    /// Cancel in-flight work, stop the driver and release every handle.
    /// Later calls do nothing; enqueues after shutdown add nothing.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.cancel_in_flight();
        let removed = state.store.clear();
        let retired = state.store.take_retired();
        self.shared.publish(&mut state);
        drop(state);

        self.shared.shutdown.cancel();
        info!(released_entries = removed.len(), "pipeline shut down");
        drop(removed);
        drop(retired);
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Shut down and wait for the driver task to exit.
    pub async fn close(mut self) {
        self.shutdown();
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
    }
}

impl<L: MetadataLoader, C: ImageCodec> Drop for BatchPipeline<L, C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
