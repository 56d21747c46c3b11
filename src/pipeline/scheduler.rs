// src/pipeline/scheduler.rs
//
// The driver task: picks the first queued entry, runs one encode at a time,
// applies or discards the outcome, yields, repeats.

use super::entry::{CompressedImage, EntryId, Retired};
use super::{PipelineState, Shared};
use crate::codec::{run_bounded, EncodedImage, ImageCodec};
use crate::error::{PipelineError, PipelineResult};
use crate::handle::DisplayHandle;
use crate::loader::ImageInfo;
use crate::options::CompressionOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The single job allowed to run. Cleared only by the job that set it.
#[derive(Debug)]
pub(crate) struct InFlight {
    pub(crate) id: EntryId,
    pub(crate) job: u64,
    pub(crate) cancel: CancellationToken,
}

impl PipelineState {
    /// Cancel the running job, if any. The slot stays occupied until the job
    /// itself returns, so nothing new starts in between.
    pub(crate) fn cancel_in_flight(&self) -> Option<EntryId> {
        self.in_flight.as_ref().map(|flight| {
            flight.cancel.cancel();
            flight.id
        })
    }
}

struct Job {
    id: EntryId,
    seq: u64,
    info: ImageInfo,
    options: CompressionOptions,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl<C: ImageCodec> Shared<C> {
    /// Driver loop. Runs until the pipeline shuts down.
    pub(crate) async fn drive(self: Arc<Self>) {
        debug!(yield_strategy = self.yielder.name(), "scheduler started");
        loop {
            while let Some(job) = self.dispatch_next() {
                if self.run_job(job).await == JobOutcome::Cancelled {
                    // whoever cancelled also changed the store and woke us
                    break;
                }
                self.yielder.yield_now().await;
            }

            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = self.wake.notified() => {}
            }
        }
        debug!("scheduler stopped");
    }

    fn dispatch_next(&self) -> Option<Job> {
        let mut state = self.state.lock();
        if state.closed || state.in_flight.is_some() {
            return None;
        }
        let id = state.store.next_queued()?;
        let info = state.store.start(id)?;

        state.next_job += 1;
        let seq = state.next_job;
        let cancel = self.shutdown.child_token();
        state.in_flight = Some(InFlight {
            id,
            job: seq,
            cancel: cancel.clone(),
        });
        let options = state.options.clone();
        self.publish(&mut state);

        debug!(entry = %id, name = %info.name, format = %options.format, quality = options.quality, "dispatching job");
        Some(Job {
            id,
            seq,
            info,
            options,
            cancel,
        })
    }

    async fn run_job(&self, job: Job) -> JobOutcome {
        let started = Instant::now();
        // Stops leftover blocking work once the job is over, whatever the outcome
        let codec_cancel = job.cancel.child_token();
        let _stop_codec = codec_cancel.clone().drop_guard();

        let encoded = run_bounded(
            self.codec.encode(&job.info, &job.options, codec_cancel),
            &job.cancel,
            self.config.encode_timeout,
        )
        .await;

        // no handle for output that is already stale
        let output = match encoded {
            Ok(encoded) if self.is_current(&job) => self.allocate_result(&job, encoded).await,
            Ok(_) => Err(PipelineError::cancelled()),
            Err(e) => Err(e),
        };

        let (outcome, retired) = self.finish(job, output, started.elapsed());
        drop(retired);
        outcome
    }

    fn is_current(&self, job: &Job) -> bool {
        !job.cancel.is_cancelled() && self.state.lock().store.is_processing(job.id)
    }

    /// Create the display handle for an encode off the driver task.
    async fn allocate_result(
        &self,
        job: &Job,
        encoded: EncodedImage,
    ) -> PipelineResult<(EncodedImage, DisplayHandle)> {
        let handles = self.handles.clone();
        let allocated = tokio::task::spawn_blocking(move || {
            let handle = handles.create(&encoded.bytes, encoded.mime_type())?;
            Ok((encoded, handle))
        })
        .await
        .map_err(|e| PipelineError::internal_panic(format!("handle task failed: {e}")))
        .and_then(|allocated| allocated);
        if let Err(e) = &allocated {
            warn!(entry = %job.id, error = %e, "result handle allocation failed");
        }
        allocated
    }

    /// Apply a job's output if the job is still current. Whatever the store
    /// displaced comes back for release after the lock is gone.
    fn finish(
        &self,
        job: Job,
        output: PipelineResult<(EncodedImage, DisplayHandle)>,
        elapsed: Duration,
    ) -> (JobOutcome, Retired) {
        let mut state = self.state.lock();
        if state.in_flight.as_ref().is_some_and(|f| f.job == job.seq) {
            state.in_flight = None;
        }

        if job.cancel.is_cancelled() || !state.store.is_processing(job.id) {
            debug!(entry = %job.id, "job cancelled, output discarded");
            let mut retired = state.store.take_retired();
            drop(state);
            if let Ok((_, handle)) = output {
                retired.push(handle);
            }
            return (JobOutcome::Cancelled, retired);
        }

        let outcome = match output {
            Ok((encoded, handle)) => {
                let output_size = encoded.byte_size();
                let format = encoded.format;
                state
                    .store
                    .complete(job.id, CompressedImage::new(encoded.bytes, format, handle));
                info!(
                    entry = %job.id,
                    name = %job.info.name,
                    %format,
                    input_bytes = job.info.size,
                    output_bytes = output_size,
                    ratio = output_size as f64 / job.info.size.max(1) as f64,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "entry compressed"
                );
                JobOutcome::Completed
            }
            Err(e) => {
                warn!(entry = %job.id, name = %job.info.name, error = %e, "entry failed");
                state.store.fail(job.id, e.user_message());
                JobOutcome::Failed
            }
        };
        let retired = state.store.take_retired();
        self.publish(&mut state);
        (outcome, retired)
    }
}
