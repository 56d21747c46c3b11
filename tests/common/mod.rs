// tests/common/mod.rs
//
// Shared fixtures: a scripted codec and a pipeline wired to a counting
// handle registry.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;
use tinypress::{
    BatchPipeline, CompressionFormat, CompressionOptions, DisplayHandle, EncodedImage, FileLike,
    HandleProvider, HandleRegistry, ImageCodec, ImageInfo, ImageLoader, PipelineConfig,
    PipelineError, PipelineResult, QueueSnapshot,
};
use tokio::sync::{mpsc as async_mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Route pipeline logs to the test writer. `RUST_LOG` picks the level,
/// warnings by default. Safe to call from every test.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub name: String,
    pub format: CompressionFormat,
    pub quality: u8,
}

#[derive(Default)]
struct Script {
    calls: Mutex<Vec<Call>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    delay: Duration,
    failures: Mutex<HashMap<String, PipelineError>>,
}

struct ActiveGuard(Arc<Script>);

impl ActiveGuard {
    fn enter(script: &Arc<Script>) -> Self {
        let now = script.active.fetch_add(1, Ordering::SeqCst) + 1;
        script.max_active.fetch_max(now, Ordering::SeqCst);
        Self(script.clone())
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Codec double. Each call is recorded, optionally waits on a gate or a
/// delay, then returns half the source size in bytes (or a scripted error).
#[derive(Clone, Default)]
pub struct ScriptedCodec {
    script: Arc<Script>,
}

impl ScriptedCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every encode blocks until [`ScriptedCodec::release`] hands out a
    /// permit, or the job is cancelled.
    pub fn gated() -> Self {
        Self {
            script: Arc::new(Script {
                gate: Some(Arc::new(Semaphore::new(0))),
                ..Script::default()
            }),
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            script: Arc::new(Script {
                delay,
                ..Script::default()
            }),
        }
    }

    pub fn fail_on(&self, name: &str, error: PipelineError) {
        self.script.failures.lock().insert(name.to_string(), error);
    }

    pub fn release(&self, permits: usize) {
        if let Some(gate) = &self.script.gate {
            gate.add_permits(permits);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.calls.lock().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.name).collect()
    }

    pub fn max_active(&self) -> usize {
        self.script.max_active.load(Ordering::SeqCst)
    }
}

impl ImageCodec for ScriptedCodec {
    fn encode(
        &self,
        source: &ImageInfo,
        options: &CompressionOptions,
        cancel: CancellationToken,
    ) -> impl Future<Output = PipelineResult<EncodedImage>> + Send {
        let script = self.script.clone();
        let call = Call {
            name: source.name.clone(),
            format: options.format,
            quality: options.quality,
        };
        let size = source.size;
        async move {
            script.calls.lock().push(call.clone());
            let _active = ActiveGuard::enter(&script);

            if let Some(gate) = &script.gate {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(PipelineError::cancelled()),
                    permit = gate.acquire() => match permit {
                        Ok(permit) => permit.forget(),
                        Err(_) => return Err(PipelineError::cancelled()),
                    },
                }
            }
            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }
            if let Some(error) = script.failures.lock().get(&call.name).cloned() {
                return Err(error);
            }
            let len = (size / 2).max(1) as usize;
            Ok(EncodedImage::new(vec![0xAB; len], call.format))
        }
    }
}

pub struct Harness {
    pub pipeline: BatchPipeline<ImageLoader, ScriptedCodec>,
    pub codec: ScriptedCodec,
    pub registry: HandleRegistry,
}

pub fn harness(codec: ScriptedCodec) -> Harness {
    harness_with(codec, PipelineConfig::default())
}

pub fn harness_with(codec: ScriptedCodec, config: PipelineConfig) -> Harness {
    let registry = HandleRegistry::new();
    let handles: Arc<dyn HandleProvider> = Arc::new(registry.clone());
    Harness {
        pipeline: pipeline_with_handles(codec.clone(), config, handles),
        codec,
        registry,
    }
}

pub fn pipeline_with_handles(
    codec: ScriptedCodec,
    config: PipelineConfig,
    handles: Arc<dyn HandleProvider>,
) -> BatchPipeline<ImageLoader, ScriptedCodec> {
    init_tracing();
    let loader = ImageLoader::new(&config, handles.clone());
    BatchPipeline::new(loader, codec, handles, config).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParkAt {
    Create,
    Release,
}

/// Handle provider that blocks the first create (or release) of handles
/// with a given MIME type until [`ParkControl::resume`] is called.
pub struct ParkedHandles {
    registry: HandleRegistry,
    mime_type: &'static str,
    at: ParkAt,
    armed: Arc<AtomicBool>,
    entered: async_mpsc::UnboundedSender<()>,
    proceed: Arc<Mutex<mpsc::Receiver<()>>>,
}

pub struct ParkControl {
    entered: async_mpsc::UnboundedReceiver<()>,
    proceed: mpsc::Sender<()>,
}

impl ParkControl {
    /// Wait until a create or release is blocked inside the provider.
    pub async fn parked(&mut self) {
        tokio::time::timeout(Duration::from_secs(10), self.entered.recv())
            .await
            .expect("nothing parked")
            .expect("provider dropped");
    }

    pub fn resume(&self) {
        let _ = self.proceed.send(());
    }
}

impl ParkedHandles {
    pub fn new(registry: HandleRegistry, mime_type: &'static str, at: ParkAt) -> (Self, ParkControl) {
        let (entered_tx, entered_rx) = async_mpsc::unbounded_channel();
        let (proceed_tx, proceed_rx) = mpsc::channel();
        let handles = Self {
            registry,
            mime_type,
            at,
            armed: Arc::new(AtomicBool::new(true)),
            entered: entered_tx,
            proceed: Arc::new(Mutex::new(proceed_rx)),
        };
        let control = ParkControl {
            entered: entered_rx,
            proceed: proceed_tx,
        };
        (handles, control)
    }

    fn park_fn(&self) -> impl Fn() + Send + 'static {
        let armed = self.armed.clone();
        let entered = self.entered.clone();
        let proceed = self.proceed.clone();
        move || {
            if armed.swap(false, Ordering::SeqCst) {
                let _ = entered.send(());
                let _ = proceed.lock().recv();
            }
        }
    }
}

impl HandleProvider for ParkedHandles {
    fn create(&self, bytes: &[u8], mime_type: &str) -> PipelineResult<DisplayHandle> {
        let parks = mime_type == self.mime_type;
        if parks && self.at == ParkAt::Create {
            (self.park_fn())();
        }
        let inner = self.registry.create(bytes, mime_type)?;
        if !(parks && self.at == ParkAt::Release) {
            return Ok(inner);
        }
        let park = self.park_fn();
        let locator = inner.locator().to_string();
        Ok(DisplayHandle::new(locator, move || {
            park();
            inner.release();
        }))
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 90])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

pub fn png_file(name: &str) -> FileLike {
    FileLike::from_bytes(name, "image/png", png_bytes(8, 6))
}

/// Wait (up to ten virtual minutes) for a snapshot matching `pred`.
pub async fn wait_until<F>(
    pipeline: &BatchPipeline<ImageLoader, ScriptedCodec>,
    mut pred: F,
) -> QueueSnapshot
where
    F: FnMut(&QueueSnapshot) -> bool,
{
    let mut rx = pipeline.subscribe();
    let snapshot = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for pipeline state")
        .expect("pipeline dropped");
    snapshot.clone()
}

pub async fn settled(pipeline: &BatchPipeline<ImageLoader, ScriptedCodec>) -> QueueSnapshot {
    wait_until(pipeline, |s| !s.entries.is_empty() && s.is_settled()).await
}
