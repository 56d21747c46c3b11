// src/pipeline/yielder.rs
//
// How the scheduler hands control back to the host between entries.

use crate::config::{PipelineConfig, YieldStrategy};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

pub trait HostYield: Send + Sync + 'static {
    fn yield_now(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    fn name(&self) -> &'static str;
}

/// Short timer sleep so queued host work runs before the next encode.
#[derive(Debug, Clone, Copy)]
pub struct IdleYield {
    delay: Duration,
}

impl IdleYield {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl HostYield for IdleYield {
    fn yield_now(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(self.delay))
    }

    fn name(&self) -> &'static str {
        "idle"
    }
}

/// Re-queue the driver task behind whatever is already runnable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredYield;

impl HostYield for DeferredYield {
    fn yield_now(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::task::yield_now())
    }

    fn name(&self) -> &'static str {
        "deferred"
    }
}

/// Pick the yield primitive for `config`. Idle mode with a zero delay
/// degrades to the deferred continuation.
pub fn select_yield(config: &PipelineConfig) -> Arc<dyn HostYield> {
    match config.yield_strategy {
        YieldStrategy::Idle if !config.idle_delay.is_zero() => {
            Arc::new(IdleYield::new(config.idle_delay))
        }
        _ => Arc::new(DeferredYield),
    }
}
