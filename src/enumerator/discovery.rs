//! Background split discovery
//!
//! A [`DiscoveryLoop`] runs a [`SplitDiscovery`] on its own task and reports
//! every outcome as a [`DiscoveryEvent`] through a sink. It never touches
//! enumerator state; the enumerator actor feeds the events into its own
//! queue so they are handled in order with every other message.

use crate::config::{DiscoveryConfig, DiscoveryMode};
use crate::core::SourceSplit;
use crate::error::{ConnectorError, ErrorCode, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Produces splits from the external resource
#[async_trait]
pub trait SplitDiscovery<S: SourceSplit>: Send + Sync {
    /// One discovery pass.
    ///
    /// Continuous discovery calls this repeatedly; a pass may return splits
    /// that earlier passes already reported.
    async fn discover(&self) -> Result<Vec<S>>;
}

/// Outcome of discovery, delivered to the enumerator
#[derive(Debug)]
pub enum DiscoveryEvent<S> {
    SplitsDiscovered(Vec<S>),
    /// No pass will ever produce new splits
    Exhausted,
    /// Retries were used up; discovery has stopped
    Failed(ConnectorError),
}

pub struct DiscoveryLoop<S: SourceSplit> {
    discovery: Arc<dyn SplitDiscovery<S>>,
    config: DiscoveryConfig,
}

impl<S: SourceSplit> DiscoveryLoop<S> {
    pub fn new(discovery: Arc<dyn SplitDiscovery<S>>, config: DiscoveryConfig) -> Self {
        Self { discovery, config }
    }

    /// Run on a new task; the loop ends when the sink rejects an event
    pub fn spawn<F>(self, sink: F) -> JoinHandle<()>
    where
        F: FnMut(DiscoveryEvent<S>) -> bool + Send + 'static,
    {
        tokio::spawn(self.run(sink))
    }

    pub async fn run<F>(self, mut sink: F)
    where
        F: FnMut(DiscoveryEvent<S>) -> bool + Send,
    {
        let mut pass = 0u64;
        loop {
            pass += 1;
            match self.discover_with_retry().await {
                Ok(splits) => {
                    debug!(pass, splits = splits.len(), "Discovery pass finished");
                    if !sink(DiscoveryEvent::SplitsDiscovered(splits)) {
                        return;
                    }
                }
                Err(err) => {
                    sink(DiscoveryEvent::Failed(err));
                    return;
                }
            }

            if self.config.mode == DiscoveryMode::OneShot {
                info!("Split discovery exhausted");
                sink(DiscoveryEvent::Exhausted);
                return;
            }
            tokio::time::sleep(self.config.interval).await;
        }
    }

    async fn discover_with_retry(&self) -> Result<Vec<S>> {
        let mut backoff = self.config.initial_backoff;
        let mut failures = 0u32;

        loop {
            match self.discovery.discover().await {
                Ok(splits) => return Ok(splits),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if failures >= self.config.max_retries => {
                    return Err(ConnectorError::transient_with_code(
                        ErrorCode::COLLABORATOR_RETRIES_EXHAUSTED,
                        format!("split discovery failed after {} attempts", failures + 1),
                    )
                    .with_source(err));
                }
                Err(err) => {
                    failures += 1;
                    warn!(
                        attempt = failures,
                        backoff_ms = backoff.as_millis() as u64,
                        "Split discovery failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff, self.config.max_backoff);
                }
            }
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}
