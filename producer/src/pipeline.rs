//! Poll-retry-publish pipeline.
//!
//! Each pipeline owns a fixed-delay loop. A tick fetches the upstream
//! snapshot (with retries), then publishes every record in order to one
//! destination:
//!
//! ```text
//! tick → RetryingFetcher → [r1, r2, ..] → publish(r1) → publish(r2) → .. → sleep(fixed_delay)
//! ```
//!
//! The next tick is scheduled from the end of the previous one, so ticks of
//! the same pipeline never overlap. A failed fetch ends the tick without
//! publishing; a failed publish is logged and the loop moves on to the next
//! record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::FetchError;
use crate::fetch::{Fetcher, RetryPolicy, RetryingFetcher};
use crate::queue::{Record, RecordPublisher};

/// Static settings for one pipeline instance.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Name used in logs, e.g. `crm`
    pub name: String,
    /// Queue receiving the records
    pub destination: String,
    /// Pause between the end of one tick and the start of the next
    pub fixed_delay: Duration,
    /// Retry policy for the upstream fetch
    pub retry: RetryPolicy,
}

/// Outcome of one successful tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records returned by the fetch
    pub fetched: usize,
    /// Records accepted by the publisher
    pub published: usize,
    /// Records whose publish failed
    pub failed: usize,
}

/// Counters accumulated over the life of a pipeline.
#[derive(Debug, Default)]
pub struct PipelineStats {
    ticks: AtomicU64,
    fetch_failures: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub ticks: u64,
    pub fetch_failures: u64,
    pub published: u64,
    pub publish_failures: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}

/// One poll-retry-publish unit for a single record type.
pub struct Pipeline<T> {
    config: PipelineConfig,
    fetcher: RetryingFetcher<T>,
    publisher: Arc<dyn RecordPublisher<T>>,
    stats: Arc<PipelineStats>,
}

impl<T: Record> Pipeline<T> {
    pub fn new(
        config: PipelineConfig,
        fetcher: Arc<dyn Fetcher<T>>,
        publisher: Arc<dyn RecordPublisher<T>>,
    ) -> Self {
        let fetcher = RetryingFetcher::new(fetcher, config.retry);
        Self {
            config,
            fetcher,
            publisher,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shared handle to this pipeline's counters.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Run a single tick: fetch with retry, then publish each record.
    ///
    /// Returns the fetch error when every attempt failed. Publish failures
    /// never fail the tick; they are counted in the report.
    pub async fn run_tick(&self) -> Result<TickReport, FetchError> {
        let name = self.config.name.as_str();
        let destination = self.config.destination.as_str();

        self.stats.ticks.fetch_add(1, Ordering::Relaxed);
        info!(pipeline = name, source = self.fetcher.source(), "pipeline_tick_started");

        let records = match self.fetcher.fetch_with_retry().await {
            Ok(records) => records,
            Err(err) => {
                self.stats.fetch_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    pipeline = name,
                    source = self.fetcher.source(),
                    attempts = self.config.retry.attempts(),
                    error = %err,
                    "pipeline_fetch_failed"
                );
                return Err(err);
            }
        };

        let mut report = TickReport {
            fetched: records.len(),
            ..Default::default()
        };

        for record in &records {
            match self.publisher.publish(destination, record).await {
                Ok(()) => {
                    report.published += 1;
                    debug!(
                        pipeline = name,
                        queue = destination,
                        kind = T::KIND,
                        record_id = record.id(),
                        "record_published"
                    );
                }
                Err(err) => {
                    report.failed += 1;
                    error!(
                        pipeline = name,
                        queue = destination,
                        kind = T::KIND,
                        record_id = record.id(),
                        error = %err,
                        "record_publish_failed"
                    );
                }
            }
        }

        self.stats
            .published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.stats
            .publish_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);

        info!(
            pipeline = name,
            queue = destination,
            fetched = report.fetched,
            published = report.published,
            failed = report.failed,
            "pipeline_tick_finished"
        );

        Ok(report)
    }

    /// Run ticks until `shutdown` turns true or its sender is dropped.
    ///
    /// Shutdown is observed between ticks; a tick in progress always runs
    /// to completion.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.config.name.clone();
        info!(
            pipeline = %name,
            queue = %self.config.destination,
            fixed_delay_ms = self.config.fixed_delay.as_millis() as u64,
            "pipeline_started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Failures are logged and counted inside the tick
            let _ = self.run_tick().await;

            if self.wait_for_next_tick(&mut shutdown).await {
                break;
            }
        }

        info!(pipeline = %name, "pipeline_stopped");
    }

    /// Sleep `fixed_delay`, returning true if shutdown was requested meanwhile.
    ///
    /// Updates that leave the flag false do not cut the delay short.
    async fn wait_for_next_tick(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let delay = tokio::time::sleep(self.config.fixed_delay);
        tokio::pin!(delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return true;
                    }
                }
                _ = &mut delay => return false,
            }
        }
    }

    /// Spawn [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
