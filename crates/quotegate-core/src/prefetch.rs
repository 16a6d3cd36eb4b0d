//! Background refresh of recently requested data.
//!
//! Successful foreground reads enqueue their [`GatewayQuery`]; every `interval` the refresher
//! drains up to `batch_size` queued queries and replays them with the cache read skipped, so
//! the normal write-through renews the entries before they expire.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::cache::CacheKey;
use crate::query::GatewayQuery;
use crate::GatewayError;

/// Boxed future returned by [`QueryReplayer::replay`].
pub type ReplayFuture<'a> = Pin<Box<dyn Future<Output = Result<(), GatewayError>> + Send + 'a>>;

/// Executes a queued query, bypassing the cache read but writing the result through.
pub trait QueryReplayer: Send + Sync {
    fn replay<'a>(&'a self, query: &'a GatewayQuery) -> ReplayFuture<'a>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    pub enabled: bool,
    pub interval: Duration,
    pub batch_size: usize,
    /// Queries beyond this many pending are dropped.
    pub max_queued: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            batch_size: 10,
            max_queued: 500,
        }
    }
}

/// Outcome of one refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PrefetchReport {
    pub refreshed: usize,
    pub failed: usize,
    /// Left in the queue after this pass.
    pub remaining: usize,
    /// Another pass was still running, nothing was drained.
    pub skipped: bool,
}

#[derive(Debug, Default)]
struct PrefetchQueue {
    order: VecDeque<(CacheKey, GatewayQuery)>,
    keys: HashSet<CacheKey>,
}

#[derive(Debug)]
pub struct PrefetchRefresher {
    config: PrefetchConfig,
    queue: Mutex<PrefetchQueue>,
    draining: AtomicBool,
}

/// Clears the draining flag even if a pass is cancelled mid-way.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl PrefetchRefresher {
    pub fn new(config: PrefetchConfig) -> Self {
        Self {
            config,
            queue: Mutex::new(PrefetchQueue::default()),
            draining: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PrefetchQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues `query` unless it is already pending. Returns whether it was added.
    pub fn enqueue(&self, query: GatewayQuery) -> bool {
        if !self.config.enabled {
            return false;
        }
        let key = query.cache_key();
        let mut queue = self.lock();
        if queue.keys.contains(&key) {
            return false;
        }
        if queue.order.len() >= self.config.max_queued {
            tracing::debug!(%key, max_queued = self.config.max_queued, "prefetch queue full");
            return false;
        }
        queue.keys.insert(key.clone());
        queue.order.push_back((key, query));
        true
    }

    pub fn pending(&self) -> usize {
        self.lock().order.len()
    }

    pub fn pending_queries(&self) -> Vec<GatewayQuery> {
        self.lock()
            .order
            .iter()
            .map(|(_, query)| query.clone())
            .collect()
    }

    fn take_batch(&self) -> Vec<GatewayQuery> {
        let mut queue = self.lock();
        let count = self.config.batch_size.min(queue.order.len());
        let batch = queue.order.drain(..count).collect::<Vec<_>>();
        for (key, _) in &batch {
            queue.keys.remove(key);
        }
        batch.into_iter().map(|(_, query)| query).collect()
    }

    /// Runs one refresh pass. Skipped when a previous pass is still draining.
    pub async fn tick(&self, replayer: &dyn QueryReplayer) -> PrefetchReport {
        if self.draining.swap(true, Ordering::AcqRel) {
            tracing::debug!("prefetch pass still running; skipping tick");
            return PrefetchReport {
                remaining: self.pending(),
                skipped: true,
                ..PrefetchReport::default()
            };
        }
        let _guard = DrainGuard(&self.draining);

        let mut report = PrefetchReport::default();
        for query in self.take_batch() {
            match replayer.replay(&query).await {
                Ok(()) => report.refreshed += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(
                        operation = query.operation(),
                        %error,
                        "prefetch refresh failed"
                    );
                }
            }
        }
        report.remaining = self.pending();
        if report.refreshed + report.failed > 0 {
            tracing::debug!(
                refreshed = report.refreshed,
                failed = report.failed,
                remaining = report.remaining,
                "prefetch pass complete"
            );
        }
        report
    }

    /// Runs [`tick`](Self::tick) every `interval` until the handle is shut down.
    pub fn spawn(self: &Arc<Self>, replayer: Arc<dyn QueryReplayer>) -> PrefetchHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let refresher = Arc::clone(self);
        let period = self.config.interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {
                        refresher.tick(replayer.as_ref()).await;
                    }
                }
            }
            tracing::debug!("prefetch refresher stopped");
        });

        PrefetchHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Running refresher task.
#[derive(Debug)]
pub struct PrefetchHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl PrefetchHandle {
    /// Stops the loop after any in-flight pass finishes.
    pub async fn shutdown(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Err(error) = (&mut self.task).await {
            tracing::warn!(%error, "prefetch task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
