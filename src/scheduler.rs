//! In-process refresh queue.
//!
//! Jobs travel over a bounded mpsc channel to a single worker task. A pending
//! set keyed by fingerprint answers `has_scheduled` until the worker claims
//! the job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};
use ulid::Ulid;

use crate::cache::Fingerprint;
use crate::calendar::now_secs;
use crate::engine::AvailabilityError;
use crate::model::*;
use crate::observability::REFRESH_FAILED_TOTAL;
use crate::ports::JobScheduler;
use crate::service::AvailabilityService;

/// Recompute one fingerprint's availability outside the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshJob {
    pub id: Ulid,
    pub product_id: ResourceId,
    pub fingerprint: Fingerprint,
    pub query: DayBlockQuery,
}

impl RefreshJob {
    pub fn new(product_id: ResourceId, query: DayBlockQuery) -> Self {
        Self {
            id: Ulid::new(),
            product_id,
            fingerprint: Fingerprint::of(product_id, &query),
            query,
        }
    }
}

#[derive(Debug)]
pub struct ScheduledJob {
    pub run_at: Ts,
    pub job: RefreshJob,
}

pub struct RefreshScheduler {
    tx: mpsc::Sender<ScheduledJob>,
    pending: DashMap<Fingerprint, Ulid>,
}

impl RefreshScheduler {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScheduledJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let scheduler = Self {
            tx,
            pending: DashMap::new(),
        };
        (scheduler, rx)
    }

    /// The worker picked the job up; it no longer counts as scheduled.
    pub fn claim(&self, job: &RefreshJob) {
        self.pending.remove_if(&job.fingerprint, |_, id| *id == job.id);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

#[async_trait]
impl JobScheduler for RefreshScheduler {
    async fn has_scheduled(&self, fingerprint: &Fingerprint) -> bool {
        self.pending.contains_key(fingerprint)
    }

    async fn schedule(&self, run_at: Ts, job: RefreshJob) -> Result<(), AvailabilityError> {
        let fingerprint = job.fingerprint.clone();
        let id = job.id;
        self.pending.insert(fingerprint.clone(), id);
        if self.tx.send(ScheduledJob { run_at, job }).await.is_err() {
            self.pending.remove_if(&fingerprint, |_, pending| *pending == id);
            return Err(AvailabilityError::SchedulerClosed);
        }
        Ok(())
    }
}

/// Background task that runs refresh jobs one at a time, in queue order.
/// Returns once every sender is gone.
pub async fn run_refresh_worker(
    service: Arc<AvailabilityService>,
    scheduler: Arc<RefreshScheduler>,
    mut rx: mpsc::Receiver<ScheduledJob>,
) {
    while let Some(ScheduledJob { run_at, job }) = rx.recv().await {
        let wait = run_at - now_secs();
        if wait > 0 {
            tokio::time::sleep(Duration::from_secs(wait as u64)).await;
        }
        scheduler.claim(&job);
        match service.run_refresh(&job, now_secs()).await {
            Ok(()) => info!(job = %job.id, product = job.product_id, "refreshed availability"),
            Err(e) => {
                metrics::counter!(REFRESH_FAILED_TOTAL).increment(1);
                warn!(job = %job.id, product = job.product_id, "refresh failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(product_id: ResourceId) -> RefreshJob {
        RefreshJob::new(product_id, DayBlockQuery::new(Span::new(0, 10 * 86_400)))
    }

    #[tokio::test]
    async fn scheduled_until_claimed() {
        let (scheduler, mut rx) = RefreshScheduler::new(4);
        let j = job(1);
        assert!(!scheduler.has_scheduled(&j.fingerprint).await);

        scheduler.schedule(0, j.clone()).await.unwrap();
        assert!(scheduler.has_scheduled(&j.fingerprint).await);
        assert!(!scheduler.has_scheduled(&job(2).fingerprint).await);

        let queued = rx.recv().await.unwrap();
        assert_eq!(queued.job, j);
        scheduler.claim(&queued.job);
        assert!(!scheduler.has_scheduled(&j.fingerprint).await);
    }

    #[tokio::test]
    async fn stale_claim_keeps_newer_job() {
        let (scheduler, _rx) = RefreshScheduler::new(4);
        let first = job(1);
        let second = job(1);
        scheduler.schedule(0, first.clone()).await.unwrap();
        scheduler.schedule(0, second).await.unwrap();
        scheduler.claim(&first);
        assert!(scheduler.has_scheduled(&first.fingerprint).await);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn closed_queue_is_an_error() {
        let (scheduler, rx) = RefreshScheduler::new(4);
        drop(rx);
        let j = job(1);
        let err = scheduler.schedule(0, j.clone()).await.unwrap_err();
        assert_eq!(err, AvailabilityError::SchedulerClosed);
        assert!(!scheduler.has_scheduled(&j.fingerprint).await);
    }
}
