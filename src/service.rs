//! Cached entry point for day availability.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::cache::{AvailabilityCache, CacheLookup, Fingerprint, RefreshState};
use crate::engine::{buffer_day_blocks, Aggregator, AvailabilityError};
use crate::limits::MAX_WINDOW_SECS;
use crate::model::*;
use crate::observability::*;
use crate::ports::{JobScheduler, ProductCatalog};
use crate::scheduler::RefreshJob;

pub struct AvailabilityService {
    aggregator: Aggregator,
    cache: Arc<AvailabilityCache>,
    scheduler: Arc<dyn JobScheduler>,
    catalog: Arc<dyn ProductCatalog>,
}

impl AvailabilityService {
    pub fn new(
        aggregator: Aggregator,
        cache: Arc<AvailabilityCache>,
        scheduler: Arc<dyn JobScheduler>,
        catalog: Arc<dyn ProductCatalog>,
    ) -> Self {
        Self {
            aggregator,
            cache,
            scheduler,
            catalog,
        }
    }

    pub fn cache(&self) -> &AvailabilityCache {
        &self.cache
    }

    /// Booked, partially booked and unavailable days of `product` in the
    /// query window.
    ///
    /// A `BackgroundRefresh` request only schedules a recomputation and
    /// returns `Ok(None)`. User requests are served from the cache: a
    /// previous snapshot while a refresh is in flight, else a fresh entry,
    /// else a synchronous computation that is then cached.
    pub async fn find_booked_day_blocks(
        &self,
        product: &BookableProduct,
        query: &DayBlockQuery,
        source: RequestSource,
        now: Ts,
    ) -> Result<Option<DayAvailability>, AvailabilityError> {
        if source == RequestSource::BackgroundRefresh {
            self.request_refresh(product.id, query, now).await?;
            return Ok(None);
        }

        let key = Fingerprint::of(product.id, query);
        let label = source_label(source);
        match self.cache.lookup(&key, now) {
            CacheLookup::Fresh(value) => {
                metrics::counter!(CACHE_HITS_TOTAL, "source" => label).increment(1);
                Ok(Some(value))
            }
            CacheLookup::Stale(value) => {
                metrics::counter!(CACHE_STALE_SERVED_TOTAL, "source" => label).increment(1);
                debug!(product = product.id, "serving previous availability during refresh");
                Ok(Some(value))
            }
            CacheLookup::Miss => {
                metrics::counter!(CACHE_MISSES_TOTAL, "source" => label).increment(1);
                let value = self.compute(product, query, source).await?;
                self.cache.set(key, value.clone(), now);
                Ok(Some(value))
            }
        }
    }

    /// Buffer days implied by a fully-booked map.
    pub fn get_buffer_day_blocks_for_booked_days(
        &self,
        product: &BookableProduct,
        fully_booked_days: &DayBlockMap,
    ) -> BufferDays {
        buffer_day_blocks(product, fully_booked_days)
    }

    /// Schedule a recomputation unless one is already queued or running.
    /// Returns whether a job was enqueued.
    ///
    /// The check and the enqueue are not atomic: two concurrent callers may
    /// both schedule. The second job just recomputes the same value.
    pub async fn request_refresh(
        &self,
        product_id: ResourceId,
        query: &DayBlockQuery,
        now: Ts,
    ) -> Result<bool, AvailabilityError> {
        let job = RefreshJob::new(product_id, query.clone());
        let key = job.fingerprint.clone();
        if self.scheduler.has_scheduled(&key).await || self.cache.refresh_state(&key, now).is_some() {
            metrics::counter!(REFRESH_COALESCED_TOTAL).increment(1);
            debug!(product = product_id, "refresh already in flight");
            return Ok(false);
        }

        self.cache.preserve_previous(&key, now);
        self.cache.mark_refresh(&key, RefreshState::Scheduled, now);
        let job_id = job.id;
        if let Err(e) = self.scheduler.schedule(now, job).await {
            self.cache.abandon_refresh(&key);
            return Err(e);
        }
        metrics::counter!(REFRESH_SCHEDULED_TOTAL).increment(1);
        info!(job = %job_id, product = product_id, "scheduled availability refresh");
        Ok(true)
    }

    /// Worker side of a refresh: recompute bypassing the cache and replace
    /// the fresh entry. On failure the in-flight marker is cleared so the
    /// next background request can try again.
    pub async fn run_refresh(&self, job: &RefreshJob, now: Ts) -> Result<(), AvailabilityError> {
        let key = &job.fingerprint;
        self.cache.mark_refresh(key, RefreshState::Started, now);

        match self.recompute(job).await {
            Ok(Some(value)) => {
                self.cache.set(key.clone(), value, now);
                self.cache.finish_refresh(key);
                Ok(())
            }
            Ok(None) => {
                debug!(product = job.product_id, "product gone, dropping cached availability");
                self.cache.invalidate(key);
                self.cache.finish_refresh(key);
                Ok(())
            }
            Err(e) => {
                self.cache.abandon_refresh(key);
                Err(e)
            }
        }
    }

    /// A booking of `product_id` was created, changed or cancelled.
    /// Returns how many cached entries were dropped.
    pub fn on_booking_changed(&self, product_id: ResourceId) -> usize {
        let dropped = self.cache.invalidate_product(product_id);
        debug!(product = product_id, dropped, "invalidated cached availability");
        dropped
    }

    async fn recompute(&self, job: &RefreshJob) -> Result<Option<DayAvailability>, AvailabilityError> {
        let Some(product) = self.catalog.get_product(job.product_id).await? else {
            return Ok(None);
        };
        let value = self.compute(&product, &job.query, RequestSource::BackgroundRefresh).await?;
        Ok(Some(value))
    }

    async fn compute(
        &self,
        product: &BookableProduct,
        query: &DayBlockQuery,
        source: RequestSource,
    ) -> Result<DayAvailability, AvailabilityError> {
        let width = query.window.width();
        if width > MAX_WINDOW_SECS {
            return Err(AvailabilityError::WindowTooWide(width));
        }
        let started = Instant::now();
        let result = self.aggregator.aggregate(product, query, source).await;
        metrics::histogram!(AGGREGATION_DURATION_SECONDS, "source" => source_label(source))
            .record(started.elapsed().as_secs_f64());
        result
    }
}
