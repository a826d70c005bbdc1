//! Availability cache with stale-while-revalidate.
//!
//! Three keyed stores share one [`Fingerprint`]:
//! - fresh entries, served while their TTL lasts;
//! - "previous" snapshots, preserved when a refresh is scheduled and served
//!   (flagged `old_availability`) until the refresh lands;
//! - in-flight markers, so only one refresh per fingerprint is scheduled.
//!
//! Every entry is replaced wholesale; writes are last-writer-wins.

use dashmap::DashMap;

use crate::calendar::{midnight, DateFormat};
use crate::config::Settings;
use crate::model::*;

/// Structured cache key for one day-availability query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub product_id: ResourceId,
    /// Window bounds aligned to midnight.
    pub min_day: Ts,
    pub max_day: Ts,
    /// Sorted sub-resource selection.
    pub resource_ids: Vec<ResourceId>,
    pub timezone_offset: Ts,
    pub date_format: DateFormat,
}

impl Fingerprint {
    pub fn of(product_id: ResourceId, query: &DayBlockQuery) -> Self {
        let mut resource_ids = query.resource_ids.clone();
        resource_ids.sort_unstable();
        resource_ids.dedup();
        Self {
            product_id,
            min_day: midnight(query.window.start),
            max_day: midnight(query.window.end),
            resource_ids,
            timezone_offset: query.timezone_offset,
            date_format: query.date_format.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// Queued, not yet picked up.
    Scheduled,
    /// A worker is recomputing.
    Started,
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Fresh(DayAvailability),
    /// Previous snapshot served during a refresh; `old_availability` is set.
    Stale(DayAvailability),
    Miss,
}

#[derive(Debug, Clone)]
struct Stored<T> {
    value: T,
    expires_at: Ts,
}

impl<T> Stored<T> {
    fn live(&self, now: Ts) -> bool {
        now < self.expires_at
    }
}

pub struct AvailabilityCache {
    fresh: DashMap<Fingerprint, Stored<DayAvailability>>,
    previous: DashMap<Fingerprint, Stored<DayAvailability>>,
    refreshing: DashMap<Fingerprint, Stored<RefreshState>>,
    ttl: Ts,
    previous_ttl: Ts,
}

impl AvailabilityCache {
    pub fn new(settings: &Settings) -> Self {
        Self::with_ttls(settings.cache_ttl_secs, settings.previous_ttl_secs)
    }

    pub fn with_ttls(ttl: Ts, previous_ttl: Ts) -> Self {
        Self {
            fresh: DashMap::new(),
            previous: DashMap::new(),
            refreshing: DashMap::new(),
            ttl,
            previous_ttl,
        }
    }

    /// Fresh value, if any. Expired entries are dropped on the way.
    pub fn get(&self, key: &Fingerprint, now: Ts) -> Option<DayAvailability> {
        live_value(&self.fresh, key, now)
    }

    pub fn set(&self, key: Fingerprint, value: DayAvailability, now: Ts) {
        self.set_with_ttl(key, value, self.ttl, now);
    }

    pub fn set_with_ttl(&self, key: Fingerprint, value: DayAvailability, ttl: Ts, now: Ts) {
        self.fresh.insert(
            key,
            Stored {
                value,
                expires_at: now + ttl,
            },
        );
    }

    pub fn invalidate(&self, key: &Fingerprint) {
        self.fresh.remove(key);
    }

    /// Drop every fresh entry of a product. Returns how many were dropped.
    pub fn invalidate_product(&self, product_id: ResourceId) -> usize {
        let before = self.fresh.len();
        self.fresh.retain(|k, _| k.product_id != product_id);
        before - self.fresh.len()
    }

    /// Read path: a previous snapshot wins while a refresh is in flight,
    /// then a fresh entry, otherwise a miss.
    pub fn lookup(&self, key: &Fingerprint, now: Ts) -> CacheLookup {
        if self.refresh_state(key, now).is_some()
            && let Some(mut stale) = live_value(&self.previous, key, now)
        {
            stale.old_availability = true;
            return CacheLookup::Stale(stale);
        }
        match self.get(key, now) {
            Some(value) => CacheLookup::Fresh(value),
            None => CacheLookup::Miss,
        }
    }

    /// Copy the current fresh value into the short-lived previous slot.
    /// Returns false when there was nothing to preserve.
    pub fn preserve_previous(&self, key: &Fingerprint, now: Ts) -> bool {
        let Some(value) = self.get(key, now) else {
            return false;
        };
        self.previous.insert(
            key.clone(),
            Stored {
                value,
                expires_at: now + self.previous_ttl,
            },
        );
        true
    }

    pub fn mark_refresh(&self, key: &Fingerprint, state: RefreshState, now: Ts) {
        self.refreshing.insert(
            key.clone(),
            Stored {
                value: state,
                expires_at: now + self.previous_ttl,
            },
        );
    }

    pub fn refresh_state(&self, key: &Fingerprint, now: Ts) -> Option<RefreshState> {
        live_value(&self.refreshing, key, now)
    }

    /// The refresh landed: clear the marker and the previous snapshot.
    pub fn finish_refresh(&self, key: &Fingerprint) {
        self.refreshing.remove(key);
        self.previous.remove(key);
    }

    /// The refresh failed: clear the marker so a later request can
    /// reschedule. The previous snapshot expires on its own.
    pub fn abandon_refresh(&self, key: &Fingerprint) {
        self.refreshing.remove(key);
    }

    /// Drop expired entries from all stores. Returns how many were dropped.
    pub fn purge_expired(&self, now: Ts) -> usize {
        let before = self.fresh.len() + self.previous.len() + self.refreshing.len();
        self.fresh.retain(|_, v| v.live(now));
        self.previous.retain(|_, v| v.live(now));
        self.refreshing.retain(|_, v| v.live(now));
        before - (self.fresh.len() + self.previous.len() + self.refreshing.len())
    }

    pub fn len(&self) -> usize {
        self.fresh.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fresh.is_empty()
    }
}

fn live_value<T: Clone>(map: &DashMap<Fingerprint, Stored<T>>, key: &Fingerprint, now: Ts) -> Option<T> {
    let value = {
        let entry = map.get(key)?;
        entry.live(now).then(|| entry.value.clone())
    };
    if value.is_none() {
        map.remove_if(key, |_, v| !v.live(now));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn key(product_id: ResourceId) -> Fingerprint {
        Fingerprint::of(product_id, &DayBlockQuery::new(Span::new(1_000_000, 2_000_000)))
    }

    fn value(marker_day: u32) -> DayAvailability {
        let mut v = DayAvailability::empty(DateFormat::default());
        v.fully_booked_days
            .mark(NaiveDate::from_ymd_opt(2025, 3, marker_day).unwrap(), 0);
        v
    }

    #[test]
    fn fingerprint_ignores_time_of_day_and_selection_order() {
        let a = DayBlockQuery::new(Span::new(86_400 + 5, 10 * 86_400 + 7)).with_resources(vec![3, 1, 3]);
        let b = DayBlockQuery::new(Span::new(86_400 + 600, 10 * 86_400 + 9)).with_resources(vec![1, 3]);
        assert_eq!(Fingerprint::of(1, &a), Fingerprint::of(1, &b));
        assert_ne!(Fingerprint::of(1, &a), Fingerprint::of(2, &a));
        let c = a.clone().with_timezone_offset_hours(1.0);
        assert_ne!(Fingerprint::of(1, &a), Fingerprint::of(1, &c));
    }

    #[test]
    fn entries_expire_after_ttl() {
        let cache = AvailabilityCache::with_ttls(60, 10);
        cache.set(key(1), value(7), 100);
        assert_eq!(cache.get(&key(1), 159), Some(value(7)));
        assert_eq!(cache.get(&key(1), 160), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_prefers_previous_while_refreshing() {
        let cache = AvailabilityCache::with_ttls(60, 10);
        cache.set(key(1), value(7), 100);
        assert!(cache.preserve_previous(&key(1), 100));
        cache.mark_refresh(&key(1), RefreshState::Scheduled, 100);
        cache.set(key(1), value(8), 101);

        let CacheLookup::Stale(stale) = cache.lookup(&key(1), 105) else {
            panic!("expected stale snapshot");
        };
        assert!(stale.old_availability);
        assert_eq!(stale.fully_booked_days, value(7).fully_booked_days);

        cache.finish_refresh(&key(1));
        assert_eq!(cache.lookup(&key(1), 105), CacheLookup::Fresh(value(8)));
    }

    #[test]
    fn stale_snapshot_and_marker_expire() {
        let cache = AvailabilityCache::with_ttls(600, 10);
        cache.set(key(1), value(7), 100);
        cache.preserve_previous(&key(1), 100);
        cache.mark_refresh(&key(1), RefreshState::Started, 100);
        assert_eq!(cache.refresh_state(&key(1), 109), Some(RefreshState::Started));
        assert_eq!(cache.refresh_state(&key(1), 110), None);
        assert_eq!(cache.lookup(&key(1), 110), CacheLookup::Fresh(value(7)));
    }

    #[test]
    fn nothing_to_preserve_on_miss() {
        let cache = AvailabilityCache::with_ttls(60, 10);
        assert!(!cache.preserve_previous(&key(1), 100));
        cache.mark_refresh(&key(1), RefreshState::Scheduled, 100);
        assert_eq!(cache.lookup(&key(1), 100), CacheLookup::Miss);
    }

    #[test]
    fn invalidate_by_product() {
        let cache = AvailabilityCache::with_ttls(60, 10);
        cache.set(key(1), value(7), 100);
        cache.set(key(2), value(7), 100);
        assert_eq!(cache.invalidate_product(1), 1);
        assert_eq!(cache.len(), 1);
        cache.invalidate(&key(2));
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_drops_only_expired() {
        let cache = AvailabilityCache::with_ttls(60, 10);
        cache.set(key(1), value(7), 100);
        cache.set(key(2), value(7), 150);
        cache.mark_refresh(&key(2), RefreshState::Scheduled, 150);
        assert_eq!(cache.purge_expired(165), 2);
        assert_eq!(cache.len(), 1);
    }
}
