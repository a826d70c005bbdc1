use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::cache::AvailabilityCache;
use crate::calendar::now_secs;

/// Background task that periodically drops expired cache entries, previous
/// snapshots and refresh markers.
pub async fn run_cache_sweeper(cache: Arc<AvailabilityCache>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let purged = cache.purge_expired(now_secs());
        if purged > 0 {
            debug!("swept {purged} expired availability entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::DateFormat;
    use crate::cache::Fingerprint;
    use crate::model::*;

    #[tokio::test]
    async fn sweeper_purges_expired_entries() {
        let cache = Arc::new(AvailabilityCache::with_ttls(60, 10));
        let query = DayBlockQuery::new(Span::new(0, 86_400));
        cache.set(
            Fingerprint::of(1, &query),
            DayAvailability::empty(DateFormat::default()),
            now_secs() - 120,
        );
        assert_eq!(cache.len(), 1);

        let sweeper = tokio::spawn(run_cache_sweeper(cache.clone(), Duration::from_millis(10)));
        for _ in 0..50 {
            if cache.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.abort();
        assert!(cache.is_empty());
    }
}
