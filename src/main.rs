use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::EnvFilter;

use daygrid::cache::AvailabilityCache;
use daygrid::calendar::now_secs;
use daygrid::config::Settings;
use daygrid::engine::Aggregator;
use daygrid::fixture::{Fixture, FixtureStore};
use daygrid::handler::CalendarHandler;
use daygrid::reaper::run_cache_sweeper;
use daygrid::scheduler::{run_refresh_worker, RefreshScheduler};
use daygrid::service::AvailabilityService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    daygrid::observability::init(settings.metrics_port)?;

    let path = std::env::args()
        .nth(1)
        .or_else(|| settings.fixture.clone())
        .ok_or("usage: daygrid <fixture.json> (or set DAYGRID_FIXTURE)")?;
    let raw = tokio::fs::read_to_string(&path).await?;
    let fixture: Fixture = serde_json::from_str(&raw)?;
    let request = fixture.request.clone().ok_or("fixture has no request")?;
    let now = fixture.now.unwrap_or_else(now_secs);

    info!("daygrid serving {path}");
    info!("  products: {}", fixture.products.len());
    info!("  bookings: {}", fixture.bookings.len());
    info!("  cache ttl: {}s (previous {}s)", settings.cache_ttl_secs, settings.previous_ttl_secs);
    info!("  date format: {}", settings.date_format.pattern());

    let store = Arc::new(FixtureStore::from_fixture(&fixture));
    let cache = Arc::new(AvailabilityCache::new(&settings));
    let (scheduler, rx) = RefreshScheduler::new(settings.refresh_queue);
    let scheduler = Arc::new(scheduler);
    let service = Arc::new(AvailabilityService::new(
        Aggregator::new(store.clone(), store.clone()),
        cache.clone(),
        scheduler.clone(),
        store.clone(),
    ));

    tokio::spawn(run_refresh_worker(service.clone(), scheduler, rx));
    tokio::spawn(run_cache_sweeper(cache, Duration::from_secs(60)));

    let handler = CalendarHandler::new(service, store).with_date_format(settings.date_format.clone());
    let response = handler.find_booked_day_blocks(&request, now).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
