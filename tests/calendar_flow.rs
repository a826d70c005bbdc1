use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use ulid::Ulid;

use daygrid::cache::AvailabilityCache;
use daygrid::calendar::{add_days, day_of, midnight, now_secs, DateFormat};
use daygrid::engine::Aggregator;
use daygrid::fixture::{Fixture, FixtureStore};
use daygrid::handler::CalendarHandler;
use daygrid::model::*;
use daygrid::scheduler::{run_refresh_worker, RefreshScheduler};
use daygrid::service::AvailabilityService;

// ── Test infrastructure ──────────────────────────────────────

struct Stack {
    store: Arc<FixtureStore>,
    service: Arc<AvailabilityService>,
    handler: CalendarHandler,
}

/// Full stack over fixture collaborators with a running refresh worker.
fn start_stack(store: FixtureStore) -> Stack {
    let store = Arc::new(store);
    let (scheduler, rx) = RefreshScheduler::new(64);
    let scheduler = Arc::new(scheduler);
    let service = Arc::new(AvailabilityService::new(
        Aggregator::new(store.clone(), store.clone()),
        Arc::new(AvailabilityCache::with_ttls(3600, 300)),
        scheduler.clone(),
        store.clone(),
    ));
    tokio::spawn(run_refresh_worker(service.clone(), scheduler, rx));
    let handler = CalendarHandler::new(service.clone(), store.clone());
    Stack {
        store,
        service,
        handler,
    }
}

fn key(ts: Ts) -> String {
    DateFormat::default().format(day_of(ts))
}

// 2025-03-07 .. 2025-03-10, product 7 with resources 70 and 71.
const FIXTURE: &str = r#"{
    "now": 1741219200,
    "products": [{
        "id": 7,
        "duration": 1,
        "duration_unit": "day",
        "buffer_period": 1,
        "apply_adjacent_buffer": true,
        "resources": [70, 71],
        "restricted_days": [0]
    }],
    "bookings": [
        { "product_id": 7, "resource_id": 70, "start": 1741392000, "end": 1741478399 },
        { "product_id": 7, "resource_id": 71, "start": 1741392000, "end": 1741478399 }
    ],
    "slots": [
        { "product_id": 7, "start": 1741341600, "resources": { "70": 1, "71": 1 } },
        { "product_id": 7, "start": 1741428000, "resources": { "70": 0, "71": 1 } },
        { "product_id": 7, "start": 1741514400, "resources": { "70": 1, "71": 1 } }
    ],
    "request": { "product_id": 7, "min_date": "2025-03-07", "max_date": "2025-03-10" }
}"#;

// ── Fixture-driven request ───────────────────────────────────

#[tokio::test]
async fn fixture_request_renders_calendar() {
    let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
    let stack = start_stack(FixtureStore::from_fixture(&fixture));
    let request = fixture.request.clone().unwrap();

    let response = stack
        .handler
        .find_booked_day_blocks(&request, fixture.now.unwrap())
        .await
        .unwrap();
    let value = serde_json::to_value(&response).unwrap();

    // March 8: resource 70 has no block left, 71 still has one.
    assert_eq!(value["fully_booked_days"], json!({ "2025-3-8": { "70": 1 } }));
    assert_eq!(value["partially_booked_days"], json!({ "2025-3-8": { "71": 1 } }));
    assert_eq!(value["unavailable_days"], json!({}));
    assert_eq!(value["restricted_days"], json!([0]));
    assert_eq!(value["old_availability"], json!(false));
    assert_eq!(
        value["buffer_days"],
        json!({ "2025-3-7": "2025-3-7", "2025-3-9": "2025-3-9" })
    );
}

#[tokio::test]
async fn selected_resource_filters_response() {
    let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
    let stack = start_stack(FixtureStore::from_fixture(&fixture));
    let mut request = fixture.request.clone().unwrap();
    request.resource_id = Some(71);

    let response = stack
        .handler
        .find_booked_day_blocks(&request, fixture.now.unwrap())
        .await
        .unwrap();
    assert!(response.fully_booked_days.is_empty());
    assert_eq!(response.partially_booked_days.len(), 1);
    assert!(response.buffer_days.is_empty());
}

// ── Background refresh ───────────────────────────────────────

#[tokio::test]
async fn background_refresh_replaces_cached_days() {
    let today = midnight(now_secs());
    let store = FixtureStore::new();
    store.add_product(BookableProduct::new(1, 1, DurationUnit::Day));
    for d in 1..=10 {
        store.set_slot(1, add_days(today, d) + 10 * 3600, 0, 1);
    }
    let stack = start_stack(store);

    let product = BookableProduct::new(1, 1, DurationUnit::Day);
    let query = DayBlockQuery::new(Span::new(add_days(today, 1), add_days(today, 10)));
    let read = |now: Ts| {
        let service = stack.service.clone();
        let product = product.clone();
        let query = query.clone();
        async move {
            service
                .find_booked_day_blocks(&product, &query, RequestSource::User, now)
                .await
                .unwrap()
                .unwrap()
        }
    };

    let before = read(now_secs()).await;
    assert!(before.fully_booked_days.is_empty());

    let booked_day = add_days(today, 3);
    stack.store.set_slot(1, booked_day + 10 * 3600, 0, 0);
    stack.store.add_booking(Booking {
        id: Ulid::new(),
        product_id: 1,
        resource_id: 0,
        start: booked_day,
        end: booked_day + 23 * 3600,
    });

    let scheduled = stack
        .service
        .find_booked_day_blocks(&product, &query, RequestSource::BackgroundRefresh, now_secs())
        .await
        .unwrap();
    assert!(scheduled.is_none());

    let mut after = read(now_secs()).await;
    for _ in 0..100 {
        if !after.old_availability && !after.fully_booked_days.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        after = read(now_secs()).await;
    }
    assert!(!after.old_availability);
    let rendered = after.render();
    assert!(rendered.fully_booked_days.contains_key(&key(booked_day)));
}

#[tokio::test]
async fn booking_change_drops_cached_days() {
    let fixture: Fixture = serde_json::from_str(FIXTURE).unwrap();
    let stack = start_stack(FixtureStore::from_fixture(&fixture));
    let request = fixture.request.clone().unwrap();
    let now = fixture.now.unwrap();

    let first = stack.handler.find_booked_day_blocks(&request, now).await.unwrap();
    assert_eq!(first.fully_booked_days.len(), 1);
    assert_eq!(stack.service.cache().len(), 1);

    // Resource 70 gets its March 8 block back.
    stack.store.set_slot(7, 1_741_428_000, 70, 1);
    assert_eq!(stack.service.on_booking_changed(7), 1);

    let second = stack.handler.find_booked_day_blocks(&request, now).await.unwrap();
    assert!(second.fully_booked_days.is_empty());
    assert_eq!(second.partially_booked_days.len(), 1);
}

#[test]
fn fixture_without_request_still_parses() {
    let fixture: Fixture = serde_json::from_str(r#"{ "products": [] }"#).unwrap();
    assert!(fixture.request.is_none());
    let store = FixtureStore::from_fixture(&fixture);
    let product = tokio_test::block_on(daygrid::ports::ProductCatalog::get_product(&store, 7)).unwrap();
    assert!(product.is_none());
}
