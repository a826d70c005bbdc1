//! In-memory collaborators backed by a JSON snapshot.
//!
//! The slot table is static: it answers time-slot resolution from a table of
//! `block start → remaining capacity per resource` rather than applying
//! availability rules itself.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;

use crate::handler::CalendarRequest;
use crate::model::*;
use crate::ports::{BookingStore, CollaboratorError, ProductCatalog, TimeSlotResolver};

/// One row of the slot table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlotRow {
    pub product_id: ResourceId,
    pub start: Ts,
    pub resources: BTreeMap<ResourceId, u32>,
}

/// File format read by the binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub products: Vec<BookableProduct>,
    #[serde(default)]
    pub bookings: Vec<Booking>,
    #[serde(default)]
    pub slots: Vec<SlotRow>,
    #[serde(default)]
    pub request: Option<CalendarRequest>,
    /// Fixed clock for reproducible output.
    #[serde(default)]
    pub now: Option<Ts>,
}

#[derive(Default)]
pub struct FixtureStore {
    products: DashMap<ResourceId, BookableProduct>,
    bookings: DashMap<ResourceId, Vec<Booking>>,
    slots: DashMap<ResourceId, BTreeMap<Ts, BlockAvailability>>,
    block_queries: AtomicUsize,
    slot_resolutions: AtomicUsize,
    booking_queries: AtomicUsize,
    old_availability: AtomicBool,
    fail_bookings: AtomicBool,
}

impl FixtureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: &Fixture) -> Self {
        let store = Self::new();
        for product in &fixture.products {
            store.add_product(product.clone());
        }
        for booking in &fixture.bookings {
            store.add_booking(booking.clone());
        }
        for row in &fixture.slots {
            for (&resource_id, &remaining) in &row.resources {
                store.set_slot(row.product_id, row.start, resource_id, remaining);
            }
        }
        store
    }

    pub fn add_product(&self, product: BookableProduct) {
        self.products.insert(product.id, product);
    }

    pub fn add_booking(&self, booking: Booking) {
        self.bookings.entry(booking.product_id).or_default().push(booking);
    }

    /// Drop a booking. Returns false if it was not present.
    pub fn cancel_booking(&self, product_id: ResourceId, id: ulid::Ulid) -> bool {
        let Some(mut list) = self.bookings.get_mut(&product_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|b| b.id != id);
        list.len() != before
    }

    pub fn set_slot(&self, product_id: ResourceId, start: Ts, resource_id: ResourceId, remaining: u32) {
        self.slots
            .entry(product_id)
            .or_default()
            .entry(start)
            .or_default()
            .resources
            .insert(resource_id, remaining);
    }

    /// Make the resolver report its answers as coming from a stale snapshot.
    pub fn set_old_availability(&self, old: bool) {
        self.old_availability.store(old, Ordering::Relaxed);
    }

    /// Make the booking store fail every call.
    pub fn fail_bookings(&self, fail: bool) {
        self.fail_bookings.store(fail, Ordering::Relaxed);
    }

    pub fn block_queries(&self) -> usize {
        self.block_queries.load(Ordering::Relaxed)
    }

    pub fn slot_resolutions(&self) -> usize {
        self.slot_resolutions.load(Ordering::Relaxed)
    }

    pub fn booking_queries(&self) -> usize {
        self.booking_queries.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TimeSlotResolver for FixtureStore {
    async fn get_blocks_in_range(
        &self,
        product: &BookableProduct,
        span: Span,
        rules: &[Span],
        resource_id: ResourceId,
    ) -> Result<BTreeSet<Ts>, CollaboratorError> {
        self.block_queries.fetch_add(1, Ordering::Relaxed);
        let Some(table) = self.slots.get(&product.id) else {
            return Ok(BTreeSet::new());
        };
        if span.start > span.end {
            return Ok(BTreeSet::new());
        }
        Ok(table
            .range(span.start..=span.end)
            .filter(|(start, _)| !rules.iter().any(|r| r.contains_instant(**start)))
            .filter(|(_, block)| {
                resource_id == PRODUCT_LEVEL || block.resources.contains_key(&resource_id)
            })
            .map(|(start, _)| *start)
            .collect())
    }

    async fn resolve_time_slots(
        &self,
        product: &BookableProduct,
        blocks: &BTreeSet<Ts>,
        _rules: &[Span],
        query: &SlotQuery,
    ) -> Result<ResolvedSlots, CollaboratorError> {
        self.slot_resolutions.fetch_add(1, Ordering::Relaxed);
        let mut resolved = ResolvedSlots {
            old_availability: self.old_availability.load(Ordering::Relaxed),
            ..Default::default()
        };
        let Some(table) = self.slots.get(&product.id) else {
            return Ok(resolved);
        };
        for start in blocks.iter().filter(|t| query.span.contains_instant(**t)) {
            let Some(block) = table.get(start) else {
                continue;
            };
            let block = if query.resource_id == PRODUCT_LEVEL {
                block.clone()
            } else {
                BlockAvailability {
                    resources: block
                        .resources
                        .iter()
                        .filter(|(r, _)| **r == query.resource_id)
                        .map(|(r, n)| (*r, *n))
                        .collect(),
                }
            };
            resolved.blocks.insert(*start, block);
        }
        Ok(resolved)
    }
}

#[async_trait]
impl BookingStore for FixtureStore {
    async fn get_bookings_in_range(
        &self,
        product: &BookableProduct,
        span: Span,
    ) -> Result<Vec<Booking>, CollaboratorError> {
        self.booking_queries.fetch_add(1, Ordering::Relaxed);
        if self.fail_bookings.load(Ordering::Relaxed) {
            return Err(CollaboratorError::new("booking store", "unavailable"));
        }
        Ok(self
            .bookings
            .get(&product.id)
            .map(|list| {
                list.iter()
                    .filter(|b| span.intersects(b.start, b.end))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ProductCatalog for FixtureStore {
    async fn get_product(&self, id: ResourceId) -> Result<Option<BookableProduct>, CollaboratorError> {
        Ok(self.products.get(&id).map(|p| p.value().clone()))
    }
}
