mod aggregate;
mod buffer;
mod error;
mod normalize;

pub use buffer::buffer_day_blocks;
pub use error::AvailabilityError;
pub use normalize::{bookable_horizon, normalize_range};

use std::sync::Arc;

use crate::ports::{BookingStore, TimeSlotResolver};

/// Turns bookings and open time slots into day-level availability.
///
/// Stateless apart from its collaborators: identical inputs over unchanged
/// collaborator state give identical output.
pub struct Aggregator {
    resolver: Arc<dyn TimeSlotResolver>,
    store: Arc<dyn BookingStore>,
}

impl Aggregator {
    pub fn new(resolver: Arc<dyn TimeSlotResolver>, store: Arc<dyn BookingStore>) -> Self {
        Self { resolver, store }
    }
}
