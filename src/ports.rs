//! Collaborators the availability core consumes.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::cache::Fingerprint;
use crate::engine::AvailabilityError;
use crate::model::*;
use crate::scheduler::RefreshJob;

/// A collaborator call failed. Propagated to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{collaborator} failed: {message}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, message: impl Into<String>) -> Self {
        Self {
            collaborator,
            message: message.into(),
        }
    }
}

/// Applies recurring availability rules and existing reservations to produce
/// the bookable blocks still open.
#[async_trait]
pub trait TimeSlotResolver: Send + Sync {
    /// Block start times inside `span` after availability rules. `rules` are
    /// extra blocking intervals; `resource_id` 0 means the product itself.
    async fn get_blocks_in_range(
        &self,
        product: &BookableProduct,
        span: Span,
        rules: &[Span],
        resource_id: ResourceId,
    ) -> Result<BTreeSet<Ts>, CollaboratorError>;

    /// Remaining capacity per block and resource after existing bookings.
    async fn resolve_time_slots(
        &self,
        product: &BookableProduct,
        blocks: &BTreeSet<Ts>,
        rules: &[Span],
        query: &SlotQuery,
    ) -> Result<ResolvedSlots, CollaboratorError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookings of `product` intersecting `span`.
    async fn get_bookings_in_range(
        &self,
        product: &BookableProduct,
        span: Span,
    ) -> Result<Vec<Booking>, CollaboratorError>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    /// `None` when the id is unknown or not a bookable product.
    async fn get_product(&self, id: ResourceId) -> Result<Option<BookableProduct>, CollaboratorError>;
}

/// Runs refresh jobs outside the request path.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// A job for this fingerprint is queued and has not started yet.
    async fn has_scheduled(&self, fingerprint: &Fingerprint) -> bool;

    async fn schedule(&self, run_at: Ts, job: RefreshJob) -> Result<(), AvailabilityError>;
}
