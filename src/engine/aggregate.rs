use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::calendar::*;
use crate::model::*;

use super::{Aggregator, AvailabilityError};

// ── Day-level aggregation ─────────────────────────────────────────

/// A booking reduced to local, midnight-aligned day bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackedBooking {
    pub start_day: Ts,
    /// Midnight of the last day, or 23:59:59 of `start_day` for same-day bookings.
    pub end_day: Ts,
    /// Actual end in local seconds.
    pub end_local: Ts,
    pub resource_id: ResourceId,
}

/// Reduce bookings to local days, dropping those outside the resource filter.
///
/// Returns `None` when nothing survives. Otherwise also returns the local-day
/// span covering every tracked booking.
pub(crate) fn track_bookings(
    bookings: &[Booking],
    query: &DayBlockQuery,
) -> Option<(Vec<TrackedBooking>, Span)> {
    let tz = query.timezone_offset;
    let mut tracked = Vec::with_capacity(bookings.len());
    let mut bounds: Option<Span> = None;

    for booking in bookings {
        if !query.selects(booking.resource_id) {
            continue;
        }
        let start_day = midnight(booking.start + tz);
        let mut end_day = midnight(booking.end + tz);
        // A same-day booking still blocks the whole day.
        if end_day == start_day {
            end_day = end_of_day(start_day);
        }

        bounds = Some(match bounds {
            Some(b) => Span::new(b.start.min(start_day), b.end.max(end_day)),
            None => Span::new(start_day, end_day),
        });
        tracked.push(TrackedBooking {
            start_day,
            end_day,
            end_local: booking.end + tz,
            resource_id: booking.resource_id,
        });
    }

    bounds.map(|b| (tracked, b))
}

/// The window handed to time-slot resolution: one day past the last booking
/// day, both ends re-aligned to midnight in the customer's timezone.
pub(crate) fn batch_window(local: Span, timezone_offset: Ts) -> Span {
    let end = add_days(local.end, 1);
    Span::new(
        midnight(local.start - timezone_offset),
        midnight(end - timezone_offset),
    )
}

/// Block the lead-in of multi-day bookings.
///
/// A new multi-day booking may not start closer than `duration + buffer - 1`
/// days before an existing one. Those days are blocked but not booked: for a
/// single-unit product they are unavailable, otherwise partially booked.
pub(crate) fn premark_day_buffer(
    product: &BookableProduct,
    tracked: &[TrackedBooking],
    out: &mut DayAvailability,
) {
    if product.duration_unit != DurationUnit::Day || product.duration <= 1 {
        return;
    }
    let sides = if product.apply_adjacent_buffer { 2 } else { 1 };
    let duration_with_buffer = i64::from(product.duration) + i64::from(product.buffer_period) * sides;
    let target = if product.qty <= 1 {
        &mut out.unavailable_days
    } else {
        &mut out.partially_booked_days
    };

    for booking in tracked {
        let mut day = add_days(booking.start_day, -(duration_with_buffer - 1));
        while day < booking.start_day {
            target.mark(day_of(day), booking.resource_id);
            day = add_days(day, 1);
        }
    }
}

/// Resource → local days that still have at least one open block.
pub(crate) fn open_days(
    slots: &ResolvedSlots,
    query: &DayBlockQuery,
) -> HashMap<ResourceId, HashSet<NaiveDate>> {
    let mut open: HashMap<ResourceId, HashSet<NaiveDate>> = HashMap::new();
    for (&block, availability) in &slots.blocks {
        let local_day = day_of(block + query.timezone_offset);
        for (&resource_id, &remaining) in &availability.resources {
            if remaining > 0 && query.selects(resource_id) {
                open.entry(resource_id).or_default().insert(local_day);
            }
        }
    }
    open
}

/// An hour-unit booking that spills past midnight does not occupy the next
/// day if that day's first block starts after the booking has ended.
pub(crate) fn ends_before_first_block(
    product: &BookableProduct,
    booking: &TrackedBooking,
    day: Ts,
) -> bool {
    if product.duration_unit != DurationUnit::Hour || day <= booking.start_day {
        return false;
    }
    let Some(first_block) = product.first_block_hhmm() else {
        return false;
    };
    same_month_day(booking.end_local, day) && first_block > hhmm(booking.end_local)
}

/// Walk every day of every booking: partially booked if the resource still
/// has an open block that day, fully booked otherwise.
pub(crate) fn classify(
    product: &BookableProduct,
    tracked: &[TrackedBooking],
    open: &HashMap<ResourceId, HashSet<NaiveDate>>,
    out: &mut DayAvailability,
) {
    for booking in tracked {
        let mut day = booking.start_day;
        while day <= booking.end_day {
            if !ends_before_first_block(product, booking, day) {
                let key = day_of(day);
                let has_slot = open
                    .get(&booking.resource_id)
                    .is_some_and(|days| days.contains(&key));
                if has_slot {
                    out.partially_booked_days.mark(key, booking.resource_id);
                } else {
                    out.fully_booked_days.mark(key, booking.resource_id);
                }
            }
            day = add_days(day, 1);
        }
    }
    // fully booked wins over partial for the same (day, resource)
    let fully = &out.fully_booked_days;
    out.partially_booked_days.subtract(fully);
}

impl Aggregator {
    /// Classify every day of `query.window` touched by a booking as partially
    /// or fully booked, and mark closed boundary days unavailable.
    ///
    /// Issues one booking query, two time-slot lookups per in-scope resource
    /// for the boundary days, and one batched lookup for the booking window.
    pub async fn aggregate(
        &self,
        product: &BookableProduct,
        query: &DayBlockQuery,
        source: RequestSource,
    ) -> Result<DayAvailability, AvailabilityError> {
        let mut result = DayAvailability::empty(query.date_format.clone());
        self.mark_closed_boundary_days(product, query, &mut result).await?;

        let bookings = self.store.get_bookings_in_range(product, query.window).await?;
        let Some((tracked, local)) = track_bookings(&bookings, query) else {
            debug!(product = product.id, "no bookings in window");
            return Ok(result);
        };

        premark_day_buffer(product, &tracked, &mut result);

        let batch = batch_window(local, query.timezone_offset);
        let slots = self.resolve_batch(product, batch, query, source).await?;
        result.old_availability = slots.old_availability;

        let open = open_days(&slots, query);
        classify(product, &tracked, &open, &mut result);

        debug!(
            product = product.id,
            bookings = tracked.len(),
            blocks = slots.blocks.len(),
            fully = result.fully_booked_days.len(),
            partially = result.partially_booked_days.len(),
            "aggregated booked days"
        );
        Ok(result)
    }

    /// The first day may close early because of the minimum lead time, the
    /// last day because of the maximum. A boundary day with no open block is
    /// unavailable for the product and all of its resources.
    async fn mark_closed_boundary_days(
        &self,
        product: &BookableProduct,
        query: &DayBlockQuery,
        out: &mut DayAvailability,
    ) -> Result<(), AvailabilityError> {
        let window = query.window;
        let first_day = Span::new(window.start, end_of_day(window.start));
        let last_day = Span::new(midnight(window.end), window.end);

        let in_scope = if query.resource_ids.is_empty() {
            vec![PRODUCT_LEVEL]
        } else {
            query.resource_ids.clone()
        };

        for resource_id in in_scope {
            if !self.has_open_block(product, first_day, resource_id).await? {
                mark_unavailable_everywhere(product, day_of(window.start), resource_id, out);
            }

            // Window already reset to the start of its last day by the caller.
            if window.end == last_day.start {
                continue;
            }

            if !self.has_open_block(product, last_day, resource_id).await? {
                mark_unavailable_everywhere(product, day_of(window.end), resource_id, out);
            }
        }
        Ok(())
    }

    async fn has_open_block(
        &self,
        product: &BookableProduct,
        span: Span,
        resource_id: ResourceId,
    ) -> Result<bool, AvailabilityError> {
        let blocks = self
            .resolver
            .get_blocks_in_range(product, span, &[], resource_id)
            .await?;
        if blocks.is_empty() {
            return Ok(false);
        }
        let slot_query = SlotQuery {
            resource_id,
            span,
            is_admin: false,
            timezone_offset: 0,
            source: RequestSource::User,
        };
        let slots = self
            .resolver
            .resolve_time_slots(product, &blocks, &[], &slot_query)
            .await?;
        Ok(slots.has_open_block())
    }

    /// One block lookup for the product over the whole batch window. Products
    /// that are closed by default and let customers pick a resource also need
    /// each resource's own blocks.
    async fn resolve_batch(
        &self,
        product: &BookableProduct,
        batch: Span,
        query: &DayBlockQuery,
        source: RequestSource,
    ) -> Result<ResolvedSlots, AvailabilityError> {
        let mut blocks = self
            .resolver
            .get_blocks_in_range(product, batch, &[], PRODUCT_LEVEL)
            .await?;

        if !product.default_availability
            && product.has_resources()
            && product.resource_assignment != ResourceAssignment::Automatic
        {
            for &resource_id in &product.resources {
                let resource_blocks = self
                    .resolver
                    .get_blocks_in_range(product, batch, &[], resource_id)
                    .await?;
                blocks.extend(resource_blocks);
            }
        }

        let slot_query = SlotQuery {
            resource_id: PRODUCT_LEVEL,
            span: batch,
            is_admin: false,
            timezone_offset: query.timezone_offset,
            source,
        };
        Ok(self
            .resolver
            .resolve_time_slots(product, &blocks, &[], &slot_query)
            .await?)
    }
}

fn mark_unavailable_everywhere(
    product: &BookableProduct,
    day: NaiveDate,
    resource_id: ResourceId,
    out: &mut DayAvailability,
) {
    out.unavailable_days.mark(day, PRODUCT_LEVEL);
    out.unavailable_days.mark(day, resource_id);
    for &r in &product.resources {
        out.unavailable_days.mark(day, r);
    }
}
