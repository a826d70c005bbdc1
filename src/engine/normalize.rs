use crate::calendar::{add_lead_time, parse_caller_date};
use crate::limits::MINUTE_IN_SECONDS;
use crate::model::*;

/// The window a product can be booked in right now.
///
/// The lower bound is pulled back by the buffer so bookings that collide with
/// the buffer are still visible to aggregation.
pub fn bookable_horizon(product: &BookableProduct, now: Ts) -> Span {
    let buffer_secs =
        product.time_interval_minutes() * i64::from(product.buffer_period) * MINUTE_IN_SECONDS;
    let min = add_lead_time(now, product.min_date).saturating_sub(buffer_secs);
    let max = add_lead_time(now, product.max_date);
    Span::new(min, max)
}

/// Clip a caller-requested window to the bookable horizon.
///
/// A requested bound is honoured only when it parses and lies strictly inside
/// the horizon; anything else silently falls back to the computed bound. An
/// inverted result falls back to the whole horizon.
pub fn normalize_range(
    product: &BookableProduct,
    requested_min: Option<&str>,
    requested_max: Option<&str>,
    now: Ts,
) -> Span {
    let horizon = bookable_horizon(product, now);
    let inside = |t: &Ts| *t > horizon.start && *t < horizon.end;
    let min = requested_min
        .and_then(parse_caller_date)
        .filter(inside)
        .unwrap_or(horizon.start);
    let max = requested_max
        .and_then(parse_caller_date)
        .filter(inside)
        .unwrap_or(horizon.end);
    if min > max {
        return horizon;
    }
    Span::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::add_days;
    use crate::limits::*;

    // 2025-03-07 10:00:00 UTC
    const NOW: Ts = 1_741_305_600 + 10 * HOUR_IN_SECONDS;

    fn product() -> BookableProduct {
        let mut p = BookableProduct::new(1, 1, DurationUnit::Day);
        p.min_date = LeadTime::new(1, LeadUnit::Day);
        p.max_date = LeadTime::new(30, LeadUnit::Day);
        p
    }

    #[test]
    fn horizon_from_lead_times() {
        let h = bookable_horizon(&product(), NOW);
        assert_eq!(h, Span::new(add_days(NOW, 1), add_days(NOW, 30)));
    }

    #[test]
    fn buffer_widens_lower_bound() {
        let mut p = BookableProduct::new(1, 2, DurationUnit::Hour);
        p.buffer_period = 1;
        let h = bookable_horizon(&p, NOW);
        // 120-minute slots, one slot of buffer
        assert_eq!(h.start, NOW - 2 * HOUR_IN_SECONDS);
    }

    #[test]
    fn requested_bounds_honoured_inside_horizon() {
        let span = normalize_range(&product(), Some("2025-03-10"), Some("2025-03-20"), NOW);
        assert_eq!(span.start, 1_741_305_600 + 3 * DAY_IN_SECONDS);
        assert_eq!(span.end, 1_741_305_600 + 13 * DAY_IN_SECONDS);
    }

    #[test]
    fn requested_bounds_outside_horizon_ignored() {
        let span = normalize_range(&product(), Some("2025-03-01"), Some("2026-01-01"), NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
    }

    #[test]
    fn bounds_on_the_wrong_side_ignored() {
        // min past the horizon end, max before its start
        let span = normalize_range(&product(), Some("2026-06-01"), Some("2025-01-01"), NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
        let span = normalize_range(&product(), None, Some("-9223372036854775808"), NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
    }

    #[test]
    fn inverted_request_uses_whole_horizon() {
        let span = normalize_range(&product(), Some("2025-03-20"), Some("2025-03-10"), NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
    }

    #[test]
    fn malformed_input_falls_back_silently() {
        let span = normalize_range(&product(), Some("garbage"), Some(""), NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
        let span = normalize_range(&product(), None, None, NOW);
        assert_eq!(span, bookable_horizon(&product(), NOW));
    }
}
