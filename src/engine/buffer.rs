use chrono::Days;

use crate::model::*;

/// Days adjacent to fully booked days that must stay blocked for the
/// product's buffer period (cleaning, turnaround).
///
/// The buffer follows the last day of each run of fully booked days; with an
/// adjacent buffer it also precedes the first day of each run. Sub-day
/// products get no buffer days.
pub fn buffer_day_blocks(product: &BookableProduct, fully_booked_days: &DayBlockMap) -> BufferDays {
    let mut buffer = BufferDays::default();
    if product.duration_unit.is_sub_day() || product.buffer_period == 0 {
        return buffer;
    }
    let period = u64::from(product.buffer_period);

    for day in fully_booked_days.days() {
        let run_ends = day
            .checked_add_days(Days::new(1))
            .is_some_and(|next| !fully_booked_days.contains_day(next));
        if !run_ends {
            continue;
        }
        for i in 1..=period {
            if let Some(d) = day.checked_add_days(Days::new(i)) {
                buffer.insert(d);
            }
        }
    }

    if product.apply_adjacent_buffer {
        for day in fully_booked_days.days() {
            let run_starts = day
                .checked_sub_days(Days::new(1))
                .is_some_and(|prev| !fully_booked_days.contains_day(prev));
            if !run_starts {
                continue;
            }
            for i in 1..=period {
                if let Some(d) = day.checked_sub_days(Days::new(i)) {
                    buffer.insert(d);
                }
            }
        }
    }

    buffer
}
