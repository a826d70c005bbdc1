use crate::model::Ts;

pub const MINUTE_IN_SECONDS: Ts = 60;
pub const HOUR_IN_SECONDS: Ts = 3_600;
pub const DAY_IN_SECONDS: Ts = 86_400;

/// Default TTL of a freshly computed availability entry.
pub const DEFAULT_CACHE_TTL_SECS: Ts = HOUR_IN_SECONDS;

/// TTL of the "previous" snapshot served while a refresh is in flight,
/// and of the in-flight marker itself.
pub const PREVIOUS_AVAILABILITY_TTL_SECS: Ts = 5 * MINUTE_IN_SECONDS;

/// Default capacity of the refresh job queue.
pub const DEFAULT_REFRESH_QUEUE: usize = 1024;

/// Widest aggregation window accepted (~5 years).
pub const MAX_WINDOW_SECS: Ts = 5 * 366 * DAY_IN_SECONDS;

/// Timezone offsets beyond this many hours are treated as malformed.
pub const MAX_TIMEZONE_OFFSET_HOURS: f64 = 14.0;

/// Default date-key pattern: numeric year-month-day, no zero padding.
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%-m-%-d";
