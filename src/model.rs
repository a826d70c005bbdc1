use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar::DateFormat;

/// Unix seconds.
pub type Ts = i64;

/// Product or sub-resource id. `0` is the product itself.
pub type ResourceId = u64;

/// Resource id meaning "the product itself, no sub-resource".
pub const PRODUCT_LEVEL: ResourceId = 0;

/// Closed interval `[start, end]` in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ts,
    pub end: Ts,
}

impl Span {
    pub fn new(start: Ts, end: Ts) -> Self {
        Self { start, end }
    }

    pub fn width(&self) -> Ts {
        self.end.saturating_sub(self.start)
    }

    pub fn intersects(&self, start: Ts, end: Ts) -> bool {
        start <= self.end && end >= self.start
    }

    pub fn contains_instant(&self, t: Ts) -> bool {
        self.start <= t && t <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Minute,
    Hour,
    Day,
}

impl DurationUnit {
    pub fn minutes(self) -> i64 {
        match self {
            DurationUnit::Minute => 1,
            DurationUnit::Hour => 60,
            DurationUnit::Day => 1440,
        }
    }

    /// Buffer days only make sense for units of a day or longer.
    pub fn is_sub_day(self) -> bool {
        matches!(self, DurationUnit::Minute | DurationUnit::Hour)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeadUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

/// How far from "now" a booking may start, e.g. `{ value: 1, unit: "month" }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeadTime {
    pub value: u32,
    pub unit: LeadUnit,
}

impl LeadTime {
    pub fn new(value: u32, unit: LeadUnit) -> Self {
        Self { value, unit }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceAssignment {
    /// The customer picks a sub-resource.
    #[default]
    Customer,
    Automatic,
}

fn default_one() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_min_lead() -> LeadTime {
    LeadTime::new(0, LeadUnit::Day)
}

fn default_max_lead() -> LeadTime {
    LeadTime::new(12, LeadUnit::Month)
}

/// A bookable product. Immutable for the duration of one aggregation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookableProduct {
    pub id: ResourceId,
    #[serde(default = "default_one")]
    pub duration: u32,
    pub duration_unit: DurationUnit,
    /// Concurrent capacity.
    #[serde(default = "default_one")]
    pub qty: u32,
    /// Mandatory gap in `duration_unit`s enforced next to a booking.
    #[serde(default)]
    pub buffer_period: u32,
    /// Buffer applies on both sides of a booking, not just after it.
    #[serde(default)]
    pub apply_adjacent_buffer: bool,
    #[serde(default = "default_min_lead")]
    pub min_date: LeadTime,
    #[serde(default = "default_max_lead")]
    pub max_date: LeadTime,
    /// `"HH:MM"` start of the first block of the day, hour-unit products only.
    #[serde(default)]
    pub first_block_time: Option<String>,
    #[serde(default)]
    pub resources: Vec<ResourceId>,
    /// Weekday numbers (0 = Sunday) on which bookings may not start.
    #[serde(default)]
    pub restricted_days: Option<Vec<u8>>,
    #[serde(default)]
    pub resource_assignment: ResourceAssignment,
    #[serde(default = "default_true")]
    pub default_availability: bool,
}

impl BookableProduct {
    pub fn new(id: ResourceId, duration: u32, duration_unit: DurationUnit) -> Self {
        Self {
            id,
            duration,
            duration_unit,
            qty: 1,
            buffer_period: 0,
            apply_adjacent_buffer: false,
            min_date: default_min_lead(),
            max_date: default_max_lead(),
            first_block_time: None,
            resources: Vec::new(),
            restricted_days: None,
            resource_assignment: ResourceAssignment::Customer,
            default_availability: true,
        }
    }

    pub fn has_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    pub fn has_restricted_days(&self) -> bool {
        self.restricted_days.as_ref().is_some_and(|d| !d.is_empty())
    }

    /// Length of one bookable slot in minutes.
    pub fn time_interval_minutes(&self) -> i64 {
        i64::from(self.duration) * self.duration_unit.minutes()
    }

    /// First block time as a `HHMM` number, e.g. `"09:30"` → `930`.
    pub fn first_block_hhmm(&self) -> Option<u32> {
        let raw = self.first_block_time.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        let (h, m) = raw.split_once(':').unwrap_or((raw, "0"));
        let h: u32 = h.trim().parse().ok()?;
        let m: u32 = m.trim().parse().ok()?;
        (h < 24 && m < 60).then_some(h * 100 + m)
    }
}

/// An existing reservation. Read-only input to aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(default = "Ulid::new")]
    pub id: Ulid,
    pub product_id: ResourceId,
    #[serde(default)]
    pub resource_id: ResourceId,
    pub start: Ts,
    pub end: Ts,
}

/// Where a `find_booked_day_blocks` call comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestSource {
    #[default]
    User,
    /// Schedule a recomputation instead of computing synchronously.
    BackgroundRefresh,
}

/// Remaining capacity of one block, per resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAvailability {
    pub resources: BTreeMap<ResourceId, u32>,
}

impl BlockAvailability {
    pub fn is_open(&self) -> bool {
        self.resources.values().any(|&n| n > 0)
    }
}

/// Output of time-slot resolution, keyed by block start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSlots {
    pub blocks: BTreeMap<Ts, BlockAvailability>,
    /// The resolver answered from a superseded snapshot.
    pub old_availability: bool,
}

impl ResolvedSlots {
    pub fn has_open_block(&self) -> bool {
        self.blocks.values().any(BlockAvailability::is_open)
    }
}

/// Parameters of a time-slot resolution call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotQuery {
    pub resource_id: ResourceId,
    pub span: Span,
    pub is_admin: bool,
    pub timezone_offset: Ts,
    pub source: RequestSource,
}

/// Rendered form of a [`DayBlockMap`]: `{ "2025-3-7": { "0": 1 } }`.
pub type RenderedDays = BTreeMap<String, BTreeMap<ResourceId, u8>>;

/// Calendar day → set of resources carrying the marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayBlockMap {
    days: BTreeMap<NaiveDate, BTreeSet<ResourceId>>,
}

impl DayBlockMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, day: NaiveDate, resource_id: ResourceId) {
        self.days.entry(day).or_default().insert(resource_id);
    }

    /// Drop one mark. A day left with no resources disappears.
    pub fn unmark(&mut self, day: NaiveDate, resource_id: ResourceId) {
        if let Some(resources) = self.days.get_mut(&day) {
            resources.remove(&resource_id);
            if resources.is_empty() {
                self.days.remove(&day);
            }
        }
    }

    /// Drop every mark also present in `other`.
    pub fn subtract(&mut self, other: &DayBlockMap) {
        for (day, resources) in &other.days {
            for &r in resources {
                self.unmark(*day, r);
            }
        }
    }

    pub fn contains(&self, day: NaiveDate, resource_id: ResourceId) -> bool {
        self.days.get(&day).is_some_and(|r| r.contains(&resource_id))
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.days.contains_key(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Number of distinct days.
    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.days.keys().copied()
    }

    pub fn resources_on(&self, day: NaiveDate) -> impl Iterator<Item = ResourceId> + '_ {
        self.days.get(&day).into_iter().flatten().copied()
    }

    pub fn render(&self, format: &DateFormat) -> RenderedDays {
        let mut out = RenderedDays::new();
        for (day, resources) in &self.days {
            let entry = out.entry(format.format(*day)).or_default();
            for &r in resources {
                entry.insert(r, 1);
            }
        }
        out
    }
}

/// Days that must render as blocked because of the buffer period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferDays {
    days: BTreeSet<NaiveDate>,
}

impl BufferDays {
    pub fn insert(&mut self, day: NaiveDate) {
        self.days.insert(day);
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.days.contains(&day)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn render(&self, format: &DateFormat) -> BTreeMap<String, String> {
        self.days
            .iter()
            .map(|d| {
                let key = format.format(*d);
                (key.clone(), key)
            })
            .collect()
    }
}

/// A day-level availability request for one product.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DayBlockQuery {
    pub window: Span,
    pub date_format: DateFormat,
    /// Customer timezone offset in seconds.
    pub timezone_offset: Ts,
    /// Sub-resource filter. Empty means the product itself.
    pub resource_ids: Vec<ResourceId>,
}

impl DayBlockQuery {
    pub fn new(window: Span) -> Self {
        Self {
            window,
            date_format: DateFormat::default(),
            timezone_offset: 0,
            resource_ids: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resource_ids: Vec<ResourceId>) -> Self {
        self.resource_ids = resource_ids;
        self
    }

    pub fn with_timezone_offset_hours(mut self, hours: f64) -> Self {
        self.timezone_offset = crate::calendar::hours_to_offset(hours);
        self
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    /// True when `resource_id` passes the sub-resource filter.
    pub fn selects(&self, resource_id: ResourceId) -> bool {
        self.resource_ids.is_empty() || self.resource_ids.contains(&resource_id)
    }
}

/// Result of one aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    pub date_format: DateFormat,
    pub partially_booked_days: DayBlockMap,
    pub fully_booked_days: DayBlockMap,
    pub unavailable_days: DayBlockMap,
    /// Served from a superseded snapshot rather than a fresh computation.
    pub old_availability: bool,
}

impl DayAvailability {
    pub fn empty(date_format: DateFormat) -> Self {
        Self {
            date_format,
            partially_booked_days: DayBlockMap::new(),
            fully_booked_days: DayBlockMap::new(),
            unavailable_days: DayBlockMap::new(),
            old_availability: false,
        }
    }

    pub fn render(&self) -> RenderedAvailability {
        RenderedAvailability {
            partially_booked_days: self.partially_booked_days.render(&self.date_format),
            fully_booked_days: self.fully_booked_days.render(&self.date_format),
            unavailable_days: self.unavailable_days.render(&self.date_format),
            old_availability: self.old_availability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedAvailability {
    pub partially_booked_days: RenderedDays,
    pub fully_booked_days: RenderedDays,
    pub unavailable_days: RenderedDays,
    pub old_availability: bool,
}
