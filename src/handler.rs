//! Calendar request handling at the transport boundary.
//!
//! Raw request parameters come in as loosely typed strings; the response is
//! the JSON document a booking calendar widget renders from.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::debug;

use crate::calendar::{parse_timezone_offset, DateFormat};
use crate::engine::{normalize_range, AvailabilityError};
use crate::model::*;
use crate::ports::ProductCatalog;
use crate::service::AvailabilityService;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CalendarRequest {
    #[serde(default)]
    pub product_id: Option<ResourceId>,
    /// Restricts the result to one sub-resource.
    #[serde(default)]
    pub resource_id: Option<ResourceId>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub min_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub max_date: Option<String>,
    /// Hours from UTC, decimals allowed.
    #[serde(default, deserialize_with = "lenient_string")]
    pub timezone_offset: Option<String>,
}

/// Accept strings and bare numbers alike.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<serde_json::Value>::deserialize(d)? {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarResponse {
    pub min_date: Ts,
    pub max_date: Ts,
    pub partially_booked_days: RenderedDays,
    pub fully_booked_days: RenderedDays,
    pub unavailable_days: RenderedDays,
    /// Weekdays bookings may not start on, or `false`.
    #[serde(serialize_with = "days_or_false")]
    pub restricted_days: Option<Vec<u8>>,
    pub old_availability: bool,
    pub buffer_days: BTreeMap<String, String>,
}

fn days_or_false<S: Serializer>(days: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
    match days {
        Some(days) => days.serialize(s),
        None => s.serialize_bool(false),
    }
}

impl CalendarResponse {
    fn empty(now: Ts) -> Self {
        Self {
            min_date: now,
            max_date: now,
            partially_booked_days: RenderedDays::new(),
            fully_booked_days: RenderedDays::new(),
            unavailable_days: RenderedDays::new(),
            restricted_days: None,
            old_availability: false,
            buffer_days: BTreeMap::new(),
        }
    }
}

pub struct CalendarHandler {
    service: Arc<AvailabilityService>,
    catalog: Arc<dyn ProductCatalog>,
    date_format: DateFormat,
}

impl CalendarHandler {
    pub fn new(service: Arc<AvailabilityService>, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self {
            service,
            catalog,
            date_format: DateFormat::default(),
        }
    }

    pub fn with_date_format(mut self, date_format: DateFormat) -> Self {
        self.date_format = date_format;
        self
    }

    /// Answer one calendar request.
    ///
    /// Fails only when the product id is missing or a collaborator fails. An
    /// unknown product yields an empty response.
    pub async fn find_booked_day_blocks(
        &self,
        request: &CalendarRequest,
        now: Ts,
    ) -> Result<CalendarResponse, AvailabilityError> {
        let product_id = request
            .product_id
            .filter(|&id| id != PRODUCT_LEVEL)
            .ok_or(AvailabilityError::MissingProduct)?;
        let Some(product) = self.catalog.get_product(product_id).await? else {
            debug!(product = product_id, "unknown product, empty calendar");
            return Ok(CalendarResponse::empty(now));
        };

        let window = normalize_range(
            &product,
            request.min_date.as_deref(),
            request.max_date.as_deref(),
            now,
        );
        let mut query = DayBlockQuery::new(window)
            .with_date_format(self.date_format.clone())
            .with_resources(
                request
                    .resource_id
                    .filter(|&id| id != PRODUCT_LEVEL)
                    .into_iter()
                    .collect(),
            );
        query.timezone_offset = request
            .timezone_offset
            .as_deref()
            .map(parse_timezone_offset)
            .unwrap_or(0);

        let booked = self
            .service
            .find_booked_day_blocks(&product, &query, RequestSource::User, now)
            .await?
            .unwrap_or_else(|| DayAvailability::empty(self.date_format.clone()));
        let buffer_days = self
            .service
            .get_buffer_day_blocks_for_booked_days(&product, &booked.fully_booked_days);
        let rendered = booked.render();

        Ok(CalendarResponse {
            min_date: window.start,
            max_date: window.end,
            partially_booked_days: rendered.partially_booked_days,
            fully_booked_days: rendered.fully_booked_days,
            unavailable_days: rendered.unavailable_days,
            restricted_days: product
                .restricted_days
                .clone()
                .filter(|_| product.has_restricted_days()),
            old_availability: rendered.old_availability,
            buffer_days: buffer_days.render(&self.date_format),
        })
    }
}
