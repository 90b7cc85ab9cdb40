//! Slot availability and overlap detection.
//!
//! Everything here is a pure function of its inputs: the caller fetches the
//! day's bookings from the store and hands over a snapshot. The public slot
//! picker and the admin manual-booking form both go through [`find_conflict`],
//! so the two flows always agree on what counts as an overlap.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::models::{Booking, Service, ShopConfig};

/// Turnaround time appended after every service.
pub const CLEANUP_BUFFER_MINUTES: i64 = 15;
pub const SLOT_INTERVAL_MINUTES: i64 = 30;
/// Used for bookings whose service is no longer in the catalog.
pub const FALLBACK_BOOKED_MINUTES: i64 = 60;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Slot {
    pub label: String,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SlotQuery<'a> {
    pub date: NaiveDate,
    pub required_minutes: i64,
    pub config: &'a ShopConfig,
    pub catalog: &'a [Service],
    pub bookings: &'a [Booking],
    pub tz: Tz,
    pub now: DateTime<Utc>,
}

pub fn required_minutes(service: &Service) -> i64 {
    service.duration_minutes + CLEANUP_BUFFER_MINUTES
}

/// Half-open interval test: `[a_start, a_end)` and `[b_start, b_end)` overlap
/// iff each starts before the other ends. Touching endpoints do not overlap.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

fn booked_interval(booking: &Booking, catalog: &[Service]) -> (DateTime<Utc>, DateTime<Utc>) {
    let minutes = catalog
        .iter()
        .find(|s| s.name == booking.service_name)
        .map(required_minutes)
        .unwrap_or(FALLBACK_BOOKED_MINUTES);
    (
        booking.start_time,
        booking.start_time + Duration::minutes(minutes),
    )
}

/// Returns the first blocking booking that overlaps `[start, start + required)`.
///
/// Cancelled, completed and no-show bookings never block. `exclude_id` skips the
/// booking currently being edited so it cannot conflict with itself.
pub fn find_conflict<'a>(
    start: DateTime<Utc>,
    required_minutes: i64,
    bookings: &'a [Booking],
    catalog: &[Service],
    exclude_id: Option<&str>,
) -> Option<&'a Booking> {
    let end = start + Duration::minutes(required_minutes);
    bookings
        .iter()
        .filter(|b| b.status.blocks_slot())
        .filter(|b| exclude_id != Some(b.id.as_str()))
        .find(|b| {
            let (booked_start, booked_end) = booked_interval(b, catalog);
            overlaps(start, end, booked_start, booked_end)
        })
}

fn local_instant(tz: Tz, date: NaiveDate, minutes_from_midnight: i64) -> Option<DateTime<Utc>> {
    let hour = u32::try_from(minutes_from_midnight / 60).ok()?;
    let minute = u32::try_from(minutes_from_midnight % 60).ok()?;
    let naive = date.and_hms_opt(hour, minute, 0)?;
    // Ambiguous wall times (DST fall-back) take the earlier instant; times
    // inside a DST gap do not exist and yield None.
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Bookable start times for one tenant-local day, in ascending order.
pub fn available_slots(query: &SlotQuery<'_>) -> Vec<Slot> {
    let config = query.config;
    if config.is_closed_on(query.date.weekday().num_days_from_sunday()) {
        return Vec::new();
    }

    let today = query.now.with_timezone(&query.tz).date_naive();
    if query.date < today {
        return Vec::new();
    }
    let is_today = query.date == today;

    let open = i64::from(config.open_hour) * 60;
    let close = i64::from(config.close_hour) * 60;
    let Some(closing) = local_instant(query.tz, query.date, close) else {
        return Vec::new();
    };

    let mut slots = Vec::new();
    let mut minutes = open;
    while minutes < close {
        let offset = minutes;
        minutes += SLOT_INTERVAL_MINUTES;

        let Some(start) = local_instant(query.tz, query.date, offset) else {
            continue;
        };
        if is_today && start < query.now {
            continue;
        }
        if start + Duration::minutes(query.required_minutes) > closing {
            continue;
        }
        if find_conflict(
            start,
            query.required_minutes,
            query.bookings,
            query.catalog,
            None,
        )
        .is_some()
        {
            continue;
        }

        slots.push(Slot {
            label: start.with_timezone(&query.tz).format("%I:%M %p").to_string(),
            start,
        });
    }

    slots
}
