use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Salon, Service};
use crate::services::availability::{self, Slot, SlotQuery};

#[derive(Debug)]
pub enum SchedulingError {
    UnknownService(String),
    SlotUnavailable,
    Conflict,
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::UnknownService(name) => {
                write!(f, "unknown service: {name}")
            }
            SchedulingError::SlotUnavailable => {
                write!(
                    f,
                    "Sorry, that time is no longer available. Please pick another slot."
                )
            }
            SchedulingError::Conflict => {
                write!(f, "CONFLICT: overlaps with an existing booking")
            }
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::UnknownService(_) => AppError::Validation(err.to_string()),
            SchedulingError::SlotUnavailable | SchedulingError::Conflict => {
                AppError::Conflict(err.to_string())
            }
        }
    }
}

/// The UTC instant at which `date` begins in `tz`.
pub fn local_midnight(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        // Midnight skipped by a DST jump; the day starts an hour later.
        None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| naive.and_utc()),
    }
}

pub fn day_bounds(tz: Tz, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.succ_opt().unwrap_or(date);
    (local_midnight(tz, date), local_midnight(tz, next))
}

pub fn find_service<'a>(salon: &'a Salon, name: &str) -> Result<&'a Service, SchedulingError> {
    salon
        .service(name)
        .ok_or_else(|| SchedulingError::UnknownService(name.to_string()))
}

/// Longest interval any booking of this salon can occupy.
fn longest_booked_minutes(salon: &Salon) -> i64 {
    salon
        .services
        .iter()
        .map(availability::required_minutes)
        .fold(availability::FALLBACK_BOOKED_MINUTES, i64::max)
}

/// Blocking bookings that can overlap a `required`-minute interval starting on
/// `date`, including ones that spill over either midnight.
fn day_snapshot(
    conn: &Connection,
    salon: &Salon,
    date: NaiveDate,
    required: i64,
) -> anyhow::Result<Vec<Booking>> {
    let (start, end) = day_bounds(salon.tz(), date);
    let from = start - Duration::minutes(longest_booked_minutes(salon));
    let until = end + Duration::minutes(required);
    queries::get_blocking_bookings_in_range(conn, &salon.id, &from, &until)
}

/// Bookable slots for `service_name` on the tenant-local `date`.
pub fn slots_for_day(
    conn: &Connection,
    salon: &Salon,
    service_name: &str,
    date: NaiveDate,
    now: DateTime<Utc>,
) -> Result<Vec<Slot>, AppError> {
    let service = find_service(salon, service_name)?;
    let required = availability::required_minutes(service);
    let bookings = day_snapshot(conn, salon, date, required)?;

    Ok(availability::available_slots(&SlotQuery {
        date,
        required_minutes: required,
        config: &salon.shop_config,
        catalog: &salon.services,
        bookings: &bookings,
        tz: salon.tz(),
        now,
    }))
}

/// Public flow: the start must be one of the slots the resolver offers right now.
pub fn ensure_slot_offered(
    conn: &Connection,
    salon: &Salon,
    service_name: &str,
    start: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let date = start.with_timezone(&salon.tz()).date_naive();
    let slots = slots_for_day(conn, salon, service_name, date, now)?;
    if slots.iter().any(|s| s.start == start) {
        Ok(())
    } else {
        Err(SchedulingError::SlotUnavailable.into())
    }
}

/// Admin flow: any start is allowed as long as it does not overlap a blocking
/// booking. `exclude_id` is the booking being edited.
pub fn ensure_no_conflict(
    conn: &Connection,
    salon: &Salon,
    service_name: &str,
    start: DateTime<Utc>,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    let service = find_service(salon, service_name)?;
    let date = start.with_timezone(&salon.tz()).date_naive();
    let required = availability::required_minutes(service);
    let bookings = day_snapshot(conn, salon, date, required)?;

    match availability::find_conflict(start, required, &bookings, &salon.services, exclude_id) {
        Some(existing) => {
            tracing::info!(
                salon = %salon.id,
                requested = %start,
                existing = %existing.id,
                "booking conflict detected"
            );
            Err(SchedulingError::Conflict.into())
        }
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::seed::default_salon;
    use crate::models::BookingStatus;
    use chrono::NaiveDateTime;

    fn setup() -> (Connection, Salon) {
        let conn = db::init_db(":memory:").unwrap();
        let mut salon = default_salon("mida", "1234");
        salon.timezone = "UTC".to_string();
        queries::save_salon(&conn, &salon).unwrap();
        (conn, salon)
    }

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn insert(conn: &Connection, id: &str, service: &str, start: &str, status: BookingStatus) {
        let now = ts("2025-06-01 08:00");
        let booking = Booking {
            id: id.to_string(),
            salon_id: "mida".to_string(),
            service_name: service.to_string(),
            staff_member: "Any".to_string(),
            start_time: ts(start),
            status,
            customer_name: "Alice".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: "0712345678".to_string(),
            is_manual: false,
            price: 350.0,
            reminder_sent: false,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        queries::create_booking(conn, &booking).unwrap();
    }

    #[test]
    fn test_day_bounds_follow_timezone() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        let (start, end) = day_bounds(chrono_tz::Africa::Johannesburg, date);
        assert_eq!(start, ts("2025-06-16 22:00"));
        assert_eq!(end, ts("2025-06-17 22:00"));
    }

    #[test]
    fn test_manual_conflict_rejected() {
        let (conn, salon) = setup();
        insert(&conn, "b1", "Cut", "2025-06-17 10:00", BookingStatus::Confirmed);

        let result = ensure_no_conflict(&conn, &salon, "Wash & Blow", ts("2025-06-17 10:30"), None);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let result = ensure_no_conflict(&conn, &salon, "Wash & Blow", ts("2025-06-17 11:15"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_manual_cancelled_booking_frees_slot() {
        let (conn, salon) = setup();
        insert(&conn, "b1", "Cut", "2025-06-17 10:00", BookingStatus::Cancelled);
        let result = ensure_no_conflict(&conn, &salon, "Color", ts("2025-06-17 10:00"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_edit_excludes_self() {
        let (conn, salon) = setup();
        insert(&conn, "b1", "Cut", "2025-06-17 10:00", BookingStatus::Confirmed);
        let result = ensure_no_conflict(&conn, &salon, "Cut", ts("2025-06-17 10:30"), Some("b1"));
        assert!(result.is_ok());
    }

    #[test]
    fn test_unknown_service_is_validation_error() {
        let (conn, salon) = setup();
        let result = ensure_no_conflict(&conn, &salon, "Perm", ts("2025-06-17 10:00"), None);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_booking_crossing_midnight_blocks_next_day() {
        let (conn, salon) = setup();
        insert(&conn, "late", "Cut", "2025-06-17 23:30", BookingStatus::Confirmed);

        // 23:30-00:45 runs into the 18th
        let result = ensure_no_conflict(&conn, &salon, "Cut", ts("2025-06-18 00:00"), None);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let result = ensure_no_conflict(&conn, &salon, "Cut", ts("2025-06-18 00:45"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_late_request_runs_into_next_day_booking() {
        let (conn, salon) = setup();
        insert(&conn, "early", "Cut", "2025-06-18 00:15", BookingStatus::Confirmed);

        let result = ensure_no_conflict(&conn, &salon, "Cut", ts("2025-06-17 23:30"), None);
        assert!(matches!(result, Err(AppError::Conflict(_))));

        let result = ensure_no_conflict(&conn, &salon, "Wash & Blow", ts("2025-06-17 23:00"), None);
        assert!(result.is_ok());
    }

    #[test]
    fn test_slots_for_day_uses_store_snapshot() {
        let (conn, salon) = setup();
        insert(&conn, "b1", "Cut", "2025-06-17 09:00", BookingStatus::Pending);
        let date = NaiveDate::from_ymd_opt(2025, 6, 17).unwrap();
        let slots = slots_for_day(&conn, &salon, "Wash & Blow", date, ts("2025-06-10 08:00")).unwrap();
        // 09:00-10:15 is taken; 10:00 would overlap
        assert_eq!(slots[0].start, ts("2025-06-17 10:30"));
    }

    #[test]
    fn test_public_start_must_be_offered() {
        let (conn, salon) = setup();
        let now = ts("2025-06-10 08:00");
        assert!(ensure_slot_offered(&conn, &salon, "Cut", ts("2025-06-17 10:00"), now).is_ok());
        // off-grid
        let off_grid = ensure_slot_offered(&conn, &salon, "Cut", ts("2025-06-17 10:10"), now);
        assert!(matches!(off_grid, Err(AppError::Conflict(_))));
        // Sunday
        let closed = ensure_slot_offered(&conn, &salon, "Cut", ts("2025-06-15 10:00"), now);
        assert!(matches!(closed, Err(AppError::Conflict(_))));
    }
}
