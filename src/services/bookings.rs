use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Salon, ANY_STAFF};
use crate::services::{notifications, scheduling};
use crate::state::AppState;

/// Fields submitted by the public widget and the admin booking form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub service: String,
    pub staff: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
}

struct ValidForm {
    name: String,
    email: String,
    phone: String,
    service: String,
    staff: String,
    start_time: DateTime<Utc>,
}

fn validate_form(form: &BookingForm, staff_required: bool) -> Result<ValidForm, AppError> {
    let name = form.name.trim();
    let email = form.email.trim();
    let phone = form.phone.trim();
    let service = form.service.trim();
    let staff = form.staff.as_deref().map(str::trim).unwrap_or("");

    let mut missing = Vec::new();
    if name.is_empty() {
        missing.push("name");
    }
    if email.is_empty() {
        missing.push("email");
    }
    if phone.is_empty() {
        missing.push("phone");
    }
    if service.is_empty() {
        missing.push("service");
    }
    if staff_required && staff.is_empty() {
        missing.push("staff");
    }
    if form.start_time.is_none() {
        missing.push("start_time");
    }
    let Some(start_time) = form.start_time.filter(|_| missing.is_empty()) else {
        return Err(AppError::Validation(format!(
            "please complete all fields: {}",
            missing.join(", ")
        )));
    };
    if !email.contains('@') {
        return Err(AppError::Validation(format!("invalid email address: {email}")));
    }

    Ok(ValidForm {
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        service: service.to_string(),
        staff: if staff.is_empty() { ANY_STAFF } else { staff }.to_string(),
        start_time,
    })
}

/// The public widget only offers "Any" and the salon's own staff.
fn ensure_known_staff(salon: &Salon, staff: &str) -> Result<(), AppError> {
    if staff == ANY_STAFF || salon.staff.iter().any(|s| s == staff) {
        Ok(())
    } else {
        Err(AppError::Validation(format!("unknown staff member: {staff}")))
    }
}

fn new_booking(salon: &Salon, form: ValidForm, status: BookingStatus, is_manual: bool, price: f64) -> Booking {
    let now = Utc::now();
    Booking {
        id: uuid::Uuid::new_v4().to_string(),
        salon_id: salon.id.clone(),
        service_name: form.service,
        staff_member: form.staff,
        start_time: form.start_time,
        status,
        customer_name: form.name,
        customer_email: form.email,
        customer_phone: form.phone,
        is_manual,
        price,
        reminder_sent: false,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn load_salon(state: &AppState, salon_id: &str) -> Result<Option<Salon>, AppError> {
    let db = state.db();
    Ok(queries::get_salon(&db, salon_id)?)
}

/// Public widget booking: starts `Pending` and must match an offered slot.
pub fn create_public_booking(
    state: &Arc<AppState>,
    salon_id: &str,
    form: &BookingForm,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    let form = validate_form(form, true)?;
    let salon = load_salon(state, salon_id)?
        .ok_or_else(|| AppError::Validation(format!("unknown salon: {salon_id}")))?;
    ensure_known_staff(&salon, &form.staff)?;

    let booking = {
        let db = state.db();
        scheduling::ensure_slot_offered(&db, &salon, &form.service, form.start_time, now)?;
        let price = scheduling::find_service(&salon, &form.service)?.price;
        let booking = new_booking(&salon, form, BookingStatus::Pending, false, price);
        queries::create_booking(&db, &booking)?;
        booking
    };

    tracing::info!(
        salon = %salon.id,
        booking = %booking.id,
        service = %booking.service_name,
        start = %booking.start_time,
        "public booking created"
    );
    state.publish_booking_change(&salon.id);
    notifications::spawn_booking_created(state, &salon, &booking);
    Ok(booking)
}

/// Dashboard booking: starts `Confirmed`, only needs to avoid overlaps.
pub fn create_manual_booking(
    state: &Arc<AppState>,
    salon_id: &str,
    form: &BookingForm,
) -> Result<Booking, AppError> {
    let form = validate_form(form, false)?;
    let salon = load_salon(state, salon_id)?
        .ok_or_else(|| AppError::NotFound(format!("salon {salon_id}")))?;

    let booking = {
        let db = state.db();
        scheduling::ensure_no_conflict(&db, &salon, &form.service, form.start_time, None)?;
        let price = scheduling::find_service(&salon, &form.service)?.price;
        let booking = new_booking(&salon, form, BookingStatus::Confirmed, true, price);
        queries::create_booking(&db, &booking)?;
        booking
    };

    tracing::info!(
        salon = %salon.id,
        booking = %booking.id,
        start = %booking.start_time,
        "manual booking created"
    );
    state.publish_booking_change(&salon.id);
    notifications::spawn_booking_created(state, &salon, &booking);
    Ok(booking)
}

/// Full-field edit of a booking that has not reached a terminal status.
pub fn edit_booking(
    state: &Arc<AppState>,
    salon_id: &str,
    booking_id: &str,
    form: &BookingForm,
) -> Result<Booking, AppError> {
    let form = validate_form(form, false)?;
    let salon = load_salon(state, salon_id)?
        .ok_or_else(|| AppError::NotFound(format!("salon {salon_id}")))?;

    let updated = {
        let db = state.db();
        let existing = queries::get_booking(&db, salon_id, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;
        if existing.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "booking is {} and can no longer be edited",
                existing.status
            )));
        }

        scheduling::ensure_no_conflict(
            &db,
            &salon,
            &form.service,
            form.start_time,
            Some(booking_id),
        )?;
        let price = scheduling::find_service(&salon, &form.service)?.price;

        let rescheduled = existing.start_time != form.start_time;
        let updated = Booking {
            service_name: form.service,
            staff_member: form.staff,
            start_time: form.start_time,
            customer_name: form.name,
            customer_email: form.email,
            customer_phone: form.phone,
            price,
            // A new time deserves a new reminder.
            reminder_sent: existing.reminder_sent && !rescheduled,
            updated_at: Utc::now(),
            ..existing
        };
        queries::update_booking_details(&db, &updated)?;
        updated
    };

    tracing::info!(salon = %salon_id, booking = %booking_id, "booking edited");
    state.publish_booking_change(salon_id);
    Ok(updated)
}

/// Moves a booking along the status machine. Cancelling is irrevocable and
/// needs `confirmed` set by the caller.
pub fn change_status(
    state: &Arc<AppState>,
    salon_id: &str,
    booking_id: &str,
    target: BookingStatus,
    confirmed: bool,
    now: DateTime<Utc>,
) -> Result<Booking, AppError> {
    let updated = {
        let db = state.db();
        let existing = queries::get_booking(&db, salon_id, booking_id)?
            .ok_or_else(|| AppError::NotFound(format!("booking {booking_id}")))?;

        if !existing.status.can_transition_to(target) {
            return Err(AppError::InvalidTransition {
                from: existing.status,
                to: target,
            });
        }
        if target == BookingStatus::Cancelled && !confirmed {
            return Err(AppError::Conflict(
                "cancelling a booking cannot be undone; resend with confirm set to true"
                    .to_string(),
            ));
        }

        let completed_at = (target == BookingStatus::Completed).then_some(now);
        queries::update_booking_status(&db, salon_id, booking_id, target, completed_at.as_ref())?;
        Booking {
            status: target,
            completed_at: completed_at.or(existing.completed_at),
            updated_at: now,
            ..existing
        }
    };

    tracing::info!(
        salon = %salon_id,
        booking = %booking_id,
        status = %target,
        "booking status changed"
    );
    state.publish_booking_change(salon_id);
    Ok(updated)
}
