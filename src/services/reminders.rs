use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};

use crate::db::queries;
use crate::models::{Booking, Salon};
use crate::services::mailer::Email;
use crate::services::notifications::{escape_html, format_local};
use crate::state::AppState;

const REMINDER_LEAD_HOURS: i64 = 24;
const REMINDER_WINDOW_HOURS: i64 = 25;

pub fn reminder_email(salon: &Salon, booking: &Booking) -> Email {
    let when = format_local(&booking.start_time, salon.tz());
    let html = format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif\">\
         <h1>See you <span style=\"color:#828282\">tomorrow</span></h1>\
         <p>Hello <strong>{name}</strong>,</p>\
         <p>This is a reminder of your <strong>{service}</strong> appointment at {salon_name}.</p>\
         <p style=\"font-size:16px\">{when}</p>\
         <p style=\"color:#888\">Need to change it? Reply to this email or give us a call.</p>\
         </body></html>",
        name = escape_html(&booking.customer_name),
        service = escape_html(&booking.service_name),
        salon_name = escape_html(&salon.name),
        when = escape_html(&when),
    );
    Email {
        to: booking.customer_email.clone(),
        subject: format!("Reminder: {} tomorrow", booking.service_name),
        html,
    }
}

/// Emails every confirmed booking starting 24 to 25 hours after `now` that has
/// not been reminded yet. Returns how many reminders went out.
pub async fn run_reminder_sweep(state: &AppState, now: DateTime<Utc>) -> anyhow::Result<usize> {
    // Build every email under the lock, then send without holding it.
    let due: Vec<(String, Email)> = {
        let db = state.db();
        let bookings = queries::get_due_reminders(
            &db,
            &(now + Duration::hours(REMINDER_LEAD_HOURS)),
            &(now + Duration::hours(REMINDER_WINDOW_HOURS)),
        )?;

        let mut salons: HashMap<String, Option<Salon>> = HashMap::new();
        let mut due = Vec::with_capacity(bookings.len());
        for booking in bookings {
            if !salons.contains_key(&booking.salon_id) {
                let salon = queries::get_salon(&db, &booking.salon_id)?;
                salons.insert(booking.salon_id.clone(), salon);
            }
            match salons.get(&booking.salon_id).and_then(Option::as_ref) {
                Some(salon) => due.push((booking.id.clone(), reminder_email(salon, &booking))),
                None => tracing::warn!(
                    booking = %booking.id,
                    salon = %booking.salon_id,
                    "reminder for unknown salon"
                ),
            }
        }
        due
    };

    let mut sent = 0;
    for (booking_id, email) in due {
        if let Err(e) = state.mailer.send(&email).await {
            tracing::error!(error = %e, booking = %booking_id, "failed to send reminder");
            continue;
        }
        let db = state.db();
        queries::mark_reminder_sent(&db, &booking_id)?;
        sent += 1;
    }

    if sent > 0 {
        tracing::info!(count = sent, "reminders sent");
    }
    Ok(sent)
}

/// Runs the sweep forever, every `config.reminder_interval_secs`.
pub async fn run_loop(state: Arc<AppState>) {
    let interval = StdDuration::from_secs(state.config.reminder_interval_secs.max(1));
    tracing::info!("reminder sweep started, every {}s", interval.as_secs());
    loop {
        if let Err(e) = run_reminder_sweep(&state, Utc::now()).await {
            tracing::error!(error = %format!("{e:#}"), "reminder sweep failed");
        }
        tokio::time::sleep(interval).await;
    }
}
