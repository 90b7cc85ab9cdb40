use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::models::{Booking, Salon};
use crate::services::mailer::Email;
use crate::state::AppState;

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn format_local(dt: &DateTime<Utc>, tz: Tz) -> String {
    dt.with_timezone(&tz)
        .format("%A, %B %-d, %Y at %-I:%M %p")
        .to_string()
}

fn detail_row(label: &str, value: &str) -> String {
    format!(
        "<tr><td style=\"color:#888;text-transform:uppercase;font-size:12px\">{label}</td>\
         <td style=\"font-size:16px\">{}</td></tr>",
        escape_html(value)
    )
}

pub fn client_confirmation(salon: &Salon, booking: &Booking) -> Email {
    let when = format_local(&booking.start_time, salon.tz());
    let html = format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif\">\
         <h1>{salon_name} <span style=\"color:#828282\">Confirmed</span></h1>\
         <p>Hello <strong>{name}</strong>,</p>\
         <p>Your appointment has been received. We look forward to seeing you.</p>\
         <table>{service}{staff}{when}</table>\
         <p style=\"color:#888\">Please arrive 5 minutes early.</p>\
         </body></html>",
        salon_name = escape_html(&salon.name),
        name = escape_html(&booking.customer_name),
        service = detail_row("Service", &booking.service_name),
        staff = detail_row("Staff", &booking.staff_member),
        when = detail_row("Date & Time", &when),
    );
    Email {
        to: booking.customer_email.clone(),
        subject: format!("Booking Confirmed: {}", booking.service_name),
        html,
    }
}

pub fn owner_notification(salon: &Salon, booking: &Booking, owner_email: &str) -> Email {
    let when = format_local(&booking.start_time, salon.tz());
    let html = format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif\">\
         <h1>New <span style=\"color:#828282\">Booking</span></h1>\
         <p>You have received a new online booking!</p>\
         <table>{client}{phone}{service}{when}</table>\
         <p style=\"color:#888\">Check the dashboard for details.</p>\
         </body></html>",
        client = detail_row("Client", &booking.customer_name),
        phone = detail_row("Phone", &booking.customer_phone),
        service = detail_row("Service", &booking.service_name),
        when = detail_row("Time", &when),
    );
    Email {
        to: owner_email.to_string(),
        subject: format!(
            "New Booking: {} ({})",
            booking.customer_name, booking.service_name
        ),
        html,
    }
}

/// Emails to send when `booking` is created: always the client, plus the owner
/// for bookings that did not come from the admin dashboard.
pub fn booking_created_emails(salon: &Salon, booking: &Booking, default_owner: &str) -> Vec<Email> {
    let mut emails = vec![client_confirmation(salon, booking)];
    if !booking.is_manual {
        let owner = salon
            .owner_email
            .as_deref()
            .filter(|e| !e.is_empty())
            .unwrap_or(default_owner);
        emails.push(owner_notification(salon, booking, owner));
    }
    emails
}

/// Fire-and-forget: failures are logged and never reach the caller.
pub fn spawn_booking_created(state: &Arc<AppState>, salon: &Salon, booking: &Booking) {
    let emails = booking_created_emails(salon, booking, &state.config.default_owner_email);
    let state = Arc::clone(state);
    let booking_id = booking.id.clone();

    tokio::spawn(async move {
        if !state.mailer.is_configured() {
            tracing::warn!(booking = %booking_id, "mail transport not configured, skipping notifications");
            return;
        }
        for email in &emails {
            if let Err(e) = state.mailer.send(email).await {
                tracing::error!(
                    error = %e,
                    booking = %booking_id,
                    to = %email.to,
                    "failed to send booking email"
                );
            }
        }
        tracing::info!(booking = %booking_id, count = emails.len(), "booking emails dispatched");
    });
}
