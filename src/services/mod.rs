pub mod auth;
pub mod availability;
pub mod bookings;
pub mod feed;
pub mod mailer;
pub mod notifications;
pub mod reminders;
pub mod reports;
pub mod scheduling;
