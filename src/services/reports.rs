//! Monthly summary emailed to the salon owner.
//!
//! A report may be sent at most once per tenant-local calendar month, whatever
//! month it covers.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, Salon};
use crate::services::mailer::Email;
use crate::services::notifications::{escape_html, format_local};
use crate::services::scheduling::local_midnight;
use crate::state::AppState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportRequest {
    pub month: Option<u32>,
    pub year: Option<i32>,
    #[serde(default)]
    pub recipient_email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReport {
    pub salon_id: String,
    pub month: u32,
    pub year: i32,
    pub total: usize,
    pub completed: usize,
    pub cancelled: usize,
    pub no_show: usize,
    /// Sum of the price snapshots of completed bookings.
    pub revenue: f64,
    #[serde(skip)]
    pub bookings: Vec<Booking>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub available: bool,
}

fn month_start(year: i32, month: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, 1)
}

fn next_month_start(year: i32, month: u32) -> Option<NaiveDate> {
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

pub fn summarize(salon_id: &str, year: i32, month: u32, bookings: Vec<Booking>) -> MonthlyReport {
    let count = |status: BookingStatus| bookings.iter().filter(|b| b.status == status).count();
    let revenue = bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Completed)
        .map(|b| b.price)
        .sum();

    MonthlyReport {
        salon_id: salon_id.to_string(),
        month,
        year,
        total: bookings.len(),
        completed: count(BookingStatus::Completed),
        cancelled: count(BookingStatus::Cancelled),
        no_show: count(BookingStatus::NoShow),
        revenue,
        bookings,
    }
}

pub fn render_report_html(salon: &Salon, report: &MonthlyReport) -> String {
    let tz = salon.tz();
    let rows: String = report
        .bookings
        .iter()
        .map(|b| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>R{:.2}</td></tr>",
                escape_html(&format_local(&b.start_time, tz)),
                escape_html(&b.customer_name),
                escape_html(&b.service_name),
                escape_html(&b.staff_member),
                b.status,
                b.price,
            )
        })
        .collect();

    format!(
        "<!DOCTYPE html><html><body style=\"font-family:sans-serif\">\
         <h1>{salon_name} <span style=\"color:#828282\">{month:02}/{year}</span></h1>\
         <table>\
         <tr><td>Total bookings</td><td>{total}</td></tr>\
         <tr><td>Completed</td><td>{completed}</td></tr>\
         <tr><td>Cancelled</td><td>{cancelled}</td></tr>\
         <tr><td>No-shows</td><td>{no_show}</td></tr>\
         <tr><td>Revenue</td><td>R{revenue:.2}</td></tr>\
         </table>\
         <h2>Booking log</h2>\
         <table><tr><th>When</th><th>Client</th><th>Service</th><th>Staff</th><th>Status</th><th>Price</th></tr>\
         {rows}</table>\
         </body></html>",
        salon_name = escape_html(&salon.name),
        month = report.month,
        year = report.year,
        total = report.total,
        completed = report.completed,
        cancelled = report.cancelled,
        no_show = report.no_show,
        revenue = report.revenue,
    )
}

fn same_local_month(salon: &Salon, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    let tz = salon.tz();
    let (a, b) = (a.with_timezone(&tz), b.with_timezone(&tz));
    a.year() == b.year() && a.month() == b.month()
}

fn load_salon(state: &AppState, salon_id: &str) -> Result<Salon, AppError> {
    let db = state.db();
    queries::get_salon(&db, salon_id)?.ok_or_else(|| AppError::NotFound(format!("salon {salon_id}")))
}

pub fn report_status(state: &AppState, salon_id: &str, now: DateTime<Utc>) -> Result<ReportStatus, AppError> {
    let salon = load_salon(state, salon_id)?;
    let last_run = {
        let db = state.db();
        queries::get_last_report_run(&db, salon_id)?
    };
    Ok(ReportStatus {
        last_run,
        available: !last_run.is_some_and(|at| same_local_month(&salon, at, now)),
    })
}

pub async fn generate_and_send(
    state: &AppState,
    salon_id: &str,
    request: &ReportRequest,
    now: DateTime<Utc>,
) -> Result<MonthlyReport, AppError> {
    let month = request
        .month
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| AppError::Validation("month must be between 1 and 12".to_string()))?;
    let year = request
        .year
        .filter(|y| (2000..=9999).contains(y))
        .ok_or_else(|| AppError::Validation("year is missing or invalid".to_string()))?;
    let recipient = request.recipient_email.trim();
    if recipient.is_empty() || !recipient.contains('@') {
        return Err(AppError::Validation("recipient email is required".to_string()));
    }
    if !state.mailer.is_configured() {
        return Err(AppError::ConfigurationMissing("mail transport".to_string()));
    }

    let salon = load_salon(state, salon_id)?;
    let (Some(first), Some(next)) = (month_start(year, month), next_month_start(year, month)) else {
        return Err(AppError::Validation(format!("invalid month {month}/{year}")));
    };

    let report = {
        let db = state.db();
        if let Some(last) = queries::get_last_report_run(&db, salon_id)? {
            if same_local_month(&salon, last, now) {
                return Err(AppError::Conflict("report already sent this month".to_string()));
            }
        }
        let tz = salon.tz();
        let bookings = queries::get_bookings_in_period(
            &db,
            salon_id,
            &local_midnight(tz, first),
            &local_midnight(tz, next),
        )?;
        summarize(salon_id, year, month, bookings)
    };

    let email = Email {
        to: recipient.to_string(),
        subject: format!("{} report: {:02}/{}", salon.name, month, year),
        html: render_report_html(&salon, &report),
    };
    state.mailer.send(&email).await?;

    {
        let db = state.db();
        queries::record_report_run(&db, salon_id, &now)?;
    }

    tracing::info!(
        salon = %salon_id,
        month,
        year,
        total = report.total,
        revenue = report.revenue,
        "monthly report sent"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db;
    use crate::db::seed::default_salon;
    use crate::services::mailer::Mailer;
    use async_trait::async_trait;
    use chrono::NaiveDateTime;
    use std::sync::{Arc, Mutex};

    struct CapturingMailer {
        configured: bool,
        sent: Arc<Mutex<Vec<Email>>>,
    }

    #[async_trait]
    impl Mailer for CapturingMailer {
        async fn send(&self, email: &Email) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(email.clone());
            Ok(())
        }

        fn is_configured(&self) -> bool {
            self.configured
        }
    }

    fn ts(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .unwrap()
            .and_utc()
    }

    fn setup(configured: bool) -> (AppState, Arc<Mutex<Vec<Email>>>) {
        let conn = db::init_db(":memory:").unwrap();
        queries::save_salon(&conn, &default_salon("mida", "1234")).unwrap();
        let sent = Arc::new(Mutex::new(vec![]));
        let mailer = CapturingMailer {
            configured,
            sent: Arc::clone(&sent),
        };
        (AppState::new(conn, AppConfig::from_env(), Box::new(mailer)), sent)
    }

    fn insert(state: &AppState, id: &str, name: &str, start: &str, status: BookingStatus, price: f64) {
        let created = ts("2025-05-01 08:00");
        let booking = Booking {
            id: id.to_string(),
            salon_id: "mida".to_string(),
            service_name: "Cut".to_string(),
            staff_member: "Any".to_string(),
            start_time: ts(start),
            status,
            customer_name: name.to_string(),
            customer_email: "client@example.com".to_string(),
            customer_phone: "0712345678".to_string(),
            is_manual: false,
            price,
            reminder_sent: false,
            completed_at: None,
            created_at: created,
            updated_at: created,
        };
        queries::create_booking(&state.db(), &booking).unwrap();
    }

    fn request(month: u32, year: i32) -> ReportRequest {
        ReportRequest {
            month: Some(month),
            year: Some(year),
            recipient_email: "owner@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_report_aggregates_local_month() {
        let (state, sent) = setup(true);
        insert(&state, "a", "Alice", "2025-05-02 08:00", BookingStatus::Completed, 350.0);
        insert(&state, "b", "<Bob>", "2025-05-10 08:00", BookingStatus::Completed, 600.0);
        insert(&state, "c", "Carol", "2025-05-11 08:00", BookingStatus::Cancelled, 450.0);
        insert(&state, "d", "Dan", "2025-05-12 08:00", BookingStatus::NoShow, 250.0);
        // 00:30 on June 1st in Johannesburg belongs to June
        insert(&state, "e", "Eve", "2025-05-31 22:30", BookingStatus::Completed, 999.0);
        // 01:30 on May 1st in Johannesburg belongs to May
        insert(&state, "f", "Fay", "2025-04-30 23:30", BookingStatus::Pending, 350.0);

        let report = generate_and_send(&state, "mida", &request(5, 2025), ts("2025-06-03 09:00"))
            .await
            .unwrap();
        assert_eq!(report.total, 5);
        assert_eq!(report.completed, 2);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.no_show, 1);
        assert_eq!(report.revenue, 950.0);

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "owner@example.com");
        assert!(sent[0].html.contains("&lt;Bob&gt;"));
        assert!(sent[0].html.contains("R950.00"));
    }

    #[tokio::test]
    async fn test_report_once_per_month() {
        let (state, _) = setup(true);
        let now = ts("2025-06-03 09:00");
        generate_and_send(&state, "mida", &request(5, 2025), now).await.unwrap();

        let err = generate_and_send(&state, "mida", &request(4, 2025), ts("2025-06-20 09:00"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(!report_status(&state, "mida", now).unwrap().available);

        let next_month = ts("2025-07-01 08:00");
        assert!(report_status(&state, "mida", next_month).unwrap().available);
        generate_and_send(&state, "mida", &request(6, 2025), next_month).await.unwrap();
    }

    #[tokio::test]
    async fn test_report_validation_and_configuration() {
        let (state, _) = setup(true);
        let now = ts("2025-06-03 09:00");
        for bad in [request(0, 2025), request(13, 2025)] {
            let err = generate_and_send(&state, "mida", &bad, now).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        let mut missing = request(5, 2025);
        missing.recipient_email = " ".to_string();
        let err = generate_and_send(&state, "mida", &missing, now).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let (unconfigured, sent) = setup(false);
        let err = generate_and_send(&unconfigured, "mida", &request(5, 2025), now)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ConfigurationMissing(_)));
        assert!(sent.lock().unwrap().is_empty());
        assert!(report_status(&unconfigured, "mida", now).unwrap().last_run.is_none());
    }
}
