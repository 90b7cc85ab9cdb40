use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Booking, Salon, Service, ShopConfig};
use crate::services::availability::Slot;
use crate::services::bookings::{self, BookingForm};
use crate::services::scheduling;
use crate::state::AppState;

const DEFAULT_DAY_COUNT: u32 = 6;
const MAX_DAY_COUNT: u32 = 60;

pub async fn health() -> &'static str {
    "ok"
}

/// `?salon=` selects the tenant; absent means the configured default.
#[derive(Deserialize)]
pub struct TenantQuery {
    pub salon: Option<String>,
}

impl TenantQuery {
    pub fn salon_id<'a>(&'a self, state: &'a AppState) -> &'a str {
        self.salon
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&state.config.default_salon_id)
    }
}

fn find_salon(state: &AppState, salon_id: &str) -> Result<Salon, AppError> {
    let db = state.db();
    queries::get_salon(&db, salon_id)?.ok_or_else(|| AppError::NotFound(format!("salon {salon_id}")))
}

// GET /api/salon
#[derive(Serialize)]
pub struct SalonProfile {
    id: String,
    name: String,
    logo_url: Option<String>,
    timezone: String,
    shop_config: ShopConfig,
    services: Vec<Service>,
    staff: Vec<String>,
}

pub async fn get_salon(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<SalonProfile>, AppError> {
    let salon = find_salon(&state, query.salon_id(&state))?;
    Ok(Json(SalonProfile {
        id: salon.id,
        name: salon.name,
        logo_url: salon.logo_url,
        timezone: salon.timezone,
        shop_config: salon.shop_config,
        services: salon.services,
        staff: salon.staff,
    }))
}

// GET /api/days
#[derive(Deserialize)]
pub struct DaysQuery {
    pub salon: Option<String>,
    pub count: Option<u32>,
}

#[derive(Serialize)]
pub struct DayResponse {
    date: NaiveDate,
    label: String,
    closed: bool,
}

pub async fn get_days(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<DayResponse>>, AppError> {
    let tenant = TenantQuery { salon: query.salon };
    let salon = find_salon(&state, tenant.salon_id(&state))?;
    let count = query.count.unwrap_or(DEFAULT_DAY_COUNT).clamp(1, MAX_DAY_COUNT);
    let today = Utc::now().with_timezone(&salon.tz()).date_naive();

    let days = (0..i64::from(count))
        .map(|offset| {
            let date = today + Duration::days(offset);
            DayResponse {
                date,
                label: date.format("%a %-d %b").to_string(),
                closed: salon
                    .shop_config
                    .is_closed_on(date.weekday().num_days_from_sunday()),
            }
        })
        .collect();
    Ok(Json(days))
}

// GET /api/slots
#[derive(Deserialize)]
pub struct SlotsQuery {
    pub salon: Option<String>,
    pub service: String,
    pub date: String,
}

pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Vec<Slot>>, AppError> {
    let date = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {}", query.date)))?;
    let tenant = TenantQuery { salon: query.salon };
    let salon = find_salon(&state, tenant.salon_id(&state))?;

    let slots = {
        let db = state.db();
        scheduling::slots_for_day(&db, &salon, &query.service, date, Utc::now())?
    };
    Ok(Json(slots))
}

// POST /api/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
    Json(form): Json<BookingForm>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = bookings::create_public_booking(&state, query.salon_id(&state), &form, Utc::now())?;
    Ok((StatusCode::CREATED, Json(booking)))
}
