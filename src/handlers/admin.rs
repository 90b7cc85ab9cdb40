use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{IntervalStream, UnboundedReceiverStream};
use tokio_stream::StreamExt;

use crate::errors::AppError;
use crate::handlers::public::TenantQuery;
use crate::models::{Booking, BookingStatus};
use crate::services::auth::{self, AdminSession};
use crate::services::bookings::{self, BookingForm};
use crate::services::feed::{self, BookingView};
use crate::services::reports::{self, MonthlyReport, ReportRequest, ReportStatus};
use crate::state::AppState;

fn session_from_token(state: &AppState, token: &str) -> Result<AdminSession, AppError> {
    auth::verify_token(&state.config.session_secret, token, Utc::now()).ok_or(AppError::Unauthorized)
}

fn check_auth(headers: &HeaderMap, state: &AppState) -> Result<AdminSession, AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    session_from_token(state, token)
}

// POST /api/admin/login
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub pin: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    token: String,
    salon_id: String,
    expires_at: DateTime<Utc>,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (token, session) = auth::login(&state, query.salon_id(&state), req.pin.trim(), Utc::now())?;
    Ok(Json(LoginResponse {
        token,
        salon_id: session.salon_id,
        expires_at: session.expires_at,
    }))
}

// GET /api/admin/bookings
#[derive(Deserialize)]
pub struct ViewQuery {
    #[serde(default)]
    pub view: BookingView,
}

pub async fn get_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let session = check_auth(&headers, &state)?;
    let bookings = feed::load_view(&state, &session.salon_id, query.view, Utc::now())?;
    Ok(Json(bookings))
}

// POST /api/admin/bookings
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(form): Json<BookingForm>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let session = check_auth(&headers, &state)?;
    let booking = bookings::create_manual_booking(&state, &session.salon_id, &form)?;
    Ok((StatusCode::CREATED, Json(booking)))
}

// PUT /api/admin/bookings/:id
pub async fn update_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(form): Json<BookingForm>,
) -> Result<Json<Booking>, AppError> {
    let session = check_auth(&headers, &state)?;
    let booking = bookings::edit_booking(&state, &session.salon_id, &id, &form)?;
    Ok(Json(booking))
}

// POST /api/admin/bookings/:id/status
#[derive(Deserialize)]
pub struct StatusChange {
    pub status: String,
    #[serde(default)]
    pub confirm: bool,
}

pub async fn change_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(req): Json<StatusChange>,
) -> Result<Json<Booking>, AppError> {
    let session = check_auth(&headers, &state)?;
    let target = BookingStatus::parse(&req.status)
        .ok_or_else(|| AppError::Validation(format!("unknown status: {}", req.status)))?;
    let booking = bookings::change_status(&state, &session.salon_id, &id, target, req.confirm, Utc::now())?;
    Ok(Json(booking))
}

// POST /api/admin/reports
pub async fn send_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ReportRequest>,
) -> Result<Json<MonthlyReport>, AppError> {
    let session = check_auth(&headers, &state)?;
    let report = reports::generate_and_send(&state, &session.salon_id, &req, Utc::now()).await?;
    Ok(Json(report))
}

// GET /api/admin/reports/status
pub async fn report_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReportStatus>, AppError> {
    let session = check_auth(&headers, &state)?;
    Ok(Json(reports::report_status(&state, &session.salon_id, Utc::now())?))
}

// GET /api/admin/bookings/events (SSE)
#[derive(Deserialize)]
pub struct EventsQuery {
    pub token: Option<String>,
    #[serde(default)]
    pub view: BookingView,
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Auth via query param (EventSource can't set headers)
    let session = session_from_token(&state, query.token.as_deref().unwrap_or(""))?;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    // The stream owns `rx`; once the client disconnects the subscription ends.
    let closer = tx.clone();
    feed::subscribe_until(
        Arc::clone(&state),
        session.salon_id,
        query.view,
        async move { closer.closed().await },
        move |changes| tx.send(changes.clone()).is_ok(),
    );

    let changes_stream = UnboundedReceiverStream::new(rx).map(|changes| {
        let data = serde_json::to_string(&changes).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().data(data).event("booking_changes"))
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    Ok(Sse::new(StreamExt::merge(changes_stream, keepalive_stream)))
}
