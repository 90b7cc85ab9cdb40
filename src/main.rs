use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use salonbook::config::AppConfig;
use salonbook::db;
use salonbook::handlers;
use salonbook::services::mailer::sendgrid::SendGridMailer;
use salonbook::services::reminders;
use salonbook::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;
    db::seed::ensure_default_salon(&conn, &config)?;

    if config.session_secret == "changeme" {
        tracing::warn!("ADMIN_SESSION_SECRET is not set, using an insecure default");
    }
    let mailer = SendGridMailer::new(config.sendgrid_api_key.clone(), config.mail_from.clone());
    if config.sendgrid_api_key.is_empty() {
        tracing::warn!("SENDGRID_API_KEY is not set, emails will not be sent");
    }

    let state = Arc::new(AppState::new(conn, config.clone(), Box::new(mailer)));

    tokio::spawn(reminders::run_loop(Arc::clone(&state)));

    let app = Router::new()
        .route("/health", get(handlers::public::health))
        .route("/api/salon", get(handlers::public::get_salon))
        .route("/api/days", get(handlers::public::get_days))
        .route("/api/slots", get(handlers::public::get_slots))
        .route("/api/bookings", post(handlers::public::create_booking))
        .route("/api/admin/login", post(handlers::admin::login))
        .route(
            "/api/admin/bookings",
            get(handlers::admin::get_bookings).post(handlers::admin::create_booking),
        )
        .route(
            "/api/admin/bookings/events",
            get(handlers::admin::events_stream),
        )
        .route("/api/admin/bookings/:id", put(handlers::admin::update_booking))
        .route(
            "/api/admin/bookings/:id/status",
            post(handlers::admin::change_status),
        )
        .route("/api/admin/reports", post(handlers::admin::send_report))
        .route(
            "/api/admin/reports/status",
            get(handlers::admin::report_status),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
