use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub default_salon_id: String,
    pub session_secret: String,
    pub session_ttl_secs: i64,
    pub sendgrid_api_key: String,
    pub mail_from: String,
    pub default_owner_email: String,
    pub reminder_interval_secs: u64,
    pub seed_admin_pin: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "salonbook.db".to_string()),
            default_salon_id: env::var("DEFAULT_SALON_ID").unwrap_or_else(|_| "mida".to_string()),
            session_secret: env::var("ADMIN_SESSION_SECRET")
                .unwrap_or_else(|_| "changeme".to_string()),
            session_ttl_secs: env::var("ADMIN_SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(12 * 60 * 60),
            sendgrid_api_key: env::var("SENDGRID_API_KEY").unwrap_or_default(),
            mail_from: env::var("MAIL_FROM")
                .unwrap_or_else(|_| "bookings@salonbook.local".to_string()),
            default_owner_email: env::var("DEFAULT_OWNER_EMAIL")
                .unwrap_or_else(|_| "owner@salonbook.local".to_string()),
            reminder_interval_secs: env::var("REMINDER_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
            seed_admin_pin: env::var("SEED_ADMIN_PIN").unwrap_or_else(|_| "1234".to_string()),
        }
    }
}
