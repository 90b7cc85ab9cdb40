use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::queries;
use crate::models::{Salon, Service, ShopConfig, DEFAULT_TIMEZONE};

fn service(id: &str, name: &str, duration_minutes: i64, price: f64, icon: &str) -> Service {
    Service {
        id: id.to_string(),
        name: name.to_string(),
        duration_minutes,
        price,
        icon: icon.to_string(),
    }
}

/// Starter catalog for a fresh tenant: closed Sundays and Mondays, 09:00-17:00.
pub fn default_salon(id: &str, admin_pin: &str) -> Salon {
    Salon {
        id: id.to_string(),
        name: "Mida Hair".to_string(),
        owner_email: None,
        logo_url: None,
        admin_pin: admin_pin.to_string(),
        timezone: DEFAULT_TIMEZONE.to_string(),
        shop_config: ShopConfig {
            open_hour: 9,
            close_hour: 17,
            closed_days: [0, 1].into_iter().collect(),
        },
        services: vec![
            service("wash-blow", "Wash & Blow", 30, 250.0, "dry"),
            service("cut", "Cut", 60, 350.0, "content_cut"),
            service("color", "Color", 90, 600.0, "palette"),
            service("relax", "Relax", 60, 450.0, "self_improvement"),
            service("all", "Color, Cut and Wash", 60, 850.0, "content_cut"),
            service("botox", "Botox", 60, 750.0, "medication"),
        ],
        staff: vec!["Mida".to_string(), "Sarah".to_string(), "John".to_string()],
    }
}

/// Inserts the default tenant if it does not exist yet. Existing records are
/// never overwritten.
pub fn ensure_default_salon(conn: &Connection, config: &AppConfig) -> anyhow::Result<()> {
    if queries::get_salon(conn, &config.default_salon_id)?.is_some() {
        return Ok(());
    }
    let salon = default_salon(&config.default_salon_id, &config.seed_admin_pin);
    queries::save_salon(conn, &salon)?;
    tracing::info!(salon = %salon.id, "seeded default salon");
    Ok(())
}
