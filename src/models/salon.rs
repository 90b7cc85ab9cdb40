use std::collections::BTreeSet;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEZONE: &str = "Africa/Johannesburg";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopConfig {
    pub open_hour: u32,
    pub close_hour: u32,
    /// Weekday indices, 0 = Sunday.
    #[serde(default)]
    pub closed_days: BTreeSet<u32>,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            open_hour: 9,
            close_hour: 17,
            closed_days: BTreeSet::new(),
        }
    }
}

impl ShopConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.open_hour > 23 || self.close_hour > 23 {
            anyhow::bail!(
                "hours out of range: {}-{}",
                self.open_hour,
                self.close_hour
            );
        }
        if self.open_hour >= self.close_hour {
            anyhow::bail!(
                "open hour {} must be before close hour {}",
                self.open_hour,
                self.close_hour
            );
        }
        if let Some(day) = self.closed_days.iter().find(|d| **d > 6) {
            anyhow::bail!("invalid weekday index: {day}");
        }
        Ok(())
    }

    pub fn is_closed_on(&self, weekday_from_sunday: u32) -> bool {
        self.closed_days.contains(&weekday_from_sunday)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub duration_minutes: i64,
    pub price: f64,
    #[serde(default)]
    pub icon: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salon {
    pub id: String,
    pub name: String,
    pub owner_email: Option<String>,
    pub logo_url: Option<String>,
    pub admin_pin: String,
    pub timezone: String,
    pub shop_config: ShopConfig,
    pub services: Vec<Service>,
    pub staff: Vec<String>,
}

impl Salon {
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Falls back to UTC when the stored zone name is not a known IANA zone.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(salon = %self.id, timezone = %self.timezone, "unknown timezone, using UTC");
            Tz::UTC
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.shop_config.validate()?;
        if self.timezone.parse::<Tz>().is_err() {
            anyhow::bail!("unknown timezone: {}", self.timezone);
        }
        let mut seen = BTreeSet::new();
        for service in &self.services {
            if service.duration_minutes <= 0 {
                anyhow::bail!("service {} must have a positive duration", service.name);
            }
            if !seen.insert(service.name.as_str()) {
                anyhow::bail!("duplicate service name: {}", service.name);
            }
        }
        Ok(())
    }
}
