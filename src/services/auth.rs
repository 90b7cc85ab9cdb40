//! PIN login for the admin dashboard.
//!
//! A correct PIN buys a short-lived bearer token scoped to one salon. The token
//! is `base64(salon_id:expires_unix).base64(hmac_sha1(payload))`, so it can be
//! verified without any server-side session table.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::db::queries;
use crate::errors::AppError;
use crate::state::AppState;

type HmacSha1 = Hmac<Sha1>;

pub const PIN_LENGTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct AdminSession {
    pub salon_id: String,
    pub expires_at: DateTime<Utc>,
}

fn mac(secret: &str) -> anyhow::Result<HmacSha1> {
    HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("invalid session secret: {e}"))
}

pub fn is_valid_pin_format(pin: &str) -> bool {
    pin.len() == PIN_LENGTH && pin.bytes().all(|b| b.is_ascii_digit())
}

fn pins_match(input: &str, stored: &str) -> bool {
    input.len() == stored.len()
        && input
            .bytes()
            .zip(stored.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

pub fn issue_token(
    secret: &str,
    salon_id: &str,
    expires_at: DateTime<Utc>,
) -> anyhow::Result<String> {
    let payload = format!("{salon_id}:{}", expires_at.timestamp());
    let mut mac = mac(secret)?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(payload),
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

pub fn verify_token(secret: &str, token: &str, now: DateTime<Utc>) -> Option<AdminSession> {
    let (payload_b64, signature_b64) = token.split_once('.')?;
    let payload = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let signature = URL_SAFE_NO_PAD.decode(signature_b64).ok()?;

    let mut mac = mac(secret).ok()?;
    mac.update(&payload);
    mac.verify_slice(&signature).ok()?;

    let payload = String::from_utf8(payload).ok()?;
    let (salon_id, expires) = payload.rsplit_once(':')?;
    let expires_at = DateTime::from_timestamp(expires.parse().ok()?, 0)?;
    if expires_at <= now {
        return None;
    }

    Some(AdminSession {
        salon_id: salon_id.to_string(),
        expires_at,
    })
}

/// Checks `pin` against the salon's stored PIN and returns a signed token.
pub fn login(
    state: &AppState,
    salon_id: &str,
    pin: &str,
    now: DateTime<Utc>,
) -> Result<(String, AdminSession), AppError> {
    if !is_valid_pin_format(pin) {
        return Err(AppError::Validation(format!("enter {PIN_LENGTH} digits")));
    }

    let salon = {
        let db = state.db();
        queries::get_salon(&db, salon_id)?
    }
    .ok_or_else(|| AppError::NotFound(format!("salon {salon_id}")))?;

    if !pins_match(pin, &salon.admin_pin) {
        tracing::warn!(salon = %salon_id, "incorrect admin PIN");
        return Err(AppError::Unauthorized);
    }

    let expires_at = now + Duration::seconds(state.config.session_ttl_secs);
    let token = issue_token(&state.config.session_secret, salon_id, expires_at)?;
    tracing::info!(salon = %salon_id, "admin signed in");

    Ok((
        token,
        AdminSession {
            salon_id: salon_id.to_string(),
            expires_at,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_750_000_000, 0).unwrap()
    }

    #[test]
    fn test_pin_format() {
        assert!(is_valid_pin_format("0042"));
        assert!(!is_valid_pin_format("123"));
        assert!(!is_valid_pin_format("12345"));
        assert!(!is_valid_pin_format("12a4"));
        assert!(!is_valid_pin_format("１２３４"));
    }

    #[test]
    fn test_pins_match() {
        assert!(pins_match("3434", "3434"));
        assert!(!pins_match("3434", "3435"));
        assert!(!pins_match("3434", "34340"));
    }

    #[test]
    fn test_token_round_trip() {
        let expires = now() + Duration::hours(1);
        let token = issue_token("secret", "mida", expires).unwrap();
        let session = verify_token("secret", &token, now()).unwrap();
        assert_eq!(session.salon_id, "mida");
        assert_eq!(session.expires_at, expires);
    }

    #[test]
    fn test_token_with_colon_in_salon_id() {
        let expires = now() + Duration::hours(1);
        let token = issue_token("secret", "chain:branch", expires).unwrap();
        let session = verify_token("secret", &token, now()).unwrap();
        assert_eq!(session.salon_id, "chain:branch");
    }

    #[test]
    fn test_token_rejects_wrong_secret_and_expiry() {
        let expires = now() + Duration::hours(1);
        let token = issue_token("secret", "mida", expires).unwrap();
        assert!(verify_token("other", &token, now()).is_none());
        assert!(verify_token("secret", &token, expires).is_none());
    }

    #[test]
    fn test_token_rejects_tampered_payload() {
        let expires = now() + Duration::hours(1);
        let token = issue_token("secret", "mida", expires).unwrap();
        let (_, sig) = token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(format!("other:{}", expires.timestamp()));
        let forged = format!("{forged_payload}.{sig}");
        assert!(verify_token("secret", &forged, now()).is_none());
        assert!(verify_token("secret", "garbage", now()).is_none());
    }
}
