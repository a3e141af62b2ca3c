use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::saved::DEFAULT_TTL_HOURS;

/// Runtime configuration, read from the environment
#[derive(Debug, Clone)]
pub struct Config {
    /// Root URL of the realtime database REST endpoint
    pub database_url: String,
    /// Database secret or ID token, sent as the `auth` query parameter
    pub database_auth: Option<String>,
    pub http_timeout: Duration,
    pub refresh_interval: Duration,
    /// How long a saved listing stays valid
    pub saved_ttl: chrono::Duration,
    pub mpesa_port: u16,
}

impl Config {
    pub fn load() -> Self {
        Self {
            database_url: try_load("FIREBASE_DATABASE_URL", "http://localhost:9000".to_string()),
            database_auth: env::var("FIREBASE_AUTH").ok().filter(|s| !s.trim().is_empty()),
            http_timeout: Duration::from_secs(try_load("HTTP_TIMEOUT_SECS", 30)),
            refresh_interval: Duration::from_secs(try_load("REFRESH_INTERVAL_SECS", 300)),
            saved_ttl: saved_ttl(try_load("SAVED_TTL_HOURS", DEFAULT_TTL_HOURS)),
            mpesa_port: try_load("MPESA_PORT", 3005),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "http://localhost:9000".to_string(),
            database_auth: None,
            http_timeout: Duration::from_secs(30),
            refresh_interval: Duration::from_secs(300),
            saved_ttl: chrono::Duration::hours(DEFAULT_TTL_HOURS),
            mpesa_port: 3005,
        }
    }
}

/// Reads `key`, falling back to `default` when unset or unparsable
fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    let raw = match env::var(key) {
        Ok(raw) => raw,
        Err(_) => {
            info!("{key} not set, using default: {default}");
            return default;
        }
    };

    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            warn!("Invalid {key} value '{raw}': {e}, using default: {default}");
            default
        }
    }
}

/// Saved listings need a positive lifetime that chrono can represent
fn saved_ttl(hours: i64) -> chrono::Duration {
    match chrono::Duration::try_hours(hours).filter(|_| hours > 0) {
        Some(ttl) => ttl,
        None => {
            warn!(
                "SAVED_TTL_HOURS out of range: {hours}, using default: {DEFAULT_TTL_HOURS}"
            );
            chrono::Duration::hours(DEFAULT_TTL_HOURS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn falls_back_to_default_on_garbage() {
        env::set_var("HOUSELOOK_TEST_PORT", "not-a-port");
        let port: u16 = try_load("HOUSELOOK_TEST_PORT", 3005);
        assert_eq!(port, 3005);
        env::remove_var("HOUSELOOK_TEST_PORT");
    }

    #[test]
    fn reads_set_values() {
        env::set_var("HOUSELOOK_TEST_SECS", "42");
        let secs: u64 = try_load("HOUSELOOK_TEST_SECS", 30);
        assert_eq!(secs, 42);
        env::remove_var("HOUSELOOK_TEST_SECS");
    }

    #[test]
    fn saved_ttl_must_be_positive_and_representable() {
        let day = chrono::Duration::hours(24);
        assert_eq!(saved_ttl(48), chrono::Duration::hours(48));
        assert_eq!(saved_ttl(0), day);
        assert_eq!(saved_ttl(-5), day);
        assert_eq!(saved_ttl(i64::MAX), day);
    }

    #[test]
    fn huge_saved_ttl_falls_back_to_a_day() {
        env::set_var("SAVED_TTL_HOURS", i64::MAX.to_string());
        let config = Config::load();
        env::remove_var("SAVED_TTL_HOURS");
        assert_eq!(config.saved_ttl, chrono::Duration::hours(24));
    }
}
