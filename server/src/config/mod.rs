use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::services::sweeper::DEFAULT_SWEEP_INTERVAL;

pub mod cors;

pub use cors::create_cors_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/booking";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ORDER_LIFE_TIME_MS: i64 = 10 * 60 * 1000;
const DEFAULT_HOLD_DURATION_SECS: i64 = 5 * 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = DEFAULT_SWEEP_INTERVAL.as_secs();
const MAX_ORDER_LIFE_TIME_MS: i64 = 30 * 24 * 60 * 60 * 1000;
const MAX_HOLD_DURATION_SECS: i64 = 30 * 24 * 60 * 60;

/// Runtime settings, read once at startup.
///
/// | Env Var                | Default                        |
/// |------------------------|--------------------------------|
/// | `DATABASE_URL`         | `postgres://localhost/booking` |
/// | `PORT`                 | `3001`                         |
/// | `DB_MAX_CONNECTIONS`   | `5`                            |
/// | `ORDER_LIFE_TIME_MS`   | `600000`                       |
/// | `HOLD_DURATION_SECS`   | `300`                          |
/// | `SWEEP_INTERVAL_SECS`  | `60`                           |
/// | `CORS_ALLOWED_ORIGINS` | see [`cors`]                   |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_max_connections: u32,
    /// How long an unpaid order keeps its seats.
    pub order_life_time: Duration,
    /// Hold length when a request does not name one.
    pub hold_duration: Duration,
    pub sweep_interval: StdDuration,
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let order_life_time_ms = bounded_or(
            &lookup,
            "ORDER_LIFE_TIME_MS",
            DEFAULT_ORDER_LIFE_TIME_MS,
            MAX_ORDER_LIFE_TIME_MS,
        );
        let hold_duration_secs = bounded_or(
            &lookup,
            "HOLD_DURATION_SECS",
            DEFAULT_HOLD_DURATION_SECS,
            MAX_HOLD_DURATION_SECS,
        );
        // tokio intervals reject a zero period
        let sweep_interval_secs = positive_or(
            &lookup,
            "SWEEP_INTERVAL_SECS",
            DEFAULT_SWEEP_INTERVAL_SECS,
        );

        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            port: parse_or(&lookup, "PORT", DEFAULT_PORT),
            db_max_connections: positive_or(
                &lookup,
                "DB_MAX_CONNECTIONS",
                DEFAULT_DB_MAX_CONNECTIONS,
            ),
            order_life_time: Duration::milliseconds(order_life_time_ms),
            hold_duration: Duration::seconds(hold_duration_secs),
            sweep_interval: StdDuration::from_secs(sweep_interval_secs),
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            tracing::warn!(key, value = %raw, error = %e, "Invalid config value, using default");
            default
        }),
    }
}

fn positive_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + Display,
    T::Err: Display,
{
    let value = parse_or(lookup, key, default);
    if value > T::default() {
        value
    } else {
        tracing::warn!(key, value = %value, "Config value must be positive, using default");
        default
    }
}

/// Like [`positive_or`], additionally rejecting values above `max`.
fn bounded_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T, max: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + Display,
    T::Err: Display,
{
    let value = positive_or(lookup, key, default);
    if value <= max {
        value
    } else {
        tracing::warn!(key, value = %value, max = %max, "Config value too large, using default");
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]);
        assert_eq!(c.port, 3001);
        assert_eq!(c.order_life_time, Duration::minutes(10));
        assert_eq!(c.hold_duration, Duration::minutes(5));
        assert_eq!(c.sweep_interval, StdDuration::from_secs(60));
        assert_eq!(c.database_url, DEFAULT_DATABASE_URL);
    }

    #[test]
    fn test_order_life_time_is_milliseconds() {
        let c = config(&[("ORDER_LIFE_TIME_MS", "90000")]);
        assert_eq!(c.order_life_time, Duration::seconds(90));
    }

    #[test]
    fn test_oversized_durations_fall_back() {
        let c = config(&[
            ("ORDER_LIFE_TIME_MS", "9223372036854775807"),
            ("HOLD_DURATION_SECS", "9223372036854775"),
        ]);
        assert_eq!(c.order_life_time, Duration::minutes(10));
        assert_eq!(c.hold_duration, Duration::minutes(5));

        let c = config(&[("ORDER_LIFE_TIME_MS", "2592000000")]);
        assert_eq!(c.order_life_time, Duration::days(30));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let c = config(&[
            ("PORT", "not-a-port"),
            ("SWEEP_INTERVAL_SECS", "0"),
            ("ORDER_LIFE_TIME_MS", "-5"),
        ]);
        assert_eq!(c.port, DEFAULT_PORT);
        assert_eq!(c.sweep_interval, StdDuration::from_secs(60));
        assert_eq!(c.order_life_time, Duration::minutes(10));
    }
}
