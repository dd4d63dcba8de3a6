use anyhow::{anyhow, Context};
use chrono::Duration;
use serde::Deserialize;
use std::str::FromStr;

// Top-level configuration: one section per concern
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub reservation: ReservationConfig,
    pub cron: CronConfig,
    pub admin: AdminConfig,
    pub notifications: NotificationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum LogFormat {
    Plain,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" | "pretty" => Ok(LogFormat::Plain),
            "json" => Ok(LogFormat::Json),
            other => Err(anyhow!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Without a URL the seat-map cache is disabled
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Lifetimes and limits of the reservation core
#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    pub lock_ttl_secs: i64,
    pub checkout_lock_ttl_secs: i64,
    pub order_ttl_secs: i64,
    pub max_seats_per_request: usize,
    pub sweep_concurrency: usize,
}

impl ReservationConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::seconds(self.lock_ttl_secs)
    }

    pub fn checkout_lock_ttl(&self) -> Duration {
        Duration::seconds(self.checkout_lock_ttl_secs)
    }

    pub fn order_ttl(&self) -> Duration {
        Duration::seconds(self.order_ttl_secs)
    }
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            lock_ttl_secs: 600,
            checkout_lock_ttl_secs: 900,
            order_ttl_secs: 900,
            max_seats_per_request: 10,
            sweep_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CronConfig {
    pub secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, timeout_seconds: 60 }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SweeperConfig {
    /// In-process sweep period. `None` leaves sweeping to the external scheduler.
    pub interval_secs: Option<u64>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = ReservationConfig::default();
        let breaker = CircuitBreakerConfig::default();

        let config = Config {
            app: AppConfig {
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "PORT", 8000)?,
                environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
                rust_log: get("RUST_LOG")
                    .unwrap_or_else(|| "seat_reservation=debug,tower_http=debug".to_string()),
                log_format: parse_or(&get, "LOG_FORMAT", LogFormat::Plain)?,
            },
            database: DatabaseConfig {
                url: get("DATABASE_URL").context("DATABASE_URL must be set")?,
                pool_size: parse_or(&get, "DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig { url: get("REDIS_URL") },
            reservation: ReservationConfig {
                lock_ttl_secs: parse_or(&get, "LOCK_TTL_SECS", defaults.lock_ttl_secs)?,
                checkout_lock_ttl_secs: parse_or(
                    &get,
                    "CHECKOUT_LOCK_TTL_SECS",
                    defaults.checkout_lock_ttl_secs,
                )?,
                order_ttl_secs: parse_or(&get, "ORDER_TTL_SECS", defaults.order_ttl_secs)?,
                max_seats_per_request: parse_or(
                    &get,
                    "MAX_SEATS_PER_REQUEST",
                    defaults.max_seats_per_request,
                )?,
                sweep_concurrency: parse_or(&get, "SWEEP_CONCURRENCY", defaults.sweep_concurrency)?,
            },
            cron: CronConfig { secret: get("CRON_SECRET") },
            admin: AdminConfig {
                username: get("ADMIN_USERNAME"),
                password_hash: get("ADMIN_PASSWORD_HASH"),
            },
            notifications: NotificationConfig { webhook_url: get("NOTIFY_WEBHOOK_URL") },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or(
                    &get,
                    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                    breaker.failure_threshold,
                )?,
                timeout_seconds: parse_or(
                    &get,
                    "CIRCUIT_BREAKER_TIMEOUT_SECONDS",
                    breaker.timeout_seconds,
                )?,
            },
            sweeper: SweeperConfig {
                interval_secs: get("SWEEPER_INTERVAL_SECS")
                    .map(|v| v.parse().context("SWEEPER_INTERVAL_SECS must be a valid number"))
                    .transpose()?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let r = &self.reservation;
        if r.lock_ttl_secs <= 0 || r.checkout_lock_ttl_secs <= 0 || r.order_ttl_secs <= 0 {
            return Err(anyhow!("lock and order TTLs must be positive"));
        }
        if r.max_seats_per_request == 0 {
            return Err(anyhow!("MAX_SEATS_PER_REQUEST must be at least 1"));
        }
        if r.sweep_concurrency == 0 {
            return Err(anyhow!("SWEEP_CONCURRENCY must be at least 1"));
        }
        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} must be a valid value: {}", key, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_is_set() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/tickets")])).unwrap();
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.app.log_format, LogFormat::Plain);
        assert_eq!(config.database.pool_size, 20);
        assert_eq!(config.reservation.lock_ttl(), Duration::minutes(10));
        assert_eq!(config.reservation.checkout_lock_ttl(), Duration::minutes(15));
        assert_eq!(config.reservation.order_ttl(), Duration::minutes(15));
        assert_eq!(config.reservation.max_seats_per_request, 10);
        assert!(config.redis.url.is_none());
        assert!(config.cron.secret.is_none());
        assert!(config.sweeper.interval_secs.is_none());
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tickets"),
            ("PORT", "9090"),
            ("LOG_FORMAT", "json"),
            ("LOCK_TTL_SECS", "120"),
            ("REDIS_URL", "redis://cache:6379"),
            ("CRON_SECRET", "s3cret"),
            ("SWEEPER_INTERVAL_SECS", "30"),
        ]))
        .unwrap();
        assert_eq!(config.app.port, 9090);
        assert_eq!(config.app.log_format, LogFormat::Json);
        assert_eq!(config.reservation.lock_ttl_secs, 120);
        assert_eq!(config.redis.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cron.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.sweeper.interval_secs, Some(30));
    }

    #[test]
    fn blank_values_count_as_unset() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tickets"),
            ("CRON_SECRET", "   "),
        ]))
        .unwrap();
        assert!(config.cron.secret.is_none());
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tickets"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tickets"),
            ("ORDER_TTL_SECS", "0"),
        ]))
        .is_err());
    }
}
