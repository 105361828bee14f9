//! Roster configuration (env-driven).

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Weekday;

use crate::decision::Availability;
use crate::models::Roster;

#[derive(Debug, Clone)]
pub struct Config {
    /// Only read by commands that touch Postgres.
    pub database_url: Option<String>,

    pub max_connections: u32,

    pub roster: Roster,

    pub availability: Availability,

    /// Upper bound on any single store call.
    pub store_timeout: Duration,

    /// Days ahead of today that `recalc` always covers.
    pub horizon_days: u32,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();

        let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("DB_MAX_CONNECTIONS must be a positive integer.")?
            .unwrap_or(5)
            .max(1);

        let roster = Roster {
            party_a: std::env::var("DUTY_PARTY_A").unwrap_or_else(|_| "Party A".to_string()),
            party_b: std::env::var("DUTY_PARTY_B").unwrap_or_else(|_| "Party B".to_string()),
        };

        let availability = Availability {
            unavailable_a: weekdays_from_env("DUTY_UNAVAILABLE_A")?,
            unavailable_b: weekdays_from_env("DUTY_UNAVAILABLE_B")?,
        };

        let timeout_secs: u64 = std::env::var("DUTY_STORE_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("DUTY_STORE_TIMEOUT_SECS must be an integer (seconds).")?
            .unwrap_or(30);

        let horizon_days: u32 = std::env::var("DUTY_HORIZON_DAYS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("DUTY_HORIZON_DAYS must be a non-negative integer.")?
            .unwrap_or(28);

        let log_level = std::env::var("DUTY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            database_url,
            max_connections,
            roster,
            availability,
            store_timeout: Duration::from_secs(timeout_secs.max(1)),
            horizon_days,
            log_level,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

fn weekdays_from_env(key: &str) -> Result<HashSet<Weekday>> {
    match std::env::var(key) {
        Ok(value) => parse_weekdays(&value).with_context(|| format!("{key} is invalid")),
        Err(_) => Ok(HashSet::new()),
    }
}

/// Parses a comma-separated weekday list such as `monday, Thu`.
pub fn parse_weekdays(value: &str) -> Result<HashSet<Weekday>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            name.parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("'{name}' is not a weekday name"))
        })
        .collect()
}
