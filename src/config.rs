//! Environment-driven configuration

use std::str::FromStr;

use crate::error::BiddingError;
use crate::services::league_scheduler::{NextWindowPolicy, SchedulerSettings};

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_ADMIN_API_KEY: &str = "ADMIN_API_KEY";
pub const ENV_SCHEDULER_API_KEY: &str = "SCHEDULER_API_KEY";
pub const ENV_STORE: &str = "BIDDING_STORE";
pub const ENV_KEY_NAMESPACE: &str = "BIDDING_KEY_NAMESPACE";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "BIDDING_SWEEP_INTERVAL_SECS";
pub const ENV_WINDOW_HOURS: &str = "BIDDING_WINDOW_HOURS";
pub const ENV_NEXT_START_OFFSET_DAYS: &str = "BIDDING_NEXT_START_OFFSET_DAYS";
pub const ENV_NEXT_START_HOUR: &str = "BIDDING_NEXT_START_HOUR";
pub const ENV_NEXT_START_UTC_OFFSET_MINUTES: &str = "BIDDING_NEXT_START_UTC_OFFSET_MINUTES";
pub const ENV_LEAGUE_ORDER: &str = "BIDDING_LEAGUE_ORDER";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_KEY_NAMESPACE: &str = "ovhl:bidding";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes

/// Where auction records live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Database,
}

impl FromStr for StoreBackend {
    type Err = BiddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "database" | "db" | "postgres" => Ok(StoreBackend::Database),
            other => Err(BiddingError::Config(format!("unknown {} value: {}", ENV_STORE, other))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BiddingConfig {
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub admin_api_key: Option<String>,
    pub scheduler_api_key: Option<String>,
    pub store_backend: StoreBackend,
    pub key_namespace: String,
    /// 0 disables the in-process sweep task
    pub sweep_interval_secs: u64,
    pub scheduler: SchedulerSettings,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            admin_api_key: None,
            scheduler_api_key: None,
            store_backend: StoreBackend::Database,
            key_namespace: DEFAULT_KEY_NAMESPACE.to_string(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl BiddingConfig {
    pub fn from_env() -> Result<Self, BiddingError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BiddingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();
        let policy_defaults = NextWindowPolicy::default();

        let league_order = match get(ENV_LEAGUE_ORDER) {
            Some(raw) => {
                let order: Vec<String> = raw
                    .split(',')
                    .map(|l| l.trim().to_lowercase())
                    .filter(|l| !l.is_empty())
                    .collect();
                if order.is_empty() {
                    return Err(BiddingError::Config(format!("{} is empty", ENV_LEAGUE_ORDER)));
                }
                order
            }
            None => defaults.scheduler.league_order.clone(),
        };

        let next_window = NextWindowPolicy {
            offset_days: parse_or(get(ENV_NEXT_START_OFFSET_DAYS), ENV_NEXT_START_OFFSET_DAYS, policy_defaults.offset_days)?,
            start_hour: parse_or(get(ENV_NEXT_START_HOUR), ENV_NEXT_START_HOUR, policy_defaults.start_hour)?,
            utc_offset_minutes: parse_or(
                get(ENV_NEXT_START_UTC_OFFSET_MINUTES),
                ENV_NEXT_START_UTC_OFFSET_MINUTES,
                policy_defaults.utc_offset_minutes,
            )?,
        };
        if next_window.start_hour > 23 {
            return Err(BiddingError::Config(format!("{} must be 0-23", ENV_NEXT_START_HOUR)));
        }

        let window_hours: i64 = parse_or(get(ENV_WINDOW_HOURS), ENV_WINDOW_HOURS, defaults.scheduler.window_hours)?;
        if window_hours <= 0 {
            return Err(BiddingError::Config(format!("{} must be positive", ENV_WINDOW_HOURS)));
        }

        Ok(Self {
            database_url: get(ENV_DATABASE_URL),
            bind_addr: get(ENV_BIND_ADDR).unwrap_or(defaults.bind_addr),
            admin_api_key: get(ENV_ADMIN_API_KEY),
            scheduler_api_key: get(ENV_SCHEDULER_API_KEY),
            store_backend: match get(ENV_STORE) {
                Some(raw) => raw.parse()?,
                None => defaults.store_backend,
            },
            key_namespace: get(ENV_KEY_NAMESPACE).unwrap_or(defaults.key_namespace),
            sweep_interval_secs: parse_or(get(ENV_SWEEP_INTERVAL_SECS), ENV_SWEEP_INTERVAL_SECS, defaults.sweep_interval_secs)?,
            scheduler: SchedulerSettings {
                league_order,
                window_hours,
                next_window,
            },
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, BiddingError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| BiddingError::Config(format!("invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}
