use crate::domain::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub maturity_interval: Duration,
    pub profit_refresh_interval: Duration,
    pub profit_refresh_epsilon: Decimal,
    pub settlement_retry_max: Duration,
    pub scheduler_enabled: bool,
    pub seed_default_plans: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let maturity_interval = parse_secs(&env_map, "MATURITY_INTERVAL_SECS", 30)?;
        let profit_refresh_interval = parse_secs(&env_map, "PROFIT_REFRESH_INTERVAL_SECS", 15)?;

        let profit_refresh_epsilon = Decimal::from_str(
            env_map
                .get("PROFIT_REFRESH_EPSILON")
                .map(|s| s.as_str())
                .unwrap_or("0.01"),
        )
        .ok()
        .filter(|eps| !eps.is_negative())
        .ok_or_else(|| {
            ConfigError::InvalidValue(
                "PROFIT_REFRESH_EPSILON".to_string(),
                "must be a non-negative decimal".to_string(),
            )
        })?;

        let settlement_retry_max = env_map
            .get("SETTLEMENT_RETRY_MAX_MS")
            .map(|s| s.as_str())
            .unwrap_or("2000")
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "SETTLEMENT_RETRY_MAX_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let scheduler_enabled = parse_bool(&env_map, "SCHEDULER_ENABLED", true)?;
        let seed_default_plans = parse_bool(&env_map, "SEED_DEFAULT_PLANS", true)?;

        Ok(Config {
            port,
            database_path,
            maturity_interval,
            profit_refresh_interval,
            profit_refresh_epsilon,
            settlement_retry_max,
            scheduler_enabled,
            seed_default_plans,
        })
    }
}

fn parse_secs(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let secs = match env_map.get(key) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        })?,
        None => default,
    };
    if secs == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}
