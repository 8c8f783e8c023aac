//! Runtime settings, read from the environment (and a `.env` file when present).

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::security::SuspicionPolicy;
use crate::services::tax::{TaxConfig, TaxError};
use crate::services::transfer::TransferLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("invalid ICMS overrides: {0}")]
    Overrides(#[from] TaxError),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Without a database URL the service keeps everything in memory.
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub signing_secret: String,
    pub max_connection_pooling: u32,
    pub port: u16,
    pub log_file: String,
    pub transfer_limits: TransferLimits,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub suspicion: SuspicionPolicy,
    pub min_withdrawal: Decimal,
    pub tax: TaxConfig,
}

fn var_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match dotenv::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let transfer_defaults = TransferLimits::default();
        let suspicion_defaults = SuspicionPolicy::default();
        let tax_defaults = TaxConfig::default();

        let icms_overrides = match dotenv::var("ICMS_RATE_OVERRIDES") {
            Ok(raw) => TaxConfig::parse_overrides(&raw)?,
            Err(_) => Default::default(),
        };

        Ok(Self {
            database_url: dotenv::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            jwt_secret: dotenv::var("JWT_SECRET").unwrap_or("your-jwt-secret".to_string()),
            signing_secret: dotenv::var("SIGNING_SECRET")
                .unwrap_or("your-signing-secret".to_string()),
            max_connection_pooling: var_or("MAX_CONNECTION_POOLING", 5)?,
            port: var_or("PORT", 3000)?,
            log_file: dotenv::var("LOG_FILE").unwrap_or("app.log".to_string()),
            transfer_limits: TransferLimits {
                min_amount: var_or("MIN_TRANSFER", transfer_defaults.min_amount)?,
                max_amount: var_or("MAX_TRANSFER", transfer_defaults.max_amount)?,
                daily_limit: var_or("DAILY_TRANSFER_LIMIT", transfer_defaults.daily_limit)?,
            },
            rate_limit_max: var_or("RATE_LIMIT_MAX", 5)?,
            rate_limit_window: Duration::from_secs(var_or("RATE_LIMIT_WINDOW_SECS", 60u64)?.max(1)),
            suspicion: SuspicionPolicy {
                max_failed_attempts: var_or(
                    "MAX_FAILED_TRANSFERS",
                    suspicion_defaults.max_failed_attempts,
                )?,
                max_transfers: var_or(
                    "MAX_TRANSFERS_PER_WINDOW",
                    suspicion_defaults.max_transfers,
                )?,
                ..suspicion_defaults
            },
            min_withdrawal: var_or("MIN_WITHDRAWAL", Decimal::new(20, 0))?,
            tax: TaxConfig {
                duty_rate: var_or("IMPORT_DUTY_RATE", tax_defaults.duty_rate)?,
                duty_includes_freight: var_or(
                    "DUTY_INCLUDES_FREIGHT",
                    tax_defaults.duty_includes_freight,
                )?,
                default_icms_rate: var_or("ICMS_DEFAULT_RATE", tax_defaults.default_icms_rate)?,
                icms_overrides,
            },
        })
    }
}
