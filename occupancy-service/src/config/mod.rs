//! Configuration module for occupancy-service.

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct OccupancyConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub mongodb: MongoConfig,
    pub ledger: LedgerSettings,
    pub billing: BillingSettings,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

impl MongoConfig {
    pub fn uri(&self) -> &str {
        self.uri.expose_secret()
    }
}

#[derive(Debug, Clone)]
pub struct LedgerSettings {
    /// Attempts after the first when another writer took the next sequence.
    pub append_max_retries: u32,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            append_max_retries: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Share of a month's rent charged when a penalty has no explicit amount.
    pub penalty_percentage_of_rent: Decimal,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            penalty_percentage_of_rent: Decimal::TEN,
        }
    }
}

impl OccupancyConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "occupancy-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            mongodb: MongoConfig {
                uri: env::var("MONGODB_URI").map(Secret::new).map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("MONGODB_URI is required"))
                })?,
                database: env::var("MONGODB_DATABASE")
                    .unwrap_or_else(|_| "occupancy".to_string()),
            },
            ledger: LedgerSettings {
                append_max_retries: parsed("LEDGER_APPEND_MAX_RETRIES")?
                    .unwrap_or(LedgerSettings::default().append_max_retries),
            },
            billing: BillingSettings {
                penalty_percentage_of_rent: match parsed::<Decimal>("RENT_PENALTY_PERCENTAGE")? {
                    Some(pct) if pct < Decimal::ZERO => {
                        return Err(AppError::ConfigError(anyhow::anyhow!(
                            "RENT_PENALTY_PERCENTAGE cannot be negative"
                        )))
                    }
                    Some(pct) => pct,
                    None => BillingSettings::default().penalty_percentage_of_rent,
                },
            },
        })
    }
}

/// Optional variable that must parse when present.
fn parsed<T: FromStr>(key: &str) -> Result<Option<T>, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map(Some).map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} is invalid: {}", key, e))
        }),
        _ => Ok(None),
    }
}
