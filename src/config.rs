//! Configuration module
//!
//! Loads configuration from environment variables. Every threshold the
//! engine uses (fraud bands, retry counts, backoff, reconciliation
//! cadence) is explicit here with a documented default; nothing is
//! inferred at call sites.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::fraud::FraudConfig;
use crate::recovery::RecoveryConfig;
use crate::router::{RouterConfig, SystemAccounts};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    pub fraud: FraudConfig,

    pub router: RouterConfig,

    pub recovery: RecoveryConfig,

    /// How often the reconciliation sweep runs
    pub reconciliation_interval: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = parse_or("DATABASE_MAX_CONNECTIONS", 10u32)?;
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let system_accounts = SystemAccounts {
            cash: required_uuid("COREBANK_CASH_ACCOUNT")?,
            loan_funding: required_uuid("COREBANK_LOAN_FUNDING_ACCOUNT")?,
        };

        let mut fraud = FraudConfig::default();
        fraud.high_amount_threshold =
            parse_or("COREBANK_FRAUD_HIGH_AMOUNT", fraud.high_amount_threshold)?;
        fraud.absolute_ceiling = parse_or("COREBANK_FRAUD_CEILING", fraud.absolute_ceiling)?;
        fraud.velocity_max_count_1h =
            parse_or("COREBANK_VELOCITY_MAX_COUNT_1H", fraud.velocity_max_count_1h)?;
        fraud.velocity_max_sum_1h =
            parse_or("COREBANK_VELOCITY_MAX_SUM_1H", fraud.velocity_max_sum_1h)?;
        fraud.velocity_max_count_24h =
            parse_or("COREBANK_VELOCITY_MAX_COUNT_24H", fraud.velocity_max_count_24h)?;
        fraud.velocity_max_sum_24h =
            parse_or("COREBANK_VELOCITY_MAX_SUM_24H", fraud.velocity_max_sum_24h)?;
        fraud.bands.medium = parse_or("COREBANK_FRAUD_BAND_MEDIUM", fraud.bands.medium)?;
        fraud.bands.high = parse_or("COREBANK_FRAUD_BAND_HIGH", fraud.bands.high)?;
        fraud.bands.critical = parse_or("COREBANK_FRAUD_BAND_CRITICAL", fraud.bands.critical)?;

        let mut router = RouterConfig::new(system_accounts);
        router.max_commit_attempts =
            parse_or("COREBANK_MAX_COMMIT_ATTEMPTS", router.max_commit_attempts)?;
        router.retry_backoff = Duration::from_millis(parse_or(
            "COREBANK_RETRY_BACKOFF_MS",
            router.retry_backoff.as_millis() as u64,
        )?);
        router.rescore_after = Duration::from_millis(parse_or(
            "COREBANK_RESCORE_AFTER_MS",
            router.rescore_after.as_millis() as u64,
        )?);

        let mut recovery = RecoveryConfig::default();
        recovery.max_attempts =
            parse_or("COREBANK_RECOVERY_MAX_ATTEMPTS", recovery.max_attempts)?;
        recovery.base_backoff = Duration::from_millis(parse_or(
            "COREBANK_RECOVERY_BASE_BACKOFF_MS",
            recovery.base_backoff.as_millis() as u64,
        )?);
        recovery.max_backoff = Duration::from_millis(parse_or(
            "COREBANK_RECOVERY_MAX_BACKOFF_MS",
            recovery.max_backoff.as_millis() as u64,
        )?);
        recovery.confirmation_deadline = Duration::from_secs(parse_or(
            "COREBANK_CONFIRMATION_DEADLINE_SECS",
            recovery.confirmation_deadline.as_secs(),
        )?);
        recovery.poll_interval = Duration::from_secs(parse_or(
            "COREBANK_RECOVERY_POLL_SECS",
            recovery.poll_interval.as_secs(),
        )?);

        let reconciliation_interval =
            Duration::from_secs(parse_or("COREBANK_RECONCILIATION_INTERVAL_SECS", 3600u64)?);

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            fraud,
            router,
            recovery,
            reconciliation_interval,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
{
    match env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

fn required_uuid(key: &'static str) -> Result<Uuid, ConfigError> {
    let raw = env::var(key).map_err(|_| ConfigError::MissingEnv(key))?;
    Uuid::from_str(&raw).map_err(|_| ConfigError::InvalidValue(key))
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
