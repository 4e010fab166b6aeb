use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::workflows::billing::{
    AddOnService, BillingConfig, BillingEngine, FeeSchedule, PriceTable, RefundBase,
    RefundSchedule,
};
use crate::workflows::domain::Money;
use crate::workflows::matching::MatchingConfig;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub billing: BillingSettings,
    pub matching: MatchingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = BillingConfig::default();
        let billing = BillingSettings {
            due_in_days: numeric_var("BILLING_DUE_DAYS", defaults.due_in_days)?,
            warranty_days: numeric_var("BILLING_WARRANTY_DAYS", defaults.warranty_days)?,
            soft_skills_test_cents: numeric_var(
                "BILLING_PRICE_SOFT_SKILLS_TEST",
                DEFAULT_SOFT_SKILLS_TEST_CENTS,
            )?,
            technical_interview_cents: numeric_var(
                "BILLING_PRICE_TECHNICAL_INTERVIEW",
                DEFAULT_TECHNICAL_INTERVIEW_CENTS,
            )?,
            refund_base: refund_base_var()?,
        };
        if billing.due_in_days <= 0 {
            return Err(ConfigError::NonPositive {
                key: "BILLING_DUE_DAYS",
            });
        }
        if billing.warranty_days <= 0 {
            return Err(ConfigError::NonPositive {
                key: "BILLING_WARRANTY_DAYS",
            });
        }

        let matching = MatchingConfig {
            formal_test_bonus: numeric_var(
                "MATCHING_FORMAL_TEST_BONUS",
                MatchingConfig::default().formal_test_bonus,
            )?,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            billing,
            matching,
        })
    }
}

const DEFAULT_SOFT_SKILLS_TEST_CENTS: u64 = 15_000;
const DEFAULT_TECHNICAL_INTERVIEW_CENTS: u64 = 25_000;

fn numeric_var<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
            key,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

fn refund_base_var() -> Result<RefundBase, ConfigError> {
    let Ok(raw) = env::var("BILLING_REFUND_BASE") else {
        return Ok(RefundBase::default());
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "fee_only" | "fee" => Ok(RefundBase::FeeOnly),
        "fee_and_add_ons" | "total" => Ok(RefundBase::FeeAndAddOns),
        _ => Err(ConfigError::InvalidRefundBase(raw)),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Billing calendar, add-on prices and refund base read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSettings {
    pub due_in_days: i64,
    pub warranty_days: i64,
    pub soft_skills_test_cents: u64,
    pub technical_interview_cents: u64,
    pub refund_base: RefundBase,
}

impl BillingSettings {
    pub fn price_table(&self) -> PriceTable {
        PriceTable::default()
            .with_price(
                AddOnService::SoftSkillsTest,
                Money::from_cents(self.soft_skills_test_cents),
            )
            .with_price(
                AddOnService::TechnicalInterview,
                Money::from_cents(self.technical_interview_cents),
            )
    }

    /// Standard fee and refund schedules with the configured prices and calendar.
    pub fn engine(&self) -> BillingEngine {
        BillingEngine::new(
            FeeSchedule::standard(),
            RefundSchedule::standard(),
            self.price_table(),
            BillingConfig {
                due_in_days: self.due_in_days,
                warranty_days: self.warranty_days,
                refund_base: self.refund_base,
            },
        )
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    NonPositive { key: &'static str },
    InvalidRefundBase(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative integer, got '{value}'")
            }
            ConfigError::NonPositive { key } => write!(f, "{key} must be greater than zero"),
            ConfigError::InvalidRefundBase(value) => write!(
                f,
                "BILLING_REFUND_BASE must be fee_only or fee_and_add_ons, got '{value}'"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
