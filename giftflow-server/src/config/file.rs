//! TOML file configuration structures.
//!
//! These structs directly map to the `giftflow.toml` file format.

use giftflow_sdk::objects::Currency;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use url::Url;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub service: ServiceConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub payment_validity: PaymentValidityConfig,
    #[serde(default)]
    pub card: Option<CardConfig>,
    #[serde(default)]
    pub mobile_money: Option<MobileMoneyConfig>,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Service API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Shared secret the application backend signs requests with.
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_provider_timeout_secs")]
    pub provider_timeout_secs: u64,
    #[serde(default)]
    pub phone: PhoneConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            provider_timeout_secs: default_provider_timeout_secs(),
            phone: PhoneConfig::default(),
        }
    }
}

fn default_provider_timeout_secs() -> u64 {
    20
}

/// Mobile-money market numbering plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    #[serde(default = "default_country_code")]
    pub country_code: String,
    #[serde(default = "default_trunk_prefix")]
    pub trunk_prefix: String,
    #[serde(default = "default_subscriber_digits")]
    pub subscriber_digits: usize,
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            trunk_prefix: default_trunk_prefix(),
            subscriber_digits: default_subscriber_digits(),
        }
    }
}

fn default_country_code() -> String {
    "233".to_string()
}

fn default_trunk_prefix() -> String {
    "0".to_string()
}

fn default_subscriber_digits() -> usize {
    9
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentValidityKind {
    #[default]
    AnyPaid,
    PaidWithin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentValidityConfig {
    #[serde(default)]
    pub policy: PaymentValidityKind,
    /// Only used by `paid_within`.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for PaymentValidityConfig {
    fn default() -> Self {
        Self {
            policy: PaymentValidityKind::default(),
            window_days: default_window_days(),
        }
    }
}

fn default_window_days() -> u32 {
    30
}

/// Hosted card checkout gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardConfig {
    pub api_base: Url,
    pub secret_key: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    #[serde(default = "default_card_currencies")]
    pub currencies: Vec<Currency>,
}

fn default_card_currencies() -> Vec<Currency> {
    vec![Currency::Usd, Currency::Eur, Currency::Ghs]
}

/// Mobile-money collection API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileMoneyConfig {
    pub api_base: Url,
    pub target_environment: String,
    pub subscription_key: String,
    pub api_user: String,
    pub api_key: String,
    #[serde(default)]
    pub callback_url: Option<String>,
    /// Without it every callback is rejected and donations settle by polling.
    #[serde(default)]
    pub callback_secret: Option<String>,
    #[serde(default = "default_mobile_money_currencies")]
    pub currencies: Vec<Currency>,
}

fn default_mobile_money_currencies() -> Vec<Currency> {
    vec![Currency::Ghs, Currency::Eur]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_poll_after_secs")]
    pub poll_after_secs: u64,
    #[serde(default = "default_expire_after_secs")]
    pub expire_after_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
            poll_after_secs: default_poll_after_secs(),
            expire_after_secs: default_expire_after_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_poll_after_secs() -> u64 {
    30
}

fn default_expire_after_secs() -> u64 {
    60 * 60
}
