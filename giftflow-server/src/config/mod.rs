//! Configuration module for giftflow-server.
//!
//! Handles loading configuration from TOML files, CLI arguments,
//! and environment variables.

pub mod file;
pub mod runtime;

use crate::config::file::{
    CardConfig as FileCardConfig, FileConfig, MobileMoneyConfig as FileMobileMoneyConfig,
    PaymentValidityConfig, PaymentValidityKind, SweeperConfig as FileSweeperConfig,
};
use crate::config::runtime::{ServerConfig, ServiceConfig, SharedConfig};
use giftflow_core::engine::EngineConfig;
use giftflow_core::phone::PhoneNumberRules;
use giftflow_core::processors::SweeperConfig;
use giftflow_core::providers::card::CardConfig;
use giftflow_core::providers::mobile_money::MobileMoneyConfig;
use giftflow_core::status::PaymentValidityPolicy;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("DATABASE_URL environment variable not set")]
    MissingDatabaseUrl,
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub service: ServiceConfig,
    pub engine: EngineConfig,
    pub payment_validity: PaymentValidityPolicy,
    pub card: Option<CardConfig>,
    pub mobile_money: Option<MobileMoneyConfig>,
    /// `None` when the sweeper is disabled.
    pub sweeper: Option<SweeperConfig>,
}

impl LoadedConfig {
    /// The hot-reloadable sections, each behind its own lock.
    pub fn shared(&self) -> SharedConfig {
        SharedConfig::new(
            self.server.clone(),
            self.service.clone(),
            self.payment_validity,
        )
    }
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: std::path::PathBuf,
    listen_override: Option<SocketAddr>,
}

impl ConfigLoader {
    pub fn new(config_path: impl AsRef<Path>, listen_override: Option<SocketAddr>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            listen_override,
        }
    }

    /// Read the TOML file, apply CLI overrides, validate, and build the
    /// runtime configuration.
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    /// Reload the configuration (used during SIGHUP).
    pub fn reload(&self) -> Result<LoadedConfig, ConfigError> {
        self.load()
    }

    fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(listen) = self.listen_override {
            file_config.server.listen = listen;
        }

        validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    let invalid = |message: &str| Err(ConfigError::ValidationError(message.to_string()));

    if config.service.secret.is_empty() {
        return invalid("service.secret must not be empty");
    }
    if config.engine.provider_timeout_secs == 0 {
        return invalid("engine.provider_timeout_secs must be greater than zero");
    }
    if config.engine.phone.subscriber_digits == 0 {
        return invalid("engine.phone.subscriber_digits must be greater than zero");
    }
    if config.payment_validity.policy == PaymentValidityKind::PaidWithin
        && config.payment_validity.window_days == 0
    {
        return invalid("payment_validity.window_days must be greater than zero");
    }
    if config.card.is_none() && config.mobile_money.is_none() {
        return invalid("at least one of [card] or [mobile_money] must be configured");
    }
    if let Some(card) = &config.card {
        if card.secret_key.is_empty() || card.webhook_secret.is_empty() {
            return invalid("card.secret_key and card.webhook_secret must not be empty");
        }
        if card.currencies.is_empty() {
            return invalid("card.currencies must not be empty");
        }
    }
    if let Some(momo) = &config.mobile_money {
        if momo.subscription_key.is_empty() || momo.api_user.is_empty() || momo.api_key.is_empty()
        {
            return invalid("mobile_money credentials must not be empty");
        }
        if momo.currencies.is_empty() {
            return invalid("mobile_money.currencies must not be empty");
        }
        if momo.callback_secret.is_none() {
            tracing::warn!(
                "mobile_money.callback_secret is not set; callbacks will be rejected and donations settle by polling"
            );
        }
    }
    let sweeper = &config.sweeper;
    if sweeper.enabled {
        if sweeper.interval_secs == 0 {
            return invalid("sweeper.interval_secs must be greater than zero");
        }
        if sweeper.expire_after_secs <= sweeper.poll_after_secs {
            return invalid("sweeper.expire_after_secs must be greater than poll_after_secs");
        }
    }
    Ok(())
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    let phone = file_config.engine.phone;
    LoadedConfig {
        server: ServerConfig {
            listen: file_config.server.listen,
        },
        service: ServiceConfig::new(file_config.service.secret.into_bytes()),
        engine: EngineConfig {
            provider_timeout: Duration::from_secs(file_config.engine.provider_timeout_secs),
            phone_rules: PhoneNumberRules {
                country_code: phone.country_code,
                trunk_prefix: phone.trunk_prefix,
                subscriber_digits: phone.subscriber_digits,
            },
        },
        payment_validity: convert_policy(&file_config.payment_validity),
        card: file_config.card.map(convert_card),
        mobile_money: file_config.mobile_money.map(convert_mobile_money),
        sweeper: convert_sweeper(&file_config.sweeper),
    }
}

fn convert_policy(p: &PaymentValidityConfig) -> PaymentValidityPolicy {
    match p.policy {
        PaymentValidityKind::AnyPaid => PaymentValidityPolicy::AnyPaidDonation,
        PaymentValidityKind::PaidWithin => PaymentValidityPolicy::PaidWithin(Duration::from_secs(
            u64::from(p.window_days) * 24 * 60 * 60,
        )),
    }
}

fn convert_card(c: FileCardConfig) -> CardConfig {
    CardConfig {
        api_base: c.api_base,
        secret_key: c.secret_key,
        webhook_secret: c.webhook_secret,
        success_url: c.success_url,
        cancel_url: c.cancel_url,
        currencies: c.currencies.into_iter().map(Into::into).collect(),
    }
}

fn convert_mobile_money(m: FileMobileMoneyConfig) -> MobileMoneyConfig {
    MobileMoneyConfig {
        api_base: m.api_base,
        target_environment: m.target_environment,
        subscription_key: m.subscription_key,
        api_user: m.api_user,
        api_key: m.api_key,
        callback_url: m.callback_url,
        callback_secret: m.callback_secret,
        currencies: m.currencies.into_iter().map(Into::into).collect(),
    }
}

fn convert_sweeper(s: &FileSweeperConfig) -> Option<SweeperConfig> {
    s.enabled.then(|| SweeperConfig {
        interval: Duration::from_secs(s.interval_secs),
        poll_after: Duration::from_secs(s.poll_after_secs),
        expire_after: Duration::from_secs(s.expire_after_secs),
    })
}

/// Get the database URL from the environment.
pub fn get_database_url() -> Result<String, ConfigError> {
    std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)
}
