//! Validated runtime configuration.
//!
//! Sections that SIGHUP can swap live behind their own `Arc<RwLock<_>>`
//! in [`SharedConfig`]. Everything else is read once at startup.

use giftflow_core::status::PaymentValidityPolicy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Service API credentials.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    secret: Box<[u8]>,
}

impl ServiceConfig {
    pub fn new(secret: impl Into<Box<[u8]>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Get the secret key bytes for HMAC verification.
    pub fn secret_bytes(&self) -> &[u8] {
        &self.secret
    }
}

/// Shared configuration state with separate locks for each section.
#[derive(Clone)]
pub struct SharedConfig {
    pub server: Arc<RwLock<ServerConfig>>,
    pub service: Arc<RwLock<ServiceConfig>>,
    pub payment_validity: Arc<RwLock<PaymentValidityPolicy>>,
}

impl SharedConfig {
    pub fn new(
        server: ServerConfig,
        service: ServiceConfig,
        payment_validity: PaymentValidityPolicy,
    ) -> Self {
        Self {
            server: Arc::new(RwLock::new(server)),
            service: Arc::new(RwLock::new(service)),
            payment_validity: Arc::new(RwLock::new(payment_validity)),
        }
    }
}
