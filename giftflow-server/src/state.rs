//! Application state shared across all request handlers.

use crate::config::LoadedConfig;
use crate::config::runtime::SharedConfig;
use giftflow_core::engine::ReconciliationEngine;
use giftflow_core::providers::{CardAdapter, MobileMoneyAdapter};
use giftflow_core::status::StatusQueryService;
use giftflow_core::store::DonationStore;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub status: Arc<StatusQueryService>,
    /// Hot-reloadable configuration (SIGHUP).
    pub config: SharedConfig,
}

impl AppState {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        status: Arc<StatusQueryService>,
        config: SharedConfig,
    ) -> Self {
        Self {
            engine,
            status,
            config,
        }
    }

    /// Wire the engine, its adapters and the query service over `store`.
    pub fn build(store: Arc<dyn DonationStore>, loaded: &LoadedConfig) -> Self {
        let mut engine = ReconciliationEngine::new(Arc::clone(&store), loaded.engine.clone());
        if let Some(card) = &loaded.card {
            engine = engine.with_adapter(Arc::new(CardAdapter::new(card.clone())));
        }
        if let Some(momo) = &loaded.mobile_money {
            engine = engine.with_adapter(Arc::new(MobileMoneyAdapter::new(momo.clone())));
        }
        let status = StatusQueryService::new(store, loaded.payment_validity);
        Self::new(Arc::new(engine), Arc::new(status), loaded.shared())
    }
}
