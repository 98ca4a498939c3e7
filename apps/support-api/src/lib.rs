pub mod config;
pub mod db;
pub mod error;
pub mod hub;
pub mod models;
pub mod payments;
pub mod routes;

use std::sync::Arc;

use config::Config;
use hub::broadcast::Broadcaster;
use hub::registry::ConnectionRegistry;
use payments::duitku::DuitkuClient;
use payments::ledger::SupportLedger;
use payments::signature::WebhookVerifier;
use payments::webhook::WebhookProcessor;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn SupportLedger>,
    pub registry: Arc<ConnectionRegistry>,
    pub webhooks: Arc<WebhookProcessor>,
    pub payments: DuitkuClient,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the hub and payment pipeline around a ledger.
    pub fn new(config: Config, ledger: Arc<dyn SupportLedger>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), config.hub);
        let verifier = WebhookVerifier::new(&config.duitku.merchant_code, &config.duitku.merchant_key);
        let webhooks = Arc::new(WebhookProcessor::new(verifier, ledger.clone(), broadcaster));
        let payments = DuitkuClient::new(config.duitku.clone());

        Self {
            ledger,
            registry,
            webhooks,
            payments,
            config: Arc::new(config),
        }
    }
}
