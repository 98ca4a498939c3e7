use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;

use support_api::config::{Config, DuitkuConfig, HubConfig};
use support_api::models::support::{NewSupport, SupportStatus};
use support_api::models::user::{User, UserId};
use support_api::payments::ledger::SupportLedger;
use support_api::payments::memory::MemoryLedger;
use support_api::payments::signature::callback_signature;
use support_api::AppState;

pub const MERCHANT_CODE: &str = "DS-TEST";
pub const MERCHANT_KEY: &str = "test-merchant-key";

pub const FAN: UserId = 10;
pub const CREATOR: UserId = 20;
pub const OTHER_CREATOR: UserId = 21;

/// Config that never touches the environment. `duitku_base_url` points the
/// invoice client at a local mock when a test needs one.
pub fn test_config(duitku_base_url: &str) -> Config {
    Config {
        database_url: "postgres://unused".to_string(),
        database_pool_size: 1,
        port: 0,
        app_url: "http://support.test".to_string(),
        duitku: DuitkuConfig {
            merchant_code: MERCHANT_CODE.to_string(),
            merchant_key: MERCHANT_KEY.to_string(),
            base_url: duitku_base_url.to_string(),
        },
        hub: HubConfig::default(),
    }
}

/// In-memory ledger with one fan and two creators.
pub fn seeded_ledger() -> Arc<MemoryLedger> {
    let ledger = Arc::new(MemoryLedger::new());
    ledger.insert_user(FAN, "Budi", User::ROLE_FAN);
    ledger.insert_user(CREATOR, "Sari", User::ROLE_CREATOR);
    ledger.insert_user(OTHER_CREATOR, "Tono", User::ROLE_CREATOR);
    ledger
}

/// Build a test AppState around the in-memory ledger.
pub fn test_state_with(config: Config) -> (AppState, Arc<MemoryLedger>) {
    let ledger = seeded_ledger();
    let state = AppState::new(config, ledger.clone());
    (state, ledger)
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState, Arc<MemoryLedger>) {
    let (state, ledger) = test_state_with(test_config("http://127.0.0.1:9"));
    let app = support_api::routes::router().with_state(state.clone());
    (app, state, ledger)
}

/// Start the app on a real TCP listener, for websocket clients.
pub async fn start_server() -> (SocketAddr, AppState, Arc<MemoryLedger>) {
    let (app, state, ledger) = test_app();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, ledger)
}

/// Store a pending donation from `FAN` to `creator_id`.
pub async fn pending_support(
    ledger: &MemoryLedger,
    creator_id: UserId,
    support_id: &str,
    reference: &str,
    amount: i64,
) {
    ledger
        .create_pending(NewSupport {
            fan_id: FAN,
            creator_id,
            amount: BigDecimal::from(amount),
            support_id: support_id.to_string(),
            reference_code: reference.to_string(),
            status: SupportStatus::Pending.as_str().to_string(),
            sent_at: Utc::now(),
            payment_timestamp: Utc::now().timestamp_millis(),
        })
        .await
        .expect("seed pending support");
}

/// A provider callback as it arrives on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Callback {
    pub merchant_code: String,
    pub amount: String,
    pub merchant_order_id: String,
    pub reference: String,
    pub result_code: String,
    pub signature: String,
    pub payment_code: String,
}

/// A correctly signed callback.
pub fn signed_callback(support_id: &str, reference: &str, amount: &str, result_code: &str) -> Callback {
    Callback {
        merchant_code: MERCHANT_CODE.to_string(),
        amount: amount.to_string(),
        merchant_order_id: support_id.to_string(),
        reference: reference.to_string(),
        result_code: result_code.to_string(),
        signature: callback_signature(MERCHANT_CODE, amount, support_id, MERCHANT_KEY),
        payment_code: "VC".to_string(),
    }
}

/// Poll until `check` holds; registration races the websocket handshake.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}
