//! Payment callback pipeline: authenticate, apply to the ledger, then notify.

use std::sync::Arc;

use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::hub::broadcast::Broadcaster;
use crate::hub::events::HubEvent;

use super::ledger::{parse_amount, LedgerError, LedgerOutcome, PaymentResult, SupportLedger};
use super::signature::{SignatureError, SignedFields, WebhookVerifier};

/// Callback body as posted by the provider. Only the first six fields are
/// acted on; the rest are accepted so that strict parsing never rejects a
/// genuine callback.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct CallbackPayload {
    pub merchant_code: String,
    pub amount: String,
    pub merchant_order_id: String,
    pub reference: String,
    pub result_code: String,
    pub signature: String,
    pub product_detail: Option<String>,
    pub additional_param: Option<String>,
    pub payment_code: Option<String>,
    pub merchant_user_id: Option<String>,
    pub publisher_order_id: Option<String>,
    pub settlement_date: Option<String>,
    pub va_number: Option<String>,
    pub source_account: Option<String>,
}

impl CallbackPayload {
    fn signed_fields(&self) -> SignedFields<'_> {
        SignedFields {
            merchant_code: &self.merchant_code,
            amount: &self.amount,
            merchant_order_id: &self.merchant_order_id,
            signature: &self.signature,
        }
    }
}

/// Acknowledgement body the provider expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    Success,
    Ignored,
}

impl CallbackStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackStatus::Success => "SUCCESS",
            CallbackStatus::Ignored => "IGNORED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error("missing callback field `{0}`")]
    Malformed(&'static str),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::Signature(e) => {
                tracing::warn!(error = %e, "rejected payment callback");
                ApiError::forbidden("Invalid signature")
            }
            WebhookError::Malformed(_) => ApiError::bad_request(err.to_string()),
            WebhookError::Ledger(e) => e.into(),
        }
    }
}

/// Owns everything a callback touches. Cheap to share behind an `Arc`.
pub struct WebhookProcessor {
    verifier: WebhookVerifier,
    ledger: Arc<dyn SupportLedger>,
    broadcaster: Broadcaster,
}

impl WebhookProcessor {
    pub fn new(verifier: WebhookVerifier, ledger: Arc<dyn SupportLedger>, broadcaster: Broadcaster) -> Self {
        Self {
            verifier,
            ledger,
            broadcaster,
        }
    }

    /// Handle one delivery.
    ///
    /// Nothing is written before the signature checks out. The creator is
    /// notified only after the ledger has committed, and a failed
    /// notification never fails the callback.
    pub async fn handle(&self, payload: &CallbackPayload) -> Result<CallbackStatus, WebhookError> {
        self.verifier.verify(&payload.signed_fields())?;

        if payload.reference.trim().is_empty() {
            return Err(WebhookError::Malformed("reference"));
        }
        if payload.result_code.trim().is_empty() {
            return Err(WebhookError::Malformed("resultCode"));
        }

        let result = PaymentResult {
            reference: payload.reference.clone(),
            support_id: payload.merchant_order_id.clone(),
            result_code: payload.result_code.trim().to_string(),
            amount: parse_amount(&payload.amount)?,
        };

        tracing::info!(
            support_id = %result.support_id,
            reference = %result.reference,
            result_code = %result.result_code,
            "payment callback verified"
        );

        match self.ledger.apply_payment_result(&result).await? {
            LedgerOutcome::Processed(notice) => {
                let event = HubEvent::from(notice);
                let report = self.broadcaster.broadcast_to_recipient(event.recipient(), &event).await;
                tracing::info!(
                    support_id = %result.support_id,
                    creator_id = event.recipient(),
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "payment processed"
                );
                Ok(CallbackStatus::Success)
            }
            LedgerOutcome::Duplicate => Ok(CallbackStatus::Success),
            LedgerOutcome::Ignored => Ok(CallbackStatus::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use bigdecimal::BigDecimal;
    use chrono::Utc;
    use tokio::sync::mpsc::UnboundedReceiver;

    use axum::extract::ws::Message;

    use super::*;
    use crate::config::HubConfig;
    use crate::hub::connection::testing::channel_connection;
    use crate::hub::registry::ConnectionRegistry;
    use crate::models::support::{NewSupport, SupportStatus};
    use crate::models::user::User;
    use crate::payments::memory::MemoryLedger;
    use crate::payments::signature::callback_signature;

    const CODE: &str = "DS100";
    const KEY: &str = "secret";
    const FAN: i64 = 10;
    const CREATOR: i64 = 20;

    struct Harness {
        processor: WebhookProcessor,
        ledger: Arc<MemoryLedger>,
        registry: Arc<ConnectionRegistry>,
    }

    async fn harness() -> Harness {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.insert_user(FAN, "Fan", User::ROLE_FAN);
        ledger.insert_user(CREATOR, "Creator", User::ROLE_CREATOR);
        ledger
            .create_pending(NewSupport {
                fan_id: FAN,
                creator_id: CREATOR,
                amount: BigDecimal::from(50000),
                support_id: "SUPPORT/1/aa/20/10".to_string(),
                reference_code: "DS-REF".to_string(),
                status: SupportStatus::Pending.as_str().to_string(),
                sent_at: Utc::now(),
                payment_timestamp: 1,
            })
            .await
            .unwrap();

        let registry = Arc::new(ConnectionRegistry::new());
        let processor = WebhookProcessor::new(
            WebhookVerifier::new(CODE, KEY),
            ledger.clone(),
            Broadcaster::new(registry.clone(), HubConfig::default()),
        );
        Harness {
            processor,
            ledger,
            registry,
        }
    }

    fn payload(result_code: &str) -> CallbackPayload {
        let amount = "50000";
        let order = "SUPPORT/1/aa/20/10";
        CallbackPayload {
            merchant_code: CODE.to_string(),
            amount: amount.to_string(),
            merchant_order_id: order.to_string(),
            reference: "DS-REF".to_string(),
            result_code: result_code.to_string(),
            signature: callback_signature(CODE, amount, order, KEY),
            ..Default::default()
        }
    }

    fn connect(h: &Harness) -> UnboundedReceiver<Message> {
        let (conn, rx) = channel_connection(CREATOR);
        h.registry.register(conn);
        rx
    }

    #[tokio::test]
    async fn success_credits_and_notifies_creator_once() {
        let h = harness().await;
        let mut rx = connect(&h);

        let status = h.processor.handle(&payload("00")).await.unwrap();
        assert_eq!(status, CallbackStatus::Success);
        assert_eq!(h.ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));

        let Some(Message::Text(frame)) = rx.recv().await else {
            panic!("expected an event frame");
        };
        let json: serde_json::Value = serde_json::from_str(frame.as_str()).unwrap();
        assert_eq!(json["event"], "support_received");
        assert_eq!(json["data"]["creator_id"], CREATOR);

        // Redelivery: acknowledged, nothing credited or sent.
        let status = h.processor.handle(&payload("00")).await.unwrap();
        assert_eq!(status, CallbackStatus::Success);
        assert_eq!(h.ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bad_signature_changes_nothing() {
        let h = harness().await;
        let mut rx = connect(&h);
        let mut forged = payload("00");
        forged.amount = "5000000".to_string();

        let err = h.processor.handle(&forged).await.unwrap_err();
        assert!(matches!(err, WebhookError::Signature(SignatureError::Mismatch)));
        assert_eq!(h.ledger.status_of("SUPPORT/1/aa/20/10"), Some(SupportStatus::Pending));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn decline_is_ignored_without_notification() {
        let h = harness().await;
        let mut rx = connect(&h);

        let status = h.processor.handle(&payload("01")).await.unwrap();
        assert_eq!(status, CallbackStatus::Ignored);
        assert_eq!(h.ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(0));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn processed_without_listeners_still_succeeds() {
        let h = harness().await;
        let status = h.processor.handle(&payload("00")).await.unwrap();
        assert_eq!(status, CallbackStatus::Success);
        assert_eq!(h.ledger.status_of("SUPPORT/1/aa/20/10"), Some(SupportStatus::Paid));
    }

    #[tokio::test]
    async fn missing_reference_is_malformed() {
        let h = harness().await;
        let mut p = payload("00");
        p.reference.clear();
        let err = h.processor.handle(&p).await.unwrap_err();
        assert!(matches!(err, WebhookError::Malformed("reference")));
    }

    #[test]
    fn error_mapping_matches_taxonomy() {
        let status = |e: WebhookError| ApiError::from(e).status;
        assert_eq!(status(SignatureError::Mismatch.into()), axum::http::StatusCode::FORBIDDEN);
        assert_eq!(
            status(LedgerError::UnknownTransaction.into()),
            axum::http::StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(WebhookError::Malformed("reference")),
            axum::http::StatusCode::BAD_REQUEST
        );
    }
}
