//! Events pushed to creators over their live connections.

use axum::extract::ws::Utf8Bytes;
use bigdecimal::BigDecimal;
use serde::Serialize;

use crate::models::support::amount_as_number;
use crate::models::user::UserId;
use crate::payments::ledger::PaymentNotice;

/// Wire format: `{ "event": "<name>", "data": { ... } }`, one per text frame.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum HubEvent {
    SupportReceived(SupportReceived),
}

#[derive(Debug, Clone, Serialize)]
pub struct SupportReceived {
    #[serde(serialize_with = "amount_as_number")]
    pub amount: BigDecimal,
    /// Provider reference; lets clients de-duplicate if a frame is replayed.
    pub reference: String,
    pub support_id: String,
    pub fan_id: UserId,
    pub fan_name: String,
    pub creator_id: UserId,
    pub creator_name: String,
}

impl From<PaymentNotice> for HubEvent {
    fn from(notice: PaymentNotice) -> Self {
        HubEvent::SupportReceived(SupportReceived {
            amount: notice.amount,
            reference: notice.reference,
            support_id: notice.support_id,
            fan_id: notice.fan_id,
            fan_name: notice.fan_name,
            creator_id: notice.creator_id,
            creator_name: notice.creator_name,
        })
    }
}

impl HubEvent {
    pub fn name(&self) -> &'static str {
        match self {
            HubEvent::SupportReceived(_) => "support_received",
        }
    }

    /// The recipient whose connections should see this event.
    pub fn recipient(&self) -> UserId {
        match self {
            HubEvent::SupportReceived(e) => e.creator_id,
        }
    }

    /// Serialize into a text frame payload. The returned buffer is cheaply
    /// cloneable, so every target shares the same bytes.
    pub fn encode(&self) -> Result<Utf8Bytes, serde_json::Error> {
        serde_json::to_string(self).map(Utf8Bytes::from)
    }
}
