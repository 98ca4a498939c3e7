//! Duitku invoice client used when a fan starts a donation.

use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::config::DuitkuConfig;

use super::signature::request_signature;

#[derive(Debug, thiserror::Error)]
pub enum PaymentProviderError {
    #[error("invoice request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("amount {0} cannot be billed")]
    InvalidAmount(String),
    #[error("provider rejected invoice ({status}): {message}")]
    Rejected { status: String, message: String },
}

/// What we ask the provider to bill.
#[derive(Debug, Clone)]
pub struct InvoiceRequest {
    pub amount: BigDecimal,
    pub merchant_order_id: String,
    pub product_details: String,
    pub email: String,
    pub callback_url: String,
}

/// The provider's answer: a reference to correlate callbacks and a URL for the fan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    pub reference: String,
    pub payment_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceBody<'a> {
    payment_amount: i64,
    merchant_order_id: &'a str,
    product_details: &'a str,
    email: &'a str,
    callback_url: &'a str,
    return_url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateInvoiceResponse {
    #[serde(default)]
    status_code: String,
    #[serde(default)]
    status_message: String,
    #[serde(default)]
    reference: String,
    #[serde(default)]
    payment_url: String,
}

#[derive(Clone)]
pub struct DuitkuClient {
    config: DuitkuConfig,
    http: reqwest::Client,
}

impl DuitkuClient {
    pub fn new(config: DuitkuConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Create an invoice. The provider only bills whole rupiah, so the amount
    /// is truncated to an integer.
    pub async fn create_invoice(&self, req: &InvoiceRequest, timestamp_ms: i64) -> Result<Invoice, PaymentProviderError> {
        let signature = request_signature(&self.config.merchant_code, timestamp_ms, &self.config.merchant_key);
        let payment_amount = req
            .amount
            .with_scale(0)
            .to_i64()
            .filter(|a| *a > 0)
            .ok_or_else(|| PaymentProviderError::InvalidAmount(req.amount.to_string()))?;

        let body = CreateInvoiceBody {
            payment_amount,
            merchant_order_id: &req.merchant_order_id,
            product_details: &req.product_details,
            email: &req.email,
            callback_url: &req.callback_url,
            return_url: "",
        };

        let resp: CreateInvoiceResponse = self
            .http
            .post(format!("{}/api/merchant/createInvoice", self.config.base_url))
            .header("x-duitku-signature", signature)
            .header("x-duitku-timestamp", timestamp_ms.to_string())
            .header("x-duitku-merchantcode", &self.config.merchant_code)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if resp.status_code != "00" || resp.reference.is_empty() || resp.payment_url.is_empty() {
            return Err(PaymentProviderError::Rejected {
                status: resp.status_code,
                message: resp.status_message,
            });
        }

        tracing::debug!(
            merchant_order_id = %req.merchant_order_id,
            reference = %resp.reference,
            "invoice created"
        );

        Ok(Invoice {
            reference: resp.reference,
            payment_url: resp.payment_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_body_uses_provider_field_names() {
        let body = CreateInvoiceBody {
            payment_amount: 50000,
            merchant_order_id: "SUPPORT/1",
            product_details: "details",
            email: "fan@example.com",
            callback_url: "https://app/cb",
            return_url: "",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["paymentAmount"], 50000);
        assert_eq!(json["merchantOrderId"], "SUPPORT/1");
        assert_eq!(json["callbackUrl"], "https://app/cb");
        assert_eq!(json["returnUrl"], "");
    }

    #[test]
    fn response_tolerates_missing_fields() {
        let resp: CreateInvoiceResponse =
            serde_json::from_str(r#"{"statusCode":"01","statusMessage":"bad merchant"}"#).unwrap();
        assert_eq!(resp.status_code, "01");
        assert!(resp.reference.is_empty());
    }
}
