//! Duitku request and callback signatures.
//!
//! Callbacks are signed as `md5(merchantCode + amount + merchantOrderId + merchantKey)`,
//! invoice requests as `sha256(merchantCode + timestamp + merchantKey)`, both
//! lowercase hex.

use md5::Md5;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The callback fields covered by the signature, as received.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub merchant_code: &'a str,
    pub amount: &'a str,
    pub merchant_order_id: &'a str,
    pub signature: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("missing callback field `{0}`")]
    MissingField(&'static str),
    #[error("callback addressed to a different merchant")]
    MerchantMismatch,
    #[error("callback signature mismatch")]
    Mismatch,
}

/// Authenticates inbound callbacks against the shared merchant key.
#[derive(Clone)]
pub struct WebhookVerifier {
    merchant_code: String,
    merchant_key: String,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("merchant_code", &self.merchant_code)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(merchant_code: impl Into<String>, merchant_key: impl Into<String>) -> Self {
        Self {
            merchant_code: merchant_code.into(),
            merchant_key: merchant_key.into(),
        }
    }

    /// Fails closed: every signed field must be present and the digest must match.
    pub fn verify(&self, fields: &SignedFields<'_>) -> Result<(), SignatureError> {
        for (name, value) in [
            ("merchantCode", fields.merchant_code),
            ("amount", fields.amount),
            ("merchantOrderId", fields.merchant_order_id),
            ("signature", fields.signature),
        ] {
            if value.trim().is_empty() {
                return Err(SignatureError::MissingField(name));
            }
        }

        if fields.merchant_code != self.merchant_code {
            return Err(SignatureError::MerchantMismatch);
        }

        let expected = callback_signature(
            fields.merchant_code,
            fields.amount,
            fields.merchant_order_id,
            &self.merchant_key,
        );
        let supplied = fields.signature.trim().to_ascii_lowercase();

        if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

/// Signature the provider attaches to a payment callback.
pub fn callback_signature(merchant_code: &str, amount: &str, merchant_order_id: &str, merchant_key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(merchant_code.as_bytes());
    hasher.update(amount.as_bytes());
    hasher.update(merchant_order_id.as_bytes());
    hasher.update(merchant_key.as_bytes());
    to_hex(&hasher.finalize())
}

/// Signature this service attaches to invoice requests.
pub fn request_signature(merchant_code: &str, timestamp_ms: i64, merchant_key: &str) -> String {
    let raw = format!("{merchant_code}{timestamp_ms}{merchant_key}");
    to_hex(&Sha256::digest(raw.as_bytes()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
