//! Support ledger: the `pending -> paid` state machine and balance credit.

use std::str::FromStr;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::support::{amount_as_number, NewSupport, Support, SupportStatus};
use crate::models::user::{User, UserId};

/// Provider result code for a settled payment. Anything else is a decline.
pub const SUCCESS_RESULT_CODE: &str = "00";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown transaction")]
    UnknownTransaction,
    #[error("callback amount {received} does not match donation amount {expected}")]
    AmountMismatch {
        expected: BigDecimal,
        received: BigDecimal,
    },
    #[error("invalid amount `{0}`")]
    InvalidAmount(String),
    #[error("user {0} not found")]
    UnknownUser(UserId),
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),
}

/// A verified provider callback, reduced to what the ledger acts on.
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub reference: String,
    pub support_id: String,
    pub result_code: String,
    pub amount: BigDecimal,
}

impl PaymentResult {
    pub fn is_success(&self) -> bool {
        self.result_code == SUCCESS_RESULT_CODE
    }
}

/// A donation joined with the display names the notification carries.
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub support: Support,
    pub fan_name: String,
    pub creator_name: String,
}

/// What a committed payment means for the creator.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentNotice {
    pub support_id: String,
    pub reference: String,
    pub amount: BigDecimal,
    pub fan_id: UserId,
    pub fan_name: String,
    pub creator_id: UserId,
    pub creator_name: String,
}

impl From<PaymentContext> for PaymentNotice {
    fn from(ctx: PaymentContext) -> Self {
        Self {
            support_id: ctx.support.support_id,
            reference: ctx.support.reference_code,
            amount: ctx.support.amount,
            fan_id: ctx.support.fan_id,
            fan_name: ctx.fan_name,
            creator_id: ctx.support.creator_id,
            creator_name: ctx.creator_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOutcome {
    /// Balance credited and status flipped; the creator should be notified.
    Processed(PaymentNotice),
    /// The provider reported a decline. Nothing changed.
    Ignored,
    /// The donation already reached a terminal state. Nothing changed.
    Duplicate,
}

/// Result of the atomic step, as seen from inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Credited,
    AlreadySettled(SupportStatus),
}

/// Decide the transition for the row as locked inside the transaction.
pub fn decide(
    current: SupportStatus,
    stored_amount: &BigDecimal,
    callback_amount: &BigDecimal,
) -> Result<Settlement, LedgerError> {
    if current.is_terminal() {
        return Ok(Settlement::AlreadySettled(current));
    }
    if stored_amount != callback_amount {
        return Err(LedgerError::AmountMismatch {
            expected: stored_amount.clone(),
            received: callback_amount.clone(),
        });
    }
    Ok(Settlement::Credited)
}

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 50;

/// Keyset cursor over paid donations, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Only rows whose primary key is below this one.
    pub before: Option<i64>,
    pub limit: i64,
}

impl PageRequest {
    /// Clamps `limit` into `1..=MAX_PAGE_SIZE`.
    pub fn new(before: Option<i64>, limit: Option<i64>) -> Self {
        Self {
            before,
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to fetch: one past the page to learn whether more exist.
    pub fn fetch_limit(&self) -> i64 {
        self.limit + 1
    }

    pub fn admits(&self, id: i64) -> bool {
        self.before.map_or(true, |before| id < before)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Build from rows fetched with [`PageRequest::fetch_limit`].
    pub fn from_rows(mut rows: Vec<T>, page: PageRequest) -> Self {
        let limit = usize::try_from(page.limit).unwrap_or(0);
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        Self { data: rows, has_more }
    }
}

/// A paid donation as listed for the creator who received it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SupporterEntry {
    /// Cursor value for the next page.
    pub id: i64,
    pub fan_id: UserId,
    pub fan_name: String,
    #[serde(serialize_with = "amount_as_number")]
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    pub sent_at: DateTime<Utc>,
}

/// A paid donation as listed for the fan who sent it.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HistoryEntry {
    pub id: i64,
    pub creator_id: UserId,
    pub creator_name: String,
    #[serde(serialize_with = "amount_as_number")]
    #[schema(value_type = f64)]
    pub amount: BigDecimal,
    pub sent_at: DateTime<Utc>,
}

/// Storage behind the donation flow.
///
/// Backed by Postgres in production and an in-memory map in tests.
#[async_trait]
pub trait SupportLedger: Send + Sync {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, LedgerError>;

    /// Persist a freshly accepted donation in `pending` state.
    async fn create_pending(&self, support: NewSupport) -> Result<Support, LedgerError>;

    /// Look up a donation by its provider reference and correlation id.
    async fn find_payment(&self, reference: &str, support_id: &str) -> Result<Option<PaymentContext>, LedgerError>;

    /// Re-check the row under lock and, if still pending, credit the creator and
    /// mark it paid. Must be all-or-nothing.
    async fn settle(&self, support_pk: i64, callback_amount: &BigDecimal) -> Result<Settlement, LedgerError>;

    async fn balance_of(&self, user_id: UserId) -> Result<BigDecimal, LedgerError>;

    /// Paid donations received by a creator, newest first.
    async fn creator_supporters(&self, creator_id: UserId, page: PageRequest)
        -> Result<Page<SupporterEntry>, LedgerError>;

    /// Total of a fan's paid donations; zero when there are none.
    async fn fan_spending(&self, fan_id: UserId) -> Result<BigDecimal, LedgerError>;

    /// Paid donations sent by a fan, newest first.
    async fn fan_history(&self, fan_id: UserId, page: PageRequest) -> Result<Page<HistoryEntry>, LedgerError>;

    /// Apply a verified callback.
    ///
    /// Unknown transactions are errors. Declines and redeliveries are normal
    /// outcomes that leave the ledger untouched.
    async fn apply_payment_result(&self, result: &PaymentResult) -> Result<LedgerOutcome, LedgerError> {
        let ctx = self
            .find_payment(&result.reference, &result.support_id)
            .await?
            .ok_or(LedgerError::UnknownTransaction)?;

        if !result.is_success() {
            tracing::info!(
                support_id = %result.support_id,
                result_code = %result.result_code,
                "payment declined by provider"
            );
            return Ok(LedgerOutcome::Ignored);
        }

        match self.settle(ctx.support.id, &result.amount).await? {
            Settlement::Credited => Ok(LedgerOutcome::Processed(ctx.into())),
            Settlement::AlreadySettled(status) => {
                tracing::info!(
                    support_id = %result.support_id,
                    %status,
                    "payment already settled, treating as redelivery"
                );
                Ok(LedgerOutcome::Duplicate)
            }
        }
    }
}

/// Parse a provider amount (`"50000"`, `"50000.00"`). Rejects non-positive values.
pub fn parse_amount(raw: &str) -> Result<BigDecimal, LedgerError> {
    let amount = BigDecimal::from_str(raw.trim()).map_err(|_| LedgerError::InvalidAmount(raw.to_string()))?;
    if amount <= BigDecimal::from(0) {
        return Err(LedgerError::InvalidAmount(raw.to_string()));
    }
    Ok(amount)
}

/// Mint the correlation id sent to the provider as `merchantOrderId`.
///
/// Timestamp plus 64 random bits keeps ids unique without a shared counter.
pub fn generate_support_id(timestamp_ms: i64, creator_id: UserId, fan_id: UserId) -> String {
    let nonce: [u8; 8] = rand::thread_rng().gen();
    let nonce: String = nonce.iter().map(|b| format!("{b:02x}")).collect();
    format!("SUPPORT/{timestamp_ms}/{nonce}/{creator_id}/{fan_id}")
}
