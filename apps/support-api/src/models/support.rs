use std::fmt;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Serialize, Serializer};

use crate::db::schema::supports;

use super::user::UserId;

/// Lifecycle of a donation attempt. `Paid` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    Pending,
    Paid,
    Failed,
}

impl SupportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SupportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown support status `{other}`")),
        }
    }
}

/// A donation attempt as stored in `supports`.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = supports)]
pub struct Support {
    pub id: i64,
    pub fan_id: UserId,
    pub creator_id: UserId,
    pub amount: BigDecimal,
    /// Correlation id minted when the donation was accepted.
    pub support_id: String,
    /// Reference assigned by the payment provider.
    pub reference_code: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub payment_timestamp: i64,
}

impl Support {
    pub fn status(&self) -> Result<SupportStatus, String> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = supports)]
pub struct NewSupport {
    pub fan_id: UserId,
    pub creator_id: UserId,
    pub amount: BigDecimal,
    pub support_id: String,
    pub reference_code: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub payment_timestamp: i64,
}

/// Emit decimal amounts as JSON numbers, without trailing zeros.
pub fn amount_as_number<S: Serializer>(amount: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
    let text = if amount.is_integer() {
        amount.with_scale(0).to_string()
    } else {
        amount.normalized().to_string()
    };
    serde_json::Number::from_str(&text)
        .map_err(serde::ser::Error::custom)?
        .serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_column_text() {
        for status in [SupportStatus::Pending, SupportStatus::Paid, SupportStatus::Failed] {
            assert_eq!(status.as_str().parse::<SupportStatus>().unwrap(), status);
        }
        assert!("refunded".parse::<SupportStatus>().is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!SupportStatus::Pending.is_terminal());
        assert!(SupportStatus::Paid.is_terminal());
        assert!(SupportStatus::Failed.is_terminal());
    }
}
