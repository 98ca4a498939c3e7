use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::db::schema::balances;

use super::user::UserId;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = balances)]
pub struct Balance {
    pub user_id: UserId,
    pub amount: BigDecimal,
    pub updated_at: DateTime<Utc>,
}

/// Row used to upsert a credit. On conflict the amount is added to the
/// existing balance rather than replacing it.
#[derive(Debug, Insertable)]
#[diesel(table_name = balances)]
pub struct BalanceCredit<'a> {
    pub user_id: UserId,
    pub amount: &'a BigDecimal,
    pub updated_at: DateTime<Utc>,
}
