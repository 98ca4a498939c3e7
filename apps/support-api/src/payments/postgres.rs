//! Postgres-backed ledger.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::OptionalExtension;
use diesel::upsert::excluded;
use diesel_async::{AsyncConnection, RunQueryDsl};
use scoped_futures::ScopedFutureExt;

use crate::db::pool::DbPool;
use crate::db::schema::{balances, supports, users};
use crate::models::balance::{Balance, BalanceCredit};
use crate::models::support::{NewSupport, Support, SupportStatus};
use crate::models::user::{User, UserId};

use super::ledger::{
    decide, HistoryEntry, LedgerError, Page, PageRequest, PaymentContext, Settlement, SupporterEntry, SupportLedger,
};

#[derive(Clone)]
pub struct PgLedger {
    db: DbPool,
}

impl PgLedger {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &DbPool {
        &self.db
    }
}

#[async_trait]
impl SupportLedger for PgLedger {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, LedgerError> {
        let mut conn = self.db.get().await?;
        let user = users::table
            .find(id)
            .select(User::as_select())
            .get_result(&mut conn)
            .await
            .optional()?;
        Ok(user)
    }

    async fn create_pending(&self, support: NewSupport) -> Result<Support, LedgerError> {
        let mut conn = self.db.get().await?;
        let row = diesel::insert_into(supports::table)
            .values(&support)
            .returning(Support::as_returning())
            .get_result(&mut conn)
            .await?;
        Ok(row)
    }

    async fn find_payment(&self, reference: &str, support_id: &str) -> Result<Option<PaymentContext>, LedgerError> {
        let mut conn = self.db.get().await?;

        let Some(support) = supports::table
            .filter(supports::reference_code.eq(reference))
            .filter(supports::support_id.eq(support_id))
            .select(Support::as_select())
            .first(&mut conn)
            .await
            .optional()?
        else {
            return Ok(None);
        };

        let names: Vec<(UserId, String)> = users::table
            .filter(users::id.eq_any([support.fan_id, support.creator_id]))
            .select((users::id, users::name))
            .load(&mut conn)
            .await?;

        let name_of = |id: UserId| {
            names
                .iter()
                .find(|(uid, _)| *uid == id)
                .map(|(_, name)| name.clone())
                .ok_or(LedgerError::UnknownUser(id))
        };

        Ok(Some(PaymentContext {
            fan_name: name_of(support.fan_id)?,
            creator_name: name_of(support.creator_id)?,
            support,
        }))
    }

    async fn settle(&self, support_pk: i64, callback_amount: &BigDecimal) -> Result<Settlement, LedgerError> {
        let mut conn = self.db.get().await?;
        let callback_amount = callback_amount.clone();

        conn.transaction::<_, LedgerError, _>(|conn| {
            async move {
                // Row lock serialises concurrent deliveries of the same callback.
                let (status, amount, creator_id): (String, BigDecimal, UserId) = supports::table
                    .find(support_pk)
                    .select((supports::status, supports::amount, supports::creator_id))
                    .for_update()
                    .get_result(conn)
                    .await
                    .optional()?
                    .ok_or(LedgerError::UnknownTransaction)?;

                let current: SupportStatus = status.parse().map_err(LedgerError::Corrupt)?;
                let settlement = decide(current, &amount, &callback_amount)?;
                if settlement != Settlement::Credited {
                    return Ok(settlement);
                }

                diesel::insert_into(balances::table)
                    .values(&BalanceCredit {
                        user_id: creator_id,
                        amount: &amount,
                        updated_at: Utc::now(),
                    })
                    .on_conflict(balances::user_id)
                    .do_update()
                    .set((
                        balances::amount.eq(balances::amount + excluded(balances::amount)),
                        balances::updated_at.eq(excluded(balances::updated_at)),
                    ))
                    .execute(conn)
                    .await?;

                let flipped = diesel::update(
                    supports::table
                        .find(support_pk)
                        .filter(supports::status.eq(SupportStatus::Pending.as_str())),
                )
                .set(supports::status.eq(SupportStatus::Paid.as_str()))
                .execute(conn)
                .await?;

                if flipped != 1 {
                    return Err(LedgerError::Corrupt(format!(
                        "status flip touched {flipped} rows for support {support_pk}"
                    )));
                }

                Ok(Settlement::Credited)
            }
            .scope_boxed()
        })
        .await
    }

    async fn balance_of(&self, user_id: UserId) -> Result<BigDecimal, LedgerError> {
        let mut conn = self.db.get().await?;
        let balance = balances::table
            .find(user_id)
            .select(Balance::as_select())
            .get_result(&mut conn)
            .await
            .optional()?;
        Ok(balance.map(|b| b.amount).unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn creator_supporters(
        &self,
        creator_id: UserId,
        page: PageRequest,
    ) -> Result<Page<SupporterEntry>, LedgerError> {
        let mut conn = self.db.get().await?;

        let mut query = supports::table
            .inner_join(users::table.on(users::id.eq(supports::fan_id)))
            .filter(supports::creator_id.eq(creator_id))
            .filter(supports::status.eq(SupportStatus::Paid.as_str()))
            .order(supports::id.desc())
            .limit(page.fetch_limit())
            .select((supports::id, supports::fan_id, users::name, supports::amount, supports::sent_at))
            .into_boxed();

        if let Some(before) = page.before {
            query = query.filter(supports::id.lt(before));
        }

        let rows: Vec<(i64, UserId, String, BigDecimal, DateTime<Utc>)> = query.load(&mut conn).await?;
        let rows = rows
            .into_iter()
            .map(|(id, fan_id, fan_name, amount, sent_at)| SupporterEntry {
                id,
                fan_id,
                fan_name,
                amount,
                sent_at,
            })
            .collect();
        Ok(Page::from_rows(rows, page))
    }

    async fn fan_spending(&self, fan_id: UserId) -> Result<BigDecimal, LedgerError> {
        let mut conn = self.db.get().await?;
        let total: Option<BigDecimal> = supports::table
            .filter(supports::fan_id.eq(fan_id))
            .filter(supports::status.eq(SupportStatus::Paid.as_str()))
            .select(diesel::dsl::sum(supports::amount))
            .get_result(&mut conn)
            .await?;
        Ok(total.unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn fan_history(&self, fan_id: UserId, page: PageRequest) -> Result<Page<HistoryEntry>, LedgerError> {
        let mut conn = self.db.get().await?;

        let mut query = supports::table
            .inner_join(users::table.on(users::id.eq(supports::creator_id)))
            .filter(supports::fan_id.eq(fan_id))
            .filter(supports::status.eq(SupportStatus::Paid.as_str()))
            .order(supports::id.desc())
            .limit(page.fetch_limit())
            .select((supports::id, supports::creator_id, users::name, supports::amount, supports::sent_at))
            .into_boxed();

        if let Some(before) = page.before {
            query = query.filter(supports::id.lt(before));
        }

        let rows: Vec<(i64, UserId, String, BigDecimal, DateTime<Utc>)> = query.load(&mut conn).await?;
        let rows = rows
            .into_iter()
            .map(|(id, creator_id, creator_name, amount, sent_at)| HistoryEntry {
                id,
                creator_id,
                creator_name,
                amount,
                sent_at,
            })
            .collect();
        Ok(Page::from_rows(rows, page))
    }
}
