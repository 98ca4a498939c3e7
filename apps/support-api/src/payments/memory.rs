//! In-memory ledger for tests and local runs without Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use parking_lot::Mutex;

use crate::models::support::{NewSupport, Support, SupportStatus};
use crate::models::user::{User, UserId};

use super::ledger::{
    decide, HistoryEntry, LedgerError, Page, PageRequest, PaymentContext, Settlement, SupporterEntry, SupportLedger,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, User>,
    balances: HashMap<UserId, BigDecimal>,
    supports: Vec<Support>,
}

/// A single mutex stands in for the database transaction: every settle runs
/// entirely under it.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl State {
    fn name_of(&self, id: UserId) -> Result<String, LedgerError> {
        self.users
            .get(&id)
            .map(|u| u.name.clone())
            .ok_or(LedgerError::UnknownUser(id))
    }

    /// Paid rows matching `filter`, newest first, cut to one past the page.
    fn paid_page<'a>(&'a self, page: PageRequest, filter: impl Fn(&Support) -> bool) -> Vec<&'a Support> {
        let mut rows: Vec<&Support> = self
            .supports
            .iter()
            .filter(|s| s.status().ok() == Some(SupportStatus::Paid))
            .filter(|s| page.admits(s.id) && filter(s))
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        rows.truncate(usize::try_from(page.fetch_limit()).unwrap_or(0));
        rows
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_user(&self, id: UserId, name: &str, role: &str) {
        self.state.lock().users.insert(
            id,
            User {
                id,
                name: name.to_string(),
                role: role.to_string(),
            },
        );
    }

    /// Current status of a donation by correlation id.
    pub fn status_of(&self, support_id: &str) -> Option<SupportStatus> {
        self.state
            .lock()
            .supports
            .iter()
            .find(|s| s.support_id == support_id)
            .and_then(|s| s.status().ok())
    }
}

#[async_trait]
impl SupportLedger for MemoryLedger {
    async fn find_user(&self, id: UserId) -> Result<Option<User>, LedgerError> {
        Ok(self.state.lock().users.get(&id).cloned())
    }

    async fn create_pending(&self, new: NewSupport) -> Result<Support, LedgerError> {
        let mut state = self.state.lock();
        if state.supports.iter().any(|s| s.support_id == new.support_id) {
            return Err(LedgerError::Database(diesel::result::Error::DatabaseError(
                diesel::result::DatabaseErrorKind::UniqueViolation,
                Box::new(format!("duplicate support_id {}", new.support_id)),
            )));
        }
        let support = Support {
            id: state.supports.len() as i64 + 1,
            fan_id: new.fan_id,
            creator_id: new.creator_id,
            amount: new.amount,
            support_id: new.support_id,
            reference_code: new.reference_code,
            status: new.status,
            sent_at: new.sent_at,
            payment_timestamp: new.payment_timestamp,
        };
        state.supports.push(support.clone());
        Ok(support)
    }

    async fn find_payment(&self, reference: &str, support_id: &str) -> Result<Option<PaymentContext>, LedgerError> {
        let state = self.state.lock();
        let Some(support) = state
            .supports
            .iter()
            .find(|s| s.reference_code == reference && s.support_id == support_id)
        else {
            return Ok(None);
        };

        Ok(Some(PaymentContext {
            fan_name: state.name_of(support.fan_id)?,
            creator_name: state.name_of(support.creator_id)?,
            support: support.clone(),
        }))
    }

    async fn settle(&self, support_pk: i64, callback_amount: &BigDecimal) -> Result<Settlement, LedgerError> {
        let mut state = self.state.lock();
        let State { balances, supports, .. } = &mut *state;

        let support = supports
            .iter_mut()
            .find(|s| s.id == support_pk)
            .ok_or(LedgerError::UnknownTransaction)?;
        let current = support.status().map_err(LedgerError::Corrupt)?;

        let settlement = decide(current, &support.amount, callback_amount)?;
        if settlement == Settlement::Credited {
            *balances
                .entry(support.creator_id)
                .or_insert_with(|| BigDecimal::from(0)) += &support.amount;
            support.status = SupportStatus::Paid.as_str().to_string();
        }
        Ok(settlement)
    }

    async fn balance_of(&self, user_id: UserId) -> Result<BigDecimal, LedgerError> {
        Ok(self
            .state
            .lock()
            .balances
            .get(&user_id)
            .cloned()
            .unwrap_or_else(|| BigDecimal::from(0)))
    }

    async fn creator_supporters(
        &self,
        creator_id: UserId,
        page: PageRequest,
    ) -> Result<Page<SupporterEntry>, LedgerError> {
        let state = self.state.lock();
        let rows = state
            .paid_page(page, |s| s.creator_id == creator_id)
            .into_iter()
            .map(|s| {
                Ok(SupporterEntry {
                    id: s.id,
                    fan_id: s.fan_id,
                    fan_name: state.name_of(s.fan_id)?,
                    amount: s.amount.clone(),
                    sent_at: s.sent_at,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        Ok(Page::from_rows(rows, page))
    }

    async fn fan_spending(&self, fan_id: UserId) -> Result<BigDecimal, LedgerError> {
        Ok(self
            .state
            .lock()
            .supports
            .iter()
            .filter(|s| s.fan_id == fan_id && s.status().ok() == Some(SupportStatus::Paid))
            .fold(BigDecimal::from(0), |total, s| total + &s.amount))
    }

    async fn fan_history(&self, fan_id: UserId, page: PageRequest) -> Result<Page<HistoryEntry>, LedgerError> {
        let state = self.state.lock();
        let rows = state
            .paid_page(page, |s| s.fan_id == fan_id)
            .into_iter()
            .map(|s| {
                Ok(HistoryEntry {
                    id: s.id,
                    creator_id: s.creator_id,
                    creator_name: state.name_of(s.creator_id)?,
                    amount: s.amount.clone(),
                    sent_at: s.sent_at,
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;
        Ok(Page::from_rows(rows, page))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::payments::ledger::{LedgerOutcome, PaymentResult};

    const FAN: UserId = 10;
    const CREATOR: UserId = 20;

    async fn seeded(amount: i64) -> (MemoryLedger, Support) {
        let ledger = MemoryLedger::new();
        ledger.insert_user(FAN, "Fan", User::ROLE_FAN);
        ledger.insert_user(CREATOR, "Creator", User::ROLE_CREATOR);
        let support = ledger
            .create_pending(NewSupport {
                fan_id: FAN,
                creator_id: CREATOR,
                amount: BigDecimal::from(amount),
                support_id: "S1".to_string(),
                reference_code: "R1".to_string(),
                status: SupportStatus::Pending.as_str().to_string(),
                sent_at: Utc::now(),
                payment_timestamp: 1,
            })
            .await
            .unwrap();
        (ledger, support)
    }

    fn result(code: &str, amount: i64) -> PaymentResult {
        PaymentResult {
            reference: "R1".to_string(),
            support_id: "S1".to_string(),
            result_code: code.to_string(),
            amount: BigDecimal::from(amount),
        }
    }

    #[tokio::test]
    async fn success_credits_once_then_reports_duplicate() {
        let (ledger, _) = seeded(50000).await;

        let outcome = ledger.apply_payment_result(&result("00", 50000)).await.unwrap();
        let LedgerOutcome::Processed(notice) = outcome else {
            panic!("expected processed, got {outcome:?}");
        };
        assert_eq!(notice.creator_id, CREATOR);
        assert_eq!(notice.fan_name, "Fan");
        assert_eq!(notice.amount, BigDecimal::from(50000));
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));
        assert_eq!(ledger.status_of("S1"), Some(SupportStatus::Paid));

        let again = ledger.apply_payment_result(&result("00", 50000)).await.unwrap();
        assert_eq!(again, LedgerOutcome::Duplicate);
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));
    }

    #[tokio::test]
    async fn decline_is_ignored_without_mutation() {
        let (ledger, _) = seeded(50000).await;
        let outcome = ledger.apply_payment_result(&result("01", 50000)).await.unwrap();
        assert_eq!(outcome, LedgerOutcome::Ignored);
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(0));
        assert_eq!(ledger.status_of("S1"), Some(SupportStatus::Pending));
    }

    #[tokio::test]
    async fn decline_after_payment_does_not_touch_paid_row() {
        let (ledger, _) = seeded(50000).await;
        ledger.apply_payment_result(&result("00", 50000)).await.unwrap();
        let outcome = ledger.apply_payment_result(&result("02", 50000)).await.unwrap();
        assert_eq!(outcome, LedgerOutcome::Ignored);
        assert_eq!(ledger.status_of("S1"), Some(SupportStatus::Paid));
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));
    }

    #[tokio::test]
    async fn unknown_transaction_is_an_error() {
        let (ledger, _) = seeded(50000).await;
        let mut unknown = result("00", 50000);
        unknown.reference = "R-other".to_string();
        let err = ledger.apply_payment_result(&unknown).await.unwrap_err();
        assert!(matches!(err, LedgerError::UnknownTransaction));
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn amount_mismatch_leaves_row_pending() {
        let (ledger, _) = seeded(50000).await;
        let err = ledger.apply_payment_result(&result("00", 1)).await.unwrap_err();
        assert!(matches!(err, LedgerError::AmountMismatch { .. }));
        assert_eq!(ledger.status_of("S1"), Some(SupportStatus::Pending));
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(0));
    }

    #[tokio::test]
    async fn concurrent_redeliveries_credit_exactly_once() {
        let (ledger, _) = seeded(50000).await;
        let ledger = Arc::new(ledger);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.apply_payment_result(&result("00", 50000)).await.unwrap()
            }));
        }

        let mut processed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), LedgerOutcome::Processed(_)) {
                processed += 1;
            }
        }
        assert_eq!(processed, 1);
        assert_eq!(ledger.balance_of(CREATOR).await.unwrap(), BigDecimal::from(50000));
    }

    #[tokio::test]
    async fn duplicate_correlation_id_is_rejected() {
        let (ledger, support) = seeded(50000).await;
        let err = ledger
            .create_pending(NewSupport {
                fan_id: FAN,
                creator_id: CREATOR,
                amount: BigDecimal::from(1),
                support_id: support.support_id,
                reference_code: "R2".to_string(),
                status: SupportStatus::Pending.as_str().to_string(),
                sent_at: Utc::now(),
                payment_timestamp: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Database(_)));
    }

    async fn paid(ledger: &MemoryLedger, support_id: &str, fan_id: UserId, creator_id: UserId, amount: i64) {
        ledger
            .create_pending(NewSupport {
                fan_id,
                creator_id,
                amount: BigDecimal::from(amount),
                support_id: support_id.to_string(),
                reference_code: format!("R-{support_id}"),
                status: SupportStatus::Pending.as_str().to_string(),
                sent_at: Utc::now(),
                payment_timestamp: 1,
            })
            .await
            .unwrap();
        let outcome = ledger
            .apply_payment_result(&PaymentResult {
                reference: format!("R-{support_id}"),
                support_id: support_id.to_string(),
                result_code: "00".to_string(),
                amount: BigDecimal::from(amount),
            })
            .await
            .unwrap();
        assert!(matches!(outcome, LedgerOutcome::Processed(_)));
    }

    #[tokio::test]
    async fn supporters_list_paid_donations_newest_first() {
        let (ledger, _) = seeded(99).await; // S1 stays pending
        ledger.insert_user(11, "Other Fan", User::ROLE_FAN);
        paid(&ledger, "S2", FAN, CREATOR, 1000).await;
        paid(&ledger, "S3", 11, CREATOR, 2000).await;
        paid(&ledger, "S4", FAN, CREATOR, 3000).await;

        let first = ledger.creator_supporters(CREATOR, PageRequest::new(None, Some(2))).await.unwrap();
        assert!(first.has_more);
        let names: Vec<_> = first.data.iter().map(|e| (e.fan_name.as_str(), e.amount.clone())).collect();
        assert_eq!(names, [("Fan", BigDecimal::from(3000)), ("Other Fan", BigDecimal::from(2000))]);

        let cursor = first.data.last().map(|e| e.id);
        let second = ledger.creator_supporters(CREATOR, PageRequest::new(cursor, Some(2))).await.unwrap();
        assert!(!second.has_more);
        assert_eq!(second.data.len(), 1);
        assert_eq!(second.data[0].amount, BigDecimal::from(1000));
    }

    #[tokio::test]
    async fn fan_spending_and_history_count_only_paid() {
        let (ledger, _) = seeded(99).await;
        assert_eq!(ledger.fan_spending(FAN).await.unwrap(), BigDecimal::from(0));

        paid(&ledger, "S2", FAN, CREATOR, 1500).await;
        paid(&ledger, "S3", FAN, CREATOR, 2500).await;

        assert_eq!(ledger.fan_spending(FAN).await.unwrap(), BigDecimal::from(4000));
        let history = ledger.fan_history(FAN, PageRequest::new(None, None)).await.unwrap();
        assert!(!history.has_more);
        let amounts: Vec<_> = history.data.iter().map(|e| e.amount.clone()).collect();
        assert_eq!(amounts, [BigDecimal::from(2500), BigDecimal::from(1500)]);
        assert!(history.data.iter().all(|e| e.creator_name == "Creator"));
    }
}
