//! Credit accounting around metered panel renewals.
//!
//! A reseller's credits live in exactly one of two places: the `credits`
//! column of our own `resellers` table, or a balance column inside the
//! panel's database. Both are reached through [`CreditAccount`], and the
//! charge → renew → refund-on-failure sequence is written once against it.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::Reseller,
    error::{AppError, Result},
    renewal::locks::KeyedLocks,
    repository::ResellerRepository,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ledger {
    Primary { reseller_id: Uuid },
    External { table: String, column: String, row_key: String },
}

impl fmt::Display for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ledger::Primary { reseller_id } => write!(f, "primary:{}", reseller_id),
            Ledger::External { table, column, row_key } => {
                write!(f, "panel:{}.{}#{}", table, column, row_key)
            }
        }
    }
}

/// A balance credits can be taken from and returned to.
#[async_trait]
pub trait CreditAccount: Send + Sync {
    fn ledger(&self) -> Ledger;

    /// Deducts `credits` if the balance covers them. Returns whether it did;
    /// an absent balance counts as insufficient.
    async fn charge(&self, credits: i64) -> Result<bool>;

    async fn refund(&self, credits: i64) -> Result<()>;
}

/// The reseller's balance in our own store.
pub struct PrimaryAccount {
    resellers: Arc<dyn ResellerRepository>,
    reseller_id: Uuid,
}

impl PrimaryAccount {
    pub fn new(resellers: Arc<dyn ResellerRepository>, reseller_id: Uuid) -> Self {
        Self { resellers, reseller_id }
    }
}

#[async_trait]
impl CreditAccount for PrimaryAccount {
    fn ledger(&self) -> Ledger {
        Ledger::Primary { reseller_id: self.reseller_id }
    }

    async fn charge(&self, credits: i64) -> Result<bool> {
        self.resellers.debit_credits(self.reseller_id, credits).await
    }

    async fn refund(&self, credits: i64) -> Result<()> {
        self.resellers.credit_credits(self.reseller_id, credits).await
    }
}

/// Credits taken from one ledger, and the account to give them back to.
#[derive(Clone)]
pub struct Charge {
    pub credits: i64,
    account: Arc<dyn CreditAccount>,
}

impl Charge {
    pub fn ledger(&self) -> Ledger {
        self.account.ledger()
    }
}

impl fmt::Debug for Charge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Charge")
            .field("credits", &self.credits)
            .field("ledger", &self.ledger())
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient credits: {needed} required")]
    Insufficient { needed: i64 },

    #[error("credit ledger unavailable: {0}")]
    Store(String),

    #[error("{detail}")]
    RenewalFailed { detail: String, refunded: Option<Ledger> },

    #[error("{detail}; refund of {credits} credits to {ledger} failed: {refund_error}")]
    RefundFailed {
        detail: String,
        credits: i64,
        ledger: Ledger,
        refund_error: String,
    },
}

/// A renewal that went through, and what it cost.
#[derive(Debug)]
pub struct MeteredRenewal {
    pub detail: String,
    pub charge: Option<Charge>,
}

pub struct CreditLedger {
    resellers: Arc<dyn ResellerRepository>,
    /// Checking and deducting a balance never interleaves with another
    /// renewal charging the same ledger.
    locks: KeyedLocks<Ledger>,
}

impl CreditLedger {
    pub fn new(resellers: Arc<dyn ResellerRepository>) -> Self {
        Self {
            resellers,
            locks: KeyedLocks::default(),
        }
    }

    /// Takes `credits` from the reseller's primary balance, falling back to
    /// the panel-side `external` account. Administrators are never charged.
    pub async fn charge(
        &self,
        reseller: &Reseller,
        credits: i64,
        external: Option<Arc<dyn CreditAccount>>,
    ) -> std::result::Result<Option<Charge>, LedgerError> {
        if reseller.is_admin {
            tracing::debug!(reseller_id = %reseller.id, "Administrator renewal is unmetered");
            return Ok(None);
        }

        let credits = credits.max(1);
        let mut accounts: Vec<Arc<dyn CreditAccount>> = Vec::with_capacity(2);
        if reseller.credits.is_some() {
            accounts.push(Arc::new(PrimaryAccount::new(self.resellers.clone(), reseller.id)));
        }
        accounts.extend(external);

        for account in accounts {
            if self.try_charge(account.as_ref(), credits).await? {
                tracing::info!(
                    reseller_id = %reseller.id,
                    ledger = %account.ledger(),
                    credits,
                    "Credits charged"
                );
                return Ok(Some(Charge { credits, account }));
            }
        }

        tracing::warn!(reseller_id = %reseller.id, credits, "No ledger covers the renewal");
        Err(LedgerError::Insufficient { needed: credits })
    }

    async fn try_charge(&self, account: &dyn CreditAccount, credits: i64) -> std::result::Result<bool, LedgerError> {
        let ledger = account.ledger();
        let _held = self.locks.lock(&ledger).await;
        account
            .charge(credits)
            .await
            .map_err(|e| LedgerError::Store(format!("{}: {}", ledger, e)))
    }

    /// Returns a charge to the ledger it was taken from.
    pub async fn refund(&self, charge: &Charge) -> Result<()> {
        let ledger = charge.ledger();
        let _held = self.locks.lock(&ledger).await;
        charge.account.refund(charge.credits).await?;
        tracing::info!(ledger = %ledger, credits = charge.credits, "Credits refunded");
        Ok(())
    }

    /// Charges, runs `renew`, and refunds the same ledger if the renewal
    /// fails.
    pub async fn metered<F, Fut>(
        &self,
        reseller: &Reseller,
        credits: i64,
        external: Option<Arc<dyn CreditAccount>>,
        renew: F,
    ) -> std::result::Result<MeteredRenewal, LedgerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let charge = self.charge(reseller, credits, external).await?;

        let error = match renew().await {
            Ok(detail) => return Ok(MeteredRenewal { detail, charge }),
            Err(e) => e,
        };

        let Some(charge) = charge else {
            return Err(LedgerError::RenewalFailed {
                detail: error.to_string(),
                refunded: None,
            });
        };

        match self.refund(&charge).await {
            Ok(()) => Err(LedgerError::RenewalFailed {
                detail: error.to_string(),
                refunded: Some(charge.ledger()),
            }),
            Err(refund_error) => {
                tracing::error!(
                    ledger = %charge.ledger(),
                    credits = charge.credits,
                    error = %refund_error,
                    "Refund after failed renewal did not go through"
                );
                Err(LedgerError::RefundFailed {
                    detail: error.to_string(),
                    credits: charge.credits,
                    ledger: charge.ledger(),
                    refund_error: refund_error.to_string(),
                })
            }
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Insufficient { .. } => AppError::BadRequest(err.to_string()),
            _ => AppError::Integration(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};

    struct MemoryAccount {
        key: &'static str,
        balance: AtomicI64,
    }

    impl MemoryAccount {
        fn new(key: &'static str, balance: i64) -> Arc<Self> {
            Arc::new(Self { key, balance: AtomicI64::new(balance) })
        }

        fn balance(&self) -> i64 {
            self.balance.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CreditAccount for MemoryAccount {
        fn ledger(&self) -> Ledger {
            Ledger::External {
                table: "reg_users".to_string(),
                column: "credits".to_string(),
                row_key: self.key.to_string(),
            }
        }

        async fn charge(&self, credits: i64) -> Result<bool> {
            let current = self.balance();
            if current < credits {
                return Ok(false);
            }
            // widen the read-modify-write window
            tokio::task::yield_now().await;
            self.balance.store(current - credits, Ordering::SeqCst);
            Ok(true)
        }

        async fn refund(&self, credits: i64) -> Result<()> {
            self.balance.fetch_add(credits, Ordering::SeqCst);
            Ok(())
        }
    }

    struct NoResellers;

    #[async_trait]
    impl ResellerRepository for NoResellers {
        async fn create(&self, _: crate::domain::CreateResellerRequest) -> Result<Reseller> {
            Err(AppError::Internal("unused".to_string()))
        }
        async fn find_by_id(&self, _: Uuid) -> Result<Option<Reseller>> {
            Ok(None)
        }
        async fn find_by_webhook_secret(&self, _: &str) -> Result<Option<Reseller>> {
            Ok(None)
        }
        async fn debit_credits(&self, _: Uuid, _: i64) -> Result<bool> {
            Ok(false)
        }
        async fn credit_credits(&self, _: Uuid, _: i64) -> Result<()> {
            Err(AppError::Internal("primary ledger must not be refunded".to_string()))
        }
    }

    fn reseller(is_admin: bool, credits: Option<i64>) -> Reseller {
        Reseller {
            id: Uuid::new_v4(),
            name: "r".to_string(),
            is_admin,
            credits,
            webhook_secret: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failed_renewal_refunds_external_ledger() {
        let ledger = CreditLedger::new(Arc::new(NoResellers));
        let account = MemoryAccount::new("9", 5);

        let outcome = ledger
            .metered(&reseller(false, Some(0)), 3, Some(account.clone()), || async {
                Err::<String, _>(AppError::External("panel down".to_string()))
            })
            .await;

        match outcome {
            Err(LedgerError::RenewalFailed { refunded: Some(Ledger::External { row_key, .. }), .. }) => {
                assert_eq!(row_key, "9")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(account.balance(), 5);
    }

    #[tokio::test]
    async fn test_successful_renewal_keeps_charge() {
        let ledger = CreditLedger::new(Arc::new(NoResellers));
        let account = MemoryAccount::new("9", 5);

        let renewal = ledger
            .metered(&reseller(false, None), 3, Some(account.clone()), || async {
                Ok::<_, AppError>("done".to_string())
            })
            .await
            .unwrap();

        assert_eq!(renewal.charge.map(|c| c.credits), Some(3));
        assert_eq!(account.balance(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_everywhere() {
        let ledger = CreditLedger::new(Arc::new(NoResellers));
        let account = MemoryAccount::new("9", 1);

        let outcome = ledger.charge(&reseller(false, Some(0)), 2, Some(account.clone())).await;
        assert!(matches!(outcome, Err(LedgerError::Insufficient { needed: 2 })));
        assert_eq!(account.balance(), 1);
    }

    #[tokio::test]
    async fn test_admin_is_unmetered() {
        let ledger = CreditLedger::new(Arc::new(NoResellers));
        let account = MemoryAccount::new("9", 0);

        let charge = ledger.charge(&reseller(true, None), 12, Some(account.clone())).await.unwrap();
        assert!(charge.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_charges_never_overdraw() {
        let ledger = CreditLedger::new(Arc::new(NoResellers));
        let account = MemoryAccount::new("9", 3);
        let owner = reseller(false, None);

        let attempts = (0..8).map(|_| {
            ledger.metered(&owner, 1, Some(account.clone()), || async {
                tokio::task::yield_now().await;
                Ok::<_, AppError>("done".to_string())
            })
        });
        let outcomes = futures_util::future::join_all(attempts).await;

        let renewed = outcomes.iter().filter(|o| o.is_ok()).count();
        let refused = outcomes
            .iter()
            .filter(|o| matches!(o, Err(LedgerError::Insufficient { needed: 1 })))
            .count();
        assert_eq!(renewed, 3);
        assert_eq!(refused, 5);
        assert_eq!(account.balance(), 0);
        assert_eq!(ledger.locks.tracked(), 0);
    }
}
