use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    domain::{PendingRenewal, RenewalCommit},
    error::{AppError, Result},
    repository::{customer_repository::mark_renewed, payment_repository::insert_payment, RenewalRepository},
};

pub struct SqliteRenewalRepository {
    pool: SqlitePool,
}

impl SqliteRenewalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RenewalRepository for SqliteRenewalRepository {
    async fn commit(&self, renewals: &[PendingRenewal]) -> Result<RenewalCommit> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        // Returning early drops `tx`, which rolls the batch back.
        for renewal in renewals {
            let touched = mark_renewed(&mut *tx, renewal.customer_id, renewal.due_date)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            if touched == 0 {
                return Err(AppError::NotFound(format!("Customer {} not found", renewal.customer_id)));
            }

            let inserted = insert_payment(&mut *tx, &renewal.payment).await;
            match inserted {
                Ok(()) => {}
                Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                    let external_id = renewal.payment.external_id.clone().unwrap_or_default();
                    tracing::info!(
                        customer_id = %renewal.customer_id,
                        external_id = %external_id,
                        "Transaction already recorded, rolling back the batch"
                    );
                    tx.rollback().await.map_err(|e| AppError::Database(e.to_string()))?;
                    return Ok(RenewalCommit::AlreadyRecorded {
                        customer_id: renewal.customer_id,
                        external_id,
                    });
                }
                Err(e) => return Err(AppError::Database(e.to_string())),
            }
        }

        tx.commit().await.map_err(|e| AppError::Database(e.to_string()))?;
        Ok(RenewalCommit::Committed)
    }
}
