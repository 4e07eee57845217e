//! Per-occupation ledger of DEBIT and CREDIT entries with a running balance.

use crate::models::{
    LedgerBalance, LedgerPosting, OccupationTransaction, TransactionFilter,
};
use crate::services::metrics::{ERRORS_TOTAL, LEDGER_APPEND_CONFLICTS, LEDGER_ENTRIES_TOTAL};
use crate::services::store::{indexes, is_duplicate_on, TransactionStore};
use anyhow::anyhow;
use dashmap::DashMap;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, instrument};

/// Appends are linearised per occupation twice over: an in-process lock
/// keyed by occupation id, and the unique (occupation_id, sequence) index
/// that rejects a writer in another process which read the same predecessor.
/// Index rejections are retried against the fresh latest entry.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn TransactionStore>,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    retry: RetryConfig,
}

impl LedgerService {
    pub fn new(store: Arc<dyn TransactionStore>, retry: RetryConfig) -> Self {
        Self {
            store,
            locks: Arc::new(DashMap::new()),
            retry,
        }
    }

    pub async fn append_debit(
        &self,
        occupation_id: &str,
        invoice_id: &str,
        amount_owed: Decimal,
    ) -> Result<OccupationTransaction, AppError> {
        self.append(LedgerPosting::Debit {
            occupation_id: occupation_id.to_string(),
            invoice_id: invoice_id.to_string(),
            amount_owed,
        })
        .await
    }

    pub async fn append_credit(
        &self,
        occupation_id: &str,
        receipt_id: &str,
        amount_paid: Decimal,
    ) -> Result<OccupationTransaction, AppError> {
        self.append(LedgerPosting::Credit {
            occupation_id: occupation_id.to_string(),
            receipt_id: receipt_id.to_string(),
            amount_paid,
        })
        .await
    }

    /// Fail with a bad request if a DEBIT of `amount_owed` would push the
    /// occupation's balance out of range. Checked before anything is written.
    pub async fn check_debit(&self, occupation_id: &str, amount_owed: Decimal) -> Result<(), AppError> {
        self.check(&LedgerPosting::Debit {
            occupation_id: occupation_id.to_string(),
            invoice_id: String::new(),
            amount_owed,
        })
        .await
    }

    /// Counterpart of [`Self::check_debit`] for a CREDIT of `amount_paid`.
    pub async fn check_credit(&self, occupation_id: &str, amount_paid: Decimal) -> Result<(), AppError> {
        self.check(&LedgerPosting::Credit {
            occupation_id: occupation_id.to_string(),
            receipt_id: String::new(),
            amount_paid,
        })
        .await
    }

    async fn check(&self, posting: &LedgerPosting) -> Result<(), AppError> {
        let brought_forward = self
            .store
            .latest_transaction(posting.occupation_id())
            .await?
            .map(|latest| latest.total_amount_carried_forward)
            .unwrap_or(Decimal::ZERO);
        posting.applied_to(brought_forward).map(|_| ())
    }

    #[instrument(skip(self, posting), fields(occupation_id = %posting.occupation_id(), posting_type = %posting.transaction_type()))]
    async fn append(&self, posting: LedgerPosting) -> Result<OccupationTransaction, AppError> {
        let occupation_id = posting.occupation_id().to_string();
        let lock = self.lock_for(&occupation_id);

        let result = {
            let _guard = lock.lock().await;
            let this = self;
            let posting = &posting;
            retry_with_backoff(
                &self.retry,
                "ledger_append",
                |e: &AppError| is_duplicate_on(e, indexes::TRANSACTION_SEQUENCE),
                move || this.try_append(posting),
            )
            .await
        };

        drop(lock);
        self.release_lock(&occupation_id);

        match result {
            Ok(entry) => {
                LEDGER_ENTRIES_TOTAL
                    .with_label_values(&[entry.transaction_type.as_str()])
                    .inc();
                info!(
                    transaction_id = %entry.id,
                    sequence = entry.sequence,
                    owed = %entry.total_amount_owed,
                    paid = %entry.total_amount_paid,
                    carried_forward = %entry.total_amount_carried_forward,
                    "Ledger entry appended"
                );
                Ok(entry)
            }
            Err(e) if is_duplicate_on(&e, indexes::TRANSACTION_SEQUENCE) => {
                Err(AppError::RaceLost(anyhow!(
                    "Ledger of occupation {} is busy, try again!",
                    occupation_id
                )))
            }
            Err(e) => Err(e),
        }
    }

    async fn try_append(&self, posting: &LedgerPosting) -> Result<OccupationTransaction, AppError> {
        let previous = self.store.latest_transaction(posting.occupation_id()).await?;
        let entry = OccupationTransaction::following(previous.as_ref(), posting)?;

        match self.store.insert_transaction(&entry).await {
            Ok(()) => Ok(entry),
            Err(e) => {
                if is_duplicate_on(&e, indexes::TRANSACTION_SEQUENCE) {
                    LEDGER_APPEND_CONFLICTS
                        .with_label_values(&[entry.transaction_type.as_str()])
                        .inc();
                }
                Err(e)
            }
        }
    }

    fn lock_for(&self, occupation_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(occupation_id.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Drop the occupation's lock once nobody else holds or awaits it.
    fn release_lock(&self, occupation_id: &str) {
        self.locks
            .remove_if(occupation_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<OccupationTransaction, AppError> {
        self.store.find_transaction(id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow!("Occupation transaction with id {} does not exist!", id))
        })
    }

    /// Entries matching `filter`, ordered by id.
    #[instrument(skip(self, filter))]
    pub async fn find(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<OccupationTransaction>, AppError> {
        let filter = filter.validated()?;
        self.store.find_transactions(&filter).await
    }

    pub async fn latest(
        &self,
        occupation_id: &str,
    ) -> Result<Option<OccupationTransaction>, AppError> {
        self.store.latest_transaction(occupation_id).await
    }

    /// Recompute the balance from the whole chain and check every stored
    /// carried-forward figure against it.
    #[instrument(skip(self))]
    pub async fn balance(&self, occupation_id: &str) -> Result<LedgerBalance, AppError> {
        let entries = self.store.ledger_of(occupation_id).await?;

        let mut owed = Decimal::ZERO;
        let mut paid = Decimal::ZERO;
        for (position, entry) in entries.iter().enumerate() {
            let out_of_range = || {
                AppError::InternalError(anyhow!(
                    "Ledger totals of occupation {} exceed the largest supported amount",
                    occupation_id
                ))
            };
            owed = owed
                .checked_add(entry.total_amount_owed)
                .ok_or_else(out_of_range)?;
            paid = paid
                .checked_add(entry.total_amount_paid)
                .ok_or_else(out_of_range)?;
            let expected = owed.checked_sub(paid).ok_or_else(out_of_range)?;

            if entry.sequence != position as i64 + 1
                || entry.total_amount_carried_forward != expected
            {
                ERRORS_TOTAL.with_label_values(&["ledger_inconsistent"]).inc();
                error!(
                    occupation_id = %occupation_id,
                    transaction_id = %entry.id,
                    sequence = entry.sequence,
                    stored = %entry.total_amount_carried_forward,
                    expected = %expected,
                    "Ledger chain is inconsistent"
                );
                return Err(AppError::InternalError(anyhow!(
                    "Ledger of occupation {} is inconsistent at entry {}",
                    occupation_id,
                    entry.id
                )));
            }
        }

        Ok(LedgerBalance {
            occupation_id: occupation_id.to_string(),
            total_amount_owed: owed,
            total_amount_paid: paid,
            total_amount_carried_forward: owed - paid,
            entries: entries.len(),
            latest_transaction_id: entries.last().map(|e| e.id.clone()),
        })
    }
}
