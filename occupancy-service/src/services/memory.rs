//! In-process store with the same uniqueness rules as the MongoDB store.
//! Used by the test suites and for embedding the services without a database.

use crate::models::{
    new_id, BookingRefund, BookingRefundFilter, Invoice, InvoiceFilter, Notice, NoticeStatus,
    Occupation, OccupationChange, OccupationFilter, OccupationStatus, OccupationTransaction,
    Payment, PaymentFilter, PaymentStatus, Receipt, ReceiptFilter, SortOrder, Tenant,
    TenantDetails, TransactionFilter, Unit, UnitStatus,
};
use crate::services::store::{
    indexes, BookingRefundStore, DuplicateKey, InvoiceStore, NoticeReader, NoticeStore,
    OccupancyStore, OccupationStore, PaymentStore, ReceiptStore, TenantDirectory,
    TransactionStore, UnitReader,
};
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Collections {
    units: HashMap<String, Unit>,
    tenants: HashMap<String, Tenant>,
    notices: Vec<Notice>,
    occupations: Vec<Occupation>,
    invoices: Vec<Invoice>,
    transactions: Vec<OccupationTransaction>,
    payments: Vec<Payment>,
    receipts: Vec<Receipt>,
    booking_refunds: Vec<BookingRefund>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Collections>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> Result<MutexGuard<'_, Collections>, AppError> {
        self.inner
            .lock()
            .map_err(|_| AppError::InternalError(anyhow!("in-memory store lock poisoned")))
    }

    /// Seed a unit, as the property catalogue would.
    pub fn put_unit(&self, unit: Unit) -> Result<(), AppError> {
        self.collections()?.units.insert(unit.id.clone(), unit);
        Ok(())
    }

    /// Seed a tenant, as the tenant directory would.
    pub fn put_tenant(&self, tenant: Tenant) -> Result<(), AppError> {
        self.collections()?.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    /// Look a notice up by id, whatever its status.
    pub fn notice(&self, id: &str) -> Result<Option<Notice>, AppError> {
        Ok(self
            .collections()?
            .notices
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }
}

fn sorted<T>(
    items: impl Iterator<Item = T>,
    order: SortOrder,
    id: impl Fn(&T) -> &str,
) -> Vec<T> {
    let mut items: Vec<T> = items.collect();
    order.sort_by_id(&mut items, id);
    items
}

/// Whether an occupation other than `except` already holds `value` in a slot.
fn slot_taken(
    occupations: &[Occupation],
    except: Option<&str>,
    slot: impl Fn(&Occupation) -> Option<&String>,
    value: Option<&String>,
) -> bool {
    let Some(value) = value else {
        return false;
    };
    occupations
        .iter()
        .filter(|o| Some(o.id.as_str()) != except)
        .any(|o| slot(o) == Some(value))
}

#[async_trait]
impl UnitReader for InMemoryStore {
    async fn find_unit(&self, id: &str) -> Result<Option<Unit>, AppError> {
        Ok(self.collections()?.units.get(id).cloned())
    }

    async fn set_unit_status(&self, id: &str, status: UnitStatus) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        let unit = collections
            .units
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(anyhow!("Unit with id {} does not exist!", id)))?;
        unit.status = status;
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for InMemoryStore {
    async fn find_tenant(&self, id: &str) -> Result<Option<Tenant>, AppError> {
        Ok(self.collections()?.tenants.get(id).cloned())
    }

    async fn create_tenant(&self, details: TenantDetails) -> Result<Tenant, AppError> {
        let tenant = Tenant {
            id: new_id(),
            first_name: details.first_name,
            surname: details.surname,
            mobile_number: details.mobile_number,
            email: details.email,
            created_on: Utc::now(),
        };
        self.collections()?
            .tenants
            .insert(tenant.id.clone(), tenant.clone());
        Ok(tenant)
    }
}

#[async_trait]
impl NoticeReader for InMemoryStore {
    async fn find_active_notice(&self, occupation_id: &str) -> Result<Option<Notice>, AppError> {
        Ok(self
            .collections()?
            .notices
            .iter()
            .filter(|n| n.occupation_id == occupation_id && n.status.is_active())
            .max_by(|a, b| a.id.cmp(&b.id))
            .cloned())
    }
}

#[async_trait]
impl NoticeStore for InMemoryStore {
    async fn insert_notice(&self, notice: &Notice) -> Result<(), AppError> {
        self.collections()?.notices.push(notice.clone());
        Ok(())
    }

    async fn set_notice_status(&self, id: &str, status: NoticeStatus) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if let Some(notice) = collections.notices.iter_mut().find(|n| n.id == id) {
            notice.status = status;
            notice.modified_on = Some(Utc::now());
        }
        Ok(())
    }
}

#[async_trait]
impl OccupationStore for InMemoryStore {
    async fn insert_occupation(&self, occupation: &Occupation) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        let existing = &collections.occupations;
        if existing.iter().any(|o| o.number == occupation.number) {
            return Err(DuplicateKey::conflict(indexes::OCCUPATION_NUMBER));
        }
        if slot_taken(
            existing,
            None,
            |o| o.booking_slot.as_ref(),
            occupation.booking_slot.as_ref(),
        ) {
            return Err(DuplicateKey::conflict(indexes::OCCUPATION_BOOKING_SLOT));
        }
        if slot_taken(
            existing,
            None,
            |o| o.tenancy_slot.as_ref(),
            occupation.tenancy_slot.as_ref(),
        ) {
            return Err(DuplicateKey::conflict(indexes::OCCUPATION_TENANCY_SLOT));
        }
        collections.occupations.push(occupation.clone());
        Ok(())
    }

    async fn find_occupation(&self, id: &str) -> Result<Option<Occupation>, AppError> {
        Ok(self
            .collections()?
            .occupations
            .iter()
            .find(|o| o.id == id)
            .cloned())
    }

    async fn find_occupation_by_number(
        &self,
        number: &str,
    ) -> Result<Option<Occupation>, AppError> {
        Ok(self
            .collections()?
            .occupations
            .iter()
            .find(|o| o.number == number)
            .cloned())
    }

    async fn find_occupations(
        &self,
        filter: &OccupationFilter,
    ) -> Result<Vec<Occupation>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections.occupations.iter().filter(|o| filter.matches(o)).cloned(),
            filter.order,
            |o| o.id.as_str(),
        ))
    }

    async fn find_pending_starting_by(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Occupation>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections
                .occupations
                .iter()
                .filter(|o| o.status == OccupationStatus::PendingOccupation && o.start_date <= date)
                .cloned(),
            SortOrder::Asc,
            |o| o.id.as_str(),
        ))
    }

    async fn transition_occupation(
        &self,
        id: &str,
        from: &[OccupationStatus],
        change: &OccupationChange,
    ) -> Result<Option<Occupation>, AppError> {
        let mut collections = self.collections()?;
        let Some(index) = collections
            .occupations
            .iter()
            .position(|o| o.id == id && from.contains(&o.status))
        else {
            return Ok(None);
        };

        let existing = &collections.occupations;
        if slot_taken(
            existing,
            Some(id),
            |o| o.booking_slot.as_ref(),
            change.booking_slot.as_ref(),
        ) {
            return Err(DuplicateKey::conflict(indexes::OCCUPATION_BOOKING_SLOT));
        }
        if slot_taken(
            existing,
            Some(id),
            |o| o.tenancy_slot.as_ref(),
            change.tenancy_slot.as_ref(),
        ) {
            return Err(DuplicateKey::conflict(indexes::OCCUPATION_TENANCY_SLOT));
        }

        let occupation = &mut collections.occupations[index];
        occupation.apply(change);
        Ok(Some(occupation.clone()))
    }
}

#[async_trait]
impl InvoiceStore for InMemoryStore {
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if collections.invoices.iter().any(|i| i.number == invoice.number) {
            return Err(DuplicateKey::conflict(indexes::INVOICE_NUMBER));
        }
        collections.invoices.push(invoice.clone());
        Ok(())
    }

    async fn find_invoice(&self, id: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self
            .collections()?
            .invoices
            .iter()
            .find(|i| i.id == id)
            .cloned())
    }

    async fn find_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections.invoices.iter().filter(|i| filter.matches(i)).cloned(),
            filter.order,
            |i| i.id.as_str(),
        ))
    }
}

#[async_trait]
impl TransactionStore for InMemoryStore {
    async fn insert_transaction(&self, entry: &OccupationTransaction) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if collections
            .transactions
            .iter()
            .any(|t| t.occupation_id == entry.occupation_id && t.sequence == entry.sequence)
        {
            return Err(DuplicateKey::conflict(indexes::TRANSACTION_SEQUENCE));
        }
        collections.transactions.push(entry.clone());
        Ok(())
    }

    async fn find_transaction(&self, id: &str) -> Result<Option<OccupationTransaction>, AppError> {
        Ok(self
            .collections()?
            .transactions
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn latest_transaction(
        &self,
        occupation_id: &str,
    ) -> Result<Option<OccupationTransaction>, AppError> {
        Ok(self
            .collections()?
            .transactions
            .iter()
            .filter(|t| t.occupation_id == occupation_id)
            .max_by_key(|t| t.sequence)
            .cloned())
    }

    async fn ledger_of(
        &self,
        occupation_id: &str,
    ) -> Result<Vec<OccupationTransaction>, AppError> {
        let mut entries: Vec<OccupationTransaction> = self
            .collections()?
            .transactions
            .iter()
            .filter(|t| t.occupation_id == occupation_id)
            .cloned()
            .collect();
        entries.sort_by_key(|t| t.sequence);
        Ok(entries)
    }

    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<OccupationTransaction>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections
                .transactions
                .iter()
                .filter(|t| filter.matches(t))
                .cloned(),
            filter.order,
            |t| t.id.as_str(),
        ))
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if collections
            .payments
            .iter()
            .any(|p| p.reference_number == payment.reference_number)
        {
            return Err(DuplicateKey::conflict(indexes::PAYMENT_REFERENCE));
        }
        collections.payments.push(payment.clone());
        Ok(())
    }

    async fn find_payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        Ok(self
            .collections()?
            .payments
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self
            .collections()?
            .payments
            .iter()
            .find(|p| p.reference_number == reference)
            .cloned())
    }

    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections.payments.iter().filter(|p| filter.matches(p)).cloned(),
            filter.order,
            |p| p.id.as_str(),
        ))
    }

    async fn claim_payment(
        &self,
        id: &str,
        receipt_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let mut collections = self.collections()?;
        let Some(payment) = collections
            .payments
            .iter_mut()
            .find(|p| p.id == id && p.status == PaymentStatus::Unclaimed)
        else {
            return Ok(None);
        };
        payment.status = PaymentStatus::Claimed;
        payment.receipt_id = Some(receipt_id.to_string());
        payment.modified_on = Some(Utc::now());
        Ok(Some(payment.clone()))
    }

    async fn release_claim(&self, id: &str, receipt_id: &str) -> Result<bool, AppError> {
        let mut collections = self.collections()?;
        let Some(payment) = collections.payments.iter_mut().find(|p| {
            p.id == id
                && p.status == PaymentStatus::Claimed
                && p.receipt_id.as_deref() == Some(receipt_id)
        }) else {
            return Ok(false);
        };
        payment.status = PaymentStatus::Unclaimed;
        payment.receipt_id = None;
        payment.modified_on = Some(Utc::now());
        Ok(true)
    }
}

#[async_trait]
impl ReceiptStore for InMemoryStore {
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if collections.receipts.iter().any(|r| r.number == receipt.number) {
            return Err(DuplicateKey::conflict(indexes::RECEIPT_NUMBER));
        }
        if collections
            .receipts
            .iter()
            .any(|r| r.payment_id == receipt.payment_id)
        {
            return Err(DuplicateKey::conflict(indexes::RECEIPT_PAYMENT));
        }
        collections.receipts.push(receipt.clone());
        Ok(())
    }

    async fn find_receipt(&self, id: &str) -> Result<Option<Receipt>, AppError> {
        Ok(self
            .collections()?
            .receipts
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_receipt_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Receipt>, AppError> {
        Ok(self
            .collections()?
            .receipts
            .iter()
            .find(|r| r.payment_id == payment_id)
            .cloned())
    }

    async fn find_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections.receipts.iter().filter(|r| filter.matches(r)).cloned(),
            filter.order,
            |r| r.id.as_str(),
        ))
    }
}

#[async_trait]
impl BookingRefundStore for InMemoryStore {
    async fn insert_booking_refund(&self, refund: &BookingRefund) -> Result<(), AppError> {
        let mut collections = self.collections()?;
        if collections
            .booking_refunds
            .iter()
            .any(|r| r.receivable_id == refund.receivable_id)
        {
            return Err(DuplicateKey::conflict(indexes::REFUND_RECEIVABLE));
        }
        collections.booking_refunds.push(refund.clone());
        Ok(())
    }

    async fn find_booking_refund_by_receivable(
        &self,
        receivable_id: &str,
    ) -> Result<Option<BookingRefund>, AppError> {
        Ok(self
            .collections()?
            .booking_refunds
            .iter()
            .find(|r| r.receivable_id == receivable_id)
            .cloned())
    }

    async fn find_booking_refunds(
        &self,
        filter: &BookingRefundFilter,
    ) -> Result<Vec<BookingRefund>, AppError> {
        let collections = self.collections()?;
        Ok(sorted(
            collections
                .booking_refunds
                .iter()
                .filter(|r| filter.matches(r))
                .cloned(),
            filter.order,
            |r| r.id.as_str(),
        ))
    }
}

#[async_trait]
impl OccupancyStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.collections().map(|_| ())
    }
}
