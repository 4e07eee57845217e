//! Services module for occupancy-service.

pub mod booking_refund;
pub mod invoice;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod mongo;
pub mod notice;
pub mod numbering;
pub mod occupation;
pub mod payment;
pub mod receipt;
pub mod store;

pub use booking_refund::BookingRefundService;
pub use invoice::InvoiceService;
pub use ledger::LedgerService;
pub use memory::InMemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use mongo::MongoStore;
pub use notice::NoticeService;
pub use occupation::OccupationService;
pub use payment::PaymentService;
pub use receipt::ReceiptService;
pub use store::OccupancyStore;

use crate::config::{BillingSettings, LedgerSettings};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::sync::Arc;

/// Every domain service, wired over one store.
#[derive(Clone)]
pub struct Services {
    store: Arc<dyn OccupancyStore>,
    pub occupations: OccupationService,
    pub notices: NoticeService,
    pub invoices: InvoiceService,
    pub ledger: LedgerService,
    pub payments: PaymentService,
    pub receipts: ReceiptService,
    pub booking_refunds: BookingRefundService,
}

impl Services {
    pub fn new<S: OccupancyStore + 'static>(
        store: Arc<S>,
        ledger_settings: &LedgerSettings,
        billing: &BillingSettings,
    ) -> Self {
        let ledger = LedgerService::new(
            store.clone(),
            RetryConfig::with_max_retries(ledger_settings.append_max_retries),
        );
        let notices = NoticeService::new(store.clone(), store.clone());
        let invoices = InvoiceService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            ledger.clone(),
            billing.penalty_percentage_of_rent,
        );
        let receipts =
            ReceiptService::new(store.clone(), store.clone(), store.clone(), ledger.clone());
        let occupations = OccupationService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            notices.clone(),
            invoices.clone(),
            receipts.clone(),
            ledger.clone(),
        );

        Self {
            payments: PaymentService::new(store.clone()),
            booking_refunds: BookingRefundService::new(store.clone(), store.clone()),
            occupations,
            notices,
            invoices,
            ledger,
            receipts,
            store,
        }
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.store.health_check().await
    }
}
