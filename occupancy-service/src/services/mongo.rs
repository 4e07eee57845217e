//! MongoDB-backed store.

use crate::models::{
    new_id, BookingRefund, BookingRefundFilter, Invoice, InvoiceFilter, Notice, NoticeStatus,
    Occupation, OccupationChange, OccupationFilter, OccupationStatus, OccupationTransaction,
    Payment, PaymentFilter, PaymentStatus, Receipt, ReceiptFilter, SortOrder, Tenant,
    TenantDetails, TransactionFilter, Unit, UnitStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{
    indexes, BookingRefundStore, DuplicateKey, InvoiceStore, NoticeReader, NoticeStore,
    OccupancyStore, OccupationStore, PaymentStore, ReceiptStore, TenantDirectory,
    TransactionStore, UnitReader,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{
        FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions, ReturnDocument,
    },
    Client as MongoClient, Collection, Database, IndexModel,
};
use service_core::error::AppError;
use tracing::instrument;

const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    client: MongoClient,
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to MongoDB");
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn units(&self) -> Collection<Unit> {
        self.db.collection("units")
    }

    fn tenants(&self) -> Collection<Tenant> {
        self.db.collection("tenants")
    }

    fn notices(&self) -> Collection<Notice> {
        self.db.collection("notices")
    }

    fn occupations(&self) -> Collection<Occupation> {
        self.db.collection("occupations")
    }

    fn invoices(&self) -> Collection<Invoice> {
        self.db.collection("invoices")
    }

    fn transactions(&self) -> Collection<OccupationTransaction> {
        self.db.collection("occupation_transactions")
    }

    fn payments(&self) -> Collection<Payment> {
        self.db.collection("payments")
    }

    fn receipts(&self) -> Collection<Receipt> {
        self.db.collection("receipts")
    }

    fn booking_refunds(&self) -> Collection<BookingRefund> {
        self.db.collection("booking_refunds")
    }

    /// Create the unique indexes the services rely on for race safety, plus
    /// lookup indexes for the common filters.
    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for occupancy-service");

        // Slots only exist while held, so the partial filter skips released ones.
        let held = |field: &str| {
            let mut filter = Document::new();
            filter.insert(field, doc! { "$type": "string" });
            filter
        };

        self.occupations()
            .create_indexes(
                [
                    unique_index(doc! { "number": 1 }, indexes::OCCUPATION_NUMBER, None),
                    unique_index(
                        doc! { "booking_slot": 1 },
                        indexes::OCCUPATION_BOOKING_SLOT,
                        Some(held("booking_slot")),
                    ),
                    unique_index(
                        doc! { "tenancy_slot": 1 },
                        indexes::OCCUPATION_TENANCY_SLOT,
                        Some(held("tenancy_slot")),
                    ),
                    lookup_index(doc! { "unit_id": 1, "status": 1 }, "occupation_unit_status"),
                    lookup_index(doc! { "status": 1, "start_date": 1 }, "occupation_status_start"),
                ],
                None,
            )
            .await?;

        self.invoices()
            .create_indexes(
                [
                    unique_index(doc! { "number": 1 }, indexes::INVOICE_NUMBER, None),
                    lookup_index(doc! { "occupation_id": 1 }, "invoice_occupation"),
                ],
                None,
            )
            .await?;

        self.transactions()
            .create_indexes(
                [
                    unique_index(
                        doc! { "occupation_id": 1, "sequence": 1 },
                        indexes::TRANSACTION_SEQUENCE,
                        None,
                    ),
                    lookup_index(doc! { "invoice_id": 1 }, "transaction_invoice"),
                    lookup_index(doc! { "receipt_id": 1 }, "transaction_receipt"),
                ],
                None,
            )
            .await?;

        self.payments()
            .create_indexes(
                [
                    unique_index(
                        doc! { "reference_number": 1 },
                        indexes::PAYMENT_REFERENCE,
                        None,
                    ),
                    lookup_index(doc! { "status": 1, "type": 1 }, "payment_status_type"),
                ],
                None,
            )
            .await?;

        self.receipts()
            .create_indexes(
                [
                    unique_index(doc! { "number": 1 }, indexes::RECEIPT_NUMBER, None),
                    unique_index(doc! { "payment_id": 1 }, indexes::RECEIPT_PAYMENT, None),
                    lookup_index(doc! { "occupation_id": 1 }, "receipt_occupation"),
                ],
                None,
            )
            .await?;

        self.booking_refunds()
            .create_indexes(
                [unique_index(
                    doc! { "receivable_id": 1 },
                    indexes::REFUND_RECEIVABLE,
                    None,
                )],
                None,
            )
            .await?;

        self.notices()
            .create_indexes(
                [lookup_index(
                    doc! { "occupation_id": 1, "status": 1 },
                    "notice_occupation_status",
                )],
                None,
            )
            .await?;

        tracing::info!("Occupancy service indexes initialized");
        Ok(())
    }
}

fn unique_index(keys: Document, name: &str, partial: Option<Document>) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(name.to_string())
                .unique(true)
                .partial_filter_expression(partial)
                .build(),
        )
        .build()
}

fn lookup_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

/// Translate a duplicate-key write failure into a typed conflict.
fn write_error(err: mongodb::error::Error) -> AppError {
    let message = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY_CODE => {
            Some(e.message.clone())
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY_CODE => Some(e.message.clone()),
        _ => None,
    };

    match message {
        Some(message) => DuplicateKey::conflict(&duplicate_index_name(&message)),
        None => AppError::from(err),
    }
}

/// Index name out of an `E11000 ... index: <name> dup key: ...` message.
fn duplicate_index_name(message: &str) -> String {
    message
        .split("index: ")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap_or("unknown")
        .to_string()
}

fn sorted_by_id(order: SortOrder) -> FindOptions {
    FindOptions::builder()
        .sort(doc! { "_id": order.direction() })
        .build()
}

/// Case-insensitive substring match.
fn contains_ignore_case(value: &str) -> Document {
    let escaped: String = value
        .chars()
        .flat_map(|c| {
            let special = "\\^$.|?*+()[]{}".contains(c);
            special.then_some('\\').into_iter().chain(std::iter::once(c))
        })
        .collect();
    doc! { "$regex": escaped, "$options": "i" }
}

fn now() -> Result<Bson, AppError> {
    Ok(to_bson(&Utc::now())?)
}

#[async_trait]
impl UnitReader for MongoStore {
    #[instrument(skip(self))]
    async fn find_unit(&self, id: &str) -> Result<Option<Unit>, AppError> {
        Ok(self.units().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self))]
    async fn set_unit_status(&self, id: &str, status: UnitStatus) -> Result<(), AppError> {
        let result = self
            .units()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str() } },
                None,
            )
            .await?;
        if result.matched_count == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Unit with id {} does not exist!",
                id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantDirectory for MongoStore {
    #[instrument(skip(self))]
    async fn find_tenant(&self, id: &str) -> Result<Option<Tenant>, AppError> {
        Ok(self.tenants().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self, details))]
    async fn create_tenant(&self, details: TenantDetails) -> Result<Tenant, AppError> {
        let tenant = Tenant {
            id: new_id(),
            first_name: details.first_name,
            surname: details.surname,
            mobile_number: details.mobile_number,
            email: details.email,
            created_on: Utc::now(),
        };
        self.tenants()
            .insert_one(&tenant, None)
            .await
            .map_err(write_error)?;
        Ok(tenant)
    }
}

#[async_trait]
impl NoticeReader for MongoStore {
    #[instrument(skip(self))]
    async fn find_active_notice(&self, occupation_id: &str) -> Result<Option<Notice>, AppError> {
        let active: Vec<&str> = NoticeStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        let options = FindOneOptions::builder().sort(doc! { "_id": -1 }).build();
        Ok(self
            .notices()
            .find_one(
                doc! { "occupation_id": occupation_id, "status": { "$in": active } },
                options,
            )
            .await?)
    }
}

#[async_trait]
impl NoticeStore for MongoStore {
    #[instrument(skip(self, notice), fields(notice_id = %notice.id))]
    async fn insert_notice(&self, notice: &Notice) -> Result<(), AppError> {
        self.notices()
            .insert_one(notice, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn set_notice_status(&self, id: &str, status: NoticeStatus) -> Result<(), AppError> {
        let modified_on = now()?;
        self.notices()
            .update_one(
                doc! { "_id": id },
                doc! { "$set": { "status": status.as_str(), "modified_on": modified_on } },
                None,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl OccupationStore for MongoStore {
    #[instrument(skip(self, occupation), fields(occupation_id = %occupation.id, unit_id = %occupation.unit_id))]
    async fn insert_occupation(&self, occupation: &Occupation) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_occupation"])
            .start_timer();
        self.occupations()
            .insert_one(occupation, None)
            .await
            .map_err(write_error)?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_occupation(&self, id: &str) -> Result<Option<Occupation>, AppError> {
        Ok(self.occupations().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self))]
    async fn find_occupation_by_number(
        &self,
        number: &str,
    ) -> Result<Option<Occupation>, AppError> {
        Ok(self
            .occupations()
            .find_one(doc! { "number": number }, None)
            .await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_occupations(
        &self,
        filter: &OccupationFilter,
    ) -> Result<Vec<Occupation>, AppError> {
        let mut query = Document::new();
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(unit_id) = &filter.unit_id {
            query.insert("unit_id", unit_id.as_str());
        }
        if let Some(tenant_id) = &filter.tenant_id {
            query.insert("tenant_id", tenant_id.as_str());
        }
        let cursor = self
            .occupations()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    #[instrument(skip(self))]
    async fn find_pending_starting_by(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<Occupation>, AppError> {
        let date = to_bson(&date)?;
        let cursor = self
            .occupations()
            .find(
                doc! {
                    "status": OccupationStatus::PendingOccupation.as_str(),
                    "start_date": { "$lte": date },
                },
                sorted_by_id(SortOrder::Asc),
            )
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    #[instrument(skip(self, change), fields(to = %change.status))]
    async fn transition_occupation(
        &self,
        id: &str,
        from: &[OccupationStatus],
        change: &OccupationChange,
    ) -> Result<Option<Occupation>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_occupation"])
            .start_timer();

        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let modified_on = now()?;
        let mut set = doc! { "status": change.status.as_str(), "modified_on": modified_on };
        let mut unset = Document::new();
        for (field, slot) in [
            ("booking_slot", &change.booking_slot),
            ("tenancy_slot", &change.tenancy_slot),
        ] {
            match slot {
                Some(unit_id) => set.insert(field, unit_id.as_str()),
                None => unset.insert(field, ""),
            };
        }
        if let Some(end_date) = change.end_date {
            set.insert("end_date", to_bson(&end_date)?);
        }
        let mut update = doc! { "$set": set };
        if !unset.is_empty() {
            update.insert("$unset", unset);
        }

        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let updated = self
            .occupations()
            .find_one_and_update(doc! { "_id": id, "status": { "$in": from } }, update, options)
            .await
            .map_err(write_error)?;

        timer.observe_duration();
        Ok(updated)
    }
}

#[async_trait]
impl InvoiceStore for MongoStore {
    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.id, invoice_type = %invoice.invoice_type))]
    async fn insert_invoice(&self, invoice: &Invoice) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();
        self.invoices()
            .insert_one(invoice, None)
            .await
            .map_err(write_error)?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_invoice(&self, id: &str) -> Result<Option<Invoice>, AppError> {
        Ok(self.invoices().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        let mut query = Document::new();
        if let Some(invoice_type) = filter.invoice_type {
            query.insert("type", invoice_type.as_str());
        }
        if let Some(number) = &filter.number {
            query.insert("number", contains_ignore_case(number));
        }
        if let Some(occupation_id) = &filter.occupation_id {
            query.insert("occupation_id", occupation_id.as_str());
        }
        let cursor = self
            .invoices()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }
}

#[async_trait]
impl TransactionStore for MongoStore {
    #[instrument(skip(self, entry), fields(occupation_id = %entry.occupation_id, sequence = entry.sequence))]
    async fn insert_transaction(&self, entry: &OccupationTransaction) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_transaction"])
            .start_timer();
        self.transactions()
            .insert_one(entry, None)
            .await
            .map_err(write_error)?;
        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_transaction(&self, id: &str) -> Result<Option<OccupationTransaction>, AppError> {
        Ok(self.transactions().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self))]
    async fn latest_transaction(
        &self,
        occupation_id: &str,
    ) -> Result<Option<OccupationTransaction>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["latest_transaction"])
            .start_timer();
        let options = FindOneOptions::builder()
            .sort(doc! { "sequence": -1 })
            .build();
        let latest = self
            .transactions()
            .find_one(doc! { "occupation_id": occupation_id }, options)
            .await?;
        timer.observe_duration();
        Ok(latest)
    }

    #[instrument(skip(self))]
    async fn ledger_of(
        &self,
        occupation_id: &str,
    ) -> Result<Vec<OccupationTransaction>, AppError> {
        let options = FindOptions::builder().sort(doc! { "sequence": 1 }).build();
        let cursor = self
            .transactions()
            .find(doc! { "occupation_id": occupation_id }, options)
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<OccupationTransaction>, AppError> {
        let mut query = Document::new();
        if let Some(transaction_type) = filter.transaction_type {
            query.insert("type", transaction_type.as_str());
        }
        if let Some(occupation_id) = &filter.occupation_id {
            query.insert("occupation_id", occupation_id.as_str());
        }
        if let Some(invoice_id) = &filter.invoice_id {
            query.insert("invoice_id", invoice_id.as_str());
        }
        if let Some(receipt_id) = &filter.receipt_id {
            query.insert("receipt_id", receipt_id.as_str());
        }
        let cursor = self
            .transactions()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }
}

#[async_trait]
impl PaymentStore for MongoStore {
    #[instrument(skip(self, payment), fields(payment_id = %payment.id, reference = %payment.reference_number))]
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        self.payments()
            .insert_one(payment, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_payment(&self, id: &str) -> Result<Option<Payment>, AppError> {
        Ok(self.payments().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self))]
    async fn find_payment_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Payment>, AppError> {
        Ok(self
            .payments()
            .find_one(doc! { "reference_number": reference }, None)
            .await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, AppError> {
        let mut query = Document::new();
        if let Some(status) = filter.status {
            query.insert("status", doc! { "$in": status.stored_values().to_vec() });
        }
        if let Some(payment_type) = filter.payment_type {
            query.insert("type", payment_type.as_str());
        }
        if let Some(reference) = &filter.reference_number {
            query.insert("reference_number", contains_ignore_case(reference));
        }
        let cursor = self
            .payments()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }

    #[instrument(skip(self))]
    async fn claim_payment(
        &self,
        id: &str,
        receipt_id: &str,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["claim_payment"])
            .start_timer();
        let modified_on = now()?;
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        let claimed = self
            .payments()
            .find_one_and_update(
                doc! {
                    "_id": id,
                    "status": { "$in": PaymentStatus::Unclaimed.stored_values().to_vec() },
                },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Claimed.as_str(),
                        "receipt_id": receipt_id,
                        "modified_on": modified_on,
                    }
                },
                options,
            )
            .await?;
        timer.observe_duration();
        Ok(claimed)
    }

    #[instrument(skip(self))]
    async fn release_claim(&self, id: &str, receipt_id: &str) -> Result<bool, AppError> {
        let modified_on = now()?;
        let result = self
            .payments()
            .update_one(
                doc! {
                    "_id": id,
                    "status": { "$in": PaymentStatus::Claimed.stored_values().to_vec() },
                    "receipt_id": receipt_id,
                },
                doc! {
                    "$set": {
                        "status": PaymentStatus::Unclaimed.as_str(),
                        "modified_on": modified_on,
                    },
                    "$unset": { "receipt_id": "" },
                },
                None,
            )
            .await?;
        Ok(result.modified_count == 1)
    }
}

#[async_trait]
impl ReceiptStore for MongoStore {
    #[instrument(skip(self, receipt), fields(receipt_id = %receipt.id, payment_id = %receipt.payment_id))]
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<(), AppError> {
        self.receipts()
            .insert_one(receipt, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_receipt(&self, id: &str) -> Result<Option<Receipt>, AppError> {
        Ok(self.receipts().find_one(doc! { "_id": id }, None).await?)
    }

    #[instrument(skip(self))]
    async fn find_receipt_by_payment(
        &self,
        payment_id: &str,
    ) -> Result<Option<Receipt>, AppError> {
        Ok(self
            .receipts()
            .find_one(doc! { "payment_id": payment_id }, None)
            .await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_receipts(&self, filter: &ReceiptFilter) -> Result<Vec<Receipt>, AppError> {
        let mut query = Document::new();
        if let Some(occupation_id) = &filter.occupation_id {
            query.insert("occupation_id", occupation_id.as_str());
        }
        if let Some(payment_id) = &filter.payment_id {
            query.insert("payment_id", payment_id.as_str());
        }
        let cursor = self
            .receipts()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }
}

#[async_trait]
impl BookingRefundStore for MongoStore {
    #[instrument(skip(self, refund), fields(receivable_id = %refund.receivable_id))]
    async fn insert_booking_refund(&self, refund: &BookingRefund) -> Result<(), AppError> {
        self.booking_refunds()
            .insert_one(refund, None)
            .await
            .map_err(write_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn find_booking_refund_by_receivable(
        &self,
        receivable_id: &str,
    ) -> Result<Option<BookingRefund>, AppError> {
        Ok(self
            .booking_refunds()
            .find_one(doc! { "receivable_id": receivable_id }, None)
            .await?)
    }

    #[instrument(skip(self, filter))]
    async fn find_booking_refunds(
        &self,
        filter: &BookingRefundFilter,
    ) -> Result<Vec<BookingRefund>, AppError> {
        let mut query = Document::new();
        if let Some(receivable_id) = &filter.receivable_id {
            query.insert("receivable_id", receivable_id.as_str());
        }
        let cursor = self
            .booking_refunds()
            .find(query, sorted_by_id(filter.order))
            .await?;
        Ok(cursor.try_collect::<Vec<_>>().await?)
    }
}

#[async_trait]
impl OccupancyStore for MongoStore {
    async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }
}
