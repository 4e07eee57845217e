//! Occupation lifecycle: booking, activation, and closing a tenancy.
//!
//! A booking is all-or-nothing up to the point the occupation is written.
//! From there the advance invoices and the receipt follow without rollback;
//! a failure in that tail is logged with the occupation id and returned.

use crate::models::{
    CreateInvoice, CreateOccupation, CreateReceipt, InvoiceType, LedgerBalance, Notice,
    NoticeStatus, Occupation, OccupationChange, OccupationFilter, OccupationStatus, Payment,
    SortOrder, SweepReport, Tenant, TenantDetails, TenantRef, Unit, UnitStatus, VacateOutcome,
};
use crate::services::invoice::InvoiceService;
use crate::services::ledger::LedgerService;
use crate::services::metrics::{ERRORS_TOTAL, OCCUPATIONS_TOTAL};
use crate::services::notice::NoticeService;
use crate::services::numbering::occupation_number;
use crate::services::receipt::ReceiptService;
use crate::services::store::{
    indexes, is_duplicate_on, OccupationStore, PaymentStore, TenantDirectory, UnitReader,
};
use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

/// Tenant of a booking, resolved before anything is written.
enum IncomingTenant {
    Existing(Tenant),
    New(TenantDetails),
}

#[derive(Clone)]
pub struct OccupationService {
    units: Arc<dyn UnitReader>,
    tenants: Arc<dyn TenantDirectory>,
    occupations: Arc<dyn OccupationStore>,
    payments: Arc<dyn PaymentStore>,
    notices: NoticeService,
    invoices: InvoiceService,
    receipts: ReceiptService,
    ledger: LedgerService,
}

impl OccupationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        units: Arc<dyn UnitReader>,
        tenants: Arc<dyn TenantDirectory>,
        occupations: Arc<dyn OccupationStore>,
        payments: Arc<dyn PaymentStore>,
        notices: NoticeService,
        invoices: InvoiceService,
        receipts: ReceiptService,
        ledger: LedgerService,
    ) -> Self {
        Self {
            units,
            tenants,
            occupations,
            payments,
            notices,
            invoices,
            receipts,
            ledger,
        }
    }

    /// Book a unit for a tenant against an upfront payment.
    #[instrument(skip(self, request), fields(unit_id = %request.unit_id, payment_id = %request.payment_id))]
    pub async fn create(&self, request: CreateOccupation) -> Result<Occupation, AppError> {
        let unit = self
            .units
            .find_unit(&request.unit_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!("Unit with id {} does not exist!", request.unit_id))
            })?;

        self.check_unit_available(&unit, request.start_date).await?;
        let incoming = self.resolve_tenant(request.tenant).await?;
        let payment = self.upfront_payment(&request.payment_id, &unit).await?;

        let tenant_id = match incoming {
            IncomingTenant::Existing(tenant) => tenant.id,
            IncomingTenant::New(details) => self.tenants.create_tenant(details).await?.id,
        };

        let occupation = self
            .insert_booking(&unit.id, &tenant_id, request.start_date)
            .await?;
        OCCUPATIONS_TOTAL.with_label_values(&["booked"]).inc();
        info!(occupation_id = %occupation.id, number = %occupation.number, "Occupation booked");

        if let Err(e) = self.provision(&occupation, &payment).await {
            ERRORS_TOTAL.with_label_values(&["partial_provisioning"]).inc();
            error!(
                occupation_id = %occupation.id,
                payment_id = %payment.id,
                error = %e,
                "Occupation booked but not fully provisioned"
            );
            return Err(e);
        }

        Ok(occupation)
    }

    /// A vacant unit must not be booked already. An occupied unit can only be
    /// booked once its occupant has given notice, from after the vacating date.
    async fn check_unit_available(&self, unit: &Unit, start_date: NaiveDate) -> Result<(), AppError> {
        if unit.status != UnitStatus::Vacant {
            let outgoing = self
                .open_occupation(&unit.id, OccupationStatus::PendingVacating)
                .await?
                .ok_or_else(|| not_vacating(&unit.id))?;
            let notice: Notice = self
                .notices
                .find_active_notice_for(&outgoing.id)
                .await?
                .ok_or_else(|| not_vacating(&unit.id))?;
            if start_date <= notice.vacating_date {
                return Err(AppError::BadRequest(anyhow!(
                    "Start date {} should be after the vacating date {} of the current occupant!",
                    start_date,
                    notice.vacating_date
                )));
            }
        }

        if self
            .open_occupation(&unit.id, OccupationStatus::PendingOccupation)
            .await?
            .is_some()
        {
            return Err(already_booked());
        }
        Ok(())
    }

    async fn open_occupation(
        &self,
        unit_id: &str,
        status: OccupationStatus,
    ) -> Result<Option<Occupation>, AppError> {
        let filter = OccupationFilter {
            status: Some(status),
            unit_id: Some(unit_id.to_string()),
            tenant_id: None,
            order: SortOrder::Desc,
        };
        Ok(self
            .occupations
            .find_occupations(&filter)
            .await?
            .into_iter()
            .next())
    }

    async fn resolve_tenant(&self, tenant: TenantRef) -> Result<IncomingTenant, AppError> {
        match tenant {
            TenantRef::Existing(id) => self
                .tenants
                .find_tenant(&id)
                .await?
                .map(IncomingTenant::Existing)
                .ok_or_else(|| AppError::NotFound(anyhow!("Tenant with id {} does not exist!", id))),
            TenantRef::New(details) => {
                details.validate()?;
                Ok(IncomingTenant::New(details))
            }
        }
    }

    async fn upfront_payment(&self, payment_id: &str, unit: &Unit) -> Result<Payment, AppError> {
        let payment = self
            .payments
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| {
                AppError::BadRequest(anyhow!("Payment with id {} does not exist!", payment_id))
            })?;
        if payment.is_claimed() {
            return Err(AppError::BadRequest(anyhow!(
                "Payment with id {} has already been processed!",
                payment_id
            )));
        }

        let required = unit.required_upfront()?;
        if payment.amount < required {
            return Err(AppError::BadRequest(anyhow!(
                "Payment amount {} is less than the required amount {}!",
                payment.amount,
                required
            )));
        }
        Ok(payment)
    }

    async fn insert_booking(
        &self,
        unit_id: &str,
        tenant_id: &str,
        start_date: NaiveDate,
    ) -> Result<Occupation, AppError> {
        let occupations = &self.occupations;
        retry_with_backoff(
            &RetryConfig::quick(),
            "insert_occupation",
            |e: &AppError| is_duplicate_on(e, indexes::OCCUPATION_NUMBER),
            move || async move {
                let occupation =
                    Occupation::booked(occupation_number(), unit_id, tenant_id, start_date);
                occupations
                    .insert_occupation(&occupation)
                    .await
                    .map(|_| occupation)
            },
        )
        .await
        .map_err(|e| {
            if is_duplicate_on(&e, indexes::OCCUPATION_BOOKING_SLOT) {
                AppError::RaceLost(anyhow!("Unit has already been booked!"))
            } else {
                e
            }
        })
    }

    /// Advance and first-month invoices, then the receipt for the payment.
    async fn provision(&self, occupation: &Occupation, payment: &Payment) -> Result<(), AppError> {
        self.invoices
            .create(CreateInvoice::of(InvoiceType::RentAdvance, &occupation.id))
            .await?;

        let mut rent = CreateInvoice::of(InvoiceType::Rent, &occupation.id);
        rent.start_date = Some(occupation.start_date);
        self.invoices.create(rent).await?;

        self.receipts
            .create(CreateReceipt {
                occupation_id: occupation.id.clone(),
                payment_id: payment.id.clone(),
            })
            .await?;
        Ok(())
    }

    /// Move a booking into tenancy and mark the unit occupied.
    #[instrument(skip(self))]
    pub async fn activate(&self, id: &str) -> Result<Occupation, AppError> {
        let occupation = self.find_by_id(id).await?;
        if occupation.status != OccupationStatus::PendingOccupation {
            return Err(AppError::BadRequest(anyhow!(
                "Occupation {} is {} and cannot be activated!",
                occupation.id,
                occupation.status
            )));
        }

        let activated = self
            .occupations
            .transition_occupation(
                &occupation.id,
                &[OccupationStatus::PendingOccupation],
                &OccupationChange::activate(&occupation.unit_id),
            )
            .await
            .map_err(|e| {
                if is_duplicate_on(&e, indexes::OCCUPATION_TENANCY_SLOT) {
                    AppError::BadRequest(anyhow!(
                        "Unit {} is still occupied!",
                        occupation.unit_id
                    ))
                } else {
                    e
                }
            })?
            .ok_or_else(|| changed_concurrently(&occupation.id))?;

        self.units
            .set_unit_status(&activated.unit_id, UnitStatus::Occupied)
            .await?;

        OCCUPATIONS_TOTAL.with_label_values(&["activated"]).inc();
        info!(occupation_id = %activated.id, unit_id = %activated.unit_id, "Occupation activated");
        Ok(activated)
    }

    /// Activate every booking whose start date has arrived.
    #[instrument(skip(self))]
    pub async fn activate_due(&self, today: NaiveDate) -> Result<SweepReport, AppError> {
        let due = self.occupations.find_pending_starting_by(today).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        for occupation in due {
            match self.activate(&occupation.id).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(occupation_id = %occupation.id, error = %e, "Occupation not activated");
                    report.skipped += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            processed = report.processed,
            skipped = report.skipped,
            "Activation sweep finished"
        );
        Ok(report)
    }

    /// End a tenancy, releasing the unit and closing any active notice.
    #[instrument(skip(self))]
    pub async fn close(
        &self,
        id: &str,
        end_date: NaiveDate,
        outcome: VacateOutcome,
    ) -> Result<Occupation, AppError> {
        self.end_tenancy(id, end_date, outcome, NoticeStatus::Closed)
            .await
    }

    /// Vacate every tenancy whose notice runs out on or before `as_of`.
    #[instrument(skip(self))]
    pub async fn vacate_due(&self, as_of: NaiveDate) -> Result<SweepReport, AppError> {
        let leaving = self
            .occupations
            .find_occupations(&OccupationFilter {
                status: Some(OccupationStatus::PendingVacating),
                unit_id: None,
                tenant_id: None,
                order: SortOrder::Asc,
            })
            .await?;

        let mut due = Vec::new();
        for occupation in leaving {
            match self.notices.find_active_notice_for(&occupation.id).await? {
                Some(notice) if notice.vacating_date <= as_of => due.push((occupation, notice)),
                Some(_) => {}
                None => {
                    warn!(occupation_id = %occupation.id, "Vacating occupation has no active notice")
                }
            }
        }

        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };
        for (occupation, notice) in due {
            match self
                .end_tenancy(
                    &occupation.id,
                    notice.vacating_date,
                    VacateOutcome::Vacated,
                    NoticeStatus::Fulfilled,
                )
                .await
            {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(
                        occupation_id = %occupation.id,
                        notice_id = %notice.id,
                        error = %e,
                        "Occupation not vacated"
                    );
                    report.skipped += 1;
                }
            }
        }

        info!(
            as_of = %as_of,
            examined = report.examined,
            processed = report.processed,
            skipped = report.skipped,
            "Vacating sweep finished"
        );
        Ok(report)
    }

    async fn end_tenancy(
        &self,
        id: &str,
        end_date: NaiveDate,
        outcome: VacateOutcome,
        notice_status: NoticeStatus,
    ) -> Result<Occupation, AppError> {
        const CLOSABLE: [OccupationStatus; 2] =
            [OccupationStatus::Current, OccupationStatus::PendingVacating];

        let occupation = self.find_by_id(id).await?;
        if !CLOSABLE.contains(&occupation.status) {
            return Err(AppError::BadRequest(anyhow!(
                "Occupation {} is {} and cannot be closed!",
                occupation.id,
                occupation.status
            )));
        }
        if end_date > Utc::now().date_naive() {
            return Err(AppError::BadRequest(anyhow!(
                "End date should be today or before!"
            )));
        }
        if end_date < occupation.start_date {
            return Err(AppError::BadRequest(anyhow!(
                "End date {} cannot be before the start date {}!",
                end_date,
                occupation.start_date
            )));
        }

        let closed = self
            .occupations
            .transition_occupation(
                &occupation.id,
                &CLOSABLE,
                &OccupationChange::close(outcome, end_date),
            )
            .await?
            .ok_or_else(|| changed_concurrently(&occupation.id))?;

        self.units
            .set_unit_status(&closed.unit_id, UnitStatus::Vacant)
            .await?;
        self.notices
            .settle_active_notice(&closed.id, notice_status)
            .await?;

        OCCUPATIONS_TOTAL.with_label_values(&["closed"]).inc();
        info!(occupation_id = %closed.id, status = %closed.status, "Occupation closed");
        Ok(closed)
    }

    #[instrument(skip(self))]
    pub async fn balance(&self, id: &str) -> Result<LedgerBalance, AppError> {
        let occupation = self.find_by_id(id).await?;
        self.ledger.balance(&occupation.id).await
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Occupation, AppError> {
        self.occupations
            .find_occupation(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Occupation with id {} does not exist!", id)))
    }

    pub async fn find_by_number(&self, number: &str) -> Result<Occupation, AppError> {
        self.occupations
            .find_occupation_by_number(&number.trim().to_uppercase())
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!("Occupation with number {} does not exist!", number))
            })
    }

    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: OccupationFilter) -> Result<Vec<Occupation>, AppError> {
        self.occupations.find_occupations(&filter.normalized()).await
    }
}

fn already_booked() -> AppError {
    AppError::BadRequest(anyhow!("Unit has already been booked!"))
}

fn not_vacating(unit_id: &str) -> AppError {
    AppError::BadRequest(anyhow!(
        "Occupant of unit {} has not given a vacating notice!",
        unit_id
    ))
}

fn changed_concurrently(id: &str) -> AppError {
    AppError::RaceLost(anyhow!("Occupation {} changed concurrently, try again!", id))
}
