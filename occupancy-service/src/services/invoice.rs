//! Invoice generation. Every invoice posts one DEBIT to the ledger.

use crate::models::{
    amount_overflow, CreateInvoice, Invoice, InvoiceAmounts, InvoiceFilter, InvoiceType,
    Occupation, OccupationFilter, OccupationStatus, SortOrder, SweepReport, Unit,
};
use crate::services::ledger::LedgerService;
use crate::services::metrics::INVOICES_TOTAL;
use crate::services::numbering::invoice_number;
use crate::services::store::{indexes, is_duplicate_on, InvoiceStore, OccupationStore, UnitReader};
use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::{retry_with_backoff, RetryConfig};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Charge name of a penalty priced from the rent.
pub const PENALTY_CHARGE: &str = "PENALTY";

type Period = Option<(NaiveDate, NaiveDate)>;

#[derive(Clone)]
pub struct InvoiceService {
    occupations: Arc<dyn OccupationStore>,
    units: Arc<dyn UnitReader>,
    invoices: Arc<dyn InvoiceStore>,
    ledger: LedgerService,
    penalty_percentage_of_rent: Decimal,
}

impl InvoiceService {
    pub fn new(
        occupations: Arc<dyn OccupationStore>,
        units: Arc<dyn UnitReader>,
        invoices: Arc<dyn InvoiceStore>,
        ledger: LedgerService,
        penalty_percentage_of_rent: Decimal,
    ) -> Self {
        Self {
            occupations,
            units,
            invoices,
            ledger,
            penalty_percentage_of_rent,
        }
    }

    #[instrument(skip(self, request), fields(occupation_id = %request.occupation_id, invoice_type = %request.invoice_type))]
    pub async fn create(&self, request: CreateInvoice) -> Result<Invoice, AppError> {
        let occupation = self
            .occupations
            .find_occupation(&request.occupation_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Occupation with id {} does not exist!",
                    request.occupation_id
                ))
            })?;

        let (period, amounts) = self.price(&request, &occupation).await?;
        if let Some(line) = amounts.negative_line() {
            return Err(AppError::BadRequest(anyhow!(
                "Invoice amount {} cannot be negative!",
                line
            )));
        }
        let total = amounts.total()?;
        self.ledger.check_debit(&occupation.id, total).await?;

        let invoices = &self.invoices;
        let (invoice_type, occupation_id, amounts) = (request.invoice_type, &occupation.id, &amounts);
        let invoice = retry_with_backoff(
            &RetryConfig::quick(),
            "insert_invoice",
            |e: &AppError| is_duplicate_on(e, indexes::INVOICE_NUMBER),
            move || async move {
                let invoice = Invoice::new(
                    invoice_number(),
                    invoice_type,
                    occupation_id,
                    period,
                    amounts.clone(),
                );
                invoices.insert_invoice(&invoice).await.map(|_| invoice)
            },
        )
        .await?;

        let entry = self
            .ledger
            .append_debit(&occupation.id, &invoice.id, total)
            .await?;

        INVOICES_TOTAL
            .with_label_values(&[invoice.invoice_type.as_str()])
            .inc();
        info!(
            invoice_id = %invoice.id,
            number = %invoice.number,
            total = %total,
            carried_forward = %entry.total_amount_carried_forward,
            "Invoice created"
        );

        Ok(invoice)
    }

    /// Work out the billing period and charge lines for a request.
    async fn price(
        &self,
        request: &CreateInvoice,
        occupation: &Occupation,
    ) -> Result<(Period, InvoiceAmounts), AppError> {
        match request.invoice_type {
            InvoiceType::RentAdvance => {
                let unit = self.unit_of(occupation).await?;
                Ok((None, unit.advance_charges()?))
            }
            InvoiceType::Rent => {
                let unit = self.unit_of(occupation).await?;
                let start = request
                    .start_date
                    .unwrap_or_else(|| Utc::now().date_naive());
                let end = request.end_date.unwrap_or_else(|| end_of_month(start));
                if end < start {
                    return Err(AppError::BadRequest(anyhow!(
                        "End date {} cannot be before start date {}!",
                        end,
                        start
                    )));
                }
                Ok((Some((start, end)), unit.monthly_charges()))
            }
            InvoiceType::Penalty => {
                let period = requested_period(request)?;
                match &request.amounts {
                    Some(amounts) => Ok((period, amounts.clone())),
                    None => {
                        let unit = self.unit_of(occupation).await?;
                        Ok((period, self.rent_penalty(&unit)?))
                    }
                }
            }
            InvoiceType::Utilities | InvoiceType::Booking => {
                let period = requested_period(request)?;
                let amounts = request.amounts.clone().ok_or_else(|| {
                    AppError::BadRequest(anyhow!(
                        "Amounts are required for {} invoices!",
                        request.invoice_type
                    ))
                })?;
                Ok((period, amounts))
            }
        }
    }

    /// Configured percentage of a month's rent, rounded up to a whole unit.
    fn rent_penalty(&self, unit: &Unit) -> Result<InvoiceAmounts, AppError> {
        let penalty = unit
            .rent_per_month
            .checked_mul(self.penalty_percentage_of_rent)
            .ok_or_else(amount_overflow)?
            / Decimal::ONE_HUNDRED;
        Ok(InvoiceAmounts {
            other_amounts: BTreeMap::from([(PENALTY_CHARGE.to_string(), penalty.ceil())]),
            ..Default::default()
        })
    }

    async fn unit_of(&self, occupation: &Occupation) -> Result<Unit, AppError> {
        self.units
            .find_unit(&occupation.unit_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow!(
                    "Unit with id {} does not exist!",
                    occupation.unit_id
                ))
            })
    }

    /// Bill the month containing `as_of` to every CURRENT occupation that
    /// has no RENT invoice starting in that month yet.
    #[instrument(skip(self))]
    pub async fn invoice_current_rent(&self, as_of: NaiveDate) -> Result<SweepReport, AppError> {
        let month_start = start_of_month(as_of);
        let month_end = end_of_month(as_of);
        let current = self
            .occupations
            .find_occupations(&OccupationFilter {
                status: Some(OccupationStatus::Current),
                unit_id: None,
                tenant_id: None,
                order: SortOrder::Asc,
            })
            .await?;
        let mut report = SweepReport {
            examined: current.len(),
            ..Default::default()
        };

        for occupation in current {
            if self.has_rent_for(&occupation.id, month_start, month_end).await? {
                report.skipped += 1;
                continue;
            }

            let mut rent = CreateInvoice::of(InvoiceType::Rent, &occupation.id);
            rent.start_date = Some(month_start);
            rent.end_date = Some(month_end);
            match self.create(rent).await {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    warn!(occupation_id = %occupation.id, error = %e, "Rent not invoiced");
                    report.skipped += 1;
                }
            }
        }

        info!(
            month = %month_start,
            examined = report.examined,
            processed = report.processed,
            skipped = report.skipped,
            "Rent invoicing sweep finished"
        );
        Ok(report)
    }

    async fn has_rent_for(
        &self,
        occupation_id: &str,
        month_start: NaiveDate,
        month_end: NaiveDate,
    ) -> Result<bool, AppError> {
        let billed = self
            .invoices
            .find_invoices(&InvoiceFilter {
                invoice_type: Some(InvoiceType::Rent),
                number: None,
                occupation_id: Some(occupation_id.to_string()),
                order: SortOrder::Desc,
            })
            .await?;
        Ok(billed.iter().any(|invoice| {
            invoice
                .start_date
                .is_some_and(|start| start >= month_start && start <= month_end)
        }))
    }

    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> Result<Invoice, AppError> {
        self.invoices
            .find_invoice(id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow!("Invoice with id {} does not exist!", id)))
    }

    #[instrument(skip(self, filter))]
    pub async fn find(&self, filter: InvoiceFilter) -> Result<Vec<Invoice>, AppError> {
        self.invoices.find_invoices(&filter.normalized()).await
    }
}

/// Caller-supplied period for non-rent invoices: both dates or neither.
fn requested_period(request: &CreateInvoice) -> Result<Period, AppError> {
    match (request.start_date, request.end_date) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) if end >= start => Ok(Some((start, end))),
        (Some(start), Some(end)) => Err(AppError::BadRequest(anyhow!(
            "End date {} cannot be before start date {}!",
            end,
            start
        ))),
        _ => Err(AppError::BadRequest(anyhow!(
            "Both start and end dates are required for an invoice period!"
        ))),
    }
}

/// First day of the calendar month containing `date`.
pub fn start_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Last day of the calendar month containing `date`.
pub fn end_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn end_of_month_handles_short_months_and_year_end() {
        assert_eq!(end_of_month(date(2024, 2, 10)), date(2024, 2, 29));
        assert_eq!(end_of_month(date(2023, 2, 1)), date(2023, 2, 28));
        assert_eq!(end_of_month(date(2024, 12, 31)), date(2024, 12, 31));
        assert_eq!(end_of_month(date(2024, 4, 15)), date(2024, 4, 30));
        assert_eq!(start_of_month(date(2024, 4, 15)), date(2024, 4, 1));
    }

    #[test]
    fn half_a_period_is_rejected() {
        let mut request = CreateInvoice::of(InvoiceType::Utilities, "occ");
        request.start_date = Some(date(2024, 1, 1));
        assert!(matches!(
            requested_period(&request),
            Err(AppError::BadRequest(_))
        ));
    }
}
