//! Common test utilities for occupancy-service integration tests.
#![allow(dead_code)]

use chrono::NaiveDate;
use occupancy_service::config::{BillingSettings, LedgerSettings};
use occupancy_service::models::{
    CreateOccupation, NewPayment, Occupation, Payment, PaymentType, Tenant, TenantRef, Unit,
    UnitStatus,
};
use occupancy_service::services::{InMemoryStore, Services};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,occupancy_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub struct TestApp {
    pub store: Arc<InMemoryStore>,
    pub services: Services,
}

/// Services over a fresh in-memory store.
pub fn spawn_services() -> TestApp {
    init_tracing();
    let store = Arc::new(InMemoryStore::new());
    let services = Services::new(
        store.clone(),
        &LedgerSettings::default(),
        &BillingSettings::default(),
    );
    TestApp { store, services }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn amount(value: i64) -> Decimal {
    Decimal::from(value)
}

/// Advance 46600 plus first month 21050.
pub const REQUIRED_UPFRONT: i64 = 67_650;
pub const MONTHLY_TOTAL: i64 = 21_050;
pub const ADVANCE_TOTAL: i64 = 46_600;

pub fn unit(id: &str, status: UnitStatus) -> Unit {
    Unit {
        id: id.to_string(),
        floor: Some(1),
        status,
        advance_in_months: 2,
        rent_per_month: amount(20_000),
        security_per_month: amount(500),
        garbage_per_month: amount(300),
        other_amounts_per_month: BTreeMap::from([("GYM".to_string(), amount(250))]),
        security_advance: amount(5_000),
        garbage_advance: amount(600),
        other_amounts_advance: BTreeMap::from([("WATER".to_string(), amount(1_000))]),
    }
}

impl TestApp {
    pub fn seed_unit(&self, id: &str, status: UnitStatus) {
        self.store.put_unit(unit(id, status)).expect("seed unit");
    }

    pub fn seed_tenant(&self) -> Tenant {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            first_name: "Amina".to_string(),
            surname: "Wanjiru".to_string(),
            mobile_number: "0712345678".to_string(),
            email: "amina@example.com".to_string(),
            created_on: chrono::Utc::now(),
        };
        self.store.put_tenant(tenant.clone()).expect("seed tenant");
        tenant
    }

    pub async fn pay(&self, value: i64) -> Payment {
        self.pay_with(value, PaymentType::Card, None).await
    }

    pub async fn pay_with(
        &self,
        value: i64,
        payment_type: PaymentType,
        occupation_number: Option<&str>,
    ) -> Payment {
        self.record_payment(amount(value), payment_type, occupation_number)
            .await
    }

    /// Card payment of an arbitrary decimal amount.
    pub async fn pay_exact(&self, value: Decimal) -> Payment {
        self.record_payment(value, PaymentType::Card, None).await
    }

    async fn record_payment(
        &self,
        value: Decimal,
        payment_type: PaymentType,
        occupation_number: Option<&str>,
    ) -> Payment {
        self.services
            .payments
            .record(NewPayment {
                payment_type,
                reference_number: format!("REF-{}", Uuid::new_v4().simple()),
                occupation_number: occupation_number.map(str::to_string),
                currency: "kes".to_string(),
                amount: value,
            })
            .await
            .expect("record payment")
    }

    /// Book `unit_id` for a seeded tenant with the exact upfront amount.
    pub async fn book(&self, unit_id: &str, start_date: NaiveDate) -> Occupation {
        let tenant = self.seed_tenant();
        let payment = self.pay(REQUIRED_UPFRONT).await;
        self.services
            .occupations
            .create(CreateOccupation {
                tenant: TenantRef::Existing(tenant.id),
                unit_id: unit_id.to_string(),
                payment_id: payment.id,
                start_date,
            })
            .await
            .expect("book occupation")
    }

    /// A CURRENT tenancy on an occupied unit.
    pub async fn current_tenancy(&self, unit_id: &str, start_date: NaiveDate) -> Occupation {
        self.seed_unit(unit_id, UnitStatus::Vacant);
        let booked = self.book(unit_id, start_date).await;
        self.services
            .occupations
            .activate(&booked.id)
            .await
            .expect("activate occupation")
    }
}
