//! Application startup and lifecycle management.

use crate::config::OccupancyConfig;
use crate::handlers::{
    booking_refunds, health, invoices, occupations, payments, receipts, sweeps, transactions,
};
use crate::services::{init_metrics, MongoStore, Services};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

/// Every route of the service, health and metrics included.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_handler))
        .route(
            "/occupations",
            post(occupations::create_occupation).get(occupations::list_occupations),
        )
        .route("/occupations/:id", get(occupations::get_occupation))
        .route(
            "/occupations/:id/activate",
            post(occupations::activate_occupation),
        )
        .route("/occupations/:id/notices", post(occupations::give_notice))
        .route("/occupations/:id/close", post(occupations::close_occupation))
        .route(
            "/occupations/:id/balance",
            get(occupations::occupation_balance),
        )
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route("/invoices/:id", get(invoices::get_invoice))
        .route("/transactions", get(transactions::list_transactions))
        .route("/transactions/:id", get(transactions::get_transaction))
        .route(
            "/payments",
            post(payments::record_payment).get(payments::list_payments),
        )
        .route("/payments/:id", get(payments::get_payment))
        .route(
            "/receipts",
            post(receipts::create_receipt).get(receipts::list_receipts),
        )
        .route("/receipts/:id", get(receipts::get_receipt))
        .route(
            "/booking-refunds",
            post(booking_refunds::create_booking_refund)
                .get(booking_refunds::list_booking_refunds),
        )
        .route("/sweeps/payments", post(sweeps::sweep_payments))
        .route("/sweeps/occupations", post(sweeps::sweep_occupations))
        .route("/sweeps/rent-invoices", post(sweeps::sweep_rent_invoices))
        .route("/sweeps/vacating", post(sweeps::sweep_vacating))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Connect to MongoDB, ensure indexes, and bind the HTTP listener.
    pub async fn build(config: OccupancyConfig) -> Result<Self, AppError> {
        init_metrics();

        let store = MongoStore::connect(config.mongodb.uri(), &config.mongodb.database).await?;
        store.initialize_indexes().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize database indexes");
            e
        })?;

        let services = Services::new(Arc::new(store), &config.ledger, &config.billing);
        let state = AppState { services };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Occupancy service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let app = router(self.state);

        tracing::info!(
            service = "occupancy-service",
            version = env!("CARGO_PKG_VERSION"),
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        axum::serve(self.http_listener, app).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
