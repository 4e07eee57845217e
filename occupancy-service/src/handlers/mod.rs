//! HTTP handlers for occupancy-service.

pub mod booking_refunds;
pub mod health;
pub mod invoices;
pub mod occupations;
pub mod payments;
pub mod receipts;
pub mod sweeps;
pub mod transactions;
