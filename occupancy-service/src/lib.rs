//! Occupancy Service - tenancy lifecycle and per-occupation ledger.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
