//! Restaurant Costing Engine
//!
//! Per-tenant ingredient ledger with weighted-average costing, composite
//! recipes and supplier invoice reconciliation, stored in SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod locks;
pub mod models;
pub mod services;

pub use config::Config;
pub use db::{Tenant, TenantStore};
pub use error::{AppError, AppResult};
