//! Business logic services for the Restaurant Costing Engine

pub mod import;
pub mod invoice;
pub mod ledger;
pub mod recipe;
pub mod reconciliation;

pub use invoice::InvoiceService;
pub use ledger::{LedgerService, PurchaseEntry};
pub use reconciliation::ReconciliationService;
pub use recipe::RecipeService;
