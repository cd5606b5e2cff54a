//! Domain models for the Restaurant Costing Engine

mod ingredient;
mod invoice;
mod recipe;
mod transaction;

pub use ingredient::*;
pub use invoice::*;
pub use recipe::*;
pub use transaction::*;
