//! Database models for the Restaurant Costing Engine
//!
//! Re-exports models from the shared crate and adds the storage row types

mod rows;

pub use rows::*;
pub use shared::models::*;
