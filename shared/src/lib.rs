//! Shared types and models for the Restaurant Costing Engine
//!
//! This crate contains the typed domain records, the pure costing math and
//! input validation used by the engine and its collaborators. It performs
//! no I/O.

pub mod costing;
pub mod models;
pub mod types;
pub mod validation;

pub use costing::*;
pub use models::*;
pub use types::*;
pub use validation::*;
