//! Error handling for the Restaurant Costing Engine
//!
//! Hard failures abort the call and surface here. Per-line-item soft failures
//! during reconciliation are returned as `ReconciliationWarning` values instead.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Lookup errors
    #[error("Invoice not found: {0}")]
    InvoiceNotFound(String),

    #[error("Ingredient not found: {0}")]
    IngredientNotFound(String),

    // Reconciliation errors
    #[error("Invoice {0} is already fully reconciled")]
    AlreadyReconciled(String),

    #[error("Invoice {invoice_number} drifted by {difference} (stored {stored_total}, lines {line_sum})")]
    ConsistencyDrift {
        invoice_number: String,
        stored_total: Decimal,
        line_sum: Decimal,
        difference: Decimal,
    },

    // Ledger errors
    #[error("Invalid operand {field}: {message}")]
    InvalidOperand { field: String, message: String },

    #[error("Insufficient stock for {ingredient}: on hand {on_hand}, requested {requested}")]
    InsufficientStock {
        ingredient: String,
        on_hand: Decimal,
        requested: Decimal,
    },

    #[error("Ledger for {ingredient} disagrees with its transaction log: on hand {on_hand}, log {derived}")]
    LedgerMismatch {
        ingredient: String,
        on_hand: Decimal,
        derived: Decimal,
    },

    // Recipe errors
    #[error("Ingredient {0} is not composite")]
    NotComposite(String),

    #[error("Recipe cycle through {0}")]
    CompositeCycle(String),

    #[error("Recipe nesting deeper than {limit} levels at {ingredient}")]
    CompositeDepthExceeded { ingredient: String, limit: usize },

    // Validation errors
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Duplicate entry: {0}")]
    DuplicateEntry(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Storage errors
    #[error("Corrupt value in column {column}: {value}")]
    CorruptRow { column: &'static str, value: String },

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    /// Stable machine-readable code for operator tooling
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvoiceNotFound(_) => "INVOICE_NOT_FOUND",
            AppError::IngredientNotFound(_) => "INGREDIENT_NOT_FOUND",
            AppError::AlreadyReconciled(_) => "ALREADY_RECONCILED",
            AppError::ConsistencyDrift { .. } => "CONSISTENCY_DRIFT",
            AppError::InvalidOperand { .. } => "INVALID_OPERAND",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::LedgerMismatch { .. } => "LEDGER_MISMATCH",
            AppError::NotComposite(_) => "NOT_COMPOSITE",
            AppError::CompositeCycle(_) => "COMPOSITE_CYCLE",
            AppError::CompositeDepthExceeded { .. } => "COMPOSITE_DEPTH_EXCEEDED",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::DuplicateEntry(_) => "DUPLICATE_ENTRY",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::CorruptRow { .. } => "CORRUPT_ROW",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::MigrationError(_) => "MIGRATION_ERROR",
            AppError::Csv(_) => "CSV_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn invalid_operand(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::InvalidOperand {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Map a UNIQUE-constraint violation to `DuplicateEntry`, pass others through
    pub fn from_insert(err: sqlx::Error, what: impl Into<String>) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::DuplicateEntry(what.into())
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

/// Error body printed by the CLI
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        // Log the error for debugging
        tracing::error!("Error: {:?}", err);

        ErrorResponse {
            error: ErrorDetail {
                code: err.code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Result type alias for services
pub type AppResult<T> = Result<T, AppError>;
