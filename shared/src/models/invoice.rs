//! Invoice and reconciliation models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::UnknownVariant;

/// Reconciliation state of an invoice.
///
/// Moves `Pending -> PartiallyReconciled -> FullyReconciled` and never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Pending,
    PartiallyReconciled,
    FullyReconciled,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Pending => "pending",
            ReconciliationStatus::PartiallyReconciled => "partially_reconciled",
            ReconciliationStatus::FullyReconciled => "fully_reconciled",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ReconciliationStatus::FullyReconciled)
    }
}

impl std::str::FromStr for ReconciliationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ReconciliationStatus::Pending),
            "partially_reconciled" => Ok(ReconciliationStatus::PartiallyReconciled),
            "fully_reconciled" => Ok(ReconciliationStatus::FullyReconciled),
            other => Err(UnknownVariant::new("reconciliation status", other)),
        }
    }
}

impl std::fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconciliationStatus::Pending => write!(f, "Pending"),
            ReconciliationStatus::PartiallyReconciled => write!(f, "Partially Reconciled"),
            ReconciliationStatus::FullyReconciled => write!(f, "Fully Reconciled"),
        }
    }
}

/// Payment state of an invoice
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Partial,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::Partial => "partial",
            PaymentStatus::Paid => "paid",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpaid" => Ok(PaymentStatus::Unpaid),
            "partial" => Ok(PaymentStatus::Partial),
            "paid" => Ok(PaymentStatus::Paid),
            other => Err(UnknownVariant::new("payment status", other)),
        }
    }
}

/// Invoice header
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: Uuid,
    pub invoice_number: String,
    pub supplier: String,
    pub invoice_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
    /// Total as printed on the supplier's invoice
    pub total_amount: Decimal,
    pub payment_status: PaymentStatus,
    pub status: ReconciliationStatus,
    /// Set only on the transition to fully reconciled
    pub reconciled_at: Option<DateTime<Utc>>,
    pub reconciled_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    pub fn is_reconciled(&self) -> bool {
        self.status.is_final()
    }
}

/// A received line on an invoice
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub line_number: i64,
    pub ingredient_code: String,
    pub ingredient_name: String,
    pub brand: String,
    /// May differ from the received quantity on partial fulfillment
    pub quantity_ordered: Option<Decimal>,
    pub quantity_received: Decimal,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub reconciled: bool,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl InvoiceLineItem {
    pub fn is_short_shipped(&self) -> bool {
        self.quantity_ordered
            .map_or(false, |ordered| self.quantity_received < ordered)
    }
}

/// Invoice together with its line items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceWithLines {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub line_items: Vec<InvoiceLineItem>,
}

/// Header supplied by the import collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInvoiceHeader {
    pub invoice_number: String,
    pub supplier: String,
    pub invoice_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
    pub total_amount: Decimal,
}

/// Line supplied by the import collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLineItem {
    pub ingredient_code: String,
    pub ingredient_name: String,
    #[serde(default)]
    pub brand: String,
    pub quantity_ordered: Option<Decimal>,
    pub quantity_received: Decimal,
    pub unit_of_measure: String,
    pub unit_price: Decimal,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

/// Complete invoice as handed over for import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportInvoice {
    pub header: ImportInvoiceHeader,
    pub lines: Vec<ImportLineItem>,
}

/// Why a single line item could not be applied
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarningKind {
    /// Neither the code nor the name resolved to an active ingredient
    UnmatchedIngredient,
    /// The ingredient exists but is stocked in another unit
    UnitMismatch { expected: String, found: String },
    /// The purchase itself was rejected (e.g. negative quantity)
    InvalidOperand { message: String },
}

/// Per-item soft failure returned alongside a reconciliation result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciliationWarning {
    pub line_item_id: Uuid,
    pub line_number: i64,
    pub ingredient_code: String,
    pub ingredient_name: String,
    #[serde(flatten)]
    pub kind: WarningKind,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationResult {
    pub invoice_number: String,
    /// Unreconciled line items considered in this run
    pub attempted: usize,
    pub applied: usize,
    pub warnings: Vec<ReconciliationWarning>,
    pub status: ReconciliationStatus,
    pub reconciled_at: Option<DateTime<Utc>>,
}

/// Stored invoice total compared with its re-derived line sum
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConsistencyReport {
    pub invoice_number: String,
    pub stored_total: Decimal,
    pub line_sum: Decimal,
    /// `line_sum - stored_total`
    pub difference: Decimal,
    pub within_tolerance: bool,
}
