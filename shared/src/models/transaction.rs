//! Append-only inventory transaction log

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::IngredientKey;
use crate::types::{TimeRange, UnknownVariant};

/// Kind of movement recorded in the log
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Stock received, usually from a reconciled invoice line
    Purchase,
    Consumption,
    /// Physical count correction
    Adjustment,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Purchase => "purchase",
            TransactionType::Consumption => "consumption",
            TransactionType::Adjustment => "adjustment",
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase" => Ok(TransactionType::Purchase),
            "consumption" => Ok(TransactionType::Consumption),
            "adjustment" => Ok(TransactionType::Adjustment),
            other => Err(UnknownVariant::new("transaction type", other)),
        }
    }
}

/// One immutable log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub ingredient_id: Uuid,
    pub code: String,
    pub brand: String,
    pub supplier: String,
    pub transaction_type: TransactionType,
    /// Positive for stock in, negative for stock out
    pub quantity_delta: Decimal,
    pub unit_cost: Decimal,
    pub invoice_number: Option<String>,
    pub line_item_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub fn key(&self) -> IngredientKey {
        IngredientKey::new(&self.code, &self.brand, &self.supplier)
    }
}

/// Filter for reading the log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionFilter {
    pub ingredient: Option<IngredientKey>,
    pub invoice_number: Option<String>,
    pub transaction_type: Option<TransactionType>,
    #[serde(default)]
    pub range: TimeRange,
}
