//! Ingredient ledger models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a ledger row.
///
/// The same catalog code can be carried by several brands and suppliers at
/// different costs, so the code alone never identifies an ingredient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IngredientKey {
    pub code: String,
    /// Empty when the supplier does not distinguish brands
    pub brand: String,
    pub supplier: String,
}

impl IngredientKey {
    pub fn new(code: impl Into<String>, brand: impl Into<String>, supplier: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            brand: brand.into(),
            supplier: supplier.into(),
        }
    }
}

impl std::fmt::Display for IngredientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.brand.is_empty() {
            write!(f, "{}@{}", self.code, self.supplier)
        } else {
            write!(f, "{}/{}@{}", self.code, self.brand, self.supplier)
        }
    }
}

/// A ledger row: on-hand quantity and running cost for one identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub brand: String,
    pub supplier: String,
    /// Every purchase and consumption of this identity must use this unit
    pub unit_of_measure: String,
    pub quantity_on_hand: Decimal,
    /// Most recent purchase price per unit
    pub last_unit_price: Decimal,
    /// Quantity-weighted mean purchase price per unit
    pub average_unit_price: Decimal,
    pub units_per_case: Decimal,
    pub active: bool,
    pub is_composite: bool,
    /// Output quantity of one batch, in this ingredient's unit (composites only)
    pub batch_output_size: Option<Decimal>,
    /// Lot of the most recently received batch
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Ingredient {
    pub fn key(&self) -> IngredientKey {
        IngredientKey::new(&self.code, &self.brand, &self.supplier)
    }

    /// Value of the stock on hand at average cost
    pub fn stock_value(&self) -> Decimal {
        crate::costing::round_money(self.quantity_on_hand * self.average_unit_price)
    }

    /// Average cost of a full case
    pub fn case_cost(&self) -> Decimal {
        crate::costing::round_money(self.average_unit_price * self.units_per_case)
    }
}

/// Point-in-time cost view consumed by sales, analytics and count collaborators
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerPosition {
    pub key: IngredientKey,
    pub unit_of_measure: String,
    pub quantity_on_hand: Decimal,
    pub average_unit_price: Decimal,
    pub last_unit_price: Decimal,
}

impl From<&Ingredient> for LedgerPosition {
    fn from(ingredient: &Ingredient) -> Self {
        Self {
            key: ingredient.key(),
            unit_of_measure: ingredient.unit_of_measure.clone(),
            quantity_on_hand: ingredient.quantity_on_hand,
            average_unit_price: ingredient.average_unit_price,
            last_unit_price: ingredient.last_unit_price,
        }
    }
}

/// Input for registering a catalog entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIngredient {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    pub supplier: String,
    pub unit_of_measure: String,
    pub units_per_case: Option<Decimal>,
    /// Set for composites; the recipe itself is attached separately
    pub batch_output_size: Option<Decimal>,
}

impl NewIngredient {
    pub fn key(&self) -> IngredientKey {
        IngredientKey::new(&self.code, &self.brand, &self.supplier)
    }
}

/// Result of a consumption against the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumptionOutcome {
    pub key: IngredientKey,
    pub consumed: Decimal,
    pub quantity_on_hand: Decimal,
    /// Set when the negative-stock policy allowed the balance below zero
    pub went_negative: bool,
}

/// Ledger row compared against its transaction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerVerification {
    pub key: IngredientKey,
    pub quantity_on_hand: Decimal,
    pub derived_quantity: Decimal,
    pub consistent: bool,
}
