//! Composite ingredient recipes (bills of materials)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::IngredientKey;

/// One base ingredient used by a composite batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecipeComponent {
    pub base: IngredientKey,
    /// Quantity of the base ingredient per batch, in the base's unit
    pub quantity_per_batch: Decimal,
}

/// Batch recipe for a composite ingredient
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub composite: IngredientKey,
    /// Output quantity of one batch, in the composite's unit
    pub batch_output_size: Decimal,
    pub components: Vec<RecipeComponent>,
}

/// A quantity of a specific ingredient required to satisfy a demand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentRequirement {
    pub key: IngredientKey,
    pub quantity: Decimal,
    /// True if this ingredient is itself composite (one-level expansion only)
    pub is_composite: bool,
}
