//! Composite ingredient recipes and bill-of-materials resolution

use chrono::Utc;
use rust_decimal::Decimal;
use shared::costing::scale_component;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::CostingConfig;
use crate::db::{decimal, store};
use crate::error::{AppError, AppResult};
use crate::locks::{ingredient_key, KeyedLocks};
use crate::models::{
    convert_rows, ComponentRequirement, ConsumptionOutcome, Ingredient, IngredientKey,
    IngredientRow, Recipe, RecipeComponent, INGREDIENT_COLUMNS,
};
use crate::services::ledger::{apply_consumption_in, fetch_by_id, fetch_by_key};

/// Recipe service for composite ingredients
#[derive(Clone)]
pub struct RecipeService {
    db: SqlitePool,
    writer: SqlitePool,
    locks: Arc<KeyedLocks>,
    costing: CostingConfig,
}

/// Row for recipe component query
#[derive(Debug, FromRow)]
struct ComponentRow {
    composite_id: Uuid,
    base_id: Uuid,
    quantity_per_batch: String,
}

/// In-memory view of a tenant's catalog and recipes
struct RecipeGraph {
    ingredients: HashMap<Uuid, Ingredient>,
    components: HashMap<Uuid, Vec<(Uuid, Decimal)>>,
}

impl RecipeGraph {
    async fn load(conn: &mut SqliteConnection) -> AppResult<Self> {
        let rows = sqlx::query_as::<_, IngredientRow>(&format!(
            "SELECT {} FROM ingredients",
            INGREDIENT_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;
        let ingredients: Vec<Ingredient> = convert_rows(rows)?;

        let component_rows = sqlx::query_as::<_, ComponentRow>(
            "SELECT composite_id, base_id, quantity_per_batch FROM recipe_components ORDER BY rowid",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut components: HashMap<Uuid, Vec<(Uuid, Decimal)>> = HashMap::new();
        for row in component_rows {
            let quantity = decimal("quantity_per_batch", &row.quantity_per_batch)?;
            components
                .entry(row.composite_id)
                .or_default()
                .push((row.base_id, quantity));
        }

        Ok(Self {
            ingredients: ingredients.into_iter().map(|i| (i.id, i)).collect(),
            components,
        })
    }

    fn ingredient(&self, id: &Uuid) -> AppResult<&Ingredient> {
        self.ingredients
            .get(id)
            .ok_or_else(|| AppError::IngredientNotFound(id.to_string()))
    }

    fn batch_output(&self, composite: &Ingredient) -> AppResult<Decimal> {
        composite
            .batch_output_size
            .filter(|size| *size > Decimal::ZERO)
            .ok_or_else(|| {
                AppError::validation(
                    "batch_output_size",
                    format!("composite {} has no batch output size", composite.key()),
                )
            })
    }

    /// Direct components of `composite` scaled to `quantity`
    fn expand(&self, composite: &Ingredient, quantity: Decimal) -> AppResult<Vec<ComponentRequirement>> {
        let batch_output = self.batch_output(composite)?;
        let mut requirements = Vec::new();
        for (base_id, per_batch) in self.components.get(&composite.id).into_iter().flatten() {
            let base = self.ingredient(base_id)?;
            requirements.push(ComponentRequirement {
                key: base.key(),
                quantity: scale_component(quantity, *per_batch, batch_output),
                is_composite: base.is_composite,
            });
        }
        Ok(requirements)
    }

    /// Walk down to non-composite ingredients, summing repeated leaves.
    /// `path` holds the composites currently being expanded.
    fn resolve(
        &self,
        id: Uuid,
        quantity: Decimal,
        depth: usize,
        max_depth: usize,
        path: &mut Vec<Uuid>,
        leaves: &mut Vec<(Uuid, Decimal)>,
    ) -> AppResult<()> {
        let ingredient = self.ingredient(&id)?;
        if !ingredient.is_composite {
            match leaves.iter_mut().find(|(leaf, _)| *leaf == id) {
                Some((_, total)) => *total += quantity,
                None => leaves.push((id, quantity)),
            }
            return Ok(());
        }

        if path.contains(&id) {
            return Err(AppError::CompositeCycle(ingredient.key().to_string()));
        }
        if depth >= max_depth {
            return Err(AppError::CompositeDepthExceeded {
                ingredient: ingredient.key().to_string(),
                limit: max_depth,
            });
        }

        let batch_output = self.batch_output(ingredient)?;
        path.push(id);
        for (base_id, per_batch) in self.components.get(&id).into_iter().flatten() {
            let needed = scale_component(quantity, *per_batch, batch_output);
            self.resolve(*base_id, needed, depth + 1, max_depth, path, leaves)?;
        }
        path.pop();
        Ok(())
    }
}

impl RecipeService {
    /// Create a new RecipeService instance
    pub fn new(
        db: SqlitePool,
        writer: SqlitePool,
        locks: Arc<KeyedLocks>,
        costing: CostingConfig,
    ) -> Self {
        Self {
            db,
            writer,
            locks,
            costing,
        }
    }

    /// Attach (or replace) the batch recipe of a composite ingredient
    pub async fn set_recipe(
        &self,
        composite: &IngredientKey,
        batch_output_size: Decimal,
        components: Vec<RecipeComponent>,
    ) -> AppResult<Recipe> {
        shared::validate_batch_output(batch_output_size)
            .map_err(|m| AppError::validation("batch_output_size", m))?;
        if components.is_empty() {
            return Err(AppError::validation(
                "components",
                "Recipe needs at least one component",
            ));
        }
        for component in &components {
            if component.quantity_per_batch <= Decimal::ZERO {
                return Err(AppError::validation(
                    "quantity_per_batch",
                    format!("quantity for {} must be positive", component.base),
                ));
            }
            if component.base == *composite {
                return Err(AppError::CompositeCycle(composite.to_string()));
            }
        }

        let mut tx = self.writer.begin().await?;
        let target = fetch_by_key(&mut tx, composite)
            .await?
            .ok_or_else(|| AppError::IngredientNotFound(composite.to_string()))?;

        let mut base_ids = Vec::with_capacity(components.len());
        for component in &components {
            let base = fetch_by_key(&mut tx, &component.base)
                .await?
                .ok_or_else(|| AppError::IngredientNotFound(component.base.to_string()))?;
            base_ids.push(base.id);
        }

        sqlx::query(
            "UPDATE ingredients SET is_composite = 1, batch_output_size = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(store(batch_output_size))
        .bind(Utc::now())
        .bind(target.id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM recipe_components WHERE composite_id = ?1")
            .bind(target.id)
            .execute(&mut *tx)
            .await?;

        for (component, base_id) in components.iter().zip(&base_ids) {
            sqlx::query(
                "INSERT INTO recipe_components (composite_id, base_id, quantity_per_batch) VALUES (?1, ?2, ?3)",
            )
            .bind(target.id)
            .bind(*base_id)
            .bind(store(component.quantity_per_batch))
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_insert(e, format!("component {}", component.base)))?;
        }

        // Reject the write if it closes a loop anywhere below this composite
        let graph = RecipeGraph::load(&mut tx).await?;
        let mut leaves = Vec::new();
        graph.resolve(
            target.id,
            batch_output_size,
            0,
            self.costing.max_composite_depth,
            &mut Vec::new(),
            &mut leaves,
        )?;

        tx.commit().await?;
        tracing::info!(
            "Recipe for {} set: {} components per {} batch",
            composite,
            components.len(),
            batch_output_size
        );

        Ok(Recipe {
            composite: composite.clone(),
            batch_output_size,
            components,
        })
    }

    /// Read the recipe of a composite ingredient
    pub async fn get_recipe(&self, composite: &IngredientKey) -> AppResult<Recipe> {
        let mut conn = self.db.acquire().await?;
        let graph = RecipeGraph::load(&mut conn).await?;
        let target = self.find_composite(&graph, composite)?;
        let batch_output_size = graph.batch_output(target)?;

        let mut components = Vec::new();
        for (base_id, per_batch) in graph.components.get(&target.id).into_iter().flatten() {
            components.push(RecipeComponent {
                base: graph.ingredient(base_id)?.key(),
                quantity_per_batch: *per_batch,
            });
        }

        Ok(Recipe {
            composite: composite.clone(),
            batch_output_size,
            components,
        })
    }

    /// One-level expansion: the direct components needed for `quantity_needed`
    /// of a composite. Components that are themselves composite are returned
    /// as-is and flagged.
    pub async fn expand_composite(
        &self,
        composite: &IngredientKey,
        quantity_needed: Decimal,
    ) -> AppResult<Vec<ComponentRequirement>> {
        shared::validate_quantity(quantity_needed)
            .map_err(|m| AppError::invalid_operand("quantity", m))?;

        let mut conn = self.db.acquire().await?;
        let graph = RecipeGraph::load(&mut conn).await?;
        let target = self.find_composite(&graph, composite)?;
        graph.expand(target, quantity_needed)
    }

    /// Full expansion down to non-composite ingredients
    pub async fn resolve_bill_of_materials(
        &self,
        composite: &IngredientKey,
        quantity_needed: Decimal,
    ) -> AppResult<Vec<ComponentRequirement>> {
        shared::validate_quantity(quantity_needed)
            .map_err(|m| AppError::invalid_operand("quantity", m))?;

        let mut conn = self.db.acquire().await?;
        let graph = RecipeGraph::load(&mut conn).await?;
        let target = self.find_composite(&graph, composite)?;

        let mut leaves = Vec::new();
        graph.resolve(
            target.id,
            quantity_needed,
            0,
            self.costing.max_composite_depth,
            &mut Vec::new(),
            &mut leaves,
        )?;

        leaves
            .into_iter()
            .map(|(id, quantity)| {
                Ok(ComponentRequirement {
                    key: graph.ingredient(&id)?.key(),
                    quantity,
                    is_composite: false,
                })
            })
            .collect()
    }

    /// Consume `quantity_needed` of a composite by depleting its base
    /// ingredients. All leaves are debited in one transaction or none are.
    pub async fn consume_composite(
        &self,
        composite: &IngredientKey,
        quantity_needed: Decimal,
        note: Option<&str>,
    ) -> AppResult<Vec<ConsumptionOutcome>> {
        shared::validate_quantity(quantity_needed)
            .map_err(|m| AppError::invalid_operand("quantity", m))?;

        let leaves = {
            let mut conn = self.db.acquire().await?;
            let graph = RecipeGraph::load(&mut conn).await?;
            let target = self.find_composite(&graph, composite)?;
            let mut leaves = Vec::new();
            graph.resolve(
                target.id,
                quantity_needed,
                0,
                self.costing.max_composite_depth,
                &mut Vec::new(),
                &mut leaves,
            )?;
            leaves
        };

        let _guards = self
            .locks
            .acquire_many(leaves.iter().map(|(id, _)| ingredient_key(id)))
            .await;

        let note = note
            .map(str::to_string)
            .unwrap_or_else(|| format!("{} x {}", composite, quantity_needed));

        let mut tx = self.writer.begin().await?;
        let mut outcomes = Vec::with_capacity(leaves.len());
        for (id, quantity) in &leaves {
            let ingredient = fetch_by_id(&mut tx, *id).await?;
            let outcome = apply_consumption_in(
                &mut tx,
                &ingredient,
                *quantity,
                self.costing.negative_stock,
                Some(note.as_str()),
            )
            .await?;
            outcomes.push(outcome);
        }
        tx.commit().await?;

        tracing::info!(
            "Consumed {} of {} across {} base ingredients",
            quantity_needed,
            composite,
            outcomes.len()
        );
        Ok(outcomes)
    }

    fn find_composite<'g>(
        &self,
        graph: &'g RecipeGraph,
        key: &IngredientKey,
    ) -> AppResult<&'g Ingredient> {
        let ingredient = graph
            .ingredients
            .values()
            .find(|i| i.key() == *key)
            .ok_or_else(|| AppError::IngredientNotFound(key.to_string()))?;
        if !ingredient.is_composite {
            return Err(AppError::NotComposite(key.to_string()));
        }
        Ok(ingredient)
    }
}
