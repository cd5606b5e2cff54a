//! Ingredient ledger service: on-hand quantity and weighted-average cost
//!
//! Every mutation of a ledger row runs under that row's keyed lock and inside
//! one SQLite transaction together with its transaction-log insert. Write
//! transactions go through the tenant's single-connection writer pool; reads
//! use the shared pool.

use chrono::Utc;
use rust_decimal::Decimal;
use shared::costing::{round_unit, weighted_average};
use shared::NegativeStockPolicy;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::locks::{ingredient_key, KeyedLocks};
use crate::models::{
    convert_rows, ConsumptionOutcome, Ingredient, IngredientKey, IngredientRow,
    InventoryTransaction, LedgerPosition, LedgerVerification, NewIngredient, TransactionFilter,
    TransactionRow, TransactionType, INGREDIENT_COLUMNS, TRANSACTION_COLUMNS,
};

/// Ledger service for purchases, consumption and count corrections
#[derive(Clone)]
pub struct LedgerService {
    db: SqlitePool,
    writer: SqlitePool,
    locks: Arc<KeyedLocks>,
    negative_stock: NegativeStockPolicy,
}

/// A purchase about to be applied to a ledger row
#[derive(Debug, Clone)]
pub struct PurchaseEntry<'a> {
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub unit_of_measure: &'a str,
    pub invoice_number: Option<&'a str>,
    pub line_item_id: Option<Uuid>,
    pub note: Option<String>,
}

impl LedgerService {
    /// Create a new LedgerService instance
    pub fn new(
        db: SqlitePool,
        writer: SqlitePool,
        locks: Arc<KeyedLocks>,
        negative_stock: NegativeStockPolicy,
    ) -> Self {
        Self {
            db,
            writer,
            locks,
            negative_stock,
        }
    }

    /// Register a catalog entry with zero stock
    pub async fn register_ingredient(&self, input: NewIngredient) -> AppResult<Ingredient> {
        shared::validate_new_ingredient(&input)
            .map_err(|(field, message)| AppError::validation(field, message))?;

        let now = Utc::now();
        let id = Uuid::new_v4();
        let units_per_case = input.units_per_case.unwrap_or(Decimal::ONE);

        let mut tx = self.writer.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO ingredients (
                id, code, name, brand, supplier, unit_of_measure, units_per_case,
                is_composite, batch_output_size, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            "#,
        )
        .bind(id)
        .bind(input.code.trim())
        .bind(input.name.trim())
        .bind(input.brand.trim())
        .bind(input.supplier.trim())
        .bind(input.unit_of_measure.trim())
        .bind(store(units_per_case))
        .bind(input.batch_output_size.is_some())
        .bind(input.batch_output_size.map(store))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_insert(e, format!("ingredient {}", input.key())))?;

        let ingredient = fetch_by_id(&mut tx, id).await?;
        tx.commit().await?;
        tracing::info!("Registered ingredient {} ({})", ingredient.key(), ingredient.name);
        Ok(ingredient)
    }

    /// Get an ingredient by identity
    pub async fn get_ingredient(&self, key: &IngredientKey) -> AppResult<Ingredient> {
        let mut conn = self.db.acquire().await?;
        fetch_by_key(&mut conn, key)
            .await?
            .ok_or_else(|| AppError::IngredientNotFound(key.to_string()))
    }

    /// Current quantity and cost for an identity
    pub async fn position(&self, key: &IngredientKey) -> AppResult<LedgerPosition> {
        let ingredient = self.get_ingredient(key).await?;
        Ok(LedgerPosition::from(&ingredient))
    }

    /// List the catalog, ordered by supplier and code
    pub async fn list_ingredients(&self, include_inactive: bool) -> AppResult<Vec<Ingredient>> {
        let rows = sqlx::query_as::<_, IngredientRow>(&format!(
            r#"
            SELECT {}
            FROM ingredients
            WHERE active = 1 OR ?1
            ORDER BY supplier, code, brand
            "#,
            INGREDIENT_COLUMNS
        ))
        .bind(include_inactive)
        .fetch_all(&self.db)
        .await?;

        convert_rows(rows)
    }

    /// Activate or deactivate a catalog entry. Inactive entries no longer
    /// match invoice lines but keep their stock and history.
    pub async fn set_active(&self, key: &IngredientKey, active: bool) -> AppResult<Ingredient> {
        let ingredient = self.get_ingredient(key).await?;
        let _guard = self.locks.acquire(&ingredient_key(&ingredient.id)).await;

        let mut tx = self.writer.begin().await?;
        sqlx::query("UPDATE ingredients SET active = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(active)
            .bind(Utc::now())
            .bind(ingredient.id)
            .execute(&mut *tx)
            .await?;
        let updated = fetch_by_id(&mut tx, ingredient.id).await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Receive `quantity` of an ingredient at `unit_price`
    pub async fn apply_purchase(
        &self,
        key: &IngredientKey,
        quantity: Decimal,
        unit_price: Decimal,
        unit_of_measure: &str,
    ) -> AppResult<Ingredient> {
        let id = self.get_ingredient(key).await?.id;
        let _guard = self.locks.acquire(&ingredient_key(&id)).await;

        let mut tx = self.writer.begin().await?;
        let ingredient = fetch_by_id(&mut tx, id).await?;
        let updated = apply_purchase_in(
            &mut tx,
            &ingredient,
            PurchaseEntry {
                quantity,
                unit_price,
                unit_of_measure,
                invoice_number: None,
                line_item_id: None,
                note: Some("direct purchase".to_string()),
            },
        )
        .await?;
        tx.commit().await?;

        Ok(updated)
    }

    /// Remove `quantity` of an ingredient from stock. Cost fields are untouched.
    pub async fn apply_consumption(
        &self,
        key: &IngredientKey,
        quantity: Decimal,
        note: Option<&str>,
    ) -> AppResult<ConsumptionOutcome> {
        let id = self.get_ingredient(key).await?.id;
        let _guard = self.locks.acquire(&ingredient_key(&id)).await;

        let mut tx = self.writer.begin().await?;
        let ingredient = fetch_by_id(&mut tx, id).await?;
        let outcome =
            apply_consumption_in(&mut tx, &ingredient, quantity, self.negative_stock, note).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    /// Overwrite on-hand with a physical count, logging the difference
    pub async fn record_count(
        &self,
        key: &IngredientKey,
        counted: Decimal,
        note: Option<&str>,
    ) -> AppResult<Ingredient> {
        shared::validate_quantity(counted)
            .map_err(|m| AppError::invalid_operand("counted_quantity", m))?;

        let id = self.get_ingredient(key).await?.id;
        let _guard = self.locks.acquire(&ingredient_key(&id)).await;

        let mut tx = self.writer.begin().await?;
        let ingredient = fetch_by_id(&mut tx, id).await?;
        let counted = round_unit(counted);
        let delta = counted - ingredient.quantity_on_hand;
        if delta.is_zero() {
            return Ok(ingredient);
        }

        sqlx::query("UPDATE ingredients SET quantity_on_hand = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(store(counted))
            .bind(Utc::now())
            .bind(ingredient.id)
            .execute(&mut *tx)
            .await?;

        insert_transaction(
            &mut tx,
            &ingredient,
            TransactionType::Adjustment,
            delta,
            ingredient.average_unit_price,
            None,
            None,
            Some(note.unwrap_or("physical count").to_string()),
        )
        .await?;
        let updated = fetch_by_id(&mut tx, ingredient.id).await?;
        tx.commit().await?;

        tracing::info!(
            "Count adjusted {} by {} to {}",
            ingredient.key(),
            delta,
            counted
        );
        Ok(updated)
    }

    /// Compare an ingredient's on-hand with the sum of its logged movements
    pub async fn verify(&self, key: &IngredientKey) -> AppResult<LedgerVerification> {
        let ingredient = self.get_ingredient(key).await?;
        self.verify_ingredient(&ingredient).await
    }

    /// Verify every ingredient; returns only the inconsistent ones
    pub async fn verify_all(&self) -> AppResult<Vec<LedgerVerification>> {
        let mut mismatches = Vec::new();
        for ingredient in self.list_ingredients(true).await? {
            let verification = self.verify_ingredient(&ingredient).await?;
            if !verification.consistent {
                tracing::warn!(
                    "Ledger mismatch for {}: on hand {}, log {}",
                    verification.key,
                    verification.quantity_on_hand,
                    verification.derived_quantity
                );
                mismatches.push(verification);
            }
        }
        Ok(mismatches)
    }

    async fn verify_ingredient(&self, ingredient: &Ingredient) -> AppResult<LedgerVerification> {
        let deltas = sqlx::query_scalar::<_, String>(
            "SELECT quantity_delta FROM inventory_transactions WHERE ingredient_id = ?1",
        )
        .bind(ingredient.id)
        .fetch_all(&self.db)
        .await?;

        let mut derived = Decimal::ZERO;
        for raw in &deltas {
            derived += crate::db::decimal("quantity_delta", raw)?;
        }

        Ok(LedgerVerification {
            key: ingredient.key(),
            quantity_on_hand: ingredient.quantity_on_hand,
            derived_quantity: derived,
            consistent: derived == ingredient.quantity_on_hand,
        })
    }

    /// Read the transaction log, oldest first
    pub async fn list_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> AppResult<Vec<InventoryTransaction>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM inventory_transactions WHERE 1 = 1",
            TRANSACTION_COLUMNS
        ));
        if let Some(key) = &filter.ingredient {
            query
                .push(" AND code = ")
                .push_bind(key.code.clone())
                .push(" AND brand = ")
                .push_bind(key.brand.clone())
                .push(" AND supplier = ")
                .push_bind(key.supplier.clone());
        }
        if let Some(invoice_number) = &filter.invoice_number {
            query
                .push(" AND invoice_number = ")
                .push_bind(invoice_number.clone());
        }
        if let Some(kind) = filter.transaction_type {
            query
                .push(" AND transaction_type = ")
                .push_bind(kind.as_str());
        }
        query.push(" ORDER BY rowid");

        let rows = query
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.db)
            .await?;

        let transactions: Vec<InventoryTransaction> = convert_rows(rows)?;
        Ok(transactions
            .into_iter()
            .filter(|t| filter.range.contains(t.created_at))
            .collect())
    }
}

// ============================================================================
// Connection-level operations shared with reconciliation and recipes
// ============================================================================

/// Look up an ingredient by its (code, brand, supplier) identity
pub(crate) async fn fetch_by_key(
    conn: &mut SqliteConnection,
    key: &IngredientKey,
) -> AppResult<Option<Ingredient>> {
    let row = sqlx::query_as::<_, IngredientRow>(&format!(
        "SELECT {} FROM ingredients WHERE code = ?1 AND brand = ?2 AND supplier = ?3",
        INGREDIENT_COLUMNS
    ))
    .bind(&key.code)
    .bind(&key.brand)
    .bind(&key.supplier)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Ingredient::try_from).transpose()
}

/// Active ingredients carrying `name` for a brand and supplier (at most two,
/// enough to tell a unique match from an ambiguous one)
pub(crate) async fn fetch_active_by_name(
    conn: &mut SqliteConnection,
    name: &str,
    brand: &str,
    supplier: &str,
) -> AppResult<Vec<Ingredient>> {
    let rows = sqlx::query_as::<_, IngredientRow>(&format!(
        r#"
        SELECT {}
        FROM ingredients
        WHERE name = ?1 AND brand = ?2 AND supplier = ?3 AND active = 1
        ORDER BY code
        LIMIT 2
        "#,
        INGREDIENT_COLUMNS
    ))
    .bind(name)
    .bind(brand)
    .bind(supplier)
    .fetch_all(&mut *conn)
    .await?;

    convert_rows(rows)
}

pub(crate) async fn fetch_by_id(conn: &mut SqliteConnection, id: Uuid) -> AppResult<Ingredient> {
    let row = sqlx::query_as::<_, IngredientRow>(&format!(
        "SELECT {} FROM ingredients WHERE id = ?1",
        INGREDIENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::IngredientNotFound(id.to_string()))?;

    Ingredient::try_from(row)
}

/// Apply a purchase to `ingredient` and log it. The caller owns the
/// transaction and holds the ingredient's lock.
pub(crate) async fn apply_purchase_in(
    conn: &mut SqliteConnection,
    ingredient: &Ingredient,
    entry: PurchaseEntry<'_>,
) -> AppResult<Ingredient> {
    shared::validate_quantity(entry.quantity)
        .map_err(|m| AppError::invalid_operand("quantity", m))?;
    shared::validate_unit_price(entry.unit_price)
        .map_err(|m| AppError::invalid_operand("unit_price", m))?;
    if !shared::units_match(&ingredient.unit_of_measure, entry.unit_of_measure) {
        return Err(AppError::invalid_operand(
            "unit_of_measure",
            format!(
                "{} is stocked in '{}', got '{}'",
                ingredient.key(),
                ingredient.unit_of_measure,
                entry.unit_of_measure
            ),
        ));
    }

    let quantity = round_unit(entry.quantity);
    let unit_price = round_unit(entry.unit_price);
    let average = weighted_average(
        ingredient.quantity_on_hand,
        ingredient.average_unit_price,
        quantity,
        unit_price,
    );
    let on_hand = ingredient.quantity_on_hand + quantity;

    sqlx::query(
        r#"
        UPDATE ingredients
        SET quantity_on_hand = ?1, last_unit_price = ?2, average_unit_price = ?3, updated_at = ?4
        WHERE id = ?5
        "#,
    )
    .bind(store(on_hand))
    .bind(store(unit_price))
    .bind(store(average))
    .bind(Utc::now())
    .bind(ingredient.id)
    .execute(&mut *conn)
    .await?;

    insert_transaction(
        conn,
        ingredient,
        TransactionType::Purchase,
        quantity,
        unit_price,
        entry.invoice_number,
        entry.line_item_id,
        entry.note,
    )
    .await?;

    tracing::debug!(
        "Purchase {} x {} @ {}: on hand {}, average {}",
        ingredient.key(),
        quantity,
        unit_price,
        on_hand,
        average
    );
    fetch_by_id(conn, ingredient.id).await
}

/// Apply a consumption to `ingredient` under `policy` and log it. The caller
/// owns the transaction and holds the ingredient's lock.
pub(crate) async fn apply_consumption_in(
    conn: &mut SqliteConnection,
    ingredient: &Ingredient,
    quantity: Decimal,
    policy: NegativeStockPolicy,
    note: Option<&str>,
) -> AppResult<ConsumptionOutcome> {
    shared::validate_quantity(quantity).map_err(|m| AppError::invalid_operand("quantity", m))?;

    let quantity = round_unit(quantity);
    let on_hand = ingredient.quantity_on_hand - quantity;
    let went_negative = on_hand < Decimal::ZERO;
    if went_negative {
        match policy {
            NegativeStockPolicy::Reject => {
                return Err(AppError::InsufficientStock {
                    ingredient: ingredient.key().to_string(),
                    on_hand: ingredient.quantity_on_hand,
                    requested: quantity,
                });
            }
            NegativeStockPolicy::Allow => {
                tracing::warn!(
                    "Consumption drives {} negative: {} - {} = {}",
                    ingredient.key(),
                    ingredient.quantity_on_hand,
                    quantity,
                    on_hand
                );
            }
        }
    }

    sqlx::query("UPDATE ingredients SET quantity_on_hand = ?1, updated_at = ?2 WHERE id = ?3")
        .bind(store(on_hand))
        .bind(Utc::now())
        .bind(ingredient.id)
        .execute(&mut *conn)
        .await?;

    insert_transaction(
        conn,
        ingredient,
        TransactionType::Consumption,
        -quantity,
        ingredient.average_unit_price,
        None,
        None,
        note.map(str::to_string),
    )
    .await?;

    Ok(ConsumptionOutcome {
        key: ingredient.key(),
        consumed: quantity,
        quantity_on_hand: on_hand,
        went_negative,
    })
}

/// Append one row to the transaction log
#[allow(clippy::too_many_arguments)]
async fn insert_transaction(
    conn: &mut SqliteConnection,
    ingredient: &Ingredient,
    transaction_type: TransactionType,
    quantity_delta: Decimal,
    unit_cost: Decimal,
    invoice_number: Option<&str>,
    line_item_id: Option<Uuid>,
    note: Option<String>,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_transactions (
            id, ingredient_id, code, brand, supplier, transaction_type, quantity_delta,
            unit_cost, invoice_number, line_item_id, note, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(ingredient.id)
    .bind(&ingredient.code)
    .bind(&ingredient.brand)
    .bind(&ingredient.supplier)
    .bind(transaction_type.as_str())
    .bind(store(quantity_delta))
    .bind(store(unit_cost))
    .bind(invoice_number)
    .bind(line_item_id)
    .bind(note)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await
    .map_err(|e| AppError::from_insert(e, "transaction for line item"))?;

    Ok(())
}
