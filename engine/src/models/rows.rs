//! Raw SQLite rows and their conversion into typed records
//!
//! Decimals and enum labels are stored as TEXT; a row that fails to parse is
//! reported as `CorruptRow` rather than silently defaulted.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::{decimal, label, opt_decimal};
use crate::error::AppError;
use shared::models::{Ingredient, InventoryTransaction, Invoice, InvoiceLineItem};

pub const INGREDIENT_COLUMNS: &str = "id, code, name, brand, supplier, unit_of_measure, \
     quantity_on_hand, last_unit_price, average_unit_price, units_per_case, active, \
     is_composite, batch_output_size, lot_number, expiration_date, created_at, updated_at";

pub const INVOICE_COLUMNS: &str = "id, invoice_number, supplier, invoice_date, received_date, \
     total_amount, payment_status, status, reconciled_at, reconciled_by, created_at";

pub const LINE_ITEM_COLUMNS: &str = "id, invoice_id, line_number, ingredient_code, \
     ingredient_name, brand, quantity_ordered, quantity_received, unit_of_measure, unit_price, \
     total_price, lot_number, expiration_date, reconciled, reconciled_at";

pub const TRANSACTION_COLUMNS: &str = "id, ingredient_id, code, brand, supplier, \
     transaction_type, quantity_delta, unit_cost, invoice_number, line_item_id, note, created_at";

#[derive(Debug, FromRow)]
pub struct IngredientRow {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub brand: String,
    pub supplier: String,
    pub unit_of_measure: String,
    pub quantity_on_hand: String,
    pub last_unit_price: String,
    pub average_unit_price: String,
    pub units_per_case: String,
    pub active: bool,
    pub is_composite: bool,
    pub batch_output_size: Option<String>,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<IngredientRow> for Ingredient {
    type Error = AppError;

    fn try_from(r: IngredientRow) -> Result<Self, Self::Error> {
        Ok(Ingredient {
            id: r.id,
            quantity_on_hand: decimal("quantity_on_hand", &r.quantity_on_hand)?,
            last_unit_price: decimal("last_unit_price", &r.last_unit_price)?,
            average_unit_price: decimal("average_unit_price", &r.average_unit_price)?,
            units_per_case: decimal("units_per_case", &r.units_per_case)?,
            batch_output_size: opt_decimal("batch_output_size", r.batch_output_size.as_deref())?,
            code: r.code,
            name: r.name,
            brand: r.brand,
            supplier: r.supplier,
            unit_of_measure: r.unit_of_measure,
            active: r.active,
            is_composite: r.is_composite,
            lot_number: r.lot_number,
            expiration_date: r.expiration_date,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct InvoiceRow {
    pub id: Uuid,
    pub invoice_number: String,
    pub supplier: String,
    pub invoice_date: NaiveDate,
    pub received_date: Option<NaiveDate>,
    pub total_amount: String,
    pub payment_status: String,
    pub status: String,
    pub reconciled_at: Option<DateTime<Utc>>,
    pub reconciled_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = AppError;

    fn try_from(r: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: r.id,
            total_amount: decimal("total_amount", &r.total_amount)?,
            payment_status: label("payment_status", &r.payment_status)?,
            status: label("status", &r.status)?,
            invoice_number: r.invoice_number,
            supplier: r.supplier,
            invoice_date: r.invoice_date,
            received_date: r.received_date,
            reconciled_at: r.reconciled_at,
            reconciled_by: r.reconciled_by,
            created_at: r.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct LineItemRow {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub line_number: i64,
    pub ingredient_code: String,
    pub ingredient_name: String,
    pub brand: String,
    pub quantity_ordered: Option<String>,
    pub quantity_received: String,
    pub unit_of_measure: String,
    pub unit_price: String,
    pub total_price: String,
    pub lot_number: Option<String>,
    pub expiration_date: Option<NaiveDate>,
    pub reconciled: bool,
    pub reconciled_at: Option<DateTime<Utc>>,
}

impl TryFrom<LineItemRow> for InvoiceLineItem {
    type Error = AppError;

    fn try_from(r: LineItemRow) -> Result<Self, Self::Error> {
        Ok(InvoiceLineItem {
            id: r.id,
            invoice_id: r.invoice_id,
            line_number: r.line_number,
            quantity_ordered: opt_decimal("quantity_ordered", r.quantity_ordered.as_deref())?,
            quantity_received: decimal("quantity_received", &r.quantity_received)?,
            unit_price: decimal("unit_price", &r.unit_price)?,
            total_price: decimal("total_price", &r.total_price)?,
            ingredient_code: r.ingredient_code,
            ingredient_name: r.ingredient_name,
            brand: r.brand,
            unit_of_measure: r.unit_of_measure,
            lot_number: r.lot_number,
            expiration_date: r.expiration_date,
            reconciled: r.reconciled,
            reconciled_at: r.reconciled_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct TransactionRow {
    pub id: Uuid,
    pub ingredient_id: Uuid,
    pub code: String,
    pub brand: String,
    pub supplier: String,
    pub transaction_type: String,
    pub quantity_delta: String,
    pub unit_cost: String,
    pub invoice_number: Option<String>,
    pub line_item_id: Option<Uuid>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for InventoryTransaction {
    type Error = AppError;

    fn try_from(r: TransactionRow) -> Result<Self, Self::Error> {
        Ok(InventoryTransaction {
            id: r.id,
            ingredient_id: r.ingredient_id,
            transaction_type: label("transaction_type", &r.transaction_type)?,
            quantity_delta: decimal("quantity_delta", &r.quantity_delta)?,
            unit_cost: decimal("unit_cost", &r.unit_cost)?,
            code: r.code,
            brand: r.brand,
            supplier: r.supplier,
            invoice_number: r.invoice_number,
            line_item_id: r.line_item_id,
            note: r.note,
            created_at: r.created_at,
        })
    }
}

/// Convert a batch of rows, failing on the first corrupt one
pub fn convert_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, AppError>
where
    T: TryFrom<R, Error = AppError>,
{
    rows.into_iter().map(T::try_from).collect()
}
