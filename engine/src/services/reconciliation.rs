//! Invoice reconciliation engine
//!
//! Applies each unreconciled line item of an invoice to the ingredient ledger.
//! Every line item commits on its own: a line that cannot be matched or
//! applied becomes a warning and stays pending for a later run, while the
//! lines before and after it go through.
//!
//! Status machine: `pending` -> `partially_reconciled` -> `fully_reconciled`.
//! A fully reconciled invoice is final and is never re-applied.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::locks::{ingredient_key, invoice_key, KeyedLocks};
use crate::models::{
    Ingredient, IngredientKey, Invoice, InvoiceLineItem, ReconciliationResult,
    ReconciliationStatus, ReconciliationWarning, WarningKind,
};
use crate::services::invoice::{fetch_invoice, fetch_line_items};
use crate::services::ledger::{
    apply_purchase_in, fetch_active_by_name, fetch_by_id, fetch_by_key, PurchaseEntry,
};

/// Reconciliation service for applying invoices to the ledger
#[derive(Clone)]
pub struct ReconciliationService {
    db: SqlitePool,
    writer: SqlitePool,
    locks: Arc<KeyedLocks>,
}

/// What happened to one line item
enum LineOutcome {
    Applied,
    Skipped(WarningKind),
}

impl ReconciliationService {
    /// Create a new ReconciliationService instance
    pub fn new(db: SqlitePool, writer: SqlitePool, locks: Arc<KeyedLocks>) -> Self {
        Self { db, writer, locks }
    }

    /// Apply every unreconciled line item of `invoice_number` to the ledger.
    ///
    /// Fails before touching anything when the invoice is missing or already
    /// fully reconciled. Per-item problems are returned as warnings.
    pub async fn reconcile_invoice(
        &self,
        invoice_number: &str,
        reconciled_by: Option<&str>,
    ) -> AppResult<ReconciliationResult> {
        let _invoice_guard = self.locks.acquire(&invoice_key(invoice_number)).await;

        let (invoice, pending) = {
            let mut conn = self.db.acquire().await?;
            let invoice = fetch_invoice(&mut conn, invoice_number).await?;
            if invoice.status.is_final() {
                return Err(AppError::AlreadyReconciled(invoice_number.to_string()));
            }
            let pending = fetch_line_items(&mut conn, invoice.id, true).await?;
            (invoice, pending)
        };

        tracing::info!(
            "Reconciling invoice {} from {}: {} pending line items",
            invoice.invoice_number,
            invoice.supplier,
            pending.len()
        );

        let attempted = pending.len();
        let mut applied = 0;
        let mut warnings = Vec::new();

        for item in &pending {
            match self.reconcile_line(&invoice, item).await? {
                LineOutcome::Applied => applied += 1,
                LineOutcome::Skipped(kind) => {
                    tracing::warn!(
                        "Invoice {} line {} ({} / {}) skipped: {:?}",
                        invoice.invoice_number,
                        item.line_number,
                        item.ingredient_code,
                        item.ingredient_name,
                        kind
                    );
                    warnings.push(ReconciliationWarning {
                        line_item_id: item.id,
                        line_number: item.line_number,
                        ingredient_code: item.ingredient_code.clone(),
                        ingredient_name: item.ingredient_name.clone(),
                        kind,
                    });
                }
            }
        }

        let (status, reconciled_at) = self.settle_status(&invoice, reconciled_by).await?;

        tracing::info!(
            "Invoice {} now {}: {} of {} line items applied, {} warnings",
            invoice.invoice_number,
            status,
            applied,
            attempted,
            warnings.len()
        );

        Ok(ReconciliationResult {
            invoice_number: invoice.invoice_number,
            attempted,
            applied,
            warnings,
            status,
            reconciled_at,
        })
    }

    /// Resolve, validate and apply one line item in its own transaction
    async fn reconcile_line(
        &self,
        invoice: &Invoice,
        item: &InvoiceLineItem,
    ) -> AppResult<LineOutcome> {
        let ingredient = {
            let mut conn = self.db.acquire().await?;
            match resolve_ingredient(&mut conn, invoice, item).await? {
                Some(ingredient) => ingredient,
                None => return Ok(LineOutcome::Skipped(WarningKind::UnmatchedIngredient)),
            }
        };

        if !shared::units_match(&ingredient.unit_of_measure, &item.unit_of_measure) {
            return Ok(LineOutcome::Skipped(WarningKind::UnitMismatch {
                expected: ingredient.unit_of_measure,
                found: item.unit_of_measure.clone(),
            }));
        }

        if item.is_short_shipped() {
            tracing::info!(
                "Invoice {} line {} short-shipped: ordered {:?}, received {}",
                invoice.invoice_number,
                item.line_number,
                item.quantity_ordered,
                item.quantity_received
            );
        }

        let _guard = self.locks.acquire(&ingredient_key(&ingredient.id)).await;
        let mut tx = self.writer.begin().await?;

        // Re-read under the lock; the row may have moved since resolution
        let ingredient = fetch_by_id(&mut tx, ingredient.id).await?;
        let entry = PurchaseEntry {
            quantity: item.quantity_received,
            unit_price: item.unit_price,
            unit_of_measure: &item.unit_of_measure,
            invoice_number: Some(&invoice.invoice_number),
            line_item_id: Some(item.id),
            note: Some(format!(
                "invoice {} line {}",
                invoice.invoice_number, item.line_number
            )),
        };
        match apply_purchase_in(&mut tx, &ingredient, entry).await {
            Ok(_) => {}
            Err(AppError::InvalidOperand { field, message }) => {
                return Ok(LineOutcome::Skipped(WarningKind::InvalidOperand {
                    message: format!("{}: {}", field, message),
                }));
            }
            Err(e) => return Err(e),
        }

        let now = Utc::now();
        let marked = sqlx::query(
            "UPDATE invoice_line_items SET reconciled = 1, reconciled_at = ?1 WHERE id = ?2 AND reconciled = 0",
        )
        .bind(now)
        .bind(item.id)
        .execute(&mut *tx)
        .await?;
        if marked.rows_affected() != 1 {
            return Err(AppError::InternalError(anyhow::anyhow!(
                "line item {} of invoice {} was reconciled concurrently",
                item.line_number,
                invoice.invoice_number
            )));
        }

        sqlx::query(
            "UPDATE ingredients SET lot_number = ?1, expiration_date = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(&item.lot_number)
        .bind(item.expiration_date)
        .bind(now)
        .bind(ingredient.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(LineOutcome::Applied)
    }

    /// Derive the invoice status from what is still pending and store it
    async fn settle_status(
        &self,
        invoice: &Invoice,
        reconciled_by: Option<&str>,
    ) -> AppResult<(ReconciliationStatus, Option<DateTime<Utc>>)> {
        let mut tx = self.writer.begin().await?;
        let remaining: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM invoice_line_items WHERE invoice_id = ?1 AND reconciled = 0",
        )
        .bind(invoice.id)
        .fetch_one(&mut *tx)
        .await?;

        if remaining == 0 {
            let now = Utc::now();
            sqlx::query(
                r#"
                UPDATE invoices
                SET status = ?1, reconciled_at = ?2, reconciled_by = ?3
                WHERE id = ?4
                "#,
            )
            .bind(ReconciliationStatus::FullyReconciled.as_str())
            .bind(now)
            .bind(reconciled_by)
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            return Ok((ReconciliationStatus::FullyReconciled, Some(now)));
        }

        sqlx::query("UPDATE invoices SET status = ?1 WHERE id = ?2")
            .bind(ReconciliationStatus::PartiallyReconciled.as_str())
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((ReconciliationStatus::PartiallyReconciled, None))
    }
}

/// Find the ledger row for a line item: exact code first, then a unique
/// active name match for the same brand and supplier
async fn resolve_ingredient(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    item: &InvoiceLineItem,
) -> AppResult<Option<Ingredient>> {
    if !item.ingredient_code.is_empty() {
        let key = IngredientKey::new(&item.ingredient_code, &item.brand, &invoice.supplier);
        if let Some(ingredient) = fetch_by_key(conn, &key).await? {
            if ingredient.active {
                return Ok(Some(ingredient));
            }
            tracing::debug!("Ingredient {} is inactive, trying name match", key);
        }
    }

    if item.ingredient_name.is_empty() {
        return Ok(None);
    }

    let mut candidates =
        fetch_active_by_name(conn, &item.ingredient_name, &item.brand, &invoice.supplier).await?;
    if candidates.len() > 1 {
        tracing::debug!(
            "Name {} matches several ingredients of {}; leaving unmatched",
            item.ingredient_name,
            invoice.supplier
        );
        return Ok(None);
    }
    Ok(candidates.pop())
}
