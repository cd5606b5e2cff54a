//! Invoice service: import, lookup, payment status and total-drift audits
//!
//! Drift between an invoice's stored total and its line items is reported,
//! never patched.

use chrono::Utc;
use rust_decimal::Decimal;
use shared::costing::{drift, line_total, round_money, sum_line_totals};
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::store;
use crate::error::{AppError, AppResult};
use crate::models::{
    convert_rows, ConsistencyReport, ImportInvoice, Invoice, InvoiceLineItem, InvoiceRow,
    InvoiceWithLines, LineItemRow, PaymentStatus, ReconciliationStatus, INVOICE_COLUMNS,
    LINE_ITEM_COLUMNS,
};

/// Invoice service for importing and auditing supplier invoices
#[derive(Clone)]
pub struct InvoiceService {
    db: SqlitePool,
    writer: SqlitePool,
    drift_tolerance: Decimal,
}

impl InvoiceService {
    /// Create a new InvoiceService instance
    pub fn new(db: SqlitePool, writer: SqlitePool, drift_tolerance: Decimal) -> Self {
        Self {
            db,
            writer,
            drift_tolerance,
        }
    }

    /// Store an imported invoice in the pending state
    pub async fn import_invoice(&self, input: ImportInvoice) -> AppResult<InvoiceWithLines> {
        shared::validate_import(&input)
            .map_err(|(field, message)| AppError::validation(field, message))?;

        let header = &input.header;
        let invoice_id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.writer.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, supplier, invoice_date, received_date, total_amount,
                payment_status, status, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(invoice_id)
        .bind(header.invoice_number.trim())
        .bind(header.supplier.trim())
        .bind(header.invoice_date)
        .bind(header.received_date)
        .bind(store(round_money(header.total_amount)))
        .bind(PaymentStatus::Unpaid.as_str())
        .bind(ReconciliationStatus::Pending.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_insert(e, format!("invoice {}", header.invoice_number)))?;

        for (idx, line) in input.lines.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO invoice_line_items (
                    id, invoice_id, line_number, ingredient_code, ingredient_name, brand,
                    quantity_ordered, quantity_received, unit_of_measure, unit_price, total_price,
                    lot_number, expiration_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(invoice_id)
            .bind(idx as i64 + 1)
            .bind(line.ingredient_code.trim())
            .bind(line.ingredient_name.trim())
            .bind(line.brand.trim())
            .bind(line.quantity_ordered.map(store))
            .bind(store(line.quantity_received))
            .bind(line.unit_of_measure.trim())
            .bind(store(line.unit_price))
            .bind(store(line_total(line.quantity_received, line.unit_price)))
            .bind(&line.lot_number)
            .bind(line.expiration_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            "Imported invoice {} from {} with {} line items",
            header.invoice_number,
            header.supplier,
            input.lines.len()
        );

        let imported = self.get_invoice(&header.invoice_number).await?;
        let report = self.report_for(&imported);
        if !report.within_tolerance {
            tracing::warn!(
                "Imported invoice {} drifts by {} from its line items",
                report.invoice_number,
                report.difference
            );
        }
        Ok(imported)
    }

    /// Get an invoice with its line items
    pub async fn get_invoice(&self, invoice_number: &str) -> AppResult<InvoiceWithLines> {
        let mut conn = self.db.acquire().await?;
        let invoice = fetch_invoice(&mut conn, invoice_number).await?;
        let line_items = fetch_line_items(&mut conn, invoice.id, false).await?;
        Ok(InvoiceWithLines {
            invoice,
            line_items,
        })
    }

    /// List invoice headers, newest invoice date first
    pub async fn list_invoices(
        &self,
        status: Option<ReconciliationStatus>,
    ) -> AppResult<Vec<Invoice>> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {}
            FROM invoices
            WHERE ?1 IS NULL OR status = ?1
            ORDER BY invoice_date DESC, invoice_number
            "#,
            INVOICE_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.db)
        .await?;

        convert_rows(rows)
    }

    /// Delete an invoice and its line items. Logged transactions stay.
    pub async fn delete_invoice(&self, invoice_number: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM invoices WHERE invoice_number = ?1")
            .bind(invoice_number)
            .execute(&self.writer)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::InvoiceNotFound(invoice_number.to_string()));
        }

        tracing::info!("Deleted invoice {}", invoice_number);
        Ok(())
    }

    /// Record payment progress on an invoice
    pub async fn set_payment_status(
        &self,
        invoice_number: &str,
        payment_status: PaymentStatus,
    ) -> AppResult<Invoice> {
        let mut tx = self.writer.begin().await?;
        let result =
            sqlx::query("UPDATE invoices SET payment_status = ?1 WHERE invoice_number = ?2")
                .bind(payment_status.as_str())
                .bind(invoice_number)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::InvoiceNotFound(invoice_number.to_string()));
        }

        let invoice = fetch_invoice(&mut tx, invoice_number).await?;
        tx.commit().await?;

        tracing::info!("Invoice {} marked {}", invoice_number, payment_status.as_str());
        Ok(invoice)
    }

    /// Compare an invoice's stored total with the sum of its line items
    pub async fn audit_invoice(&self, invoice_number: &str) -> AppResult<ConsistencyReport> {
        let invoice = self.get_invoice(invoice_number).await?;
        Ok(self.report_for(&invoice))
    }

    /// Audit every invoice; returns only those outside tolerance
    pub async fn audit_all_invoices(&self) -> AppResult<Vec<ConsistencyReport>> {
        let mut drifted = Vec::new();
        for invoice in self.list_invoices(None).await? {
            let report = self.audit_invoice(&invoice.invoice_number).await?;
            if !report.within_tolerance {
                tracing::warn!(
                    "Invoice {} total {} differs from line sum {} by {}",
                    report.invoice_number,
                    report.stored_total,
                    report.line_sum,
                    report.difference
                );
                drifted.push(report);
            }
        }
        Ok(drifted)
    }

    /// Fail with `ConsistencyDrift` if the invoice total disagrees with its lines
    pub async fn ensure_consistent(&self, invoice_number: &str) -> AppResult<ConsistencyReport> {
        let report = self.audit_invoice(invoice_number).await?;
        if !report.within_tolerance {
            return Err(AppError::ConsistencyDrift {
                invoice_number: report.invoice_number,
                stored_total: report.stored_total,
                line_sum: report.line_sum,
                difference: report.difference,
            });
        }
        Ok(report)
    }

    fn report_for(&self, invoice: &InvoiceWithLines) -> ConsistencyReport {
        let stored_total = invoice.invoice.total_amount;
        let line_sum = sum_line_totals(invoice.line_items.iter().map(|l| &l.total_price));
        let gap = drift(stored_total, line_sum, self.drift_tolerance);

        ConsistencyReport {
            invoice_number: invoice.invoice.invoice_number.clone(),
            stored_total,
            line_sum,
            difference: line_sum - stored_total,
            within_tolerance: gap.is_none(),
        }
    }
}

// ============================================================================
// Connection-level reads shared with reconciliation
// ============================================================================

pub(crate) async fn fetch_invoice(
    conn: &mut SqliteConnection,
    invoice_number: &str,
) -> AppResult<Invoice> {
    let row = sqlx::query_as::<_, InvoiceRow>(&format!(
        "SELECT {} FROM invoices WHERE invoice_number = ?1",
        INVOICE_COLUMNS
    ))
    .bind(invoice_number)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::InvoiceNotFound(invoice_number.to_string()))?;

    Invoice::try_from(row)
}

/// Line items of an invoice in line order, optionally only unreconciled ones
pub(crate) async fn fetch_line_items(
    conn: &mut SqliteConnection,
    invoice_id: Uuid,
    only_unreconciled: bool,
) -> AppResult<Vec<InvoiceLineItem>> {
    let rows = sqlx::query_as::<_, LineItemRow>(&format!(
        r#"
        SELECT {}
        FROM invoice_line_items
        WHERE invoice_id = ?1 AND (reconciled = 0 OR NOT ?2)
        ORDER BY line_number
        "#,
        LINE_ITEM_COLUMNS
    ))
    .bind(invoice_id)
    .bind(only_unreconciled)
    .fetch_all(&mut *conn)
    .await?;

    convert_rows(rows)
}
