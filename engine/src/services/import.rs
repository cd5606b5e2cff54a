//! CSV invoice import
//!
//! One row per line item; header columns repeat on every row of an invoice.
//! Rows are grouped by invoice number in order of first appearance.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::{io::Read, path::Path};

use crate::error::{AppError, AppResult};
use crate::models::{ImportInvoice, ImportInvoiceHeader, ImportLineItem};

#[derive(Debug, Deserialize)]
struct InvoiceCsvRow {
    invoice_number: String,
    supplier: String,
    invoice_date: NaiveDate,
    received_date: Option<NaiveDate>,
    #[serde(with = "rust_decimal::serde::str")]
    total_amount: Decimal,
    #[serde(default)]
    ingredient_code: String,
    #[serde(default)]
    ingredient_name: String,
    #[serde(default)]
    brand: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    quantity_ordered: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    quantity_received: Decimal,
    unit_of_measure: String,
    #[serde(with = "rust_decimal::serde::str")]
    unit_price: Decimal,
    lot_number: Option<String>,
    expiration_date: Option<NaiveDate>,
}

impl InvoiceCsvRow {
    fn header(&self) -> ImportInvoiceHeader {
        ImportInvoiceHeader {
            invoice_number: self.invoice_number.trim().to_string(),
            supplier: self.supplier.trim().to_string(),
            invoice_date: self.invoice_date,
            received_date: self.received_date,
            total_amount: self.total_amount,
        }
    }

    fn into_line(self) -> ImportLineItem {
        ImportLineItem {
            ingredient_code: self.ingredient_code,
            ingredient_name: self.ingredient_name,
            brand: self.brand,
            quantity_ordered: self.quantity_ordered,
            quantity_received: self.quantity_received,
            unit_of_measure: self.unit_of_measure,
            unit_price: self.unit_price,
            lot_number: self.lot_number.filter(|l| !l.trim().is_empty()),
            expiration_date: self.expiration_date,
        }
    }
}

/// Parse invoices from CSV text with a header row
pub fn read_invoices<R: Read>(reader: R) -> AppResult<Vec<ImportInvoice>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut invoices: Vec<ImportInvoice> = Vec::new();
    for (idx, record) in rdr.deserialize::<InvoiceCsvRow>().enumerate() {
        let row = record?;
        let header = row.header();

        match invoices
            .iter_mut()
            .find(|inv| inv.header.invoice_number == header.invoice_number)
        {
            Some(existing) => {
                if !same_header(&existing.header, &header) {
                    return Err(AppError::validation(
                        format!("row {}", idx + 1),
                        format!(
                            "header columns disagree with earlier rows of invoice {}",
                            header.invoice_number
                        ),
                    ));
                }
                existing.lines.push(row.into_line());
            }
            None => invoices.push(ImportInvoice {
                header,
                lines: vec![row.into_line()],
            }),
        }
    }

    tracing::debug!("Parsed {} invoices from CSV", invoices.len());
    Ok(invoices)
}

/// Parse invoices from a CSV file
pub fn read_invoices_file(path: &Path) -> AppResult<Vec<ImportInvoice>> {
    let file = std::fs::File::open(path)?;
    read_invoices(file)
}

fn same_header(a: &ImportInvoiceHeader, b: &ImportInvoiceHeader) -> bool {
    a.supplier == b.supplier
        && a.invoice_date == b.invoice_date
        && a.received_date == b.received_date
        && a.total_amount == b.total_amount
}
