//! Validation utilities for imported invoices, catalog entries and tenants

use rust_decimal::Decimal;

use crate::models::{ImportInvoice, ImportLineItem, NewIngredient};

// ============================================================================
// Numeric Validations
// ============================================================================

/// Validate a quantity moving into or out of the ledger
pub fn validate_quantity(quantity: Decimal) -> Result<(), &'static str> {
    if quantity < Decimal::ZERO {
        return Err("Quantity cannot be negative");
    }
    Ok(())
}

/// Validate a per-unit price
pub fn validate_unit_price(price: Decimal) -> Result<(), &'static str> {
    if price < Decimal::ZERO {
        return Err("Unit price cannot be negative");
    }
    Ok(())
}

/// Validate a composite batch yield
pub fn validate_batch_output(size: Decimal) -> Result<(), &'static str> {
    if size <= Decimal::ZERO {
        return Err("Batch output size must be positive");
    }
    Ok(())
}

// ============================================================================
// Catalog Validations
// ============================================================================

/// Validate a unit-of-measure label
pub fn validate_unit(unit: &str) -> Result<(), &'static str> {
    if unit.trim().is_empty() {
        return Err("Unit of measure cannot be empty");
    }
    Ok(())
}

/// Whether two unit-of-measure labels name the same unit (case and
/// surrounding whitespace are ignored)
pub fn units_match(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Validate a catalog entry before it is registered
pub fn validate_new_ingredient(input: &NewIngredient) -> Result<(), (&'static str, &'static str)> {
    if input.code.trim().is_empty() {
        return Err(("code", "Ingredient code cannot be empty"));
    }
    if input.name.trim().is_empty() {
        return Err(("name", "Ingredient name cannot be empty"));
    }
    if input.supplier.trim().is_empty() {
        return Err(("supplier", "Supplier cannot be empty"));
    }
    validate_unit(&input.unit_of_measure).map_err(|m| ("unit_of_measure", m))?;
    if let Some(per_case) = input.units_per_case {
        if per_case <= Decimal::ZERO {
            return Err(("units_per_case", "Units per case must be positive"));
        }
    }
    if let Some(size) = input.batch_output_size {
        validate_batch_output(size).map_err(|m| ("batch_output_size", m))?;
    }
    Ok(())
}

// ============================================================================
// Invoice Validations
// ============================================================================

/// Validate an invoice line as received from the import collaborator.
///
/// A negative received quantity (credit line) is accepted here; the ledger
/// refuses it when the line is reconciled.
pub fn validate_line_item(line: &ImportLineItem) -> Result<(), &'static str> {
    if line.ingredient_code.trim().is_empty() && line.ingredient_name.trim().is_empty() {
        return Err("Line item needs an ingredient code or name");
    }
    validate_unit(&line.unit_of_measure)?;
    if let Some(ordered) = line.quantity_ordered {
        validate_quantity(ordered)?;
    }
    validate_unit_price(line.unit_price)?;
    Ok(())
}

/// Validate a complete invoice import; returns the offending field on error
pub fn validate_import(invoice: &ImportInvoice) -> Result<(), (String, &'static str)> {
    let header = &invoice.header;
    if header.invoice_number.trim().is_empty() {
        return Err(("invoice_number".to_string(), "Invoice number cannot be empty"));
    }
    if header.supplier.trim().is_empty() {
        return Err(("supplier".to_string(), "Supplier cannot be empty"));
    }
    if header.total_amount < Decimal::ZERO {
        return Err(("total_amount".to_string(), "Invoice total cannot be negative"));
    }
    if invoice.lines.is_empty() {
        return Err(("lines".to_string(), "Invoice must have at least one line item"));
    }
    if let (Some(received), invoiced) = (header.received_date, header.invoice_date) {
        if received < invoiced {
            return Err(("received_date".to_string(), "Received date precedes invoice date"));
        }
    }
    for (idx, line) in invoice.lines.iter().enumerate() {
        validate_line_item(line).map_err(|m| (format!("lines[{}]", idx), m))?;
    }
    Ok(())
}

// ============================================================================
// Tenant Validations
// ============================================================================

/// Validate a tenant id used to name its database file (1-64 of `[A-Za-z0-9_-]`)
pub fn validate_tenant_id(tenant: &str) -> Result<(), &'static str> {
    if tenant.is_empty() || tenant.len() > 64 {
        return Err("Tenant id must be 1-64 characters");
    }
    if !tenant
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err("Tenant id may only contain letters, digits, '_' and '-'");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportInvoiceHeader;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(code: &str, qty: &str, price: &str) -> ImportLineItem {
        ImportLineItem {
            ingredient_code: code.to_string(),
            ingredient_name: "Flour".to_string(),
            brand: String::new(),
            quantity_ordered: None,
            quantity_received: dec(qty),
            unit_of_measure: "lb".to_string(),
            unit_price: dec(price),
            lot_number: None,
            expiration_date: None,
        }
    }

    fn invoice(lines: Vec<ImportLineItem>) -> ImportInvoice {
        ImportInvoice {
            header: ImportInvoiceHeader {
                invoice_number: "INV-1".to_string(),
                supplier: "Sysco".to_string(),
                invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                received_date: NaiveDate::from_ymd_opt(2024, 3, 2),
                total_amount: dec("20.00"),
            },
            lines,
        }
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(dec("0")).is_ok());
        assert!(validate_quantity(dec("12.5")).is_ok());
        assert!(validate_quantity(dec("-0.01")).is_err());
    }

    #[test]
    fn test_units_match() {
        assert!(units_match("lb", "LB"));
        assert!(units_match(" oz", "oz "));
        assert!(!units_match("lb", "kg"));
    }

    #[test]
    fn test_validate_import_valid() {
        assert!(validate_import(&invoice(vec![line("FL-01", "10", "2.00")])).is_ok());
    }

    #[test]
    fn test_validate_import_rejects_empty_lines() {
        let err = validate_import(&invoice(vec![])).unwrap_err();
        assert_eq!(err.0, "lines");
    }

    #[test]
    fn test_validate_import_reports_line_index() {
        let err = validate_import(&invoice(vec![
            line("FL-01", "10", "2.00"),
            line("FL-02", "1", "-2.00"),
        ]))
        .unwrap_err();
        assert_eq!(err.0, "lines[1]");
    }

    #[test]
    fn test_validate_import_accepts_credit_line() {
        assert!(validate_import(&invoice(vec![line("FL-01", "-2", "2.00")])).is_ok());
    }

    #[test]
    fn test_validate_import_received_before_invoice() {
        let mut inv = invoice(vec![line("FL-01", "10", "2.00")]);
        inv.header.received_date = NaiveDate::from_ymd_opt(2024, 2, 28);
        assert_eq!(validate_import(&inv).unwrap_err().0, "received_date");
    }

    #[test]
    fn test_validate_tenant_id() {
        assert!(validate_tenant_id("bistro_42").is_ok());
        assert!(validate_tenant_id("north-side").is_ok());
        assert!(validate_tenant_id("").is_err());
        assert!(validate_tenant_id("../etc").is_err());
        assert!(validate_tenant_id(&"a".repeat(65)).is_err());
    }
}
