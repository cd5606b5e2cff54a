//! Shared fixtures for the engine integration tests
#![allow(dead_code)]

use chrono::NaiveDate;
use costing_engine::config::Config;
use costing_engine::models::{
    ImportInvoice, ImportInvoiceHeader, ImportLineItem, Ingredient, IngredientKey, NewIngredient,
};
use costing_engine::{Tenant, TenantStore};
use rust_decimal::Decimal;
use std::str::FromStr;
use tempfile::TempDir;

pub const SUPPLIER: &str = "Sysco";

// Helper to create Decimal from string
pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// A tenant backed by a database file in its own temporary directory
pub struct TestTenant {
    pub tenant: Tenant,
    pub store: TenantStore,
    _dir: TempDir,
}

impl std::ops::Deref for TestTenant {
    type Target = Tenant;

    fn deref(&self) -> &Tenant {
        &self.tenant
    }
}

pub async fn tenant() -> TestTenant {
    tenant_with(|_| {}).await
}

pub async fn tenant_with(adjust: impl FnOnce(&mut Config)) -> TestTenant {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_data_dir(dir.path());
    adjust(&mut config);
    let store = TenantStore::new(config);
    let tenant = store.open("bistro").await.unwrap();
    TestTenant {
        tenant,
        store,
        _dir: dir,
    }
}

pub fn key(code: &str) -> IngredientKey {
    IngredientKey::new(code, "", SUPPLIER)
}

pub fn new_ingredient(code: &str, name: &str, unit: &str) -> NewIngredient {
    NewIngredient {
        code: code.to_string(),
        name: name.to_string(),
        brand: String::new(),
        supplier: SUPPLIER.to_string(),
        unit_of_measure: unit.to_string(),
        units_per_case: None,
        batch_output_size: None,
    }
}

pub async fn register(tenant: &Tenant, code: &str, name: &str, unit: &str) -> Ingredient {
    tenant
        .ledger()
        .register_ingredient(new_ingredient(code, name, unit))
        .await
        .unwrap()
}

pub fn line(code: &str, name: &str, qty: &str, unit: &str, price: &str) -> ImportLineItem {
    ImportLineItem {
        ingredient_code: code.to_string(),
        ingredient_name: name.to_string(),
        brand: String::new(),
        quantity_ordered: None,
        quantity_received: dec(qty),
        unit_of_measure: unit.to_string(),
        unit_price: dec(price),
        lot_number: None,
        expiration_date: None,
    }
}

pub fn invoice(number: &str, total: &str, lines: Vec<ImportLineItem>) -> ImportInvoice {
    ImportInvoice {
        header: ImportInvoiceHeader {
            invoice_number: number.to_string(),
            supplier: SUPPLIER.to_string(),
            invoice_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            received_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            total_amount: dec(total),
        },
        lines,
    }
}
