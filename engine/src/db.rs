//! Per-tenant SQLite storage
//!
//! Every organization keeps its ledger in its own database file. A
//! [`TenantStore`] opens each file once, runs the embedded migrations and
//! hands out a [`Tenant`] handle (pools plus the tenant's lock table) that the
//! services borrow for each unit of work.
//!
//! Each tenant gets two pools over the same file: `db` for reads and a
//! one-connection `writer` that every write transaction goes through, so a
//! deferred `BEGIN` never upgrades against a lock held by another writer.

use dashmap::DashMap;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::{str::FromStr, sync::Arc, time::Duration};

use crate::config::{Config, CostingConfig};
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::services::{InvoiceService, LedgerService, ReconciliationService, RecipeService};

/// Storage handle for one tenant
#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub db: SqlitePool,
    pub writer: SqlitePool,
    pub locks: Arc<KeyedLocks>,
    pub costing: CostingConfig,
}

impl Tenant {
    pub fn ledger(&self) -> LedgerService {
        LedgerService::new(
            self.db.clone(),
            self.writer.clone(),
            self.locks.clone(),
            self.costing.negative_stock,
        )
    }

    pub fn recipes(&self) -> RecipeService {
        RecipeService::new(
            self.db.clone(),
            self.writer.clone(),
            self.locks.clone(),
            self.costing.clone(),
        )
    }

    pub fn invoices(&self) -> InvoiceService {
        InvoiceService::new(
            self.db.clone(),
            self.writer.clone(),
            self.costing.drift_tolerance,
        )
    }

    pub fn reconciliation(&self) -> ReconciliationService {
        ReconciliationService::new(self.db.clone(), self.writer.clone(), self.locks.clone())
    }

    /// Close both pools; pending connections finish first
    pub async fn close(&self) {
        self.writer.close().await;
        self.db.close().await;
    }
}

/// Opens and caches one [`Tenant`] per organization
pub struct TenantStore {
    config: Config,
    tenants: DashMap<String, Tenant>,
}

impl TenantStore {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            tenants: DashMap::new(),
        }
    }

    /// Get the handle for `tenant_id`, creating its database on first use
    pub async fn open(&self, tenant_id: &str) -> AppResult<Tenant> {
        shared::validate_tenant_id(tenant_id).map_err(|m| AppError::validation("tenant", m))?;

        if let Some(tenant) = self.tenants.get(tenant_id) {
            return Ok(tenant.value().clone());
        }

        self.config.validate()?;
        let (db, writer) = connect(&self.config, tenant_id).await?;
        let tenant = Tenant {
            id: tenant_id.to_string(),
            db,
            writer,
            locks: Arc::new(KeyedLocks::new()),
            costing: self.config.costing.clone(),
        };

        // Another task may have opened the same tenant meanwhile; keep the first
        let entry = self
            .tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| tenant.clone())
            .value()
            .clone();
        if !Arc::ptr_eq(&entry.locks, &tenant.locks) {
            tenant.close().await;
        }
        Ok(entry)
    }

    /// Close every open tenant pool
    pub async fn close_all(&self) {
        let tenants: Vec<Tenant> = self.tenants.iter().map(|t| t.value().clone()).collect();
        for tenant in tenants {
            tenant.close().await;
        }
        self.tenants.clear();
    }
}

/// Open the tenant's database file and bring its schema up to date.
/// Returns the read pool and the single-connection writer pool.
pub async fn connect(config: &Config, tenant_id: &str) -> AppResult<(SqlitePool, SqlitePool)> {
    std::fs::create_dir_all(&config.database.data_dir)?;
    let path = config.database.data_dir.join(format!("{}.db", tenant_id));

    tracing::info!("Opening tenant database {}", path.display());

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(config.database.busy_timeout_secs));

    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options.clone())
        .await?;

    sqlx::migrate!("./migrations").run(&writer).await?;
    tracing::debug!("Migrations completed for tenant {}", tenant_id);

    let db = SqlitePoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;

    Ok((db, writer))
}

/// Parse a decimal stored as TEXT
pub fn decimal(column: &'static str, raw: &str) -> AppResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| AppError::CorruptRow {
        column,
        value: raw.to_string(),
    })
}

/// Parse an optional decimal stored as TEXT
pub fn opt_decimal(column: &'static str, raw: Option<&str>) -> AppResult<Option<Decimal>> {
    raw.map(|r| decimal(column, r)).transpose()
}

/// Parse a stored enum label
pub fn label<T>(column: &'static str, raw: &str) -> AppResult<T>
where
    T: FromStr,
{
    raw.parse::<T>().map_err(|_| AppError::CorruptRow {
        column,
        value: raw.to_string(),
    })
}

/// Canonical TEXT form of a decimal for storage
pub fn store(value: Decimal) -> String {
    value.normalize().to_string()
}
