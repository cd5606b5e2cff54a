//! Restaurant Costing Engine - operator CLI
//!
//! Imports supplier invoices, runs reconciliation and inspects the
//! per-tenant ingredient ledger.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use costing_engine::error::ErrorResponse;
use costing_engine::models::{IngredientKey, TransactionFilter};
use costing_engine::services::import::read_invoices_file;
use costing_engine::{AppError, AppResult, Config, TenantStore};
use shared::TimeRange;

#[derive(Parser)]
#[command(name = "costing", version, about = "Ingredient costing and invoice reconciliation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import invoices from a CSV file (one row per line item)
    Import { tenant: String, file: PathBuf },

    /// Apply an invoice's pending line items to the ledger
    Reconcile {
        tenant: String,
        invoice: String,
        /// Actor recorded when the invoice becomes fully reconciled
        #[arg(long)]
        by: Option<String>,
    },

    /// Compare invoice totals with their line items
    Audit {
        tenant: String,
        /// Audit a single invoice instead of listing every drifting one
        invoice: Option<String>,
    },

    /// Print the ingredient ledger
    Ledger {
        tenant: String,
        #[arg(long)]
        include_inactive: bool,
    },

    /// Print the transaction log, oldest first
    Transactions {
        tenant: String,
        #[arg(long)]
        invoice: Option<String>,
        /// Only movements of this ingredient code (requires --supplier)
        #[arg(long, requires = "supplier")]
        code: Option<String>,
        #[arg(long, default_value = "")]
        brand: String,
        #[arg(long)]
        supplier: Option<String>,
        /// RFC 3339 lower bound, inclusive
        #[arg(long)]
        since: Option<DateTime<Utc>>,
        /// RFC 3339 upper bound, exclusive
        #[arg(long)]
        until: Option<DateTime<Utc>>,
        /// Write CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },

    /// Check every ingredient's on-hand against its transaction log
    Verify { tenant: String },
}

/// One row of the `ledger` report
#[derive(Serialize)]
struct LedgerLine {
    code: String,
    brand: String,
    supplier: String,
    name: String,
    unit_of_measure: String,
    quantity_on_hand: Decimal,
    average_unit_price: Decimal,
    last_unit_price: Decimal,
    stock_value: Decimal,
    case_cost: Decimal,
    active: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "costing_engine=info,costing=info,sqlx=warn".into());
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    tracing::debug!("Environment: {}", config.environment);

    let cli = Cli::parse();
    let store = TenantStore::new(config);

    let outcome = run(&store, cli.command).await;
    store.close_all().await;

    if let Err(err) = outcome {
        let body = ErrorResponse::from(&err);
        println!("{}", serde_json::to_string_pretty(&body)?);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(store: &TenantStore, command: Command) -> AppResult<()> {
    match command {
        Command::Import { tenant, file } => {
            let tenant = store.open(&tenant).await?;
            let invoices = tenant.invoices();
            let mut imported = Vec::new();
            for invoice in read_invoices_file(&file)? {
                imported.push(invoices.import_invoice(invoice).await?);
            }
            print_json(&imported)
        }
        Command::Reconcile {
            tenant,
            invoice,
            by,
        } => {
            let tenant = store.open(&tenant).await?;
            let result = tenant
                .reconciliation()
                .reconcile_invoice(&invoice, by.as_deref())
                .await?;
            print_json(&result)
        }
        Command::Audit { tenant, invoice } => {
            let tenant = store.open(&tenant).await?;
            let invoices = tenant.invoices();
            match invoice {
                Some(number) => print_json(&invoices.audit_invoice(&number).await?),
                None => print_json(&invoices.audit_all_invoices().await?),
            }
        }
        Command::Ledger {
            tenant,
            include_inactive,
        } => {
            let tenant = store.open(&tenant).await?;
            let lines: Vec<LedgerLine> = tenant
                .ledger()
                .list_ingredients(include_inactive)
                .await?
                .into_iter()
                .map(|i| LedgerLine {
                    stock_value: i.stock_value(),
                    case_cost: i.case_cost(),
                    code: i.code,
                    brand: i.brand,
                    supplier: i.supplier,
                    name: i.name,
                    unit_of_measure: i.unit_of_measure,
                    quantity_on_hand: i.quantity_on_hand,
                    average_unit_price: i.average_unit_price,
                    last_unit_price: i.last_unit_price,
                    active: i.active,
                })
                .collect();
            print_json(&lines)
        }
        Command::Transactions {
            tenant,
            invoice,
            code,
            brand,
            supplier,
            since,
            until,
            csv,
        } => {
            let tenant = store.open(&tenant).await?;
            let filter = TransactionFilter {
                ingredient: code.zip(supplier).map(|(c, s)| IngredientKey::new(c, brand, s)),
                invoice_number: invoice,
                transaction_type: None,
                range: TimeRange {
                    start: since,
                    end: until,
                },
            };
            let transactions = tenant.ledger().list_transactions(&filter).await?;
            if csv {
                let mut wtr = csv::Writer::from_writer(std::io::stdout());
                for record in &transactions {
                    wtr.serialize(record)?;
                }
                wtr.flush()?;
                Ok(())
            } else {
                print_json(&transactions)
            }
        }
        Command::Verify { tenant } => {
            let tenant = store.open(&tenant).await?;
            let mismatches = tenant.ledger().verify_all().await?;
            print_json(&mismatches)?;
            if let Some(first) = mismatches.into_iter().next() {
                return Err(AppError::LedgerMismatch {
                    ingredient: first.key.to_string(),
                    on_hand: first.quantity_on_hand,
                    derived: first.derived_quantity,
                });
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> AppResult<()> {
    let body = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    println!("{}", body);
    Ok(())
}
