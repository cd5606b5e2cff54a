//! Invoice management tests
//!
//! Tests for stored invoices including:
//! - Import validation and duplicate invoice numbers
//! - Total-versus-line-sum drift audits
//! - Payment status, listing and cascade delete
//! - CSV import grouped into invoices

mod common;

use common::*;
use costing_engine::models::{PaymentStatus, ReconciliationStatus, TransactionFilter};
use costing_engine::services::import::read_invoices;
use costing_engine::AppError;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::costing::{drift, round_money, DEFAULT_DRIFT_TOLERANCE};

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[tokio::test]
    async fn test_import_stores_pending_invoice() {
        let t = tenant().await;
        let stored = t
            .invoices()
            .import_invoice(invoice(
                "INV-1",
                "27.50",
                vec![
                    line("FL-01", "Flour", "10", "lb", "2.00"),
                    line("BU-01", "Butter", "1.5", "lb", "5.00"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(stored.invoice.status, ReconciliationStatus::Pending);
        assert_eq!(stored.invoice.payment_status, PaymentStatus::Unpaid);
        assert_eq!(stored.line_items.len(), 2);
        assert_eq!(stored.line_items[0].line_number, 1);
        assert_eq!(stored.line_items[0].total_price, dec("20.00"));
        assert_eq!(stored.line_items[1].total_price, dec("7.50"));
        assert!(stored.line_items.iter().all(|l| !l.reconciled));
    }

    #[tokio::test]
    async fn test_duplicate_invoice_number() {
        let t = tenant().await;
        let invoices = t.invoices();
        let inv = invoice("INV-1", "20.00", vec![line("FL-01", "Flour", "10", "lb", "2.00")]);
        invoices.import_invoice(inv.clone()).await.unwrap();

        let err = invoices.import_invoice(inv).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEntry(_)));
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_invoice() {
        let t = tenant().await;
        let err = t
            .invoices()
            .import_invoice(invoice("INV-1", "0.00", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "lines"));

        // Nothing half-written
        assert!(t.invoices().list_invoices(None).await.unwrap().is_empty());
    }

    /// A two-cent gap is drift; the stored total is left alone
    #[tokio::test]
    async fn test_drift_exceeding_tolerance() {
        let t = tenant().await;
        let invoices = t.invoices();
        invoices
            .import_invoice(invoice(
                "INV-1",
                "100.00",
                vec![
                    line("FL-01", "Flour", "1", "lb", "60.01"),
                    line("SU-01", "Sugar", "1", "lb", "40.01"),
                ],
            ))
            .await
            .unwrap();

        let report = invoices.audit_invoice("INV-1").await.unwrap();
        assert_eq!(report.stored_total, dec("100.00"));
        assert_eq!(report.line_sum, dec("100.02"));
        assert_eq!(report.difference, dec("0.02"));
        assert!(!report.within_tolerance);

        let err = invoices.ensure_consistent("INV-1").await.unwrap_err();
        assert!(matches!(err, AppError::ConsistencyDrift { .. }));

        let stored = invoices.get_invoice("INV-1").await.unwrap();
        assert_eq!(stored.invoice.total_amount, dec("100.00"));
    }

    /// A half cent rounds up to one cent, which is within tolerance
    #[tokio::test]
    async fn test_drift_within_tolerance() {
        let t = tenant().await;
        let invoices = t.invoices();
        invoices
            .import_invoice(invoice(
                "INV-2",
                "100.00",
                vec![line("FL-01", "Flour", "1", "lb", "100.005")],
            ))
            .await
            .unwrap();

        let report = invoices.ensure_consistent("INV-2").await.unwrap();
        assert_eq!(report.line_sum, dec("100.01"));
        assert!(report.within_tolerance);
        assert!(invoices.audit_all_invoices().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_audit_all_lists_only_drifting() {
        let t = tenant().await;
        let invoices = t.invoices();
        invoices
            .import_invoice(invoice(
                "INV-OK",
                "20.00",
                vec![line("FL-01", "Flour", "10", "lb", "2.00")],
            ))
            .await
            .unwrap();
        invoices
            .import_invoice(invoice(
                "INV-BAD",
                "19.00",
                vec![line("FL-01", "Flour", "10", "lb", "2.00")],
            ))
            .await
            .unwrap();

        let drifted = invoices.audit_all_invoices().await.unwrap();
        assert_eq!(drifted.len(), 1);
        assert_eq!(drifted[0].invoice_number, "INV-BAD");
        assert_eq!(drifted[0].difference, dec("1.00"));
    }

    #[tokio::test]
    async fn test_payment_status_and_listing() {
        let t = tenant().await;
        register(&t, "FL-01", "Flour", "lb").await;
        let invoices = t.invoices();
        for number in ["INV-1", "INV-2"] {
            invoices
                .import_invoice(invoice(
                    number,
                    "20.00",
                    vec![line("FL-01", "Flour", "10", "lb", "2.00")],
                ))
                .await
                .unwrap();
        }

        let paid = invoices
            .set_payment_status("INV-1", PaymentStatus::Paid)
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        t.reconciliation()
            .reconcile_invoice("INV-2", None)
            .await
            .unwrap();
        let done = invoices
            .list_invoices(Some(ReconciliationStatus::FullyReconciled))
            .await
            .unwrap();
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].invoice_number, "INV-2");

        // Visible to a fresh read right away
        let stored = invoices.get_invoice("INV-1").await.unwrap();
        assert_eq!(stored.invoice.payment_status, PaymentStatus::Paid);

        let err = invoices
            .set_payment_status("INV-404", PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvoiceNotFound(_)));
    }

    /// Deleting an invoice drops its lines but keeps the audit trail
    #[tokio::test]
    async fn test_delete_cascades_to_lines() {
        let t = tenant().await;
        register(&t, "FL-01", "Flour", "lb").await;
        let invoices = t.invoices();
        invoices
            .import_invoice(invoice(
                "INV-1",
                "20.00",
                vec![line("FL-01", "Flour", "10", "lb", "2.00")],
            ))
            .await
            .unwrap();
        t.reconciliation()
            .reconcile_invoice("INV-1", None)
            .await
            .unwrap();

        invoices.delete_invoice("INV-1").await.unwrap();

        let lines: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoice_line_items")
            .fetch_one(&t.db)
            .await
            .unwrap();
        assert_eq!(lines, 0);
        assert!(matches!(
            invoices.get_invoice("INV-1").await.unwrap_err(),
            AppError::InvoiceNotFound(_)
        ));

        let log = t
            .ledger()
            .list_transactions(&TransactionFilter::default())
            .await
            .unwrap();
        assert_eq!(log.len(), 1);
        assert!(matches!(
            invoices.delete_invoice("INV-1").await.unwrap_err(),
            AppError::InvoiceNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_csv_import_groups_and_stores() {
        let t = tenant().await;
        let data = "invoice_number,supplier,invoice_date,received_date,total_amount,\
            ingredient_code,ingredient_name,brand,quantity_ordered,quantity_received,\
            unit_of_measure,unit_price,lot_number,expiration_date\n\
            INV-9,Sysco,2024-03-01,2024-03-02,27.50,FL-01,Flour,,10,10,lb,2.00,,\n\
            INV-9,Sysco,2024-03-01,2024-03-02,27.50,BU-01,Butter,,2,1.5,lb,5.00,B7,2024-04-01\n";

        let parsed = read_invoices(data.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 1);

        let stored = t
            .invoices()
            .import_invoice(parsed.into_iter().next().unwrap())
            .await
            .unwrap();
        assert_eq!(stored.line_items.len(), 2);
        assert!(stored.line_items[1].is_short_shipped());
        assert!(t.invoices().ensure_consistent("INV-9").await.is_ok());
    }

    /// Separate tenants never see each other's data
    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let t = tenant().await;
        t.invoices()
            .import_invoice(invoice(
                "INV-1",
                "20.00",
                vec![line("FL-01", "Flour", "10", "lb", "2.00")],
            ))
            .await
            .unwrap();

        let other = t.store.open("cafe").await.unwrap();
        assert!(other.invoices().list_invoices(None).await.unwrap().is_empty());

        assert!(matches!(
            t.store.open("../escape").await,
            Err(AppError::Validation { .. })
        ));
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Drift is reported exactly when the rounded gap exceeds one cent
        #[test]
        fn prop_drift_matches_rounded_gap(
            stored_cents in 0i64..10_000_000,
            gap_mills in -100i64..100
        ) {
            let stored = Decimal::new(stored_cents, 2);
            let line_sum = stored + Decimal::new(gap_mills, 3);
            let gap = round_money(line_sum) - stored;

            let reported = drift(stored, line_sum, DEFAULT_DRIFT_TOLERANCE);
            prop_assert_eq!(reported.is_some(), gap.abs() > DEFAULT_DRIFT_TOLERANCE);
            if let Some(difference) = reported {
                prop_assert_eq!(difference, gap);
            }
        }
    }
}
