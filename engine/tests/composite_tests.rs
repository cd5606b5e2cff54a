//! Composite ingredient tests
//!
//! Tests for batch recipes including:
//! - One-level expansion and full bill-of-materials resolution
//! - Cycle and depth-limit rejection
//! - All-or-nothing consumption of a composite's base ingredients

mod common;

use common::*;
use costing_engine::models::{IngredientKey, RecipeComponent};
use costing_engine::AppError;
use proptest::prelude::*;
use rust_decimal::Decimal;
use shared::costing::scale_component;

fn component(base: IngredientKey, per_batch: &str) -> RecipeComponent {
    RecipeComponent {
        base,
        quantity_per_batch: dec(per_batch),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod unit_tests {
    use super::*;

    /// 4oz of a 128oz batch needs 8 x 4/128 = 0.25oz of the base
    #[tokio::test]
    async fn test_expand_scales_by_batch_output() {
        let t = tenant().await;
        register(&t, "CR-01", "Cream", "oz").await;
        register(&t, "SA-01", "Alfredo sauce", "oz").await;
        let recipes = t.recipes();
        recipes
            .set_recipe(&key("SA-01"), dec("128"), vec![component(key("CR-01"), "8")])
            .await
            .unwrap();

        let needs = recipes.expand_composite(&key("SA-01"), dec("4")).await.unwrap();
        assert_eq!(needs.len(), 1);
        assert_eq!(needs[0].key, key("CR-01"));
        assert_eq!(needs[0].quantity, dec("0.25"));
        assert!(!needs[0].is_composite);

        let recipe = recipes.get_recipe(&key("SA-01")).await.unwrap();
        assert_eq!(recipe.batch_output_size, dec("128"));
        assert_eq!(recipe.components.len(), 1);
    }

    #[tokio::test]
    async fn test_expand_non_composite_fails() {
        let t = tenant().await;
        register(&t, "CR-01", "Cream", "oz").await;
        let err = t
            .recipes()
            .expand_composite(&key("CR-01"), dec("1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotComposite(_)));
    }

    /// Nested composites resolve to leaves; shared leaves aggregate
    #[tokio::test]
    async fn test_bill_of_materials_nested() {
        let t = tenant().await;
        register(&t, "BU-01", "Butter", "oz").await;
        register(&t, "FL-01", "Flour", "oz").await;
        register(&t, "MI-01", "Milk", "oz").await;
        register(&t, "RX-01", "Roux", "oz").await;
        register(&t, "BE-01", "Bechamel", "oz").await;
        let recipes = t.recipes();

        // Roux: 16oz batch of 8oz butter + 8oz flour
        recipes
            .set_recipe(
                &key("RX-01"),
                dec("16"),
                vec![component(key("BU-01"), "8"), component(key("FL-01"), "8")],
            )
            .await
            .unwrap();
        // Bechamel: 64oz batch of 8oz roux + 56oz milk + 2oz butter
        recipes
            .set_recipe(
                &key("BE-01"),
                dec("64"),
                vec![
                    component(key("RX-01"), "8"),
                    component(key("MI-01"), "56"),
                    component(key("BU-01"), "2"),
                ],
            )
            .await
            .unwrap();

        let top = recipes.expand_composite(&key("BE-01"), dec("32")).await.unwrap();
        assert!(top.iter().any(|r| r.key == key("RX-01") && r.is_composite));

        let bom = recipes
            .resolve_bill_of_materials(&key("BE-01"), dec("32"))
            .await
            .unwrap();
        let need = |code: &str| {
            bom.iter()
                .find(|r| r.key == key(code))
                .map(|r| r.quantity)
                .unwrap()
        };
        assert_eq!(bom.len(), 3);
        // 32oz bechamel = half batch: 4oz roux (2 butter, 2 flour), 28 milk, 1 butter
        assert_eq!(need("BU-01"), dec("3"));
        assert_eq!(need("FL-01"), dec("2"));
        assert_eq!(need("MI-01"), dec("28"));
        assert!(bom.iter().all(|r| !r.is_composite));
    }

    #[tokio::test]
    async fn test_recipe_rejects_cycles() {
        let t = tenant().await;
        register(&t, "AA-01", "Stock A", "oz").await;
        register(&t, "BB-01", "Stock B", "oz").await;
        register(&t, "WA-01", "Water", "oz").await;
        let recipes = t.recipes();

        let err = recipes
            .set_recipe(&key("AA-01"), dec("10"), vec![component(key("AA-01"), "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompositeCycle(_)));

        recipes
            .set_recipe(&key("AA-01"), dec("10"), vec![component(key("BB-01"), "5")])
            .await
            .unwrap();
        let err = recipes
            .set_recipe(&key("BB-01"), dec("10"), vec![component(key("AA-01"), "5")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompositeCycle(_)));

        // The rejected write left B a plain ingredient
        let b = t.ledger().get_ingredient(&key("BB-01")).await.unwrap();
        assert!(!b.is_composite);
        recipes
            .set_recipe(&key("BB-01"), dec("10"), vec![component(key("WA-01"), "10")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let t = tenant_with(|c| c.costing.max_composite_depth = 2).await;
        register(&t, "L0", "Water", "oz").await;
        register(&t, "L1", "Level 1", "oz").await;
        register(&t, "L2", "Level 2", "oz").await;
        register(&t, "L3", "Level 3", "oz").await;
        let recipes = t.recipes();

        recipes
            .set_recipe(&key("L1"), dec("1"), vec![component(key("L0"), "1")])
            .await
            .unwrap();
        recipes
            .set_recipe(&key("L2"), dec("1"), vec![component(key("L1"), "1")])
            .await
            .unwrap();
        let err = recipes
            .set_recipe(&key("L3"), dec("1"), vec![component(key("L2"), "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CompositeDepthExceeded { limit: 2, .. }));
    }

    #[tokio::test]
    async fn test_consume_composite_depletes_leaves() {
        let t = tenant().await;
        register(&t, "CR-01", "Cream", "oz").await;
        register(&t, "PA-01", "Parmesan", "oz").await;
        register(&t, "SA-01", "Alfredo sauce", "oz").await;
        let ledger = t.ledger();
        ledger
            .apply_purchase(&key("CR-01"), dec("64"), dec("0.20"), "oz")
            .await
            .unwrap();
        ledger
            .apply_purchase(&key("PA-01"), dec("32"), dec("0.90"), "oz")
            .await
            .unwrap();
        t.recipes()
            .set_recipe(
                &key("SA-01"),
                dec("128"),
                vec![component(key("CR-01"), "8"), component(key("PA-01"), "16")],
            )
            .await
            .unwrap();

        let outcomes = t
            .recipes()
            .consume_composite(&key("SA-01"), dec("4"), Some("fettuccine"))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 2);

        let cream = ledger.get_ingredient(&key("CR-01")).await.unwrap();
        assert_eq!(cream.quantity_on_hand, dec("63.75"));
        assert_eq!(cream.average_unit_price, dec("0.20"));
        let parmesan = ledger.get_ingredient(&key("PA-01")).await.unwrap();
        assert_eq!(parmesan.quantity_on_hand, dec("31.5"));
    }

    /// One short leaf rejects the whole consumption
    #[tokio::test]
    async fn test_consume_composite_is_atomic() {
        let t = tenant().await;
        register(&t, "CR-01", "Cream", "oz").await;
        register(&t, "PA-01", "Parmesan", "oz").await;
        register(&t, "SA-01", "Alfredo sauce", "oz").await;
        let ledger = t.ledger();
        ledger
            .apply_purchase(&key("CR-01"), dec("64"), dec("0.20"), "oz")
            .await
            .unwrap();
        t.recipes()
            .set_recipe(
                &key("SA-01"),
                dec("128"),
                vec![component(key("CR-01"), "8"), component(key("PA-01"), "16")],
            )
            .await
            .unwrap();

        let err = t
            .recipes()
            .consume_composite(&key("SA-01"), dec("4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));

        let cream = ledger.get_ingredient(&key("CR-01")).await.unwrap();
        assert_eq!(cream.quantity_on_hand, dec("64"));
        assert!(ledger.verify_all().await.unwrap().is_empty());
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

        /// Producing one full batch needs exactly the per-batch quantity
        #[test]
        fn prop_full_batch_needs_per_batch_quantity(
            per_batch in 1i64..100_000,
            output in 1i64..100_000
        ) {
            let per_batch = Decimal::new(per_batch, 2);
            let output = Decimal::new(output, 2);
            prop_assert_eq!(scale_component(output, per_batch, output), per_batch);
        }

        /// Needs scale linearly with the quantity produced
        #[test]
        fn prop_scaling_is_monotonic(
            per_batch in 1i64..10_000,
            output in 1i64..10_000,
            needed in 0i64..10_000
        ) {
            let per_batch = Decimal::new(per_batch, 1);
            let output = Decimal::new(output, 1);
            let small = scale_component(Decimal::new(needed, 1), per_batch, output);
            let large = scale_component(Decimal::new(needed + 1, 1), per_batch, output);
            prop_assert!(large >= small);
        }
    }
}
