//! Property-based tests for the cart and the stored record shapes.
//!
//! # Properties Tested
//!
//! 1. **Clamp Property**: a cart line always stays within `[0, stock]`
//! 2. **Aggregate Property**: subtotal, shipping fee and total never go negative
//! 3. **Drift Property**: incremental totals agree with totals recomputed from scratch
//! 4. **Record Property**: stored entities parse back into the same value

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use skyport::config::StoreConfig;
use skyport::entity::{Entity, EntityId};
use skyport::models::{Cart, Product, Series, Transaction, TransactionType};
use skyport::serialization::{decode_partition, encode_partition};
use std::collections::BTreeMap;

// ============================================================================
// Strategies
// ============================================================================

/// Whole-unit prices and weights keep JSON round-trips exact.
fn arb_product(id: EntityId) -> impl Strategy<Value = Product> {
    (0u32..5_000, 0u32..20, 0u32..2_000, "[A-Za-z][A-Za-z0-9 ]{0,20}").prop_map(
        move |(price, stock, weight, name)| {
            Product::new(
                id,
                name,
                "generated",
                f64::from(price),
                stock,
                f64::from(weight),
                30.0,
                Series {
                    name: "Mavic".to_string(),
                    model: "Gen".to_string(),
                    description: String::new(),
                },
            )
        },
    )
}

fn arb_catalogue() -> impl Strategy<Value = Vec<Product>> {
    (arb_product(1), arb_product(2), arb_product(3)).prop_map(|(a, b, c)| vec![a, b, c])
}

/// A sequence of (product index, delta) cart mutations.
fn arb_mutations() -> impl Strategy<Value = Vec<(usize, i64)>> {
    prop::collection::vec((0usize..3, -25i64..25), 0..60)
}

fn arb_transaction() -> impl Strategy<Value = Transaction> {
    (
        1u32..u32::MAX,
        any::<u32>(),
        0u32..1_000_000,
        any::<bool>(),
        0i64..4_102_444_800_000,
    )
        .prop_map(|(id, user_id, amount, deposit, millis)| {
            let kind = if deposit {
                TransactionType::Deposit
            } else {
                TransactionType::Withdrawal
            };
            let date = Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now);
            Transaction::new(id, user_id, f64::from(amount), kind, date)
        })
}

fn apply_all(
    cart: &mut Cart,
    catalogue: &[Product],
    mutations: &[(usize, i64)],
    config: &StoreConfig,
) {
    for &(index, delta) in mutations {
        cart.apply_delta(&catalogue[index], delta, config);
    }
}

// ============================================================================
// Property 1 and 2: Clamp and Aggregates
// ============================================================================

proptest! {
    /// Property: every line stays within stock and zero lines are dropped
    #[test]
    fn prop_cart_lines_clamped_to_stock(
        catalogue in arb_catalogue(),
        mutations in arb_mutations(),
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();

        for &(index, delta) in &mutations {
            let product = &catalogue[index];
            cart.apply_delta(product, delta, &config);

            let quantity = cart.quantity_of(product.id);
            prop_assert!(quantity <= product.quantity);
            prop_assert!(cart.items.values().all(|&q| q > 0), "zero line kept");
        }
    }

    /// Property: aggregates are never negative, whatever the mutation order
    #[test]
    fn prop_cart_aggregates_non_negative(
        catalogue in arb_catalogue(),
        mutations in arb_mutations(),
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();

        for &(index, delta) in &mutations {
            cart.apply_delta(&catalogue[index], delta, &config);
            prop_assert!(cart.subtotal >= 0.0);
            prop_assert!(cart.shipping_fee >= 0.0);
            prop_assert!(cart.total >= 0.0);
        }
    }

    /// Property: a mutation reports a change exactly when the line moved
    #[test]
    fn prop_cart_change_reported_iff_quantity_moved(
        product in arb_product(7),
        start in 0i64..20,
        delta in -25i64..25,
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();
        cart.apply_delta(&product, start, &config);

        let before = cart.quantity_of(product.id);
        let change = cart.apply_delta(&product, delta, &config);
        let after = cart.quantity_of(product.id);

        match change {
            Some(change) => {
                prop_assert_ne!(before, after);
                prop_assert_eq!(change.previous, before);
                prop_assert_eq!(change.current, after);
                prop_assert_eq!(change.is_addition(), after > before);
            }
            None => prop_assert_eq!(before, after),
        }
    }
}

// ============================================================================
// Property 3: Drift
// ============================================================================

proptest! {
    /// Property: with stable prices the incremental totals match a recomputation
    #[test]
    fn prop_incremental_totals_match_recomputed(
        catalogue in arb_catalogue(),
        mutations in arb_mutations(),
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();
        apply_all(&mut cart, &catalogue, &mutations, &config);

        let lookup = |id| catalogue.iter().find(|p| p.id == id).cloned();
        let fresh = cart.recomputed(lookup, &config);

        prop_assert!(
            cart.totals_match(&fresh),
            "incremental {:?} vs recomputed {:?}",
            (cart.subtotal, cart.shipping_fee, cart.total),
            (fresh.subtotal, fresh.shipping_fee, fresh.total)
        );
        prop_assert_eq!(&cart.items, &fresh.items);
    }

    /// Property: removing everything returns the cart to its empty state
    #[test]
    fn prop_emptying_cart_resets_totals(
        catalogue in arb_catalogue(),
        mutations in arb_mutations(),
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();
        apply_all(&mut cart, &catalogue, &mutations, &config);

        for product in &catalogue {
            cart.apply_delta(product, -i64::from(u32::MAX), &config);
        }

        prop_assert!(cart.is_empty());
        prop_assert_eq!(cart.number_of_units(), 0);
        prop_assert!(cart.total.abs() < 1e-6);
    }
}

// ============================================================================
// Property 4: Stored records
// ============================================================================

proptest! {
    /// Property: a stored transaction parses back into the same record
    #[test]
    fn prop_transaction_record_roundtrip(tx in arb_transaction()) {
        let value = serde_json::to_value(&tx).expect("Serialization should succeed");
        let parsed = Transaction::parse(value).expect("Stored record should parse");
        prop_assert_eq!(tx, parsed);
    }

    /// Property: a product partition decodes into the partition that was encoded
    #[test]
    fn prop_product_partition_roundtrip(catalogue in arb_catalogue()) {
        let partition: BTreeMap<_, _> = catalogue.into_iter().map(|p| (p.id, p)).collect();

        let raw = encode_partition(&partition).expect("Encoding should succeed");
        let decoded: BTreeMap<_, Product> =
            decode_partition(&raw).expect("Decoding should succeed");

        prop_assert_eq!(partition, decoded);
    }

    /// Property: the persisted cart shape survives storage
    #[test]
    fn prop_cart_roundtrip(
        catalogue in arb_catalogue(),
        mutations in arb_mutations(),
    ) {
        let config = StoreConfig::default();
        let mut cart = Cart::default();
        apply_all(&mut cart, &catalogue, &mutations, &config);

        let raw = serde_json::to_string(&cart).expect("Serialization should succeed");
        let restored: Cart = serde_json::from_str(&raw).expect("Deserialization should succeed");

        prop_assert!(cart.totals_match(&restored));
        prop_assert_eq!(&cart.items, &restored.items);
    }
}
