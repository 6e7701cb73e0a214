//! The pending-purchase cart.
//!
//! The cart is a singleton stored under its own key. Its aggregates are
//! maintained incrementally on every mutation; checkout never trusts them
//! and recomputes each line from the product partition instead.

use super::{money_eq, Product};
use crate::config::StoreConfig;
use crate::entity::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    /// Product id to reserved quantity. Never holds a zero quantity.
    pub items: BTreeMap<EntityId, u32>,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
}

/// Outcome of a cart mutation that changed something.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CartChange {
    pub product_id: EntityId,
    pub previous: u32,
    pub current: u32,
}

impl CartChange {
    pub fn is_addition(&self) -> bool {
        self.current > self.previous
    }
}

impl Cart {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn quantity_of(&self, product_id: EntityId) -> u32 {
        self.items.get(&product_id).copied().unwrap_or(0)
    }

    /// Total number of units across all lines.
    pub fn number_of_units(&self) -> u64 {
        self.items.values().map(|&q| u64::from(q)).sum()
    }

    /// Move the quantity of `product` by `delta`, clamped to `[0, product.quantity]`.
    ///
    /// Aggregates are adjusted by the contribution of the applied change
    /// only, then clamped at zero. Returns `None` when the clamped quantity
    /// equals the current one.
    pub fn apply_delta(
        &mut self,
        product: &Product,
        delta: i64,
        config: &StoreConfig,
    ) -> Option<CartChange> {
        let previous = self.quantity_of(product.id);
        let requested = i64::from(previous).saturating_add(delta);
        let current = requested.clamp(0, i64::from(product.quantity));
        // `current` lies within `[0, u32::MAX]` after the clamp.
        let current = u32::try_from(current).unwrap_or(0);

        if current == previous {
            return None;
        }

        if current == 0 {
            self.items.remove(&product.id);
        } else {
            self.items.insert(product.id, current);
        }

        let applied = f64::from(current) - f64::from(previous);
        let subtotal_change = product.price * applied;
        let shipping_change = config.shipping_fee(product.weight, 1) * applied;

        self.subtotal = (self.subtotal + subtotal_change).max(0.0);
        self.shipping_fee = (self.shipping_fee + shipping_change).max(0.0);
        self.total = (self.total + subtotal_change + shipping_change).max(0.0);

        Some(CartChange {
            product_id: product.id,
            previous,
            current,
        })
    }

    /// Aggregates recomputed from `items` and the given product lookup.
    ///
    /// Lines whose product cannot be found are skipped.
    pub fn recomputed<F>(&self, lookup: F, config: &StoreConfig) -> Cart
    where
        F: Fn(EntityId) -> Option<Product>,
    {
        let mut cart = Cart {
            items: self.items.clone(),
            ..Cart::default()
        };

        for (&product_id, &quantity) in &self.items {
            if let Some(product) = lookup(product_id) {
                cart.subtotal += product.subtotal_for(quantity);
                cart.shipping_fee += product.shipping_fee_for(quantity, config);
            }
        }
        cart.total = cart.subtotal + cart.shipping_fee;
        cart
    }

    /// True if the incremental aggregates agree with `other`'s, allowing for drift.
    pub fn totals_match(&self, other: &Cart) -> bool {
        money_eq(self.subtotal, other.subtotal)
            && money_eq(self.shipping_fee, other.shipping_fee)
            && money_eq(self.total, other.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::product::tests::drone;

    #[test]
    fn test_add_then_remove_past_zero_deletes_key() {
        let config = StoreConfig::default();
        let product = drone(1, 100.0, 5, 40.0);
        let mut cart = Cart::default();

        let change = cart.apply_delta(&product, 2, &config).unwrap();
        assert_eq!((change.previous, change.current), (0, 2));
        assert!(change.is_addition());
        assert_eq!(cart.subtotal, 200.0);
        assert_eq!(cart.shipping_fee, 20.0);
        assert_eq!(cart.total, 220.0);

        let change = cart.apply_delta(&product, -5, &config).unwrap();
        assert_eq!((change.previous, change.current), (2, 0));
        assert!(!cart.items.contains_key(&1));
        assert_eq!(cart.total, 0.0);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_add_clamps_to_stock() {
        let config = StoreConfig::default();
        let product = drone(1, 10.0, 3, 0.0);
        let mut cart = Cart::default();

        cart.apply_delta(&product, 10, &config);
        assert_eq!(cart.quantity_of(1), 3);
        assert_eq!(cart.subtotal, 30.0);

        assert!(cart.apply_delta(&product, 1, &config).is_none());
    }

    #[test]
    fn test_noop_delta() {
        let config = StoreConfig::default();
        let product = drone(1, 10.0, 3, 0.0);
        let mut cart = Cart::default();

        assert!(cart.apply_delta(&product, 0, &config).is_none());
        assert!(cart.apply_delta(&product, -1, &config).is_none());
        assert_eq!(cart, Cart::default());
    }

    #[test]
    fn test_aggregates_clamped_at_zero() {
        let config = StoreConfig::default();
        let product = drone(1, 10.0, 3, 4.0);
        let mut cart = Cart::default();
        cart.items.insert(1, 2);

        cart.apply_delta(&product, -2, &config);
        assert_eq!(cart.subtotal, 0.0);
        assert_eq!(cart.shipping_fee, 0.0);
        assert_eq!(cart.total, 0.0);
    }

    #[test]
    fn test_recomputed_matches_incremental() {
        let config = StoreConfig::default();
        let a = drone(1, 19.99, 9, 250.0);
        let b = drone(2, 5.25, 9, 33.0);
        let mut cart = Cart::default();

        cart.apply_delta(&a, 4, &config);
        cart.apply_delta(&b, 7, &config);
        cart.apply_delta(&a, -1, &config);

        let lookup = |id| [a.clone(), b.clone()].into_iter().find(|p| p.id == id);
        let fresh = cart.recomputed(lookup, &config);
        assert!(cart.totals_match(&fresh));
        assert_eq!(cart.number_of_units(), 10);
    }

    #[test]
    fn test_storage_shape() {
        let config = StoreConfig::default();
        let mut cart = Cart::default();
        cart.apply_delta(&drone(42, 1.0, 5, 0.0), 2, &config);

        let value = serde_json::to_value(&cart).unwrap();
        assert_eq!(value["items"]["42"], 2);
        assert!(value.get("shippingFee").is_some());
    }
}
