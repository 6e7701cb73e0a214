//! Orders: one purchased cart line each.

use super::{money_eq, Product, ShippingAddress, User};
use crate::config::{StoreConfig, ORDERS_KEY};
use crate::entity::{ensure_amount, Entity, EntityId, ADMIN_ID};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

/// Figures of one purchased line, computed from the product's current price and weight.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrderLine {
    pub product_id: EntityId,
    pub quantity: u32,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
}

impl OrderLine {
    pub fn for_product(product: &Product, quantity: u32, config: &StoreConfig) -> Self {
        let subtotal = product.subtotal_for(quantity);
        let shipping_fee = product.shipping_fee_for(quantity, config);
        OrderLine {
            product_id: product.id,
            quantity,
            subtotal,
            shipping_fee,
            total: subtotal + shipping_fee,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: EntityId,
    pub user_id: EntityId,
    pub product_id: EntityId,
    pub quantity: u32,
    pub subtotal: f64,
    pub shipping_fee: f64,
    pub total: f64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub estimated_arrival: DateTime<Utc>,
    /// Copy of the customer's address when the order was placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_address: Option<ShippingAddress>,
}

impl Order {
    /// Place an order for `customer` at `now`.
    ///
    /// Arrival is estimated at one hour per unit of shipping fee.
    ///
    /// # Errors
    ///
    /// Returns `Error::ValidationError` if the arrival date is out of range.
    pub fn place(
        id: EntityId,
        customer: &User,
        line: OrderLine,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        Ok(Order {
            id,
            user_id: customer.id,
            product_id: line.product_id,
            quantity: line.quantity,
            subtotal: line.subtotal,
            shipping_fee: line.shipping_fee,
            total: line.total,
            date_time: now,
            estimated_arrival: estimated_arrival(now, line.shipping_fee)?,
            shipping_address: customer.shipping_address().cloned(),
        })
    }
}

/// `now + shipping_fee hours`.
///
/// # Errors
///
/// Returns `Error::ValidationError` when the fee is not a finite amount or
/// the date would fall outside the representable range.
pub fn estimated_arrival(now: DateTime<Utc>, shipping_fee: f64) -> Result<DateTime<Utc>> {
    let millis = (shipping_fee * MILLIS_PER_HOUR).round();
    let out_of_range = || {
        Error::ValidationError(format!(
            "shipping fee {} puts the arrival date out of range",
            shipping_fee
        ))
    };
    // i64::MAX as f64 rounds up, so the bound is exclusive.
    if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
        return Err(out_of_range());
    }
    Duration::try_milliseconds(millis as i64)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(out_of_range)
}

impl Entity for Order {
    fn id(&self) -> EntityId {
        self.id
    }

    fn storage_key() -> &'static str {
        ORDERS_KEY
    }

    fn validate(&self) -> Result<()> {
        if self.user_id == ADMIN_ID {
            return Err(Error::ValidationError(
                "Only customers can make orders".to_string(),
            ));
        }
        if self.quantity < 1 {
            return Err(Error::ValidationError(
                "Cannot place an order with no items".to_string(),
            ));
        }
        ensure_amount("order subtotal", self.subtotal)?;
        ensure_amount("order shipping fee", self.shipping_fee)?;
        ensure_amount("order total", self.total)?;

        if !money_eq(self.total, self.subtotal + self.shipping_fee) {
            return Err(Error::ValidationError(format!(
                "Order total was not calculated correctly: {} != {} + {}",
                self.total, self.subtotal, self.shipping_fee
            )));
        }

        Ok(())
    }
}
