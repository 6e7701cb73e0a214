//! Domain models.
//!
//! Plain data structs. Ids are allocated by the owning repository and passed
//! into the constructors; nothing here touches storage.

pub mod cart;
pub mod order;
pub mod product;
pub mod transaction;
pub mod user;

pub use cart::{Cart, CartChange};
pub use order::{Order, OrderLine};
pub use product::{Faq, Feature, IncludedItem, ModelDescriptor, Product, Series, Vec3};
pub use transaction::{Transaction, TransactionType};
pub use user::{Name, Role, ShippingAddress, User, AVATAR_COLORS};

/// Tolerance used when comparing accumulated monetary amounts.
pub(crate) const MONEY_EPSILON: f64 = 1e-6;

/// Compare two monetary amounts, allowing for floating point drift.
pub(crate) fn money_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= MONEY_EPSILON * a.abs().max(b.abs()).max(1.0)
}
