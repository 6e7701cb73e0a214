//! The four concrete repositories.
//!
//! Dependencies are passed in explicitly. Construction order follows them:
//! users, then orders and transactions, then products.

pub mod order;
pub mod product;
pub mod transaction;
pub mod user;

pub use order::OrderRepository;
pub use product::{ProductRepository, Purchase};
pub use transaction::TransactionRepository;
pub use user::UserRepository;
