//! # skyport
//!
//! Local-storage data layer of a drone storefront: catalogue, cart,
//! checkout, accounts, orders and a balance ledger, all persisted as JSON
//! partitions in per-origin key/value storage.
//!
//! ## Features
//!
//! - **Generic engine:** [`repository::Repository`] caches a partition and validates writes
//! - **Cross-tab sync:** other tabs reconcile each write, last writer wins
//! - **Atomic checkout:** orders, the withdrawal and stock changes commit together or not at all
//! - **Typed events:** per-repository event buses with unsubscribe handles
//! - **Explicit wiring:** repositories receive their dependencies; no globals
//!
//! ## Quick Start
//!
//! ```
//! use skyport::auth::Registration;
//! use skyport::storage::MemoryStorage;
//! use skyport::Storefront;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> skyport::Result<()> {
//! let store = Storefront::new(MemoryStorage::new())?;
//! store.initialize().await?;
//!
//! store.users().register_user(Registration {
//!     first_name: "Jane".to_string(),
//!     last_name: None,
//!     email: "jane@example.com".to_string(),
//!     phone: "+974-5555-1234".to_string(),
//!     password: "correct horse".to_string(),
//!     shipping_address: None,
//! })?;
//! store.transactions().top_up_balance(10_000.0)?;
//!
//! let drone = store.products().get_all_products()[0].id;
//! store.products().add_product_to_cart(drone, 1)?;
//! let purchase = store.products().confirm_purchase()?;
//!
//! assert_eq!(purchase.orders.len(), 1);
//! assert!(store.products().is_cart_empty());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cross-tab reconciliation
//!
//! Each tab has its own [`Storefront`] over a storage handle of the same
//! origin. Call [`Storefront::reconcile`] (or run [`Storefront::watch`]) to
//! pick up writes made by the other tabs.

#[macro_use]
extern crate log;

pub mod auth;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod fixtures;
pub mod models;
pub mod repositories;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod session;
pub mod storage;

// Re-exports for convenience
pub use config::StoreConfig;
pub use entity::{Entity, EntityId};
pub use error::{Error, Result};
pub use repositories::{
    OrderRepository, ProductRepository, Purchase, TransactionRepository, UserRepository,
};
pub use repository::{LocalRepository, Repository};
pub use service::{Storefront, StorefrontBuilder};
pub use storage::{MemoryStorage, Storage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
