//! High-level storefront facade.
//!
//! Builds the four repositories over one storage handle and wires their
//! dependencies, so a caller only has to keep one value around.

use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::Result;
use crate::fixtures::{BundledFixtures, FixtureSource};
use crate::models::User;
use crate::repositories::{
    OrderRepository, ProductRepository, TransactionRepository, UserRepository,
};
use crate::repository::LocalRepository;
use crate::session::Session;
use crate::storage::Storage;
use std::sync::Arc;

/// Every repository of one tab, sharing a session, clock and configuration.
///
/// Cloning is cheap; clones share the same repositories.
///
/// # Example
///
/// ```
/// use skyport::storage::MemoryStorage;
/// use skyport::Storefront;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> skyport::Result<()> {
/// let store = Storefront::new(MemoryStorage::new())?;
/// store.initialize().await?;
///
/// let first = store.products().get_all_products()[0].id;
/// store.products().add_product_to_cart(first, 1)?;
/// assert_eq!(store.products().cart_quantity(first), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Storefront<S: Storage> {
    storage: S,
    config: StoreConfig,
    session: Arc<Session<S>>,
    users: Arc<UserRepository<S>>,
    orders: Arc<OrderRepository<S>>,
    transactions: Arc<TransactionRepository<S>>,
    products: Arc<ProductRepository<S>>,
}

/// Builder for [`Storefront`].
pub struct StorefrontBuilder<S: Storage> {
    storage: S,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    fixtures: Arc<dyn FixtureSource>,
}

impl<S: Storage> StorefrontBuilder<S> {
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_fixtures(mut self, fixtures: Arc<dyn FixtureSource>) -> Self {
        self.fixtures = fixtures;
        self
    }

    /// # Errors
    ///
    /// Returns `Error::ConfigError` if the configuration is invalid.
    pub fn build(self) -> Result<Storefront<S>> {
        self.config.validate()?;
        let StorefrontBuilder {
            storage,
            config,
            clock,
            fixtures,
        } = self;

        let session = Arc::new(Session::new(
            storage.clone(),
            Arc::clone(&clock),
            config.session_ttl,
        ));
        let users = Arc::new(UserRepository::new(
            storage.clone(),
            Arc::clone(&session),
            config.clone(),
            Arc::clone(&fixtures),
        ));
        let orders = Arc::new(OrderRepository::new(
            storage.clone(),
            Arc::clone(&session),
            config.clone(),
            Arc::clone(&clock),
            Arc::clone(&fixtures),
        ));
        let transactions = Arc::new(TransactionRepository::new(
            storage.clone(),
            Arc::clone(&session),
            config.clone(),
            Arc::clone(&clock),
            Arc::clone(&fixtures),
            Arc::clone(&users),
        ));
        let products = Arc::new(ProductRepository::new(
            storage.clone(),
            Arc::clone(&session),
            config.clone(),
            clock,
            fixtures,
            Arc::clone(&users),
            Arc::clone(&orders),
            Arc::clone(&transactions),
        ));

        Ok(Storefront {
            storage,
            config,
            session,
            users,
            orders,
            transactions,
            products,
        })
    }
}

impl<S: Storage> Storefront<S> {
    /// Storefront with default configuration, the system clock and the
    /// bundled fixtures.
    pub fn new(storage: S) -> Result<Self> {
        Self::builder(storage).build()
    }

    pub fn builder(storage: S) -> StorefrontBuilder<S> {
        StorefrontBuilder {
            storage,
            config: StoreConfig::default(),
            clock: Arc::new(SystemClock),
            fixtures: Arc::new(BundledFixtures),
        }
    }

    /// Initialize every repository concurrently, then restore the session.
    ///
    /// Returns the user logged back in from a live session marker. A marker
    /// naming a missing user is dropped with a warning.
    ///
    /// # Errors
    ///
    /// Fails if any repository fails to initialize, e.g. a missing fixture.
    pub async fn initialize(&self) -> Result<Option<User>> {
        futures::try_join!(
            self.users.initialize(),
            self.orders.initialize(),
            self.transactions.initialize(),
            self.products.initialize(),
        )?;

        match self.users.login_from_session() {
            Ok(user) => Ok(user),
            Err(e) if e.is_not_found() => {
                warn!("Could not restore session: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply changes made by other tabs. Returns true if anything changed.
    pub async fn reconcile(&self) -> Result<bool> {
        let users = self.users.reconcile().await?;
        let orders = self.orders.reconcile().await?;
        let transactions = self.transactions.reconcile().await?;
        let products = self.products.reconcile().await?;
        Ok(users || orders || transactions || products)
    }

    /// Reconcile every time another tab writes. Runs until storage closes.
    pub async fn watch(&self) -> Result<()> {
        let mut changes = self.storage.subscribe();
        while changes.next().await.is_some() {
            self.reconcile().await?;
        }
        Ok(())
    }

    /// Log out and reload every cache from storage.
    pub async fn logout(&self) -> Result<()> {
        self.users.logout_user()?;
        self.orders.base().reload()?;
        self.transactions.base().reload()?;
        self.products.base().reload()?;
        Ok(())
    }

    pub fn current_user(&self) -> Option<User> {
        self.session.current_user()
    }

    pub fn products(&self) -> &ProductRepository<S> {
        &self.products
    }

    pub fn users(&self) -> &UserRepository<S> {
        &self.users
    }

    pub fn orders(&self) -> &OrderRepository<S> {
        &self.orders
    }

    pub fn transactions(&self) -> &TransactionRepository<S> {
        &self.transactions
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use crate::error::Error;
    use crate::fixtures::{StaticFixtures, PRODUCT_LIST};
    use crate::storage::MemoryStorage;

    #[tokio::test]
    async fn test_storefront_initializes_everything() {
        let store = Storefront::new(MemoryStorage::new()).expect("Failed to build");
        assert_eq!(store.initialize().await.expect("Failed to initialize"), None);

        assert!(store.products().number_of_products() > 0);
        assert!(store.users().get_user(0).is_some());
        assert!(store.products().base().is_initialized());
    }

    #[tokio::test]
    async fn test_missing_fixture_is_fatal() {
        let store = Storefront::builder(MemoryStorage::new())
            .with_fixtures(Arc::new(StaticFixtures::new().without(PRODUCT_LIST)))
            .build()
            .unwrap();

        let result = store.initialize().await;
        assert!(matches!(result, Err(Error::FixtureError(_))));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = Storefront::builder(MemoryStorage::new())
            .with_config(StoreConfig::default().with_shipping_constant(-1.0))
            .build();
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_clone_shares_repositories() {
        let store = Storefront::new(MemoryStorage::new()).unwrap();
        store.initialize().await.unwrap();
        let other = store.clone();

        other
            .users()
            .login_user(Credentials::new("admin@skyport.qa", "admin1234"))
            .unwrap();
        assert!(store.current_user().unwrap().is_admin());
        assert!(Arc::ptr_eq(&store.products, &other.products));
    }

    #[tokio::test]
    async fn test_storefront_thread_safety() {
        let store = Storefront::new(MemoryStorage::new()).unwrap();
        store.initialize().await.unwrap();
        let ids: Vec<_> = store
            .products()
            .get_all_products()
            .iter()
            .map(|p| p.id)
            .collect();

        let mut handles = vec![];
        for id in ids.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .products()
                    .add_product_to_cart(id, 1)
                    .expect("Failed to add to cart");
            }));
        }
        for handle in handles {
            handle.await.expect("Task failed");
        }

        assert_eq!(store.products().cart().number_of_units(), ids.len() as u64);
    }
}
