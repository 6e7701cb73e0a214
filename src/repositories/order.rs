//! Orders placed by customers.

use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::entity::{EntityId, ADMIN_ID};
use crate::error::{Error, Result};
use crate::events::{ListenerId, RepositoryEvent, RepositoryEventKind};
use crate::fixtures::{FixtureSource, DEFAULT_ORDERS};
use crate::models::{Order, OrderLine, Product};
use crate::repository::{LocalRepository, Repository};
use crate::session::Session;
use crate::storage::Storage;
use std::sync::Arc;

pub struct OrderRepository<S: Storage> {
    base: Repository<Order, S>,
    session: Arc<Session<S>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    fixtures: Arc<dyn FixtureSource>,
}

impl<S: Storage> OrderRepository<S> {
    pub fn new(
        storage: S,
        session: Arc<Session<S>>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        fixtures: Arc<dyn FixtureSource>,
    ) -> Self {
        OrderRepository {
            base: Repository::new(storage),
            session,
            config,
            clock,
            fixtures,
        }
    }

    pub fn get_order(&self, id: EntityId) -> Option<Order> {
        self.base.get_item(id)
    }

    pub fn number_of_orders(&self) -> usize {
        self.base.number_of_items()
    }

    /// Orders of one user, oldest first.
    pub fn get_orders_by_user(&self, user_id: EntityId) -> Vec<Order> {
        let mut orders = self.base.filter(|order| order.user_id == user_id);
        orders.sort_by_key(|order| (order.date_time, order.id));
        orders
    }

    /// Base checks plus ownership: the order must belong to the logged-in
    /// customer.
    ///
    /// # Errors
    ///
    /// - `Error::Unauthenticated` if nobody is logged in
    /// - `Error::ValidationError` for an admin order, an order owned by
    ///   another user, or broken order figures
    pub fn validate_add_order(&self, order: &Order) -> Result<()> {
        self.base.validate_add(order)?;

        let current = self
            .session
            .current_user()
            .ok_or_else(|| Error::Unauthenticated("log in to place an order".to_string()))?;

        if current.is_admin() || order.user_id == ADMIN_ID {
            return Err(Error::ValidationError(
                "Only customers can make orders".to_string(),
            ));
        }
        if order.user_id != current.id {
            return Err(Error::ValidationError(format!(
                "order {} belongs to user {} but user {} is logged in",
                order.id, order.user_id, current.id
            )));
        }
        Ok(())
    }

    pub fn add_order(&self, order: Order) -> Result<Order> {
        self.base.ensure_initialized()?;
        self.validate_add_order(&order)?;
        self.base.add_item(order)
    }

    /// Add several orders with one storage write; all or none.
    pub fn add_orders(&self, orders: Vec<Order>) -> Result<Vec<Order>> {
        self.base.ensure_initialized()?;
        for order in &orders {
            self.validate_add_order(order)?;
        }
        self.base.add_items(orders)
    }

    pub fn update_order(&self, order: Order) -> Result<Order> {
        self.base.update_item(order)
    }

    /// Place an order for the logged-in customer, priced from `product` now.
    pub fn create_order(&self, product: &Product, quantity: u32) -> Result<Order> {
        let customer = self
            .session
            .current_user()
            .ok_or_else(|| Error::Unauthenticated("log in to place an order".to_string()))?;

        let line = OrderLine::for_product(product, quantity, &self.config);
        let order = Order::place(self.base.allocate_id()?, &customer, line, self.clock.now())?;
        self.add_order(order)
    }

    pub fn listen<F>(&self, kind: RepositoryEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RepositoryEvent<Order>) + Send + Sync + 'static,
    {
        self.base.listen(kind, callback)
    }
}

impl<S: Storage> LocalRepository<S> for OrderRepository<S> {
    type Model = Order;

    fn base(&self) -> &Repository<Order, S> {
        &self.base
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    // Seed orders are history: they skip the ownership check.
    async fn add_default_data(&self) -> Result<()> {
        if self.base.number_of_items() > 0 {
            return Ok(());
        }
        let records = self.fixtures.load(DEFAULT_ORDERS).await?;
        let count = self.base.seed(records)?;
        debug!("Seeded {} default orders", count);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::fixtures::StaticFixtures;
    use crate::models::product::tests::drone;
    use crate::models::user::tests::registration;
    use crate::models::User;
    use crate::storage::MemoryStorage;
    use chrono::{Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn setup() -> (OrderRepository<MemoryStorage>, Arc<Session<MemoryStorage>>, User) {
        let storage = MemoryStorage::new();
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        ));
        let session = Arc::new(Session::new(storage.clone(), clock.clone(), Duration::days(7)));
        let orders = OrderRepository::new(
            storage,
            Arc::clone(&session),
            StoreConfig::default(),
            clock,
            Arc::new(StaticFixtures::new()),
        );
        orders.initialize().await.expect("Failed to initialize orders");

        let mut rng = StdRng::seed_from_u64(5);
        let customer = User::customer(21, &registration("jane@example.com"), &mut rng);
        (orders, session, customer)
    }

    #[tokio::test]
    async fn test_create_order_for_current_customer() {
        let (orders, session, customer) = setup().await;
        session.establish(&customer).unwrap();

        let order = orders.create_order(&drone(3, 50.0, 10, 8.0), 2).unwrap();
        assert_eq!(order.user_id, 21);
        assert_eq!(order.total, 104.0);
        assert_eq!(orders.get_orders_by_user(21), vec![order]);
    }

    #[tokio::test]
    async fn test_order_requires_login() {
        let (orders, _, _) = setup().await;
        let result = orders.create_order(&drone(3, 50.0, 10, 8.0), 1);
        assert!(matches!(result, Err(Error::Unauthenticated(_))));
        assert_eq!(orders.number_of_orders(), 0);
    }

    #[tokio::test]
    async fn test_order_for_someone_else_rejected() {
        let (orders, session, customer) = setup().await;
        session.establish(&customer).unwrap();

        let line = OrderLine::for_product(&drone(3, 50.0, 10, 8.0), 1, &StoreConfig::default());
        let mut other = customer.clone();
        other.id = 22;
        let order = Order::place(99, &other, line, Utc::now()).unwrap();

        assert!(matches!(
            orders.add_order(order),
            Err(Error::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_rejected_as_a_whole() {
        let (orders, session, customer) = setup().await;
        session.establish(&customer).unwrap();

        let config = StoreConfig::default();
        let good = OrderLine::for_product(&drone(3, 50.0, 10, 8.0), 1, &config);
        let mut bad = Order::place(2, &customer, good, Utc::now()).unwrap();
        bad.total = 0.0;

        let first = Order::place(1, &customer, good, Utc::now()).unwrap();
        let result = orders.add_orders(vec![first, bad]);
        assert!(result.is_err());
        assert_eq!(orders.number_of_orders(), 0);
    }
}
