//! Catalogue, cart and checkout.
//!
//! The product repository owns two pieces of state: the product partition
//! and the cart singleton. Checkout is the only operation that writes to
//! other repositories; it validates everything first and rolls every touched
//! partition back if a write fails.

use super::{OrderRepository, TransactionRepository, UserRepository};
use crate::clock::Clock;
use crate::config::{StoreConfig, CART_KEY};
use crate::entity::{EntityId, ADMIN_ID};
use crate::error::{Error, Result};
use crate::events::{
    CartEvent, CartEventKind, EventBus, ListenerId, RepositoryEvent, RepositoryEventKind,
};
use crate::fixtures::{FixtureSource, PRODUCT_LIST};
use crate::models::{
    Cart, CartChange, Order, OrderLine, Product, Series, Transaction, TransactionType, User,
};
use crate::repository::{LocalRepository, Repository};
use crate::serialization::{decode_value, encode_value};
use crate::session::Session;
use crate::storage::{ChangeSet, Storage};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// What a successful checkout produced.
#[derive(Clone, Debug, PartialEq)]
pub struct Purchase {
    /// One order per cart line.
    pub orders: Vec<Order>,
    /// The single withdrawal covering every order.
    pub transaction: Transaction,
}

impl Purchase {
    pub fn grand_total(&self) -> f64 {
        self.transaction.amount
    }
}

// Everything checkout may touch, taken before the first write.
struct Snapshots {
    products: BTreeMap<EntityId, Product>,
    users: BTreeMap<EntityId, User>,
    orders: BTreeMap<EntityId, Order>,
    transactions: BTreeMap<EntityId, Transaction>,
    cart: Cart,
}

pub struct ProductRepository<S: Storage> {
    base: Repository<Product, S>,
    cart: RwLock<Cart>,
    cart_events: EventBus<CartEvent>,
    session: Arc<Session<S>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    fixtures: Arc<dyn FixtureSource>,
    users: Arc<UserRepository<S>>,
    orders: Arc<OrderRepository<S>>,
    transactions: Arc<TransactionRepository<S>>,
}

impl<S: Storage> ProductRepository<S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        storage: S,
        session: Arc<Session<S>>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        fixtures: Arc<dyn FixtureSource>,
        users: Arc<UserRepository<S>>,
        orders: Arc<OrderRepository<S>>,
        transactions: Arc<TransactionRepository<S>>,
    ) -> Self {
        ProductRepository {
            base: Repository::new(storage),
            cart: RwLock::new(Cart::default()),
            cart_events: EventBus::new(),
            session,
            config,
            clock,
            fixtures,
            users,
            orders,
            transactions,
        }
    }

    // ========================================================================
    // Catalogue
    // ========================================================================

    pub fn get_product(&self, id: EntityId) -> Option<Product> {
        self.base.get_item(id)
    }

    /// Every product, ordered by id.
    pub fn get_all_products(&self) -> Vec<Product> {
        self.base.all_items()
    }

    pub fn number_of_products(&self) -> usize {
        self.base.number_of_items()
    }

    pub fn add_product(&self, product: Product) -> Result<Product> {
        self.base.add_item(product)
    }

    pub fn update_product(&self, product: Product) -> Result<Product> {
        self.base.update_item(product)
    }

    /// Distinct series by name, in catalogue order.
    pub fn get_all_series(&self) -> Vec<Series> {
        let mut seen = HashSet::new();
        self.get_all_products()
            .into_iter()
            .map(|product| product.series)
            .filter(|series| seen.insert(series.name.clone()))
            .collect()
    }

    pub fn get_products_by_series(&self, name: &str) -> Vec<Product> {
        self.base.filter(|product| product.series.name == name)
    }

    pub fn listen<F>(&self, kind: RepositoryEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RepositoryEvent<Product>) + Send + Sync + 'static,
    {
        self.base.listen(kind, callback)
    }

    // ========================================================================
    // Cart
    // ========================================================================

    pub fn cart(&self) -> Cart {
        self.cart.read().clone()
    }

    pub fn is_cart_empty(&self) -> bool {
        self.cart.read().is_empty()
    }

    pub fn cart_quantity(&self, product_id: EntityId) -> u32 {
        self.cart.read().quantity_of(product_id)
    }

    pub fn add_product_to_cart(
        &self,
        product_id: EntityId,
        quantity: u32,
    ) -> Result<Option<CartChange>> {
        self.increment_cart_item(product_id, i64::from(quantity))
    }

    pub fn remove_product_from_cart(
        &self,
        product_id: EntityId,
        quantity: u32,
    ) -> Result<Option<CartChange>> {
        self.increment_cart_item(product_id, -i64::from(quantity))
    }

    /// Set the cart quantity of a product, clamped to its stock.
    pub fn update_item_in_cart(
        &self,
        product_id: EntityId,
        quantity: u32,
    ) -> Result<Option<CartChange>> {
        let delta = i64::from(quantity) - i64::from(self.cart_quantity(product_id));
        self.increment_cart_item(product_id, delta)
    }

    /// Move a product's cart quantity by `delta`, clamped to `[0, stock]`.
    ///
    /// Returns `Ok(None)` without persisting or emitting anything when the
    /// clamped quantity does not change.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the product does not exist.
    pub fn increment_cart_item(
        &self,
        product_id: EntityId,
        delta: i64,
    ) -> Result<Option<CartChange>> {
        self.base.ensure_initialized()?;
        let product = self
            .get_product(product_id)
            .ok_or_else(|| Error::NotFound(format!("product {}", product_id)))?;

        let change = {
            let mut cart = self.cart.write();
            let mut next = cart.clone();
            let Some(change) = next.apply_delta(&product, delta, &self.config) else {
                return Ok(None);
            };
            self.persist_cart(&next)?;
            *cart = next;
            change
        };

        debug!(
            "Cart quantity of product {}: {} -> {}",
            change.product_id, change.previous, change.current
        );
        let event = if change.is_addition() {
            CartEvent::Add {
                product_id: change.product_id,
                previous: change.previous,
                current: change.current,
            }
        } else {
            CartEvent::Remove {
                product_id: change.product_id,
                previous: change.previous,
                current: change.current,
            }
        };
        self.cart_events.emit(&event);
        Ok(Some(change))
    }

    pub fn clear_cart(&self) -> Result<()> {
        self.base.ensure_initialized()?;
        {
            let mut cart = self.cart.write();
            let empty = Cart::default();
            self.persist_cart(&empty)?;
            *cart = empty;
        }
        debug!("Cart cleared");
        self.cart_events.emit(&CartEvent::Clear);
        Ok(())
    }

    pub fn listen_cart<F>(&self, kind: CartEventKind, callback: F) -> ListenerId
    where
        F: Fn(&CartEvent) + Send + Sync + 'static,
    {
        self.cart_events.listen(kind, callback)
    }

    pub fn unlisten_cart(&self, id: ListenerId) -> bool {
        self.cart_events.unlisten(id)
    }

    fn persist_cart(&self, cart: &Cart) -> Result<()> {
        self.base.storage().set(CART_KEY, encode_value(cart)?)
    }

    fn restore_cart(&self, cart: Cart) -> Result<()> {
        let mut current = self.cart.write();
        self.persist_cart(&cart)?;
        *current = cart;
        Ok(())
    }

    /// Replace the in-memory cart with the stored one.
    ///
    /// An unreadable cart is discarded.
    fn load_cart(&self) -> Result<()> {
        let cart = match self.base.storage().get(CART_KEY)? {
            Some(raw) => match decode_value::<Cart>(&raw) {
                Ok(cart) => cart,
                Err(e) => {
                    warn!("Discarding unreadable cart: {}", e);
                    self.base.storage().remove(CART_KEY)?;
                    Cart::default()
                }
            },
            None => Cart::default(),
        };
        *self.cart.write() = cart;
        Ok(())
    }

    /// Drop cart lines whose product no longer exists and reprice the rest.
    ///
    /// Re-seeding a catalogue without fixed ids gives every product a new id,
    /// which strands the lines of a cart stored beside it. Returns true if
    /// the cart changed.
    fn prune_cart(&self) -> Result<bool> {
        let mut cart = self.cart.write();
        let stale: Vec<EntityId> = cart
            .items
            .keys()
            .copied()
            .filter(|&id| !self.base.contains(id))
            .collect();
        if stale.is_empty() {
            return Ok(false);
        }

        let mut kept = cart.clone();
        for id in &stale {
            kept.items.remove(id);
        }
        let pruned = kept.recomputed(|id| self.base.get_item(id), &self.config);
        self.persist_cart(&pruned)?;
        *cart = pruned;

        warn!(
            "Dropped {} cart lines for products that no longer exist: {:?}",
            stale.len(),
            stale
        );
        Ok(true)
    }

    // ========================================================================
    // Checkout
    // ========================================================================

    /// Turn the cart into orders, one withdrawal and stock decrements.
    ///
    /// Each line is repriced from the current product data; the cart's own
    /// totals are not used. Either every write happens or none does.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError` for an empty cart, an admin customer, a
    ///   line exceeding stock, or a total above the balance
    /// - `Error::Unauthenticated` if nobody is logged in
    /// - `Error::NotFound` if a cart line names a missing product
    pub fn confirm_purchase(&self) -> Result<Purchase> {
        self.base.ensure_initialized()?;

        let cart = self.cart();
        if cart.is_empty() {
            return Err(Error::ValidationError("Cannot check out an empty cart".to_string()));
        }
        let customer = self
            .session
            .current_user()
            .ok_or_else(|| Error::Unauthenticated("log in to check out".to_string()))?;
        if customer.is_admin() || customer.id == ADMIN_ID {
            return Err(Error::ValidationError(
                "The admin account cannot make purchases".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(cart.items.len());
        for (&product_id, &quantity) in &cart.items {
            let product = self
                .get_product(product_id)
                .ok_or_else(|| Error::NotFound(format!("product {} in cart", product_id)))?;
            if quantity > product.quantity {
                return Err(Error::ValidationError(format!(
                    "only {} of {} left in stock, {} requested",
                    product.quantity, product.name, quantity
                )));
            }
            lines.push((product.clone(), OrderLine::for_product(&product, quantity, &self.config)));
        }
        let grand_total: f64 = lines.iter().map(|(_, line)| line.total).sum();

        let now = self.clock.now();
        let mut reserved = HashSet::new();
        let mut orders = Vec::with_capacity(lines.len());
        for (_, line) in &lines {
            let id = self.orders.base().allocate_id_excluding(&reserved)?;
            reserved.insert(id);
            let order = Order::place(id, &customer, *line, now)?;
            self.orders.validate_add_order(&order)?;
            orders.push(order);
        }

        let withdrawal = Transaction::new(
            self.transactions.base().allocate_id()?,
            customer.id,
            grand_total,
            TransactionType::Withdrawal,
            now,
        );
        self.transactions.validate_add_transaction(&withdrawal)?;

        let snapshots = self.take_snapshots();
        match self.commit_purchase(orders, withdrawal, &lines) {
            Ok(purchase) => {
                info!(
                    "User {} checked out {} orders for {}",
                    customer.id,
                    purchase.orders.len(),
                    purchase.grand_total()
                );
                Ok(purchase)
            }
            Err(e) => {
                error!("Checkout for user {} failed: {}", customer.id, e);
                self.roll_back(snapshots);
                Err(e)
            }
        }
    }

    fn commit_purchase(
        &self,
        orders: Vec<Order>,
        withdrawal: Transaction,
        lines: &[(Product, OrderLine)],
    ) -> Result<Purchase> {
        let orders = self.orders.add_orders(orders)?;
        let transaction = self.transactions.add_transaction(withdrawal)?;

        for (product, line) in lines {
            let mut updated = product.clone();
            updated.quantity = updated.quantity.saturating_sub(line.quantity);
            updated.number_of_sales = updated.number_of_sales.saturating_add(line.quantity);
            updated.number_of_ongoing_orders = updated.number_of_ongoing_orders.saturating_add(1);
            self.base.update_item(updated)?;
        }

        self.clear_cart()?;
        Ok(Purchase {
            orders,
            transaction,
        })
    }

    fn take_snapshots(&self) -> Snapshots {
        Snapshots {
            products: self.base.snapshot(),
            users: self.users.base().snapshot(),
            orders: self.orders.base().snapshot(),
            transactions: self.transactions.base().snapshot(),
            cart: self.cart(),
        }
    }

    fn roll_back(&self, snapshots: Snapshots) {
        let results = [
            self.base.restore(snapshots.products),
            self.users.base().restore(snapshots.users),
            self.orders.base().restore(snapshots.orders),
            self.transactions.base().restore(snapshots.transactions),
            self.restore_cart(snapshots.cart),
        ];
        for e in results.into_iter().filter_map(|result| result.err()) {
            error!("Rolling back checkout failed: {}", e);
        }

        if let Some(id) = self.session.current_user_id() {
            if let Some(user) = self.users.get_user(id) {
                self.session.refresh(&user);
            }
        }
    }
}

impl<S: Storage> LocalRepository<S> for ProductRepository<S> {
    type Model = Product;

    fn base(&self) -> &Repository<Product, S> {
        &self.base
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn add_default_data(&self) -> Result<()> {
        if self.base.number_of_items() > 0 {
            return Ok(());
        }
        let records = self.fixtures.load(PRODUCT_LIST).await?;
        let count = self.base.seed(records)?;
        info!("Seeded {} products", count);
        Ok(())
    }

    fn load_extra(&self) -> Result<()> {
        self.load_cart()?;
        if self.prune_cart()? {
            self.cart_events.emit(&CartEvent::Reload);
        }
        Ok(())
    }

    fn reconcile_extra(&self, changes: &ChangeSet) -> Result<()> {
        let mut reloaded = false;
        if changes.touches(CART_KEY) {
            debug!("Cart changed in another tab, reloading");
            self.load_cart()?;
            reloaded = true;
        }
        if reloaded || changes.touches(self.base.key()) {
            reloaded |= self.prune_cart()?;
        }
        if reloaded {
            self.cart_events.emit(&CartEvent::Reload);
        }
        Ok(())
    }
}
