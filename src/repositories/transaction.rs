//! Balance ledger.
//!
//! Every transaction added here is applied to its owner's balance through
//! the user repository. Seeded transactions are history and are not applied.

use super::UserRepository;
use crate::clock::Clock;
use crate::config::StoreConfig;
use crate::entity::EntityId;
use crate::error::{Error, Result};
use crate::events::{ListenerId, RepositoryEvent, RepositoryEventKind};
use crate::fixtures::{FixtureSource, DEFAULT_TRANSACTIONS};
use crate::models::{Transaction, TransactionType, MONEY_EPSILON};
use crate::repository::{LocalRepository, Repository};
use crate::session::Session;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct TransactionRepository<S: Storage> {
    base: Repository<Transaction, S>,
    session: Arc<Session<S>>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    fixtures: Arc<dyn FixtureSource>,
    users: Arc<UserRepository<S>>,
}

impl<S: Storage> TransactionRepository<S> {
    pub fn new(
        storage: S,
        session: Arc<Session<S>>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
        fixtures: Arc<dyn FixtureSource>,
        users: Arc<UserRepository<S>>,
    ) -> Self {
        TransactionRepository {
            base: Repository::new(storage),
            session,
            config,
            clock,
            fixtures,
            users,
        }
    }

    pub fn get_transaction(&self, id: EntityId) -> Option<Transaction> {
        self.base.get_item(id)
    }

    pub fn number_of_transactions(&self) -> usize {
        self.base.number_of_items()
    }

    pub fn get_transactions_by_user(&self, user_id: EntityId) -> Vec<Transaction> {
        chronological(self.base.filter(|tx| tx.user_id == user_id))
    }

    pub fn get_transactions_by_type(&self, kind: TransactionType) -> Vec<Transaction> {
        chronological(self.base.filter(|tx| tx.kind == kind))
    }

    /// Transactions dated within `[from, to]`.
    pub fn get_transactions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<Transaction> {
        chronological(
            self.base
                .filter(|tx| tx.date_time >= from && tx.date_time <= to),
        )
    }

    /// Base checks plus ownership and, for withdrawals, available balance.
    ///
    /// The balance is read from the user repository, not from the session
    /// copy, so it reflects every applied transaction.
    pub fn validate_add_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.base.validate_add(transaction)?;

        let current = self.session.current_user_id().ok_or_else(|| {
            Error::Unauthenticated("log in to record a transaction".to_string())
        })?;
        if transaction.user_id != current {
            return Err(Error::ValidationError(format!(
                "transaction {} belongs to user {} but user {} is logged in",
                transaction.id, transaction.user_id, current
            )));
        }

        if transaction.kind == TransactionType::Withdrawal {
            let balance = self
                .users
                .get_user(current)
                .map(|user| user.balance)
                .ok_or_else(|| Error::NotFound(format!("user {}", current)))?;

            if transaction.amount > balance + MONEY_EPSILON {
                return Err(Error::ValidationError(format!(
                    "insufficient balance: {} available, {} requested",
                    balance, transaction.amount
                )));
            }
        }
        Ok(())
    }

    /// Record a transaction and apply it to the owner's balance.
    ///
    /// If the balance cannot be updated the transaction is removed again.
    pub fn add_transaction(&self, transaction: Transaction) -> Result<Transaction> {
        self.base.ensure_initialized()?;
        self.validate_add_transaction(&transaction)?;

        let snapshot = self.base.snapshot();
        let transaction = self.base.add_item(transaction)?;
        if let Err(e) = self.users.apply_transaction(&transaction) {
            error!("Failed to apply transaction {}: {}", transaction.id, e);
            self.base.restore(snapshot)?;
            return Err(e);
        }
        Ok(transaction)
    }

    /// Record a transaction of the logged-in user dated now.
    pub fn create_transaction(&self, amount: f64, kind: TransactionType) -> Result<Transaction> {
        let user_id = self.session.current_user_id().ok_or_else(|| {
            Error::Unauthenticated("log in to record a transaction".to_string())
        })?;
        let id = self.base.allocate_id()?;
        self.add_transaction(Transaction::new(id, user_id, amount, kind, self.clock.now()))
    }

    /// Deposit `amount` into the logged-in user's balance.
    pub fn top_up_balance(&self, amount: f64) -> Result<Transaction> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(Error::ValidationError(format!(
                "top-up amount must be positive, got {}",
                amount
            )));
        }
        let transaction = self.create_transaction(amount, TransactionType::Deposit)?;
        info!("User {} topped up {}", transaction.user_id, amount);
        Ok(transaction)
    }

    pub fn listen<F>(&self, kind: RepositoryEventKind, callback: F) -> ListenerId
    where
        F: Fn(&RepositoryEvent<Transaction>) + Send + Sync + 'static,
    {
        self.base.listen(kind, callback)
    }
}

fn chronological(mut transactions: Vec<Transaction>) -> Vec<Transaction> {
    transactions.sort_by_key(|tx| (tx.date_time, tx.id));
    transactions
}

impl<S: Storage> LocalRepository<S> for TransactionRepository<S> {
    type Model = Transaction;

    fn base(&self) -> &Repository<Transaction, S> {
        &self.base
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    async fn add_default_data(&self) -> Result<()> {
        if self.base.number_of_items() > 0 {
            return Ok(());
        }
        let records = self.fixtures.load(DEFAULT_TRANSACTIONS).await?;
        let count = self.base.seed(records)?;
        debug!("Seeded {} default transactions", count);
        Ok(())
    }
}
