//! Accounts, login and the current session.

use crate::auth::{Credentials, Registration};
use crate::config::{StoreConfig, SESSION_KEY, USERS_KEY};
use crate::entity::{EntityId, ADMIN_ID};
use crate::error::{Error, Result};
use crate::events::{AuthEvent, AuthEventKind, EventBus, ListenerId};
use crate::fixtures::{FixtureSource, DEFAULT_ADMIN};
use crate::models::{Transaction, User, MONEY_EPSILON};
use crate::repository::{LocalRepository, Repository};
use crate::session::Session;
use crate::storage::{ChangeSet, Storage};
use std::sync::Arc;

pub struct UserRepository<S: Storage> {
    base: Repository<User, S>,
    session: Arc<Session<S>>,
    config: StoreConfig,
    fixtures: Arc<dyn FixtureSource>,
    auth_events: EventBus<AuthEvent>,
}

impl<S: Storage> UserRepository<S> {
    pub fn new(
        storage: S,
        session: Arc<Session<S>>,
        config: StoreConfig,
        fixtures: Arc<dyn FixtureSource>,
    ) -> Self {
        UserRepository {
            base: Repository::new(storage),
            session,
            config,
            fixtures,
            auth_events: EventBus::new(),
        }
    }

    pub fn session(&self) -> &Session<S> {
        &self.session
    }

    pub fn get_user(&self, id: EntityId) -> Option<User> {
        self.base.get_item(id)
    }

    /// Case-insensitive lookup.
    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.base.find(|user| user.has_email(email))
    }

    pub fn number_of_users(&self) -> usize {
        self.base.number_of_items()
    }

    pub fn all_users(&self) -> Vec<User> {
        self.base.all_items()
    }

    /// Base checks plus email uniqueness.
    pub fn validate_add_user(&self, user: &User) -> Result<()> {
        self.base.validate_add(user)?;
        self.ensure_email_free(&user.email, user.id)
    }

    fn ensure_email_free(&self, email: &str, owner: EntityId) -> Result<()> {
        match self.get_user_by_email(email) {
            Some(existing) if existing.id != owner => {
                Err(Error::DuplicateEmail(email.trim().to_string()))
            }
            _ => Ok(()),
        }
    }

    pub fn add_user(&self, user: User) -> Result<User> {
        self.base.ensure_initialized()?;
        self.validate_add_user(&user)?;
        self.base.add_item(user)
    }

    /// Replace a stored user, keeping the session copy in sync.
    pub fn update_user(&self, user: User) -> Result<User> {
        self.ensure_email_free(&user.email, user.id)?;
        let user = self.base.update_item(user)?;
        self.session.refresh(&user);
        Ok(user)
    }

    /// Create a customer account and log it in.
    ///
    /// # Errors
    ///
    /// - `Error::ValidationError` if the form breaks a registration rule
    /// - `Error::DuplicateEmail` if the email is already registered
    pub fn register_user(&self, registration: Registration) -> Result<User> {
        registration.validate()?;
        if self.get_user_by_email(&registration.email).is_some() {
            return Err(Error::DuplicateEmail(registration.email.trim().to_string()));
        }

        let id = self.base.allocate_id()?;
        let user = User::customer(id, &registration, &mut rand::rng());
        let user = self.add_user(user)?;
        self.session.establish(&user)?;

        info!("Registered user {}", user.id);
        self.auth_events.emit(&AuthEvent::Register(user.clone()));
        Ok(user)
    }

    /// Check credentials and log the account in.
    ///
    /// # Errors
    ///
    /// - `Error::AccountNotFound` if no account uses the email
    /// - `Error::IncorrectPassword` if the account exists but the password differs
    pub fn login_user(&self, credentials: Credentials) -> Result<User> {
        self.base.ensure_initialized()?;
        let user = self
            .get_user_by_email(&credentials.email)
            .ok_or_else(|| Error::AccountNotFound(credentials.email.trim().to_string()))?;

        if !user.password.matches(&credentials.password) {
            debug!("Wrong password for user {}", user.id);
            return Err(Error::IncorrectPassword);
        }

        self.session.establish(&user)?;
        info!("User {} logged in", user.id);
        self.auth_events.emit(&AuthEvent::Login(user.clone()));
        Ok(user)
    }

    /// Log back in the user named by a live session marker.
    ///
    /// Returns `Ok(None)` when there is no marker or it has expired.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the marker names a user that does not
    /// exist; the marker is removed first.
    pub fn login_from_session(&self) -> Result<Option<User>> {
        self.base.ensure_initialized()?;
        let Some(id) = self.session.restore_marker()? else {
            return Ok(None);
        };

        match self.get_user(id) {
            Some(user) => {
                self.session.set_current(Some(user.clone()));
                info!("Restored session of user {}", user.id);
                self.auth_events.emit(&AuthEvent::Login(user.clone()));
                Ok(Some(user))
            }
            None => {
                self.session.clear()?;
                Err(Error::NotFound(format!("session user {}", id)))
            }
        }
    }

    /// Log out and reload the user cache from storage.
    pub fn logout_user(&self) -> Result<()> {
        let previous = self.session.current_user_id();
        self.session.clear()?;

        info!("User {:?} logged out", previous);
        self.auth_events.emit(&AuthEvent::Logout);
        self.base.reload()?;
        Ok(())
    }

    /// Apply a recorded transaction to its owner's balance.
    ///
    /// # Errors
    ///
    /// - `Error::NotFound` if the owner does not exist
    /// - `Error::ValidationError` if a withdrawal exceeds the balance
    pub fn apply_transaction(&self, transaction: &Transaction) -> Result<User> {
        let mut user = self.get_user(transaction.user_id).ok_or_else(|| {
            Error::NotFound(format!(
                "user {} of transaction {}",
                transaction.user_id, transaction.id
            ))
        })?;

        let balance = user.balance + transaction.balance_delta();
        if balance < -MONEY_EPSILON {
            return Err(Error::ValidationError(format!(
                "insufficient balance: {} available, {} requested",
                user.balance, transaction.amount
            )));
        }

        user.balance = balance.max(0.0);
        debug!(
            "Balance of user {} is now {} after {} {}",
            user.id, user.balance, transaction.kind, transaction.amount
        );
        self.update_user(user)
    }

    pub fn listen_auth<F>(&self, kind: AuthEventKind, callback: F) -> ListenerId
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.auth_events.listen(kind, callback)
    }

    pub fn unlisten_auth(&self, id: ListenerId) -> bool {
        self.auth_events.unlisten(id)
    }

    fn sync_session(&self, changes: &ChangeSet) -> Result<()> {
        if changes.touches(SESSION_KEY) {
            match self.session.restore_marker()? {
                Some(id) if self.session.current_user_id() != Some(id) => {
                    debug!("Session changed in another tab, switching to user {}", id);
                    self.session.set_current(self.get_user(id));
                }
                Some(_) => {}
                None => {
                    if self.session.is_authenticated() {
                        debug!("Logged out in another tab");
                        self.session.set_current(None);
                    }
                }
            }
        }

        if changes.touches(USERS_KEY) {
            if let Some(id) = self.session.current_user_id() {
                self.session.set_current(self.get_user(id));
            }
        }
        Ok(())
    }
}

impl<S: Storage> LocalRepository<S> for UserRepository<S> {
    type Model = User;

    fn base(&self) -> &Repository<User, S> {
        &self.base
    }

    fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Seed the admin account if it is missing.
    async fn add_default_data(&self) -> Result<()> {
        if self.base.contains(ADMIN_ID) {
            return Ok(());
        }

        let records = self.fixtures.load(DEFAULT_ADMIN).await?;
        let count = self.base.seed(records)?;
        if !self.base.get_item(ADMIN_ID).is_some_and(|admin| admin.is_admin()) {
            return Err(Error::FixtureError(format!(
                "{} does not define the admin account",
                DEFAULT_ADMIN
            )));
        }

        info!("Seeded {} default users", count);
        Ok(())
    }

    fn reconcile_extra(&self, changes: &ChangeSet) -> Result<()> {
        self.sync_session(changes)
    }
}
