//! Store configuration.
//!
//! Configuration is set once when the [`Storefront`](crate::Storefront) is built:
//!
//! ```
//! use skyport::config::StoreConfig;
//! use chrono::Duration;
//!
//! let config = StoreConfig::default()
//!     .with_shipping_constant(0.5)
//!     .with_session_ttl(Duration::days(2));
//!
//! assert!(config.validate().is_ok());
//! ```

use crate::error::{Error, Result};
use chrono::Duration;

/// Storage key of the product partition.
pub const PRODUCTS_KEY: &str = "products";
/// Storage key of the user partition.
pub const USERS_KEY: &str = "users";
/// Storage key of the order partition.
pub const ORDERS_KEY: &str = "orders";
/// Storage key of the transaction partition.
pub const TRANSACTIONS_KEY: &str = "transactions";
/// Storage key of the cart singleton.
pub const CART_KEY: &str = "cart";
/// Storage key of the session marker.
pub const SESSION_KEY: &str = "session";

/// Default shipping fee per weight unit per item.
pub const DEFAULT_SHIPPING_CONSTANT: f64 = 0.25;

/// Default lifetime of a session marker, in days.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Configuration shared by every repository.
#[derive(Clone, Debug, PartialEq)]
pub struct StoreConfig {
    /// Shipping fee charged per weight unit per item.
    ///
    /// `fee = weight * shipping_constant * quantity`
    pub shipping_constant: f64,

    /// How long a session marker stays valid after login.
    pub session_ttl: Duration,

    /// Wipe and re-seed every partition on each `initialize()`.
    pub development_mode: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            shipping_constant: DEFAULT_SHIPPING_CONSTANT,
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            development_mode: false,
        }
    }
}

impl StoreConfig {
    /// Override the shipping constant.
    pub fn with_shipping_constant(mut self, constant: f64) -> Self {
        self.shipping_constant = constant;
        self
    }

    /// Override the session lifetime.
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Enable or disable development mode.
    pub fn with_development_mode(mut self, enabled: bool) -> Self {
        self.development_mode = enabled;
        self
    }

    /// Build a configuration from `SKYPORT_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` if a variable is set but malformed, or
    /// if the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = StoreConfig::default();

        if let Some(raw) = lookup("SKYPORT_SHIPPING_CONSTANT") {
            config.shipping_constant = raw.trim().parse().map_err(|_| {
                Error::ConfigError(format!("SKYPORT_SHIPPING_CONSTANT is not a number: {}", raw))
            })?;
        }

        if let Some(raw) = lookup("SKYPORT_SESSION_TTL_DAYS") {
            let days: i64 = raw.trim().parse().map_err(|_| {
                Error::ConfigError(format!("SKYPORT_SESSION_TTL_DAYS is not an integer: {}", raw))
            })?;
            config.session_ttl = Duration::days(days);
        }

        if let Some(raw) = lookup("SKYPORT_DEV_MODE") {
            config.development_mode = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" | "" => false,
                other => {
                    return Err(Error::ConfigError(format!(
                        "SKYPORT_DEV_MODE is not a boolean: {}",
                        other
                    )))
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` for a negative or non-finite shipping
    /// constant, or a session lifetime that is not positive.
    pub fn validate(&self) -> Result<()> {
        if !self.shipping_constant.is_finite() || self.shipping_constant < 0.0 {
            return Err(Error::ConfigError(format!(
                "shipping constant must be a non-negative number, got {}",
                self.shipping_constant
            )));
        }

        if self.session_ttl <= Duration::zero() {
            return Err(Error::ConfigError(
                "session lifetime must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Shipping fee for `quantity` items weighing `weight` each.
    pub fn shipping_fee(&self, weight: f64, quantity: u32) -> f64 {
        weight * self.shipping_constant * f64::from(quantity)
    }
}
