//! Password digests and registration checks.
//!
//! Passwords are stored as the unsalted SHA-256 hex digest of their UTF-8
//! plaintext. This keeps stored accounts compatible with existing data; it
//! offers no protection if the user partition leaks.

use crate::error::{Error, Result};
use crate::models::ShippingAddress;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 hex digest of a password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Hash a plaintext password.
    pub fn from_plaintext(plaintext: &str) -> Self {
        PasswordDigest(hex::encode(Sha256::digest(plaintext.as_bytes())))
    }

    /// Check a plaintext password against this digest.
    pub fn matches(&self, plaintext: &str) -> bool {
        *self == Self::from_plaintext(plaintext)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the stored value has the shape of a SHA-256 hex digest.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(..)")
    }
}

/// Login payload. The password is plaintext.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Registration payload. The password is plaintext.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
    pub email: String,
    pub phone: String,
    pub password: String,
    #[serde(default)]
    pub shipping_address: Option<ShippingAddress>,
}

/// Minimum accepted password length at registration.
pub const MIN_PASSWORD_LENGTH: usize = 8;

impl Registration {
    /// Check the registration form rules.
    ///
    /// # Errors
    ///
    /// Returns `Error::ValidationError` naming the first failing field.
    pub fn validate(&self) -> Result<()> {
        if self.first_name.trim().is_empty() {
            return Err(Error::ValidationError("first name is required".to_string()));
        }
        validate_email(&self.email)?;
        validate_phone(&self.phone)?;
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(Error::ValidationError(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            )));
        }
        Ok(())
    }
}

/// Check that `email` looks like `local@domain.tld`.
pub fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain
                    .split_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(Error::ValidationError(format!("invalid email address: {}", email)))
    }
}

/// Check that `phone` uses the `+974-XXXX-XXXX` format.
pub fn validate_phone(phone: &str) -> Result<()> {
    let mut parts = phone.split('-');
    let valid = matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("+974"), Some(a), Some(b), None)
            if a.len() == 4 && b.len() == 4
                && a.chars().chain(b.chars()).all(|c| c.is_ascii_digit())
    );

    if valid {
        Ok(())
    } else {
        Err(Error::ValidationError(format!(
            "phone number must look like +974-XXXX-XXXX, got {}",
            phone
        )))
    }
}
