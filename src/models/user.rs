//! Accounts: the single admin and registered customers.

use crate::auth::{PasswordDigest, Registration};
use crate::config::USERS_KEY;
use crate::entity::{ensure_amount, Entity, EntityId, ADMIN_ID};
use crate::error::{Error, Result};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Colours an avatar can be given at registration.
pub const AVATAR_COLORS: [&str; 8] = [
    "red", "orange", "amber", "lime", "emerald", "sky", "indigo", "rose",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub first: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub label: String,
    pub street: String,
    pub city: String,
    pub country: String,
    /// Maps link to the address.
    pub url: String,
}

/// What kind of account a user is.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Role {
    Admin,
    Customer {
        #[serde(
            default,
            rename = "shippingAddress",
            skip_serializing_if = "Option::is_none"
        )]
        shipping_address: Option<ShippingAddress>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub name: Name,
    /// Unique across all users.
    pub email: String,
    pub phone: String,
    pub password: PasswordDigest,
    pub avatar_color: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(flatten)]
    pub role: Role,
}

impl User {
    /// Build a customer account from a registration form.
    ///
    /// The password is hashed and a random avatar colour is chosen.
    pub fn customer<R: Rng + ?Sized>(
        id: EntityId,
        registration: &Registration,
        rng: &mut R,
    ) -> Self {
        let last = registration
            .last_name
            .as_ref()
            .map(|last| last.trim().to_string())
            .filter(|last| !last.is_empty());

        User {
            id,
            name: Name {
                first: registration.first_name.trim().to_string(),
                last,
            },
            email: registration.email.trim().to_string(),
            phone: registration.phone.clone(),
            password: PasswordDigest::from_plaintext(&registration.password),
            avatar_color: random_avatar_color(rng),
            balance: 0.0,
            role: Role::Customer {
                shipping_address: registration.shipping_address.clone(),
            },
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    pub fn first_name(&self) -> &str {
        &self.name.first
    }

    pub fn last_name(&self) -> &str {
        self.name.last.as_deref().unwrap_or_default()
    }

    pub fn full_name(&self) -> String {
        match &self.name.last {
            Some(last) => format!("{} {}", self.name.first, last),
            None => self.name.first.clone(),
        }
    }

    /// Initials shown in the avatar, e.g. `JD` for Jane Doe.
    pub fn acronym(&self) -> String {
        std::iter::once(self.name.first.as_str())
            .chain(self.name.last.as_deref())
            .filter_map(|part| part.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    /// The customer's shipping address, if any.
    pub fn shipping_address(&self) -> Option<&ShippingAddress> {
        match &self.role {
            Role::Customer { shipping_address } => shipping_address.as_ref(),
            Role::Admin => None,
        }
    }

    /// Case-insensitive email comparison.
    pub fn has_email(&self, email: &str) -> bool {
        self.email.trim().eq_ignore_ascii_case(email.trim())
    }
}

impl Entity for User {
    fn id(&self) -> EntityId {
        self.id
    }

    fn storage_key() -> &'static str {
        USERS_KEY
    }

    fn validate(&self) -> Result<()> {
        match (&self.role, self.id) {
            (Role::Admin, ADMIN_ID) => {}
            (Role::Admin, id) => {
                return Err(Error::ValidationError(format!(
                    "the admin account must use id {}, got {}",
                    ADMIN_ID, id
                )))
            }
            (Role::Customer { .. }, ADMIN_ID) => {
                return Err(Error::ValidationError(format!(
                    "id {} is reserved for the admin account",
                    ADMIN_ID
                )))
            }
            (Role::Customer { .. }, _) => {}
        }

        if self.name.first.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "user {} has no first name",
                self.id
            )));
        }
        if !self.email.contains('@') {
            return Err(Error::ValidationError(format!(
                "user {} has an invalid email",
                self.id
            )));
        }
        if !self.password.is_well_formed() {
            return Err(Error::ValidationError(format!(
                "user {} has a malformed password digest",
                self.id
            )));
        }
        ensure_amount("balance", self.balance)
    }
}

fn random_avatar_color<R: Rng + ?Sized>(rng: &mut R) -> String {
    AVATAR_COLORS
        .choose(rng)
        .copied()
        .unwrap_or(AVATAR_COLORS[0])
        .to_string()
}
