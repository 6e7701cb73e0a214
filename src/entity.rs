//! Core entity trait and id allocation.

use crate::error::{Error, Result};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Identifier of every persisted entity.
pub type EntityId = u32;

/// Id reserved for the single admin account.
pub const ADMIN_ID: EntityId = 0;

/// Trait that all persisted entities must implement.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use skyport::entity::{Entity, EntityId};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Coupon {
///     pub id: EntityId,
///     pub code: String,
/// }
///
/// impl Entity for Coupon {
///     fn id(&self) -> EntityId {
///         self.id
///     }
///
///     fn storage_key() -> &'static str {
///         "coupons"
///     }
/// }
/// ```
pub trait Entity: Send + Sync + Serialize + DeserializeOwned + Clone + 'static {
    /// Return the entity's unique id.
    fn id(&self) -> EntityId;

    /// Return the storage key of the partition holding this entity type.
    fn storage_key() -> &'static str;

    /// Check the entity's own field constraints.
    ///
    /// Called before every add/update and after every parse.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Turn a raw stored record back into an entity.
    ///
    /// The stored id is kept verbatim so ids survive reloads.
    ///
    /// # Errors
    ///
    /// - `Error::DeserializationError`: the record does not have the entity's shape
    /// - any error returned by [`validate`](Entity::validate)
    fn parse(data: serde_json::Value) -> Result<Self> {
        let entity: Self = serde_json::from_value(data).map_err(|e| {
            Error::DeserializationError(format!("{} record: {}", Self::storage_key(), e))
        })?;
        entity.validate()?;
        Ok(entity)
    }
}

/// Draw a fresh id that is non-zero and not taken.
///
/// `is_taken` is normally a lookup into the owning repository's live cache,
/// extended with ids reserved by the current batch when several entities
/// are created together.
pub fn allocate_id<R, F>(rng: &mut R, is_taken: F) -> EntityId
where
    R: Rng + ?Sized,
    F: Fn(EntityId) -> bool,
{
    loop {
        let candidate: EntityId = rng.random();
        if candidate != ADMIN_ID && !is_taken(candidate) {
            return candidate;
        }
    }
}

/// Check that a monetary amount is a non-negative finite number.
pub(crate) fn ensure_amount(field: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(Error::ValidationError(format!(
            "{} must be a non-negative amount, got {}",
            field, value
        )))
    }
}
