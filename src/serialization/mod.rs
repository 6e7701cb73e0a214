//! JSON codec for storage partitions.
//!
//! Every entity partition is stored as one JSON object keyed by entity id:
//!
//! ```text
//! {
//!   "1734411107": { "id": 1734411107, "name": "Mavic 3 Pro", ... },
//!   "2299011650": { "id": 2299011650, "name": "Mini 4 Pro", ... }
//! }
//! ```
//!
//! The whole partition is rewritten on every mutation, so the last writer
//! wins at the granularity of a full snapshot.
//!
//! # Example
//!
//! ```rust
//! use skyport::serialization::{decode_value, encode_value};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Marker { user_id: u32 }
//!
//! # fn main() -> skyport::Result<()> {
//! let json = encode_value(&Marker { user_id: 7 })?;
//! let back: Marker = decode_value(&json)?;
//! assert_eq!(back, Marker { user_id: 7 });
//! # Ok(())
//! # }
//! ```

use crate::entity::{Entity, EntityId};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

/// Serialize a whole partition.
///
/// # Errors
///
/// Returns `Error::SerializationError` if an entity cannot be serialized.
pub fn encode_partition<M: Entity>(items: &BTreeMap<EntityId, M>) -> Result<String> {
    serde_json::to_string(items).map_err(|e| {
        error!("Serializing {} failed: {}", M::storage_key(), e);
        Error::SerializationError(e.to_string())
    })
}

/// Deserialize a whole partition, parsing each record through [`Entity::parse`].
///
/// The first record that fails aborts the whole load.
///
/// # Errors
///
/// Returns `Error::CorruptedData` if the blob is not a JSON object, a key is
/// not an id, a record fails to parse, or a record's id disagrees with its key.
pub fn decode_partition<M: Entity>(raw: &str) -> Result<BTreeMap<EntityId, M>> {
    let records: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(raw).map_err(|e| {
            Error::CorruptedData(format!("{} is not a JSON object: {}", M::storage_key(), e))
        })?;

    let mut items = BTreeMap::new();
    for (key, record) in records {
        let id: EntityId = key.parse().map_err(|_| {
            Error::CorruptedData(format!("{} has a non-numeric key {:?}", M::storage_key(), key))
        })?;

        let item = M::parse(record).map_err(|e| {
            error!("Parsing {} record {} failed: {}", M::storage_key(), key, e);
            Error::CorruptedData(format!("{} record {}: {}", M::storage_key(), key, e))
        })?;

        if item.id() != id {
            return Err(Error::CorruptedData(format!(
                "{} record stored under {} has id {}",
                M::storage_key(),
                id,
                item.id()
            )));
        }

        items.insert(id, item);
    }

    Ok(items)
}

/// Serialize a singleton value.
///
/// # Errors
///
/// Returns `Error::SerializationError` if the value cannot be serialized.
pub fn encode_value<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| Error::SerializationError(e.to_string()))
}

/// Deserialize a singleton value.
///
/// # Errors
///
/// Returns `Error::CorruptedData` if the JSON is malformed or has the wrong shape.
pub fn decode_value<T: DeserializeOwned>(raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::CorruptedData(e.to_string()))
}
