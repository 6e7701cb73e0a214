//! Seed data sources.
//!
//! Fixtures are JSON arrays of plain records matching each model's stored
//! shape. Records may omit `id`; the seeding repository allocates one.

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::path::PathBuf;

/// Catalogue seeded into the product repository.
pub const PRODUCT_LIST: &str = "product_list";
/// The admin account (id 0).
pub const DEFAULT_ADMIN: &str = "default_admin";
pub const DEFAULT_ORDERS: &str = "default_orders";
pub const DEFAULT_TRANSACTIONS: &str = "default_transactions";

/// Somewhere seed fixtures can be loaded from.
///
/// Loading is the only asynchronous step of initialization.
pub trait FixtureSource: Send + Sync {
    /// Load the records of fixture `name`.
    ///
    /// # Errors
    ///
    /// Returns `Error::FixtureError` if the fixture is missing or is not a
    /// JSON array of objects.
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<serde_json::Value>>>;
}

fn parse_fixture(name: &str, raw: &str) -> Result<Vec<serde_json::Value>> {
    let records: Vec<serde_json::Value> = serde_json::from_str(raw)
        .map_err(|e| Error::FixtureError(format!("{} is not a JSON array: {}", name, e)))?;

    if let Some(position) = records.iter().position(|record| !record.is_object()) {
        return Err(Error::FixtureError(format!(
            "{} record {} is not an object",
            name, position
        )));
    }
    Ok(records)
}

/// Fixtures compiled into the crate from `fixtures/`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BundledFixtures;

impl BundledFixtures {
    fn raw(name: &str) -> Option<&'static str> {
        match name {
            PRODUCT_LIST => Some(include_str!("../fixtures/product_list.json")),
            DEFAULT_ADMIN => Some(include_str!("../fixtures/default_admin.json")),
            DEFAULT_ORDERS => Some(include_str!("../fixtures/default_orders.json")),
            DEFAULT_TRANSACTIONS => Some(include_str!("../fixtures/default_transactions.json")),
            _ => None,
        }
    }
}

impl FixtureSource for BundledFixtures {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<serde_json::Value>>> {
        Box::pin(async move {
            let raw = Self::raw(name)
                .ok_or_else(|| Error::FixtureError(format!("no bundled fixture {}", name)))?;
            parse_fixture(name, raw)
        })
    }
}

/// Fixtures read from `<root>/<name>.json`.
#[derive(Clone, Debug)]
pub struct DirectoryFixtures {
    root: PathBuf,
}

impl DirectoryFixtures {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryFixtures { root: root.into() }
    }
}

impl FixtureSource for DirectoryFixtures {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<serde_json::Value>>> {
        Box::pin(async move {
            let path = self.root.join(format!("{}.json", name));
            debug!("Loading fixture {}", path.display());
            let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
                Error::FixtureError(format!("cannot read {}: {}", path.display(), e))
            })?;
            parse_fixture(name, &raw)
        })
    }
}

/// Fixtures held in memory, mainly for tests.
///
/// Every known fixture starts out empty.
#[derive(Clone, Debug)]
pub struct StaticFixtures {
    records: HashMap<String, Vec<serde_json::Value>>,
}

impl StaticFixtures {
    pub fn new() -> Self {
        let records = [PRODUCT_LIST, DEFAULT_ADMIN, DEFAULT_ORDERS, DEFAULT_TRANSACTIONS]
            .into_iter()
            .map(|name| (name.to_string(), Vec::new()))
            .collect();
        StaticFixtures { records }
    }

    /// Replace the records of fixture `name`.
    pub fn with(mut self, name: &str, records: Vec<serde_json::Value>) -> Self {
        self.records.insert(name.to_string(), records);
        self
    }

    /// Remove fixture `name` so loading it fails.
    pub fn without(mut self, name: &str) -> Self {
        self.records.remove(name);
        self
    }
}

impl Default for StaticFixtures {
    fn default() -> Self {
        Self::new()
    }
}

impl FixtureSource for StaticFixtures {
    fn load<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Vec<serde_json::Value>>> {
        Box::pin(async move {
            self.records
                .get(name)
                .cloned()
                .ok_or_else(|| Error::FixtureError(format!("no fixture named {}", name)))
        })
    }
}
