//! Catalogue products.

use crate::config::{StoreConfig, PRODUCTS_KEY};
use crate::entity::{ensure_amount, Entity, EntityId};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Highest possible rating.
pub const MAX_RATING: f64 = 5.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// How the product's 3D model is placed in the viewer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub url: String,
    pub position: Vec3,
    /// Degrees.
    pub rotation: Vec3,
    pub scale: f64,
    pub camera_position: Vec3,
}

/// Product family, e.g. `Mavic` / `3 Pro` / `Aerial Photography`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub model: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub name: String,
    pub image_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedItem {
    pub name: String,
    pub quantity: u32,
    pub image_url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

/// A drone in the catalogue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: EntityId,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub image_url: String,
    pub price: f64,
    /// Units in stock.
    pub quantity: u32,
    /// Grams.
    pub weight: f64,
    /// Minutes.
    pub flight_time: f64,
    /// Out of 5, in half points.
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub number_of_reviews: u32,
    #[serde(default)]
    pub number_of_sales: u32,
    #[serde(default)]
    pub number_of_ongoing_orders: u32,
    pub model: ModelDescriptor,
    pub series: Series,
    #[serde(default)]
    pub features: Vec<Feature>,
    #[serde(default)]
    pub included_items: Vec<IncludedItem>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
}

impl Product {
    /// Create a new catalogue entry with no rating and no sales history.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: EntityId,
        name: impl Into<String>,
        description: impl Into<String>,
        price: f64,
        quantity: u32,
        weight: f64,
        flight_time: f64,
        series: Series,
    ) -> Self {
        Product {
            id,
            name: name.into(),
            description: description.into(),
            image_url: String::new(),
            price,
            quantity,
            weight,
            flight_time,
            rating: 0.0,
            number_of_reviews: 0,
            number_of_sales: 0,
            number_of_ongoing_orders: 0,
            model: ModelDescriptor::default(),
            series,
            features: Vec::new(),
            included_items: Vec::new(),
            faqs: Vec::new(),
        }
    }

    /// Price of `quantity` units.
    pub fn subtotal_for(&self, quantity: u32) -> f64 {
        self.price * f64::from(quantity)
    }

    /// Shipping fee of `quantity` units.
    pub fn shipping_fee_for(&self, quantity: u32, config: &StoreConfig) -> f64 {
        config.shipping_fee(self.weight, quantity)
    }

    pub fn in_stock(&self) -> bool {
        self.quantity > 0
    }
}

impl Entity for Product {
    fn id(&self) -> EntityId {
        self.id
    }

    fn storage_key() -> &'static str {
        PRODUCTS_KEY
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::ValidationError(format!(
                "product {} has no name",
                self.id
            )));
        }
        ensure_amount("price", self.price)?;
        ensure_amount("weight", self.weight)?;
        ensure_amount("flight time", self.flight_time)?;

        let doubled = self.rating * 2.0;
        if !(0.0..=MAX_RATING).contains(&self.rating) || doubled.fract() != 0.0 {
            return Err(Error::ValidationError(format!(
                "rating must be between 0 and 5 in half points, got {}",
                self.rating
            )));
        }

        Ok(())
    }
}
