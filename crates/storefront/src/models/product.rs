//! Product domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shopkeep_core::cart::LineProduct;
use shopkeep_core::{Price, ProductId};

/// A catalog product.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image_url: Option<String>,
    /// Object-storage key when the image was uploaded rather than linked.
    pub image_key: Option<String>,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// Whether at least one unit is in stock.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock_quantity > 0
    }

    /// Data needed to put this product in a cart.
    #[must_use]
    pub fn as_line_product(&self) -> LineProduct {
        LineProduct {
            product_id: self.id,
            name: self.name.clone(),
            price: self.price,
            image_url: self.image_url.clone(),
        }
    }
}

/// Where a product image lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductImage {
    /// Public URL rendered in `<img src>`.
    pub url: String,
    /// Storage key, present only for uploaded images.
    pub key: Option<String>,
}

impl ProductImage {
    /// An image hosted elsewhere.
    #[must_use]
    pub const fn linked(url: String) -> Self {
        Self { url, key: None }
    }
}

/// Input for product creation.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock_quantity: i32,
    pub image: Option<ProductImage>,
}

/// Input for a product edit.
#[derive(Debug, Clone)]
pub struct ProductUpdate {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub stock_quantity: i32,
    /// `None` keeps the current image.
    pub image: Option<ProductImage>,
}
