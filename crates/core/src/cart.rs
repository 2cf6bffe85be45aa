//! Cart line aggregation.
//!
//! A cart is a list of [`CartLine`]s, at most one per product. The functions
//! here compute totals and apply the local-mirror mutations that follow a
//! successful remote write. They never touch storage themselves.

use serde::{Deserialize, Serialize};

use crate::{Price, ProductId};

/// One product in a cart, joined with the product's current catalog data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub image_url: Option<String>,
    pub quantity: i32,
}

impl CartLine {
    /// `price × quantity` for this line.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// Product data needed to add a new line to a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineProduct {
    pub product_id: ProductId,
    pub name: String,
    pub price: Price,
    pub image_url: Option<String>,
}

/// Number of items in the cart: the sum of positive quantities.
#[must_use]
pub fn total_items(lines: &[CartLine]) -> i64 {
    lines
        .iter()
        .filter(|line| line.quantity > 0)
        .map(|line| i64::from(line.quantity))
        .sum()
}

/// Cart value: the sum of `price × quantity` over all lines.
#[must_use]
pub fn total_price(lines: &[CartLine]) -> Price {
    lines.iter().map(CartLine::subtotal).sum()
}

/// Item count and value of a cart, computed together for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CartTotals {
    pub items: i64,
    pub price: Price,
}

impl CartTotals {
    #[must_use]
    pub fn of(lines: &[CartLine]) -> Self {
        Self {
            items: total_items(lines),
            price: total_price(lines),
        }
    }
}

/// Mirror an add: bump an existing line by one, or append a new line.
///
/// Returns the line's new quantity. A line already at `i32::MAX` stays
/// there; [`quantity_after_add`] is how callers refuse such an add.
pub fn apply_add(lines: &mut Vec<CartLine>, product: LineProduct) -> i32 {
    if let Some(line) = lines
        .iter_mut()
        .find(|line| line.product_id == product.product_id)
    {
        line.quantity = line.quantity.saturating_add(1);
        return line.quantity;
    }

    lines.push(CartLine {
        product_id: product.product_id,
        name: product.name,
        price: product.price,
        image_url: product.image_url,
        quantity: 1,
    });
    1
}

/// Mirror a quantity change. A quantity of zero or less removes the line.
pub fn apply_set_quantity(lines: &mut Vec<CartLine>, product_id: ProductId, quantity: i32) {
    if quantity <= 0 {
        apply_remove(lines, product_id);
        return;
    }
    if let Some(line) = lines.iter_mut().find(|line| line.product_id == product_id) {
        line.quantity = quantity;
    }
}

/// Mirror a removal.
pub fn apply_remove(lines: &mut Vec<CartLine>, product_id: ProductId) {
    lines.retain(|line| line.product_id != product_id);
}

/// Quantity that an add would persist for `product_id`, or `None` when the
/// line cannot grow any further.
#[must_use]
pub fn quantity_after_add(lines: &[CartLine], product_id: ProductId) -> Option<i32> {
    lines
        .iter()
        .find(|line| line.product_id == product_id)
        .map_or(Some(1), |line| line.quantity.checked_add(1))
}
