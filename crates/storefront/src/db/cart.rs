//! Cart line repository.

use sqlx::PgPool;

use shopkeep_core::cart::CartLine;
use shopkeep_core::{Price, ProductId, UserId};

use super::RepositoryError;

#[derive(Debug, sqlx::FromRow)]
struct CartLineRow {
    product_id: ProductId,
    name: String,
    price: Price,
    image_url: Option<String>,
    quantity: i32,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        Self {
            product_id: row.product_id,
            name: row.name,
            price: row.price,
            image_url: row.image_url,
            quantity: row.quantity,
        }
    }
}

/// Repository for persisted cart lines.
pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    /// Create a new cart repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// A user's cart lines joined with current product data, oldest line first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, user: UserId) -> Result<Vec<CartLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, CartLineRow>(
            r"
            SELECT c.product_id, p.name, p.price, p.image_url, c.quantity
            FROM cart_items c
            JOIN products p ON p.id = c.product_id
            WHERE c.user_id = $1
            ORDER BY c.created_at ASC
            ",
        )
        .bind(user)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(CartLine::from).collect())
    }

    /// Insert or overwrite the quantity for (user, product).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product or user does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(
        &self,
        user: UserId,
        product: ProductId,
        quantity: i32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO cart_items (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = now()
            ",
        )
        .bind(user)
        .bind(product)
        .bind(quantity)
        .execute(self.pool)
        .await
        .map_err(|e| RepositoryError::from_reference(e, RepositoryError::NotFound))?;

        Ok(())
    }

    /// Remove one line. Removing a missing line is not an error.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn delete(&self, user: UserId, product: ProductId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND product_id = $2")
            .bind(user)
            .bind(product)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove every line for a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the delete fails.
    pub async fn clear(&self, user: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
