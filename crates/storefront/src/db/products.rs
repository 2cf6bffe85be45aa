//! Product repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shopkeep_core::{Price, ProductId};

use super::RepositoryError;
use crate::models::{NewProduct, Product, ProductUpdate};

const PRODUCT_COLUMNS: &str =
    "id, name, description, price, image_url, image_key, stock_quantity, created_at";

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Price,
    image_url: Option<String>,
    image_key: Option<String>,
    stock_quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            image_url: row.image_url,
            image_key: row.image_key,
            stock_quantity: row.stock_quantity,
            created_at: row.created_at,
        }
    }
}

/// Repository for product database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List the newest products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Get a product by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let (image_url, image_key) = product
            .image
            .map_or((None, None), |image| (Some(image.url), image.key));

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO products (id, name, description, price, image_url, image_key, stock_quantity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(ProductId::new_v4())
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(image_url)
        .bind(image_key)
        .bind(product.stock_quantity)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Overwrite a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Database` if the update fails.
    pub async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        let replace_image = update.image.is_some();
        let (image_url, image_key) = update
            .image
            .map_or((None, None), |image| (Some(image.url), image.key));

        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE products
            SET name = $2,
                description = $3,
                price = $4,
                stock_quantity = $5,
                image_url = CASE WHEN $6 THEN $7 ELSE image_url END,
                image_key = CASE WHEN $6 THEN $8 ELSE image_key END
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(update.stock_quantity)
        .bind(replace_image)
        .bind(image_url)
        .bind(image_key)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::from).ok_or(RepositoryError::NotFound)
    }

    /// Delete a product. Cart lines holding it go with it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if the product does not exist.
    /// Returns `RepositoryError::Conflict` if orders reference the product.
    pub async fn delete(&self, id: ProductId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                RepositoryError::from_reference(
                    e,
                    RepositoryError::Conflict("product has been ordered".to_owned()),
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
