//! Seed the catalog with sample products.
//!
//! Products are read from a YAML list (the bundled `seed/products.yaml` unless
//! a file is given) and inserted through the storefront backend. Names that
//! already exist are skipped, so the command can be re-run safely.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use shopkeep_core::Price;
use shopkeep_storefront::db::{Backend, PgBackend, RepositoryError};
use shopkeep_storefront::models::{NewProduct, ProductImage};

use super::CommandError;

const SAMPLE_CATALOG: &str = include_str!("../../seed/products.yaml");

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Connect(#[from] CommandError),

    #[error("Failed to read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid product {name}: {reason}")]
    InvalidProduct { name: String, reason: String },

    #[error("Database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// One product entry in the seed file.
#[derive(Debug, Deserialize)]
struct SeedProduct {
    name: String,
    #[serde(default)]
    description: String,
    price: String,
    #[serde(default)]
    stock_quantity: i32,
    image_url: Option<String>,
}

impl TryFrom<SeedProduct> for NewProduct {
    type Error = SeedError;

    fn try_from(seed: SeedProduct) -> Result<Self, Self::Error> {
        let invalid = |reason: String| SeedError::InvalidProduct {
            name: seed.name.clone(),
            reason,
        };
        if seed.name.trim().is_empty() {
            return Err(invalid("name is empty".to_owned()));
        }
        let price = Price::parse(&seed.price).map_err(|e| invalid(e.to_string()))?;
        if seed.stock_quantity < 0 {
            return Err(invalid("stock_quantity is negative".to_owned()));
        }

        Ok(Self {
            name: seed.name.trim().to_owned(),
            description: seed.description.trim().to_owned(),
            price,
            stock_quantity: seed.stock_quantity,
            image: seed.image_url.map(ProductImage::linked),
        })
    }
}

/// Parse and validate a YAML product list. Nothing is written on error.
fn parse_catalog(yaml: &str) -> Result<Vec<NewProduct>, SeedError> {
    let entries: Vec<SeedProduct> = serde_yaml::from_str(yaml)?;
    entries.into_iter().map(NewProduct::try_from).collect()
}

/// Insert the products from `file` (or the sample catalog).
///
/// # Errors
///
/// Returns `SeedError` if the file cannot be read or parsed, or the database
/// rejects a write.
pub async fn products(file: Option<&Path>) -> Result<(), SeedError> {
    let yaml = match file {
        Some(path) => {
            info!(path = %path.display(), "Loading products from file");
            tokio::fs::read_to_string(path)
                .await
                .map_err(|e| SeedError::Read(path.display().to_string(), e))?
        }
        None => SAMPLE_CATALOG.to_owned(),
    };

    // Validate everything before connecting.
    let products = parse_catalog(&yaml)?;
    info!(count = products.len(), "Parsed product list");

    let backend = PgBackend::new(super::connect().await?);
    let mut existing: HashSet<String> = backend
        .list_products(i64::MAX)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;
    for product in products {
        if existing.contains(&product.name) {
            warn!(name = %product.name, "Product already exists, skipping");
            skipped += 1;
            continue;
        }
        let created = backend.create_product(product).await?;
        existing.insert(created.name);
        inserted += 1;
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_catalog_is_valid() {
        let products = parse_catalog(SAMPLE_CATALOG).unwrap();
        assert!(products.len() >= 5);
        assert!(products.iter().any(|p| p.image.is_some()));
        assert!(products.iter().any(|p| p.stock_quantity == 0));
    }

    #[test]
    fn test_rejects_bad_price() {
        let yaml = "- name: Mug\n  price: \"cheap\"\n";
        let err = parse_catalog(yaml).unwrap_err();
        assert!(matches!(err, SeedError::InvalidProduct { ref name, .. } if name == "Mug"));
    }

    #[test]
    fn test_defaults_optional_fields() {
        let yaml = "- name: Mug\n  price: \"9.50\"\n";
        let products = parse_catalog(yaml).unwrap();
        let mug = products.first().unwrap();
        assert_eq!(mug.stock_quantity, 0);
        assert!(mug.description.is_empty());
        assert!(mug.image.is_none());
    }
}
