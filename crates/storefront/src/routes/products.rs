//! Product detail route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};
use tracing::instrument;

use shopkeep_core::ProductId;

use super::{Layout, MessageQuery};
use crate::error::AppError;
use crate::middleware::OptionalAuth;
use crate::models::Product;
use crate::state::AppState;

/// Product display data for templates.
#[derive(Clone)]
pub struct ProductView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: String,
    pub image_url: Option<String>,
    pub stock_quantity: i32,
    pub in_stock: bool,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.to_string(),
            name: product.name.clone(),
            description: product.description.clone(),
            price: product.price.to_string(),
            image_url: product.image_url.clone(),
            stock_quantity: product.stock_quantity,
            in_stock: product.in_stock(),
        }
    }
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub layout: Layout,
    pub product: ProductView,
}

/// Display a single product.
///
/// Always reads the live row so stock is current.
#[instrument(skip(state, user, messages))]
pub async fn show(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Path(id): Path<ProductId>,
    Query(messages): Query<MessageQuery>,
) -> Result<Response, AppError> {
    let product = state
        .catalog()
        .product(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))?;

    let layout = Layout::load(&state, user.as_ref(), messages).await;
    Ok(ProductShowTemplate {
        layout,
        product: ProductView::from(&product),
    }
    .into_response())
}
