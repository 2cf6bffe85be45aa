//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Query, State},
    response::IntoResponse,
};
use tracing::instrument;

use super::products::ProductView;
use super::{Layout, MessageQuery};
use crate::middleware::OptionalAuth;
use crate::state::AppState;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct HomeTemplate {
    pub layout: Layout,
    pub products: Vec<ProductView>,
}

/// Display the catalog.
///
/// Served from the listing cache when warm. A failed live fetch renders an
/// empty grid with a banner.
#[instrument(skip(state, user, messages))]
pub async fn index(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    Query(messages): Query<MessageQuery>,
) -> impl IntoResponse {
    let mut layout = Layout::load(&state, user.as_ref(), messages).await;

    let products = match state.catalog().listing().await {
        Ok(products) => products.iter().map(ProductView::from).collect(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load product listing");
            layout.fail("Could not load products. Please try again.");
            Vec::new()
        }
    };

    HomeTemplate { layout, products }
}
