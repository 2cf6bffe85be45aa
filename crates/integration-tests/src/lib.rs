//! Integration tests for Shopkeep.
//!
//! Each test spawns the full storefront router on an ephemeral port, backed by
//! [`MemoryBackend`], [`MemoryImageStore`] and an in-memory session store,
//! and drives it over HTTP with a cookie-carrying client. No database or
//! external service is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shopkeep-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, redirect};
use secrecy::SecretString;
use tempfile::TempDir;
use tower_sessions::MemoryStore;

use shopkeep_core::{Email, Price, Role, UserId};
use shopkeep_storefront::config::StorefrontConfig;
use shopkeep_storefront::db::{Backend, MemoryBackend};
use shopkeep_storefront::middleware::create_session_layer;
use shopkeep_storefront::models::{NewProduct, Product};
use shopkeep_storefront::routes;
use shopkeep_storefront::state::AppState;
use shopkeep_storefront::storage::{ImageStore, MemoryImageStore};

/// Password every test account uses.
pub const PASSWORD: &str = "correct horse battery";

/// A running storefront plus handles on its in-memory backends.
pub struct TestApp {
    pub address: String,
    pub backend: Arc<MemoryBackend>,
    pub images: Arc<MemoryImageStore>,
    pub state: AppState,
    _media_dir: TempDir,
}

/// A signed-in client and the account behind it.
pub struct Shopper {
    pub client: Client,
    pub id: UserId,
    pub email: Email,
}

fn test_config(media_dir: &TempDir) -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        base_url: "http://localhost".to_owned(),
        media_dir: media_dir.path().to_path_buf(),
        catalog_ttl: Duration::from_secs(60),
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 1.0,
        sentry_traces_sample_rate: 0.0,
    }
}

impl TestApp {
    /// Start a fresh app on an ephemeral port.
    pub async fn spawn() -> Self {
        let media_dir = tempfile::tempdir().unwrap();
        let config = test_config(&media_dir);

        let backend = Arc::new(MemoryBackend::new());
        let images = Arc::new(MemoryImageStore::new());
        let backend_port: Arc<dyn Backend> = backend.clone();
        let image_port: Arc<dyn ImageStore> = images.clone();
        let state = AppState::new(config.clone(), backend_port, image_port);

        let app = routes::app(state.clone())
            .layer(create_session_layer(MemoryStore::default(), &config));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            address,
            backend,
            images,
            state,
            _media_dir: media_dir,
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    /// A client with its own cookie jar that does not follow redirects.
    #[must_use]
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .redirect(redirect::Policy::none())
            .build()
            .unwrap()
    }

    pub async fn get(&self, client: &Client, path: &str) -> Response {
        client.get(self.url(path)).send().await.unwrap()
    }

    pub async fn post_form(&self, client: &Client, path: &str, form: &[(&str, &str)]) -> Response {
        client.post(self.url(path)).form(form).send().await.unwrap()
    }

    /// Insert a product directly into the backend.
    pub async fn seed_product(&self, name: &str, price: &str, stock: i32) -> Product {
        self.backend
            .create_product(NewProduct {
                name: name.to_owned(),
                description: format!("{name} description"),
                price: Price::parse(price).unwrap(),
                stock_quantity: stock,
                image: None,
            })
            .await
            .unwrap()
    }

    /// Register through the HTTP form; the new account is signed in.
    pub async fn register(&self, email: &str, full_name: &str) -> Shopper {
        let client = Self::client();
        let response = self
            .post_form(
                &client,
                "/register",
                &[
                    ("email", email),
                    ("full_name", full_name),
                    ("password", PASSWORD),
                    ("password_confirm", PASSWORD),
                ],
            )
            .await;
        assert_eq!(location(&response), "/", "registration should sign in");

        let email = Email::parse(email).unwrap();
        let credentials = self.backend.get_credentials(&email).await.unwrap().unwrap();
        Shopper {
            client,
            id: credentials.user_id,
            email,
        }
    }

    /// Register, then promote to admin.
    pub async fn register_admin(&self, email: &str) -> Shopper {
        let admin = self.register(email, "Store Admin").await;
        self.backend.set_role(&admin.email, Role::Admin).await.unwrap();
        admin
    }
}

/// The `Location` header of a redirect response.
#[must_use]
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .map(|v| v.to_str().unwrap().to_owned())
        .unwrap_or_default()
}

/// Whether `response` redirects to `path` (ignoring any banner query).
#[must_use]
pub fn redirects_to(response: &Response, path: &str) -> bool {
    response.status().is_redirection()
        && location(response).split('?').next() == Some(path)
}
