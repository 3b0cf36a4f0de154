//! Integration tests for the Pomelo storefront client.
//!
//! Every test runs against a `wiremock` mock of the commerce API and a
//! temporary state directory, so the suite is hermetic: no network, no
//! shared state, no server to start.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p pomelo-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `token_refresh` - Single-flight refresh, replay, session invalidation
//! - `cart_flows` - Optimistic mutations, rollback, wholesale overwrite
//! - `login_merge` - Login-time cart merge and its idempotence
//! - `storefront` - End-to-end flows through the [`Storefront`] facade

use std::sync::Arc;

use tempfile::TempDir;
use wiremock::MockServer;

use pomelo_client::api::auth::AuthClient;
use pomelo_client::api::cart::CartClient;
use pomelo_client::cart::{CartReconciler, LocalCartStore};
use pomelo_client::pipeline::RequestPipeline;
use pomelo_client::session::SessionStore;
use pomelo_client::storage::FileStorage;
use pomelo_client::Storefront;
use pomelo_core::{CartLine, Email, ProductId, UserId, UserRecord};
use rust_decimal::Decimal;

/// A mock API plus a fully-wired client over a temporary state directory.
///
/// The components are assembled by hand rather than through [`Storefront`]
/// so tests control exactly when (and whether) the session watcher runs;
/// without it, every server interaction is an explicit call in the test.
pub struct Harness {
    pub server: MockServer,
    pub storage: Arc<FileStorage>,
    pub session: SessionStore,
    pub local: LocalCartStore,
    pub cart: CartReconciler,
    pub auth: AuthClient,
    pub pipeline: RequestPipeline,
    state_dir: TempDir,
}

impl Harness {
    /// Start a mock server and wire a client against it.
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let state_dir = tempfile::tempdir().expect("failed to create state dir");
        Self::over(server, state_dir)
    }

    fn over(server: MockServer, state_dir: TempDir) -> Self {
        let storage = Arc::new(FileStorage::new(state_dir.path().to_path_buf()));

        let session = SessionStore::new(storage.clone());
        session.hydrate().expect("failed to hydrate session");

        let local = LocalCartStore::new(storage.clone());
        local.hydrate().expect("failed to hydrate cart");

        let pipeline = RequestPipeline::new(reqwest::Client::new(), server.uri(), session.clone());
        let cart_api = CartClient::new(pipeline.clone());
        let cart = CartReconciler::new(local.clone(), cart_api, session.clone());
        let auth = AuthClient::new(pipeline.clone(), session.clone());

        Self {
            server,
            storage,
            session,
            local,
            cart,
            auth,
            pipeline,
            state_dir,
        }
    }

    /// Tear down the in-memory client and rebuild it over the same state
    /// directory and mock server, simulating a process restart.
    #[must_use]
    pub fn restart(self) -> Self {
        Self::over(self.server, self.state_dir)
    }

    /// Seed an authenticated session directly, as if a login happened in a
    /// previous run. Does not touch the server.
    pub fn seed_session(&self, access_token: &str, refresh_token: &str) {
        self.session
            .set_session(
                test_user(),
                access_token.to_string(),
                refresh_token.to_string(),
            )
            .expect("failed to seed session");
    }

    /// Build a [`Storefront`] facade over this harness's server with its own
    /// fresh state directory. The facade runs its session watcher.
    pub fn storefront(&self) -> (Storefront, TempDir) {
        let state_dir = tempfile::tempdir().expect("failed to create state dir");
        let config =
            pomelo_client::config::ClientConfig::for_endpoint(self.server.uri(), state_dir.path());
        let store = Storefront::new(config).expect("failed to build storefront");
        (store, state_dir)
    }
}

/// The user every test logs in as.
#[must_use]
pub fn test_user() -> UserRecord {
    UserRecord {
        id: UserId::new("u_1"),
        email: Email::parse("shopper@example.com").expect("valid email"),
        name: Some("Shopper".to_string()),
        created_at: None,
    }
}

/// Build a local cart line.
#[must_use]
pub fn line(product_id: &str, unit_price: &str, quantity: u32) -> CartLine {
    CartLine {
        product_id: ProductId::new(product_id),
        name: format!("Product {product_id}"),
        unit_price: unit_price.parse::<Decimal>().expect("valid price"),
        quantity,
        image_url: None,
    }
}

/// JSON for one server cart item.
#[must_use]
pub fn cart_item_json(
    line_id: &str,
    product_id: &str,
    unit_price: &str,
    quantity: u32,
) -> serde_json::Value {
    serde_json::json!({
        "id": line_id,
        "productId": product_id,
        "name": format!("Product {product_id}"),
        "unitPrice": unit_price,
        "quantity": quantity,
    })
}

/// JSON for a server cart holding the given items.
#[must_use]
pub fn cart_json(items: &[serde_json::Value]) -> serde_json::Value {
    serde_json::json!({ "items": items })
}

/// JSON for the API's error payload convention.
#[must_use]
pub fn error_json(message: &str, error_code: Option<&str>, status: u16) -> serde_json::Value {
    match error_code {
        Some(code) => serde_json::json!({
            "message": message,
            "errorCode": code,
            "statusCode": status,
        }),
        None => serde_json::json!({
            "message": message,
            "statusCode": status,
        }),
    }
}

/// JSON for `POST /auth/refresh` success.
#[must_use]
pub fn tokens_json(access_token: &str, refresh_token: &str) -> serde_json::Value {
    serde_json::json!({
        "accessToken": access_token,
        "refreshToken": refresh_token,
    })
}

/// JSON for `POST /auth/login` and `POST /auth/register` success.
#[must_use]
pub fn auth_json(access_token: &str, refresh_token: &str) -> serde_json::Value {
    serde_json::json!({
        "user": {
            "id": "u_1",
            "email": "shopper@example.com",
            "name": "Shopper",
        },
        "accessToken": access_token,
        "refreshToken": refresh_token,
    })
}
