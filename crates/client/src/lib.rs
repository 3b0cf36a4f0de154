//! Pomelo storefront client library.
//!
//! # Architecture
//!
//! Everything in this crate sits on two coupled subsystems:
//!
//! - The **session pipeline** ([`session::SessionStore`] +
//!   [`pipeline::RequestPipeline`]) attaches the current access token to
//!   every outbound call, detects token expiry, performs a single-flight
//!   refresh, and replays calls that were blocked while the refresh was in
//!   flight.
//! - The **cart reconciler** ([`cart::CartReconciler`]) presents one cart
//!   API regardless of authentication state, applying optimistic local
//!   mutations that are rolled back exactly on server failure, and merging
//!   the anonymous local cart into the server cart on login.
//!
//! They are coupled through the session store: a successful login flows into
//! the reconciler via a `watch` subscription, never via a direct call.
//!
//! # Example
//!
//! ```rust,ignore
//! use pomelo_client::{ClientConfig, Storefront};
//!
//! let config = ClientConfig::from_env()?;
//! let store = Storefront::new(config)?;
//!
//! store.auth().login(&email, &password).await?;
//! store.cart().add_item(line).await?;
//! println!("{} items", store.cart().total_items());
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod cart;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod storage;

use std::sync::Arc;

use thiserror::Error;

use crate::api::auth::AuthClient;
use crate::api::cart::CartClient;
use crate::api::products::ProductsClient;
use crate::cart::{CartReconciler, LocalCartStore};
use crate::config::ConfigError;
use crate::pipeline::RequestPipeline;
use crate::session::SessionStore;
use crate::storage::{FileStorage, StorageError};

pub use crate::config::ClientConfig;
pub use crate::error::{ApiError, ErrorCode};

/// Errors that can occur while constructing a [`Storefront`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration loading or validation failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    /// Durable state could not be read at startup.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Fully-wired storefront client.
///
/// Owns the session store, local cart, request pipeline, and the typed API
/// clients, and keeps the cart reconciler subscribed to session transitions.
/// Cheap to clone; all clones share the same process-wide state.
#[derive(Clone)]
pub struct Storefront {
    session: SessionStore,
    auth: AuthClient,
    cart: CartReconciler,
    products: ProductsClient,
}

impl Storefront {
    /// Build a storefront client from configuration and hydrate durable
    /// state.
    ///
    /// Must be called within a tokio runtime: the cart reconciler spawns a
    /// background task that reacts to session transitions.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the HTTP client cannot be built or durable
    /// state cannot be read.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let storage = Arc::new(FileStorage::new(config.state_dir.clone()));

        let session = SessionStore::new(storage.clone());
        session.hydrate()?;

        let local = LocalCartStore::new(storage);
        local.hydrate()?;

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let pipeline = RequestPipeline::new(http, config.api_base_url, session.clone());

        let auth = AuthClient::new(pipeline.clone(), session.clone());
        let cart_api = CartClient::new(pipeline.clone());
        let products = ProductsClient::new(pipeline);

        let cart = CartReconciler::new(local, cart_api, session.clone());
        // Detached: runs until the session store (and its watch channel) drops
        let _ = cart.spawn_session_watcher();

        Ok(Self {
            session,
            auth,
            cart,
            products,
        })
    }

    /// The process-wide session store.
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Authentication operations (login, register, logout).
    #[must_use]
    pub const fn auth(&self) -> &AuthClient {
        &self.auth
    }

    /// The unified cart API.
    #[must_use]
    pub const fn cart(&self) -> &CartReconciler {
        &self.cart
    }

    /// Product catalog reads.
    #[must_use]
    pub const fn products(&self) -> &ProductsClient {
        &self.products
    }
}
