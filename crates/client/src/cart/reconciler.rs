//! Cart reconciler: one cart API over the local and server carts.
//!
//! Presents `items`/`total_items`/`total_price` and the four mutations
//! regardless of authentication state:
//!
//! - Anonymous: mutations apply only to the local cart, synchronously.
//! - Authenticated: the local cart is mutated first (optimistic, so the UI
//!   reflects it immediately), then the matching server call is issued. On
//!   failure the local cart is restored to its exact pre-mutation snapshot
//!   and the error is re-raised.
//!
//! A login transition (observed through the session store's watch channel)
//! triggers a one-shot merge: local lines are offered to the server's bulk
//! sync and the server's answer replaces the local cart wholesale.
//!
//! Authenticated mutations are serialized through a per-reconciler mutation
//! lock held across the optimistic write and the server round-trip, so a
//! snapshot can never be invalidated by an overlapping mutation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use pomelo_core::{CartLine, CartLineId, ProductId};

use crate::api::cart::{CartClient, ServerCart, SyncLine};
use crate::cart::local::LocalCartStore;
use crate::error::ApiError;
use crate::session::SessionStore;
use crate::storage::StorageError;

/// Errors raised by cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The server rejected a cart call; local state has been rolled back.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Local cart state could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The server cart has no line for this product, so its quantity cannot
    /// be updated there.
    #[error("no server cart line for product {0}")]
    LineNotOnServer(ProductId),
}

/// Unified cart over [`LocalCartStore`] and [`CartClient`].
///
/// Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct CartReconciler {
    inner: Arc<ReconcilerInner>,
}

struct ReconcilerInner {
    local: LocalCartStore,
    server: CartClient,
    session: SessionStore,
    /// Product -> server line id, learned from every server cart we see.
    line_ids: RwLock<HashMap<ProductId, CartLineId>>,
    /// Serializes authenticated mutations (and wholesale overwrites).
    mutation_lock: Mutex<()>,
    /// Collapses concurrent login-merge triggers into one in-flight sync.
    merge_guard: Mutex<()>,
}

impl CartReconciler {
    /// Create a reconciler over the given stores and server client.
    #[must_use]
    pub fn new(local: LocalCartStore, server: CartClient, session: SessionStore) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                local,
                server,
                session,
                line_ids: RwLock::new(HashMap::new()),
                mutation_lock: Mutex::new(()),
                merge_guard: Mutex::new(()),
            }),
        }
    }

    /// Spawn the background task that reacts to session transitions:
    /// login triggers the local-to-server merge, logout empties the local
    /// cart so the next anonymous session starts clean.
    pub fn spawn_session_watcher(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut rx = this.inner.session.subscribe();
        // Baseline read happens synchronously, before the task is spawned: a
        // transition racing the task's first poll must arrive as a change,
        // not become the baseline itself.
        let mut was_authenticated = rx.borrow_and_update().user.is_some();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let is_authenticated = rx.borrow_and_update().user.is_some();
                if is_authenticated && !was_authenticated {
                    if let Err(err) = this.merge_local_into_server().await {
                        warn!(error = %err, "login-time cart merge failed");
                    }
                } else if !is_authenticated && was_authenticated {
                    this.inner
                        .line_ids
                        .write()
                        .expect("line id map poisoned")
                        .clear();
                    if let Err(err) = this.inner.local.clear() {
                        warn!(error = %err, "failed to clear local cart on logout");
                    }
                }
                was_authenticated = is_authenticated;
            }
        })
    }

    // =========================================================================
    // Read surface
    // =========================================================================

    /// The current cart lines.
    #[must_use]
    pub fn items(&self) -> Vec<CartLine> {
        self.inner.local.items()
    }

    /// Total unit count, computed from the local cart only.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.inner.local.total_items()
    }

    /// Total price, computed from the local cart only so the UI is always
    /// consistent with the mutation that just applied.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.inner.local.total_price()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add a line to the cart. If the product is already present its
    /// quantity is incremented by `line.quantity`.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the server rejects the call (local state is
    /// rolled back first) or local persistence fails.
    #[instrument(skip(self), fields(product_id = %line.product_id, quantity = line.quantity))]
    pub async fn add_item(&self, line: CartLine) -> Result<(), CartError> {
        let _guard = self.inner.mutation_lock.lock().await;

        let snapshot = self.inner.local.snapshot();
        self.inner.local.add(line.clone())?;

        if !self.inner.session.is_authenticated() {
            return Ok(());
        }
        match self.inner.server.add_item(&line.product_id, line.quantity).await {
            Ok(cart) => {
                self.record_line_ids(&cart);
                Ok(())
            }
            Err(err) => {
                self.inner.local.restore(snapshot)?;
                Err(err.into())
            }
        }
    }

    /// Set the absolute quantity of a product's line. A quantity of zero
    /// removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the server rejects the call (local state is
    /// rolled back first) or local persistence fails.
    #[instrument(skip(self), fields(product_id = %product_id, quantity))]
    pub async fn update_quantity(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return self.remove_item(product_id).await;
        }
        let _guard = self.inner.mutation_lock.lock().await;

        let snapshot = self.inner.local.snapshot();
        if !snapshot.iter().any(|l| &l.product_id == product_id) {
            // Nothing to update locally or remotely
            return Ok(());
        }
        self.inner.local.update_quantity(product_id, quantity)?;

        if !self.inner.session.is_authenticated() {
            return Ok(());
        }
        let result = match self.lookup_line_id(product_id).await {
            Ok(line_id) => self
                .inner
                .server
                .update_item(&line_id, quantity)
                .await
                .map(|cart| self.record_line_ids(&cart))
                .map_err(CartError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            self.inner.local.restore(snapshot)?;
            return Err(err);
        }
        Ok(())
    }

    /// Remove a product's line from the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the server rejects the call (local state is
    /// rolled back first) or local persistence fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn remove_item(&self, product_id: &ProductId) -> Result<(), CartError> {
        let _guard = self.inner.mutation_lock.lock().await;

        let snapshot = self.inner.local.snapshot();
        self.inner.local.remove(product_id)?;

        if !self.inner.session.is_authenticated() {
            return Ok(());
        }
        // The line-id map is in-memory only, so after a restart the id must
        // be re-learned from the server before the absence of an entry can
        // mean "already removed there".
        let line_id = match self.lookup_line_id(product_id).await {
            Ok(line_id) => line_id,
            Err(CartError::LineNotOnServer(_)) => {
                debug!("no server line to remove");
                return Ok(());
            }
            Err(err) => {
                self.inner.local.restore(snapshot)?;
                return Err(err);
            }
        };
        match self.inner.server.remove_item(&line_id).await {
            Ok(()) => {
                self.inner
                    .line_ids
                    .write()
                    .expect("line id map poisoned")
                    .remove(product_id);
                Ok(())
            }
            Err(err) => {
                self.inner.local.restore(snapshot)?;
                Err(err.into())
            }
        }
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the server rejects the call (prior contents
    /// are restored in full) or local persistence fails.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<(), CartError> {
        let _guard = self.inner.mutation_lock.lock().await;

        let snapshot = self.inner.local.snapshot();
        self.inner.local.clear()?;

        if !self.inner.session.is_authenticated() {
            return Ok(());
        }
        match self.inner.server.clear().await {
            Ok(()) => {
                self.inner
                    .line_ids
                    .write()
                    .expect("line id map poisoned")
                    .clear();
                Ok(())
            }
            Err(err) => {
                self.inner.local.restore(snapshot)?;
                Err(err.into())
            }
        }
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Fetch the authoritative server cart and overwrite the local cart
    /// wholesale. No-op while anonymous.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the fetch fails or the result cannot be
    /// persisted.
    #[instrument(skip(self))]
    pub async fn refresh_from_server(&self) -> Result<(), CartError> {
        if !self.inner.session.is_authenticated() {
            return Ok(());
        }
        let _guard = self.inner.mutation_lock.lock().await;
        self.fetch_and_overwrite_locked().await
    }

    /// Offer every local line to the server's bulk sync and replace the
    /// local cart with the server's answer (last-writer-wins: whatever the
    /// server computed after applying the lines is what we display).
    ///
    /// Idempotent under concurrent triggers: while a merge is in flight,
    /// further calls return immediately without issuing a second sync.
    ///
    /// # Errors
    ///
    /// Returns [`CartError`] if the sync fails or the result cannot be
    /// persisted.
    #[instrument(skip(self))]
    pub async fn merge_local_into_server(&self) -> Result<(), CartError> {
        let Ok(_merge) = self.inner.merge_guard.try_lock() else {
            debug!("cart merge already in flight; collapsing trigger");
            return Ok(());
        };
        if !self.inner.session.is_authenticated() {
            return Ok(());
        }

        let _guard = self.inner.mutation_lock.lock().await;
        let lines = self.inner.local.items();
        if lines.is_empty() {
            // Nothing to offer; just adopt whatever the server has
            return self.fetch_and_overwrite_locked().await;
        }

        let sync_lines: Vec<SyncLine> = lines
            .iter()
            .map(|l| SyncLine {
                product_id: l.product_id.clone(),
                quantity: l.quantity,
            })
            .collect();
        debug!(line_count = sync_lines.len(), "merging local cart into server");
        let cart = self.inner.server.sync(&sync_lines).await?;
        self.adopt_server_cart(cart)?;
        Ok(())
    }

    /// Fetch and overwrite; caller must hold the mutation lock.
    async fn fetch_and_overwrite_locked(&self) -> Result<(), CartError> {
        let cart = self.inner.server.get().await?;
        self.adopt_server_cart(cart)?;
        Ok(())
    }

    /// Make a server cart the local truth: rebuild the line-id map and
    /// overwrite the local store wholesale.
    fn adopt_server_cart(&self, cart: ServerCart) -> Result<(), StorageError> {
        self.record_line_ids(&cart);
        self.inner.local.replace_all(cart.into_cart_lines())
    }

    /// Rebuild the product -> server line id map from an authoritative cart.
    fn record_line_ids(&self, cart: &ServerCart) {
        let mut map = self.inner.line_ids.write().expect("line id map poisoned");
        map.clear();
        for item in &cart.items {
            map.insert(item.product_id.clone(), item.id.clone());
        }
    }

    /// Resolve the server line id for a product, refetching the server cart
    /// once if the map has no entry (e.g., after a process restart). The
    /// refetch only feeds the id map; it does not touch local cart contents
    /// mid-mutation.
    async fn lookup_line_id(&self, product_id: &ProductId) -> Result<CartLineId, CartError> {
        let known = {
            self.inner
                .line_ids
                .read()
                .expect("line id map poisoned")
                .get(product_id)
                .cloned()
        };
        if let Some(line_id) = known {
            return Ok(line_id);
        }

        let cart = self.inner.server.get().await?;
        self.record_line_ids(&cart);
        self.inner
            .line_ids
            .read()
            .expect("line id map poisoned")
            .get(product_id)
            .cloned()
            .ok_or_else(|| CartError::LineNotOnServer(product_id.clone()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::pipeline::RequestPipeline;
    use crate::storage::MemoryStorage;
    use rust_decimal::dec;

    fn line(product_id: &str, unit_price: Decimal, quantity: u32) -> CartLine {
        CartLine {
            product_id: ProductId::new(product_id),
            name: format!("Product {product_id}"),
            unit_price,
            quantity,
            image_url: None,
        }
    }

    /// Anonymous reconciler; the endpoint is never reached.
    fn reconciler() -> CartReconciler {
        let storage = Arc::new(MemoryStorage::new());
        let session = SessionStore::new(storage.clone());
        session.hydrate().unwrap();
        let local = LocalCartStore::new(storage);
        local.hydrate().unwrap();
        let pipeline = RequestPipeline::new(
            reqwest::Client::new(),
            "http://localhost:0".to_string(),
            session.clone(),
        );
        CartReconciler::new(local, CartClient::new(pipeline), session)
    }

    #[tokio::test]
    async fn test_anonymous_add_merges_quantities() {
        let cart = reconciler();
        cart.add_item(line("p1", dec!(10.00), 2)).await.unwrap();
        cart.add_item(line("p1", dec!(10.00), 1)).await.unwrap();

        let items = cart.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(cart.total_price(), dec!(30.00));
        assert_eq!(cart.total_items(), 3);
    }

    #[tokio::test]
    async fn test_anonymous_update_to_zero_removes() {
        let cart = reconciler();
        cart.add_item(line("p1", dec!(5.00), 2)).await.unwrap();
        cart.update_quantity(&ProductId::new("p1"), 0).await.unwrap();
        assert!(cart.items().is_empty());
        assert_eq!(cart.total_price(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_anonymous_mutations_never_touch_network() {
        // The pipeline points at a closed port; anonymous mutations must
        // still succeed because no server call is issued.
        let cart = reconciler();
        cart.add_item(line("p1", dec!(1.25), 4)).await.unwrap();
        cart.update_quantity(&ProductId::new("p1"), 2).await.unwrap();
        cart.remove_item(&ProductId::new("p1")).await.unwrap();
        cart.add_item(line("p2", dec!(2.00), 1)).await.unwrap();
        cart.clear_cart().await.unwrap();
        assert!(cart.items().is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_product_is_noop() {
        let cart = reconciler();
        cart.add_item(line("p1", dec!(5.00), 1)).await.unwrap();
        cart.update_quantity(&ProductId::new("p9"), 3).await.unwrap();
        assert_eq!(cart.total_items(), 1);
    }

    #[tokio::test]
    async fn test_totals_invariant_after_each_mutation() {
        let cart = reconciler();
        cart.add_item(line("p1", dec!(10.00), 2)).await.unwrap();
        cart.add_item(line("p2", dec!(3.00), 5)).await.unwrap();
        assert_eq!(cart.total_items(), 7);
        assert_eq!(cart.total_price(), dec!(35.00));

        cart.update_quantity(&ProductId::new("p2"), 1).await.unwrap();
        assert_eq!(cart.total_items(), 3);
        assert_eq!(cart.total_price(), dec!(23.00));

        cart.remove_item(&ProductId::new("p1")).await.unwrap();
        assert_eq!(cart.total_items(), 1);
        assert_eq!(cart.total_price(), dec!(3.00));
    }
}
