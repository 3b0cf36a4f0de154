//! Durable local cart store.
//!
//! Holds the ordered cart lines for this client, usable with no credentials.
//! Mutations are synchronous and write-through to storage. While a session
//! exists the reconciler treats this store as a read-through cache of the
//! server cart, overwriting it wholesale on every authoritative fetch.

use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use pomelo_core::{CartLine, ProductId};

use crate::storage::{Storage, StorageError};

/// Storage slot holding the persisted cart.
const CART_SLOT: &str = "cart.json";

/// Persisted cart shape: `{ "items": [...] }`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CartFile {
    items: Vec<CartLine>,
}

/// Ordered, durable list of cart lines.
///
/// Invariants maintained by every mutator: at most one line per product,
/// and no line with quantity zero.
#[derive(Clone)]
pub struct LocalCartStore {
    inner: Arc<LocalCartInner>,
}

struct LocalCartInner {
    storage: Arc<dyn Storage>,
    items: RwLock<Vec<CartLine>>,
}

impl LocalCartStore {
    /// Create a cart store backed by `storage`, empty until
    /// [`hydrate`](Self::hydrate) runs.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(LocalCartInner {
                storage,
                items: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Read persisted cart contents. Undecodable state is discarded; lines
    /// violating the quantity invariant are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be read.
    pub fn hydrate(&self) -> Result<(), StorageError> {
        let file = match self.inner.storage.read(CART_SLOT)? {
            Some(contents) => match serde_json::from_str::<CartFile>(&contents) {
                Ok(file) => file,
                Err(err) => {
                    warn!(error = %err, "discarding undecodable persisted cart");
                    CartFile::default()
                }
            },
            None => CartFile::default(),
        };
        let items: Vec<CartLine> = file
            .items
            .into_iter()
            .filter(|line| {
                if line.quantity == 0 {
                    warn!(product_id = %line.product_id, "dropping persisted zero-quantity line");
                    false
                } else {
                    true
                }
            })
            .collect();
        debug!(line_count = items.len(), "cart hydrated");
        *self.inner.items.write().expect("cart lock poisoned") = items;
        Ok(())
    }

    /// The current cart lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartLine> {
        self.inner.items.read().expect("cart lock poisoned").clone()
    }

    /// Capture the full current state for later [`restore`](Self::restore).
    #[must_use]
    pub fn snapshot(&self) -> Vec<CartLine> {
        self.items()
    }

    /// Restore a previously captured snapshot exactly.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the restored state cannot be persisted.
    pub fn restore(&self, snapshot: Vec<CartLine>) -> Result<(), StorageError> {
        self.set_items(snapshot)
    }

    /// Replace the entire cart with the given lines (wholesale overwrite
    /// from an authoritative server cart).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the new state cannot be persisted.
    pub fn replace_all(&self, lines: Vec<CartLine>) -> Result<(), StorageError> {
        self.set_items(lines)
    }

    /// Add a line, merging with any existing line for the same product by
    /// incrementing its quantity.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the new state cannot be persisted.
    pub fn add(&self, line: CartLine) -> Result<(), StorageError> {
        let snapshot = {
            let mut items = self.inner.items.write().expect("cart lock poisoned");
            if let Some(existing) = items.iter_mut().find(|l| l.product_id == line.product_id) {
                existing.quantity += line.quantity;
            } else {
                items.push(line);
            }
            items.clone()
        };
        self.persist(&snapshot)
    }

    /// Set the absolute quantity of a product's line. A quantity of zero
    /// removes the line; a missing product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the new state cannot be persisted.
    pub fn update_quantity(&self, product_id: &ProductId, quantity: u32) -> Result<(), StorageError> {
        let snapshot = {
            let mut items = self.inner.items.write().expect("cart lock poisoned");
            if quantity == 0 {
                items.retain(|l| &l.product_id != product_id);
            } else if let Some(line) = items.iter_mut().find(|l| &l.product_id == product_id) {
                line.quantity = quantity;
            }
            items.clone()
        };
        self.persist(&snapshot)
    }

    /// Remove a product's line. Removing an absent product is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the new state cannot be persisted.
    pub fn remove(&self, product_id: &ProductId) -> Result<(), StorageError> {
        let snapshot = {
            let mut items = self.inner.items.write().expect("cart lock poisoned");
            items.retain(|l| &l.product_id != product_id);
            items.clone()
        };
        self.persist(&snapshot)
    }

    /// Empty the cart. The slot itself is kept (the cart is never deleted,
    /// only emptied).
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the emptied state cannot be persisted.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.set_items(Vec::new())
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().expect("cart lock poisoned").is_empty()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_items(&self) -> u64 {
        self.inner
            .items
            .read()
            .expect("cart lock poisoned")
            .iter()
            .map(|l| u64::from(l.quantity))
            .sum()
    }

    /// Sum of `unit_price x quantity` across all lines.
    #[must_use]
    pub fn total_price(&self) -> Decimal {
        self.inner
            .items
            .read()
            .expect("cart lock poisoned")
            .iter()
            .map(CartLine::line_total)
            .sum()
    }

    fn set_items(&self, lines: Vec<CartLine>) -> Result<(), StorageError> {
        let snapshot = {
            let mut items = self.inner.items.write().expect("cart lock poisoned");
            *items = lines;
            items.clone()
        };
        self.persist(&snapshot)
    }

    fn persist(&self, items: &[CartLine]) -> Result<(), StorageError> {
        let file = CartFile {
            items: items.to_vec(),
        };
        let json = serde_json::to_string(&file).expect("cart serialization is infallible");
        self.inner.storage.write(CART_SLOT, &json)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
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

    fn store() -> LocalCartStore {
        let store = LocalCartStore::new(Arc::new(MemoryStorage::new()));
        store.hydrate().unwrap();
        store
    }

    #[test]
    fn test_add_merges_same_product() {
        let store = store();
        store.add(line("p1", dec!(10.00), 2)).unwrap();
        store.add(line("p1", dec!(10.00), 1)).unwrap();

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(store.total_items(), 3);
        assert_eq!(store.total_price(), dec!(30.00));
    }

    #[test]
    fn test_totals_over_multiple_lines() {
        let store = store();
        store.add(line("p1", dec!(10.00), 2)).unwrap();
        store.add(line("p2", dec!(3.50), 4)).unwrap();

        assert_eq!(store.total_items(), 6);
        assert_eq!(store.total_price(), dec!(34.00));
    }

    #[test]
    fn test_update_quantity_to_zero_removes_line() {
        let store = store();
        store.add(line("p1", dec!(5.00), 2)).unwrap();
        store.update_quantity(&ProductId::new("p1"), 0).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.total_price(), Decimal::ZERO);
    }

    #[test]
    fn test_update_quantity_missing_product_is_noop() {
        let store = store();
        store.add(line("p1", dec!(5.00), 2)).unwrap();
        store.update_quantity(&ProductId::new("p9"), 7).unwrap();
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.total_items(), 2);
    }

    #[test]
    fn test_snapshot_restore_is_exact() {
        let store = store();
        store.add(line("p1", dec!(10.00), 2)).unwrap();
        store.add(line("p2", dec!(3.50), 1)).unwrap();

        let snapshot = store.snapshot();
        store.remove(&ProductId::new("p1")).unwrap();
        store.add(line("p3", dec!(1.00), 5)).unwrap();

        store.restore(snapshot.clone()).unwrap();
        assert_eq!(store.items(), snapshot);
        assert_eq!(store.total_price(), dec!(23.50));
    }

    #[test]
    fn test_persists_across_instances() {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalCartStore::new(storage.clone());
        store.hydrate().unwrap();
        store.add(line("p1", dec!(2.00), 3)).unwrap();

        let reloaded = LocalCartStore::new(storage);
        reloaded.hydrate().unwrap();
        assert_eq!(reloaded.total_items(), 3);
        assert_eq!(reloaded.total_price(), dec!(6.00));
    }

    #[test]
    fn test_hydrate_drops_zero_quantity_lines() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .write(
                "cart.json",
                r#"{"items":[
                    {"productId":"p1","name":"A","unitPrice":"1.00","quantity":0,"imageUrl":null},
                    {"productId":"p2","name":"B","unitPrice":"2.00","quantity":1,"imageUrl":null}
                ]}"#,
            )
            .unwrap();
        let store = LocalCartStore::new(storage);
        store.hydrate().unwrap();
        assert_eq!(store.items().len(), 1);
        assert_eq!(store.items()[0].product_id, ProductId::new("p2"));
    }

    #[test]
    fn test_clear_keeps_empty_cart() {
        let storage = Arc::new(MemoryStorage::new());
        let store = LocalCartStore::new(storage.clone());
        store.hydrate().unwrap();
        store.add(line("p1", dec!(2.00), 3)).unwrap();
        store.clear().unwrap();

        assert!(store.is_empty());
        // Slot still round-trips as an empty cart, not an absent one
        assert_eq!(
            storage.read("cart.json").unwrap().as_deref(),
            Some(r#"{"items":[]}"#)
        );
    }
}
