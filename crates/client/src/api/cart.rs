//! Typed client for the server-owned cart.
//!
//! The server cart is the authority while a user is authenticated; this
//! module is the only place that speaks its wire shape. Conversions into
//! [`CartLine`] live here so the reconciler and stores never see wire types.

use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use pomelo_core::{CartLine, CartLineId, ProductId};

use crate::error::ApiError;
use crate::pipeline::RequestPipeline;

// =============================================================================
// Wire types
// =============================================================================

/// The server's cart representation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCart {
    /// Cart lines as the server knows them.
    #[serde(default)]
    pub items: Vec<ServerCartItem>,
}

/// A cart line as the server represents it: the [`CartLine`] shape plus a
/// server-assigned line identifier.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCartItem {
    /// Server-assigned line identifier, used for update/remove calls.
    pub id: CartLineId,
    /// Product this line refers to.
    pub product_id: ProductId,
    /// Display name.
    pub name: String,
    /// Price per unit.
    pub unit_price: Decimal,
    /// Units in the cart.
    pub quantity: u32,
    /// Product image reference.
    #[serde(default)]
    pub image_url: Option<String>,
}

/// One line of a bulk `POST /cart/sync` request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SyncLine {
    /// Product to offer to the server cart.
    pub product_id: ProductId,
    /// Quantity held locally.
    pub quantity: u32,
}

impl ServerCart {
    /// Translate the server cart into local cart lines.
    ///
    /// Lines the server reports with a zero quantity are dropped rather than
    /// stored, preserving the local cart's quantity invariant.
    #[must_use]
    pub fn into_cart_lines(self) -> Vec<CartLine> {
        self.items
            .into_iter()
            .filter_map(|item| {
                if item.quantity == 0 {
                    warn!(product_id = %item.product_id, "server returned zero-quantity line; dropping");
                    return None;
                }
                Some(CartLine {
                    product_id: item.product_id,
                    name: item.name,
                    unit_price: item.unit_price,
                    quantity: item.quantity,
                    image_url: item.image_url,
                })
            })
            .collect()
    }
}

// =============================================================================
// CartClient
// =============================================================================

/// Typed calls against the server cart, riding on the request pipeline.
#[derive(Clone)]
pub struct CartClient {
    pipeline: RequestPipeline,
}

impl CartClient {
    /// Create a cart client over the shared pipeline.
    #[must_use]
    pub const fn new(pipeline: RequestPipeline) -> Self {
        Self { pipeline }
    }

    /// Fetch the authoritative cart.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self))]
    pub async fn get(&self) -> Result<ServerCart, ApiError> {
        self.pipeline.request(Method::GET, "/cart", None).await
    }

    /// Add `quantity` units of a product to the server cart.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn add_item(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<ServerCart, ApiError> {
        let body = serde_json::json!({
            "productId": product_id,
            "quantity": quantity,
        });
        self.pipeline
            .request(Method::POST, "/cart/items", Some(body))
            .await
    }

    /// Set the absolute quantity of an existing server cart line.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn update_item(
        &self,
        line_id: &CartLineId,
        quantity: u32,
    ) -> Result<ServerCart, ApiError> {
        let body = serde_json::json!({ "quantity": quantity });
        self.pipeline
            .request(
                Method::PUT,
                &format!("/cart/items/{line_id}"),
                Some(body),
            )
            .await
    }

    /// Remove a line from the server cart.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_item(&self, line_id: &CartLineId) -> Result<(), ApiError> {
        self.pipeline
            .request_unit(Method::DELETE, &format!("/cart/items/{line_id}"), None)
            .await
    }

    /// Empty the server cart.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<(), ApiError> {
        self.pipeline.request_unit(Method::DELETE, "/cart", None).await
    }

    /// Offer locally-held lines to the server in bulk. The response is the
    /// cart the server computed after applying them, which becomes the new
    /// truth on the client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self, lines), fields(line_count = lines.len()))]
    pub async fn sync(&self, lines: &[SyncLine]) -> Result<ServerCart, ApiError> {
        let body = serde_json::to_value(lines).expect("sync lines serialization is infallible");
        self.pipeline
            .request(Method::POST, "/cart/sync", Some(body))
            .await
    }
}
