//! Cart inspection and mutation commands.
//!
//! All of these work anonymously; with a persisted session the mutations
//! also reach the server cart, rolling back locally if the server rejects
//! them.

use tracing::info;

use pomelo_core::{CartLine, ProductId};

/// Print the cart contents and totals.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed.
pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let items = store.cart().items();
    if items.is_empty() {
        info!("Cart is empty");
        return Ok(());
    }
    for line in &items {
        info!(
            "  {} x{} @ {} = {}",
            line.name,
            line.quantity,
            line.unit_price,
            line.line_total()
        );
    }
    info!(
        "Total: {} items, {}",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}

/// Add a product to the cart, looking up its catalog entry first.
///
/// # Errors
///
/// Returns an error if the product is unknown or the mutation fails.
pub async fn add(product_id: &str, quantity: u32) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let product = store.products().get(&ProductId::new(product_id)).await?;
    let line = CartLine {
        product_id: product.id,
        name: product.name.clone(),
        unit_price: product.price.amount,
        quantity,
        image_url: product.image_url,
    };
    store.cart().add_item(line).await?;
    info!("Added {} x{}", product.name, quantity);
    info!(
        "Cart: {} items, {}",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}

/// Set the absolute quantity of a cart line.
///
/// # Errors
///
/// Returns an error if the mutation fails.
pub async fn update(product_id: &str, quantity: u32) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    store
        .cart()
        .update_quantity(&ProductId::new(product_id), quantity)
        .await?;
    info!(
        "Cart: {} items, {}",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}

/// Remove a product from the cart.
///
/// # Errors
///
/// Returns an error if the mutation fails.
pub async fn remove(product_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    store.cart().remove_item(&ProductId::new(product_id)).await?;
    info!(
        "Cart: {} items, {}",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}

/// Empty the cart.
///
/// # Errors
///
/// Returns an error if the mutation fails.
pub async fn clear() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    store.cart().clear_cart().await?;
    info!("Cart cleared");
    Ok(())
}

/// Overwrite the local cart with the server's authoritative cart.
///
/// # Errors
///
/// Returns an error if the fetch fails.
pub async fn refresh() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    if !store.session().is_authenticated() {
        info!("Not logged in; the local cart is already the only cart");
        return Ok(());
    }
    store.cart().refresh_from_server().await?;
    info!(
        "Cart: {} items, {}",
        store.cart().total_items(),
        store.cart().total_price()
    );
    Ok(())
}
