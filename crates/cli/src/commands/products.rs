//! Product catalog commands.

use tracing::info;

use pomelo_core::ProductId;

/// List the catalog.
///
/// # Errors
///
/// Returns an error if the request fails.
pub async fn list() -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let products = store.products().list().await?;
    if products.is_empty() {
        info!("No products");
        return Ok(());
    }
    for product in &products {
        info!("  {}  {}  {}", product.id, product.name, product.price);
    }
    info!("{} products", products.len());
    Ok(())
}

/// Show one product.
///
/// # Errors
///
/// Returns an error if the product is unknown or the request fails.
pub async fn show(product_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::storefront()?;
    let product = store.products().get(&ProductId::new(product_id)).await?;
    info!("{}  {}", product.name, product.price);
    if let Some(description) = &product.description {
        info!("{description}");
    }
    if let Some(image_url) = &product.image_url {
        info!("Image: {image_url}");
    }
    Ok(())
}
