//! Product catalog reads.
//!
//! Read-only business endpoints riding the same authenticated pipeline as
//! everything else. Responses are cached with `moka` (5-minute TTL) since
//! catalog data changes rarely relative to how often the UI asks for it.

use std::time::Duration;

use moka::future::Cache;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, instrument};

use pomelo_core::{Price, ProductId};

use crate::error::ApiError;
use crate::pipeline::RequestPipeline;

const CACHE_CAPACITY: u64 = 1000;
const CACHE_TTL: Duration = Duration::from_secs(300); // 5 minutes

/// A product as returned by the catalog endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Server-assigned product identifier.
    pub id: ProductId,
    /// Display name.
    pub name: String,
    /// Marketing description, if any.
    #[serde(default)]
    pub description: Option<String>,
    /// Current price.
    pub price: Price,
    /// Primary image reference.
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    ProductList(Vec<Product>),
}

/// Client for the product catalog.
#[derive(Clone)]
pub struct ProductsClient {
    pipeline: RequestPipeline,
    cache: Cache<String, CacheValue>,
}

impl ProductsClient {
    /// Create a products client over the shared pipeline.
    #[must_use]
    pub fn new(pipeline: RequestPipeline) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self { pipeline, cache }
    }

    /// List the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the request fails.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Product>, ApiError> {
        let cache_key = "products:all".to_string();
        if let Some(CacheValue::ProductList(products)) = self.cache.get(&cache_key).await {
            debug!("cache hit for product list");
            return Ok(products);
        }

        let products: Vec<Product> = self.pipeline.request(Method::GET, "/products", None).await?;
        self.cache
            .insert(cache_key, CacheValue::ProductList(products.clone()))
            .await;
        Ok(products)
    }

    /// Get a single product by id.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError`] if the product is not found or the request fails.
    #[instrument(skip(self), fields(product_id = %product_id))]
    pub async fn get(&self, product_id: &ProductId) -> Result<Product, ApiError> {
        let cache_key = format!("product:{product_id}");
        if let Some(CacheValue::Product(product)) = self.cache.get(&cache_key).await {
            debug!("cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .pipeline
            .request(Method::GET, &format!("/products/{product_id}"), None)
            .await?;
        self.cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }
}
