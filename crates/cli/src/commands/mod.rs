//! CLI command implementations.

pub mod auth;
pub mod cart;
pub mod products;

use pomelo_client::config::ClientConfig;
use pomelo_client::Storefront;

/// Build a fully-wired storefront client from the environment.
pub fn storefront() -> Result<Storefront, Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    Ok(Storefront::new(config)?)
}
