//! Typed clients for the commerce API.
//!
//! Every client rides on [`crate::pipeline::RequestPipeline`], so all
//! business calls share bearer-token attachment, single-flight refresh, and
//! error normalization.

pub mod auth;
pub mod cart;
pub mod products;

pub use auth::AuthClient;
pub use cart::{CartClient, ServerCart, ServerCartItem, SyncLine};
pub use products::{Product, ProductsClient};
